//! Wallet ledger: per-user balance with an append-only transaction log.

pub mod wallet;

pub use wallet::{
    CreditWallet, DebitWallet, OpenWallet, SettleWithdrawal, TransactionKind, TransactionStatus,
    Wallet, WalletCommand, WalletCredited, WalletDebited, WalletEvent, WalletId, WalletOpened,
    WalletTransaction, WithdrawalOutcome, WithdrawalSettled,
};
