use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tradelane_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use tradelane_events::Event;

/// Namespace for wallet ids; a user has exactly one wallet stream.
const WALLET_NAMESPACE: Uuid = Uuid::from_u128(0x6d1f_4b0e_93a2_4c57_8f0d_2a7e_51c3_b9e4);

/// Wallet identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletId(pub AggregateId);

impl WalletId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    /// The wallet of `user_id`. Stable across processes.
    pub fn for_user(user_id: UserId) -> Self {
        Self(AggregateId::derived(&WALLET_NAMESPACE, user_id.as_uuid().as_bytes()))
    }
}

impl core::fmt::Display for WalletId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Completed,
    /// Withdrawal awaiting manual bank processing.
    Pending,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalOutcome {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub transaction_id: AggregateId,
    pub kind: TransactionKind,
    pub amount: u64,
    pub description: String,
    pub balance_after: u64,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

/// Aggregate root: Wallet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wallet {
    id: WalletId,
    user_id: Option<UserId>,
    balance: u64,
    transactions: Vec<WalletTransaction>,
    version: u64,
    created: bool,
}

impl Wallet {
    /// Create an empty, not-yet-opened aggregate instance for rehydration.
    pub fn empty(id: WalletId) -> Self {
        Self {
            id,
            user_id: None,
            balance: 0,
            transactions: Vec::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> WalletId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.user_id
    }

    pub fn balance(&self) -> u64 {
        self.balance
    }

    /// Full log, oldest first.
    pub fn transactions(&self) -> &[WalletTransaction] {
        &self.transactions
    }

    /// A page of the log, newest first.
    pub fn get_transactions(&self, limit: usize, offset: usize) -> Vec<&WalletTransaction> {
        self.transactions.iter().rev().skip(offset).take(limit).collect()
    }

    pub fn transaction(&self, transaction_id: AggregateId) -> Option<&WalletTransaction> {
        self.transactions
            .iter()
            .find(|t| t.transaction_id == transaction_id)
    }

    /// Replays the log and checks every `balance_after` plus the final balance.
    pub fn is_conserved(&self) -> bool {
        let mut running: u64 = 0;
        for tx in &self.transactions {
            let next = match tx.kind {
                TransactionKind::Credit => running.checked_add(tx.amount),
                TransactionKind::Debit => running.checked_sub(tx.amount),
            };
            match next {
                Some(n) if n == tx.balance_after => running = n,
                _ => return false,
            }
        }
        running == self.balance
    }
}

impl AggregateRoot for Wallet {
    type Id = WalletId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenWallet. Opening an open wallet is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenWallet {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: CreditWallet. Opens the wallet first if needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditWallet {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub transaction_id: AggregateId,
    pub amount: u64,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DebitWallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebitWallet {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub transaction_id: AggregateId,
    pub amount: u64,
    pub description: String,
    /// Withdrawals stay pending until an admin settles them.
    pub withdrawal: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettleWithdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleWithdrawal {
    pub wallet_id: WalletId,
    pub actor: Actor,
    pub transaction_id: AggregateId,
    pub outcome: WithdrawalOutcome,
    /// Used for the compensating credit when the withdrawal failed.
    pub reversal_transaction_id: AggregateId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletCommand {
    OpenWallet(OpenWallet),
    CreditWallet(CreditWallet),
    DebitWallet(DebitWallet),
    SettleWithdrawal(SettleWithdrawal),
}

/// Event: WalletOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletOpened {
    pub wallet_id: WalletId,
    pub user_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WalletCredited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletCredited {
    pub wallet_id: WalletId,
    pub transaction_id: AggregateId,
    pub amount: u64,
    pub description: String,
    pub balance_after: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WalletDebited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletDebited {
    pub wallet_id: WalletId,
    pub transaction_id: AggregateId,
    pub amount: u64,
    pub description: String,
    pub balance_after: u64,
    pub status: TransactionStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalSettled. Changes the debit's status, never its amount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalSettled {
    pub wallet_id: WalletId,
    pub transaction_id: AggregateId,
    pub status: TransactionStatus,
    pub settled_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalletEvent {
    WalletOpened(WalletOpened),
    WalletCredited(WalletCredited),
    WalletDebited(WalletDebited),
    WithdrawalSettled(WithdrawalSettled),
}

impl WalletEvent {
    pub fn wallet_id(&self) -> WalletId {
        match self {
            WalletEvent::WalletOpened(e) => e.wallet_id,
            WalletEvent::WalletCredited(e) => e.wallet_id,
            WalletEvent::WalletDebited(e) => e.wallet_id,
            WalletEvent::WithdrawalSettled(e) => e.wallet_id,
        }
    }
}

impl Event for WalletEvent {
    fn event_type(&self) -> &'static str {
        match self {
            WalletEvent::WalletOpened(_) => "wallet.wallet.opened",
            WalletEvent::WalletCredited(_) => "wallet.wallet.credited",
            WalletEvent::WalletDebited(_) => "wallet.wallet.debited",
            WalletEvent::WithdrawalSettled(_) => "wallet.withdrawal.settled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            WalletEvent::WalletOpened(e) => e.occurred_at,
            WalletEvent::WalletCredited(e) => e.occurred_at,
            WalletEvent::WalletDebited(e) => e.occurred_at,
            WalletEvent::WithdrawalSettled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Wallet {
    type Command = WalletCommand;
    type Event = WalletEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WalletEvent::WalletOpened(e) => {
                self.id = e.wallet_id;
                self.user_id = Some(e.user_id);
                self.balance = 0;
                self.transactions.clear();
                self.created = true;
            }
            WalletEvent::WalletCredited(e) => {
                self.balance = e.balance_after;
                self.transactions.push(WalletTransaction {
                    transaction_id: e.transaction_id,
                    kind: TransactionKind::Credit,
                    amount: e.amount,
                    description: e.description.clone(),
                    balance_after: e.balance_after,
                    status: TransactionStatus::Completed,
                    created_at: e.occurred_at,
                });
            }
            WalletEvent::WalletDebited(e) => {
                self.balance = e.balance_after;
                self.transactions.push(WalletTransaction {
                    transaction_id: e.transaction_id,
                    kind: TransactionKind::Debit,
                    amount: e.amount,
                    description: e.description.clone(),
                    balance_after: e.balance_after,
                    status: e.status,
                    created_at: e.occurred_at,
                });
            }
            WalletEvent::WithdrawalSettled(e) => {
                if let Some(tx) = self
                    .transactions
                    .iter_mut()
                    .find(|t| t.transaction_id == e.transaction_id)
                {
                    tx.status = e.status;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WalletCommand::OpenWallet(cmd) => self.handle_open(cmd),
            WalletCommand::CreditWallet(cmd) => self.handle_credit(cmd),
            WalletCommand::DebitWallet(cmd) => self.handle_debit(cmd),
            WalletCommand::SettleWithdrawal(cmd) => self.handle_settle(cmd),
        }
    }
}

impl Wallet {
    fn ensure_wallet_id(&self, wallet_id: WalletId) -> Result<(), DomainError> {
        if self.id != wallet_id {
            return Err(DomainError::invariant("wallet_id mismatch"));
        }
        Ok(())
    }

    fn ensure_owner(&self, user_id: UserId) -> Result<(), DomainError> {
        match self.user_id {
            Some(owner) if owner != user_id => {
                Err(DomainError::invariant("wallet belongs to another user"))
            }
            _ => Ok(()),
        }
    }

    fn ensure_new_transaction(&self, transaction_id: AggregateId) -> Result<(), DomainError> {
        if self.transaction(transaction_id).is_some() {
            return Err(DomainError::conflict(format!(
                "transaction {transaction_id} already recorded"
            )));
        }
        Ok(())
    }

    fn opened_event(&self, wallet_id: WalletId, user_id: UserId, at: DateTime<Utc>) -> Option<WalletEvent> {
        if self.created {
            None
        } else {
            Some(WalletEvent::WalletOpened(WalletOpened {
                wallet_id,
                user_id,
                occurred_at: at,
            }))
        }
    }

    fn handle_open(&self, cmd: &OpenWallet) -> Result<Vec<WalletEvent>, DomainError> {
        self.ensure_wallet_id(cmd.wallet_id)?;
        self.ensure_owner(cmd.user_id)?;
        Ok(self
            .opened_event(cmd.wallet_id, cmd.user_id, cmd.occurred_at)
            .into_iter()
            .collect())
    }

    fn handle_credit(&self, cmd: &CreditWallet) -> Result<Vec<WalletEvent>, DomainError> {
        self.ensure_wallet_id(cmd.wallet_id)?;
        self.ensure_owner(cmd.user_id)?;
        if cmd.amount == 0 {
            return Err(DomainError::invalid_amount("credit amount must be positive"));
        }
        self.ensure_new_transaction(cmd.transaction_id)?;

        let balance_after = self
            .balance
            .checked_add(cmd.amount)
            .ok_or_else(|| DomainError::invalid_amount("credit would overflow the balance"))?;

        let mut events: Vec<WalletEvent> = self
            .opened_event(cmd.wallet_id, cmd.user_id, cmd.occurred_at)
            .into_iter()
            .collect();
        events.push(WalletEvent::WalletCredited(WalletCredited {
            wallet_id: cmd.wallet_id,
            transaction_id: cmd.transaction_id,
            amount: cmd.amount,
            description: cmd.description.trim().to_string(),
            balance_after,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_debit(&self, cmd: &DebitWallet) -> Result<Vec<WalletEvent>, DomainError> {
        self.ensure_wallet_id(cmd.wallet_id)?;
        self.ensure_owner(cmd.user_id)?;
        if cmd.amount == 0 {
            return Err(DomainError::invalid_amount("debit amount must be positive"));
        }
        self.ensure_new_transaction(cmd.transaction_id)?;

        let balance_after =
            self.balance
                .checked_sub(cmd.amount)
                .ok_or(DomainError::InsufficientBalance {
                    requested: cmd.amount,
                    balance: self.balance,
                })?;

        let status = if cmd.withdrawal {
            TransactionStatus::Pending
        } else {
            TransactionStatus::Completed
        };

        let mut events: Vec<WalletEvent> = self
            .opened_event(cmd.wallet_id, cmd.user_id, cmd.occurred_at)
            .into_iter()
            .collect();
        events.push(WalletEvent::WalletDebited(WalletDebited {
            wallet_id: cmd.wallet_id,
            transaction_id: cmd.transaction_id,
            amount: cmd.amount,
            description: cmd.description.trim().to_string(),
            balance_after,
            status,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_settle(&self, cmd: &SettleWithdrawal) -> Result<Vec<WalletEvent>, DomainError> {
        self.ensure_wallet_id(cmd.wallet_id)?;
        cmd.actor.require_admin("settle withdrawals")?;
        if !self.created {
            return Err(DomainError::not_found("wallet"));
        }

        let tx = self
            .transaction(cmd.transaction_id)
            .ok_or_else(|| DomainError::not_found("transaction"))?;
        if tx.kind != TransactionKind::Debit || tx.status != TransactionStatus::Pending {
            return Err(DomainError::invariant(format!(
                "transaction {} is not a pending withdrawal",
                cmd.transaction_id
            )));
        }

        let status = match cmd.outcome {
            WithdrawalOutcome::Completed => TransactionStatus::Completed,
            WithdrawalOutcome::Failed => TransactionStatus::Failed,
        };
        let mut events = vec![WalletEvent::WithdrawalSettled(WithdrawalSettled {
            wallet_id: cmd.wallet_id,
            transaction_id: cmd.transaction_id,
            status,
            settled_by: cmd.actor.user_id,
            occurred_at: cmd.occurred_at,
        })];

        if cmd.outcome == WithdrawalOutcome::Failed {
            self.ensure_new_transaction(cmd.reversal_transaction_id)?;
            let balance_after = self
                .balance
                .checked_add(tx.amount)
                .ok_or_else(|| DomainError::invalid_amount("reversal would overflow the balance"))?;
            events.push(WalletEvent::WalletCredited(WalletCredited {
                wallet_id: cmd.wallet_id,
                transaction_id: cmd.reversal_transaction_id,
                amount: tx.amount,
                description: format!("withdrawal reversal ({})", cmd.transaction_id),
                balance_after,
                occurred_at: cmd.occurred_at,
            }));
        }

        Ok(events)
    }
}
