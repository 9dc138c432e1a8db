//! Settlement service: the application layer over the four ledgers.
//!
//! Every write goes through the [`CommandDispatcher`]; reads of a single
//! entity rehydrate from its stream, list reads come from the projections.
//! Notifications and realtime events are sent only after the write commits
//! and never fail the operation.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use serde_json::json;

use tradelane_auth::{DirectoryError, UserDirectory, UserRecord};
use tradelane_core::{Actor, AggregateId, DomainError, Role, UserId};
use tradelane_events::{EventBus, EventEnvelope, InMemoryEventBus};
use tradelane_inventory::{
    CreateProduct, Product, ProductCommand, ProductId, ReleaseStock, Restock, SetAvailability,
    UpdateProduct,
};
use tradelane_orders::{
    ApproveOrder, Order, OrderCommand, OrderId, OrderStatus, RejectOrder, ReviewAction,
    StatusHistoryEntry, UpdateOrderStatus,
};
use tradelane_payouts::{
    CreatePayout, DeletePayout, PayeeRole, Payout, PayoutCommand, PayoutId, PayoutMode,
    PayoutStatus, UpdatePayout,
};
use tradelane_wallet::{
    CreditWallet, DebitWallet, OpenWallet, SettleWithdrawal, Wallet, WalletCommand, WalletId,
    WalletTransaction, WithdrawalOutcome,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::{CancellationStockPolicy, SettlementConfig};
use crate::event_store::EventStore;
use crate::notify::{
    EntityRef, Notification, NotificationKind, Notifier, RealtimeEvent, RealtimePublisher,
    notify_best_effort, publish_best_effort,
};
use crate::order_number::OrderNumberIndex;
use crate::projections::ReadModels;
use crate::projections::orders::OrderReadModel;
use crate::projections::payouts::PayoutReadModel;
use crate::projections::products::ProductReadModel;
use crate::saga::{PlaceOrderRequest, PlacementContext, place_order};
use crate::streams;

pub type SharedStore = Arc<dyn EventStore>;
pub type SharedBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
pub type SettlementDispatcher = CommandDispatcher<SharedStore, SharedBus>;

/// Capabilities owned outside the event store.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn UserDirectory>,
    pub notifier: Arc<dyn Notifier>,
    pub realtime: Arc<dyn RealtimePublisher>,
    pub order_numbers: Arc<dyn OrderNumberIndex>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub price: u64,
    pub margin: u64,
    pub stock: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductChanges {
    pub name: Option<String>,
    pub price: Option<u64>,
    pub margin: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPayout {
    pub order_id: OrderId,
    pub payee_id: UserId,
    pub payee_role: PayeeRole,
    pub payable_amount: u64,
    pub mode: PayoutMode,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Vec<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutChanges {
    pub paid_amount: Option<u64>,
    pub mode: Option<PayoutMode>,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderHistory {
    pub order_number: String,
    pub status_history: Vec<StatusHistoryEntry>,
}

/// Result of a wallet movement: the new log entry and the resulting balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletReceipt {
    pub transaction: WalletTransaction,
    pub balance: u64,
}

pub struct SettlementService {
    dispatcher: SettlementDispatcher,
    read_models: ReadModels,
    collaborators: Collaborators,
    config: SettlementConfig,
}

impl SettlementService {
    /// Wire the service over `store` and rebuild every read model from it.
    pub fn new(
        store: SharedStore,
        collaborators: Collaborators,
        config: SettlementConfig,
    ) -> Result<Self, DispatchError> {
        let bus: SharedBus = Arc::new(InMemoryEventBus::new());
        let read_models = ReadModels::new(bus.subscribe());
        let service = Self {
            dispatcher: CommandDispatcher::new(store, bus),
            read_models,
            collaborators,
            config,
        };
        service.rebuild()?;
        Ok(service)
    }

    pub fn config(&self) -> &SettlementConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &SettlementDispatcher {
        &self.dispatcher
    }

    /// Drop the read models and replay the whole log into them. Order numbers
    /// found in the log are re-claimed so the index survives restarts.
    pub fn rebuild(&self) -> Result<(), DispatchError> {
        self.read_models.sync();
        let events = self.dispatcher.store().load_all()?;
        self.read_models
            .rebuild(&events)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;

        let admin = Actor::new(UserId::from_uuid(uuid::Uuid::nil()), Role::SuperAdmin);
        for order in self.read_models.orders.list_visible_to(&admin) {
            self.collaborators
                .order_numbers
                .claim(&order.order_number, order.order_id.0)
                .map_err(|e| DispatchError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }

    // ---- inventory ---------------------------------------------------------

    pub fn create_product(&self, actor: Actor, new: NewProduct) -> Result<Product, DispatchError> {
        let product_id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id,
            actor,
            name: new.name,
            price: new.price,
            margin: new.margin,
            stock: new.stock,
            occurred_at: Utc::now(),
        });
        let product = self.dispatch_product(product_id, &cmd)?;
        tracing::info!(%product_id, supplier_id = %actor.user_id, "product created");
        Ok(product)
    }

    pub fn update_product(
        &self,
        actor: Actor,
        product_id: ProductId,
        changes: ProductChanges,
    ) -> Result<Product, DispatchError> {
        let cmd = ProductCommand::UpdateProduct(UpdateProduct {
            product_id,
            actor,
            name: changes.name,
            price: changes.price,
            margin: changes.margin,
            occurred_at: Utc::now(),
        });
        self.dispatch_product(product_id, &cmd)
    }

    pub fn restock(&self, actor: Actor, product_id: ProductId, quantity: u64) -> Result<Product, DispatchError> {
        let cmd = ProductCommand::Restock(Restock {
            product_id,
            actor,
            quantity,
            occurred_at: Utc::now(),
        });
        self.dispatch_product(product_id, &cmd)
    }

    pub fn set_availability(
        &self,
        actor: Actor,
        product_id: ProductId,
        available: bool,
    ) -> Result<Product, DispatchError> {
        let cmd = ProductCommand::SetAvailability(SetAvailability {
            product_id,
            actor,
            available,
            occurred_at: Utc::now(),
        });
        self.dispatch_product(product_id, &cmd)
    }

    pub fn get_product(&self, product_id: ProductId) -> Result<Product, DispatchError> {
        let product = self
            .dispatcher
            .load(product_id.0, |id| Product::empty(ProductId::new(id)))?;
        if !product.exists() {
            return Err(DomainError::not_found("product").into());
        }
        Ok(product)
    }

    pub fn list_products(&self) -> Vec<ProductReadModel> {
        self.read_models.sync();
        self.read_models.products.list()
    }

    fn dispatch_product(&self, product_id: ProductId, cmd: &ProductCommand) -> Result<Product, DispatchError> {
        let (product, committed) = self.dispatcher.dispatch_with_retry(
            product_id.0,
            streams::PRODUCT,
            self.config.max_dispatch_attempts,
            cmd,
            |id| Product::empty(ProductId::new(id)),
        )?;
        self.read_models.absorb(&committed);
        Ok(product)
    }

    // ---- orders ------------------------------------------------------------

    pub fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, DispatchError> {
        let ctx = PlacementContext {
            config: &self.config,
            order_numbers: self.collaborators.order_numbers.as_ref(),
            directory: self.collaborators.directory.as_ref(),
            notifier: self.collaborators.notifier.as_ref(),
            realtime: self.collaborators.realtime.as_ref(),
        };
        let result = place_order(&self.dispatcher, ctx, request);
        self.read_models.sync();
        let (order, committed) = result?;
        self.read_models.absorb(&committed);
        Ok(order)
    }

    pub fn approve_order(
        &self,
        actor: Actor,
        order_id: OrderId,
        notes: Option<String>,
    ) -> Result<Order, DispatchError> {
        let cmd = OrderCommand::ApproveOrder(ApproveOrder {
            order_id,
            actor,
            notes,
            occurred_at: Utc::now(),
        });
        let order = self.dispatch_order(order_id, &cmd)?;
        tracing::info!(%order_id, reviewed_by = %actor.user_id, "order approved");

        self.notify_parties(
            &order,
            None,
            NotificationKind::OrderApproved,
            "Order approved",
            format!("Order {} was approved and pushed for fulfilment", order.order_number()),
        );
        Ok(order)
    }

    /// Reject and restore the reserved stock. The rejection is the commit
    /// point; a failed release is logged and leaves the reservation in place.
    pub fn reject_order(&self, actor: Actor, order_id: OrderId, notes: String) -> Result<Order, DispatchError> {
        let cmd = OrderCommand::RejectOrder(RejectOrder {
            order_id,
            actor,
            notes,
            occurred_at: Utc::now(),
        });
        let order = self.dispatch_order(order_id, &cmd)?;
        tracing::info!(%order_id, reviewed_by = %actor.user_id, "order rejected");

        if let Err(e) = self.release_reservation(&order) {
            tracing::error!(%order_id, error = %e, "stock release after rejection failed");
        }

        let reason = order
            .admin_review()
            .and_then(|r| r.notes.clone())
            .unwrap_or_default();
        self.notify_parties(
            &order,
            None,
            NotificationKind::OrderRejected,
            "Order rejected",
            format!("Order {} was rejected: {reason}", order.order_number()),
        );
        Ok(order)
    }

    pub fn update_order_status(
        &self,
        actor: Actor,
        order_id: OrderId,
        status: OrderStatus,
        notes: Option<String>,
    ) -> Result<Order, DispatchError> {
        let cmd = OrderCommand::UpdateOrderStatus(UpdateOrderStatus {
            order_id,
            actor,
            status,
            notes,
            occurred_at: Utc::now(),
        });
        let order = self.dispatch_order(order_id, &cmd)?;
        tracing::info!(%order_id, %status, updated_by = %actor.user_id, "order status changed");

        if status == OrderStatus::Cancelled
            && self.config.cancellation_stock_policy == CancellationStockPolicy::Restore
        {
            if let Err(e) = self.release_reservation(&order) {
                tracing::error!(%order_id, error = %e, "stock release after cancellation failed");
            }
        }

        self.notify_parties(
            &order,
            Some(actor.user_id),
            NotificationKind::OrderStatusChanged,
            "Order status changed",
            format!("Order {} is now {status}", order.order_number()),
        );
        publish_best_effort(
            self.collaborators.realtime.as_ref(),
            RealtimeEvent {
                topic: "order.status_changed".to_string(),
                payload: json!({ "order_id": order_id, "status": status }),
            },
        );
        Ok(order)
    }

    pub fn get_order(&self, actor: Actor, order_id: OrderId) -> Result<Order, DispatchError> {
        let order = self
            .dispatcher
            .load(order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if !order.exists() {
            return Err(DomainError::not_found("order").into());
        }
        if !order.is_visible_to(&actor) {
            return Err(DomainError::not_authorized("order belongs to another party").into());
        }
        Ok(order)
    }

    pub fn order_history(&self, actor: Actor, order_id: OrderId) -> Result<OrderHistory, DispatchError> {
        let order = self.get_order(actor, order_id)?;
        Ok(OrderHistory {
            order_number: order.order_number().to_string(),
            status_history: order.status_history().to_vec(),
        })
    }

    pub fn list_orders(&self, actor: Actor) -> Vec<OrderReadModel> {
        self.read_models.sync();
        self.read_models.orders.list_visible_to(&actor)
    }

    fn dispatch_order(&self, order_id: OrderId, cmd: &OrderCommand) -> Result<Order, DispatchError> {
        let (order, committed) = self.dispatcher.dispatch_with_retry(
            order_id.0,
            streams::ORDER,
            self.config.max_dispatch_attempts,
            cmd,
            |id| Order::empty(OrderId::new(id)),
        )?;
        self.read_models.absorb(&committed);
        Ok(order)
    }

    /// Return whatever this order still holds to stock.
    fn release_reservation(&self, order: &Order) -> Result<(), DispatchError> {
        let Some(product_id) = order.product_id() else {
            return Ok(());
        };
        let order_id = order.id_typed();
        let outstanding = self.get_product(product_id)?.reserved_for(order_id.0);
        if outstanding == 0 {
            return Ok(());
        }
        let cmd = ProductCommand::ReleaseStock(ReleaseStock {
            product_id,
            order_id: order_id.0,
            quantity: outstanding,
            occurred_at: Utc::now(),
        });
        let product = self.dispatch_product(product_id, &cmd)?;
        tracing::info!(%order_id, %product_id, released = outstanding, stock = product.stock(), "stock released");
        Ok(())
    }

    /// Tell the seller and supplier of `order`, except `skip` (usually the actor).
    fn notify_parties(
        &self,
        order: &Order,
        skip: Option<UserId>,
        kind: NotificationKind,
        title: &str,
        message: String,
    ) {
        let entity_ref = EntityRef::new("order", order.id_typed().0);
        for recipient in [order.seller_id(), order.supplier_id()].into_iter().flatten() {
            if Some(recipient) == skip {
                continue;
            }
            notify_best_effort(
                self.collaborators.notifier.as_ref(),
                Notification {
                    recipient,
                    title: title.to_string(),
                    message: message.clone(),
                    kind,
                    entity_ref: Some(entity_ref.clone()),
                },
            );
        }
    }

    // ---- payouts -----------------------------------------------------------

    pub fn create_payout(&self, actor: Actor, new: NewPayout) -> Result<Payout, DispatchError> {
        actor.require_admin("create payouts")?;

        let payee = self
            .collaborators
            .directory
            .find_by_id(new.payee_id)
            .map_err(directory_error)?;
        match payee {
            None => return Err(DomainError::invalid_payee("payee does not exist").into()),
            Some(p) if !p.is_active() => {
                return Err(DomainError::invalid_payee("payee has been deleted").into());
            }
            Some(p) if !new.payee_role.matches(p.role) => {
                return Err(DomainError::invalid_payee(format!(
                    "payee holds role {}, not {:?}",
                    p.role, new.payee_role
                ))
                .into());
            }
            Some(_) => {}
        }

        let order = self
            .dispatcher
            .load(new.order_id.0, |id| Order::empty(OrderId::new(id)))?;
        if !order.exists() {
            return Err(DomainError::not_found("order").into());
        }
        // Only orders an admin approved are payable.
        if order.admin_review().map(|r| r.action) != Some(ReviewAction::Approved) {
            return Err(DomainError::invariant(format!(
                "payouts require an approved order (current status: {})",
                order.status()
            ))
            .into());
        }

        let now = Utc::now();
        let due_date = new
            .due_date
            .unwrap_or_else(|| now + Duration::days(self.config.payout_due_days));
        let payout_id = PayoutId::new(AggregateId::new());
        let cmd = PayoutCommand::CreatePayout(CreatePayout {
            payout_id,
            actor,
            order_id: new.order_id,
            payee_id: new.payee_id,
            payee_role: new.payee_role,
            payable_amount: new.payable_amount,
            mode: new.mode,
            reference_number: new.reference_number,
            remarks: new.remarks,
            proof_images: new.proof_images,
            due_date,
            occurred_at: now,
        });
        let payout = self.dispatch_payout(payout_id, &cmd)?;
        tracing::info!(%payout_id, order_id = %new.order_id, payee_id = %new.payee_id, "payout created");

        notify_best_effort(
            self.collaborators.notifier.as_ref(),
            Notification {
                recipient: new.payee_id,
                title: "Payout scheduled".to_string(),
                message: format!(
                    "A payout of {} for order {} is due {}",
                    payout.payable_amount(),
                    order.order_number(),
                    due_date.format("%Y-%m-%d")
                ),
                kind: NotificationKind::PayoutCreated,
                entity_ref: Some(EntityRef::new("payout", payout_id.0)),
            },
        );
        Ok(payout)
    }

    pub fn update_payout(
        &self,
        actor: Actor,
        payout_id: PayoutId,
        changes: PayoutChanges,
    ) -> Result<Payout, DispatchError> {
        let before = self
            .dispatcher
            .load(payout_id.0, |id| Payout::empty(PayoutId::new(id)))?
            .status();

        let cmd = PayoutCommand::UpdatePayout(UpdatePayout {
            payout_id,
            actor,
            paid_amount: changes.paid_amount,
            mode: changes.mode,
            reference_number: changes.reference_number,
            remarks: changes.remarks,
            proof_images: changes.proof_images,
            occurred_at: Utc::now(),
        });
        let payout = self.dispatch_payout(payout_id, &cmd)?;
        tracing::info!(%payout_id, status = ?payout.status(), paid = payout.paid_amount(), "payout updated");

        if before != PayoutStatus::Paid && payout.status() == PayoutStatus::Paid {
            if let Some(payee) = payout.payee_id() {
                notify_best_effort(
                    self.collaborators.notifier.as_ref(),
                    Notification {
                        recipient: payee,
                        title: "Payout paid".to_string(),
                        message: format!("{} has been paid out", payout.paid_amount()),
                        kind: NotificationKind::PayoutPaid,
                        entity_ref: Some(EntityRef::new("payout", payout_id.0)),
                    },
                );
            }
        }
        Ok(payout)
    }

    pub fn delete_payout(&self, actor: Actor, payout_id: PayoutId) -> Result<(), DispatchError> {
        let cmd = PayoutCommand::DeletePayout(DeletePayout {
            payout_id,
            actor,
            occurred_at: Utc::now(),
        });
        self.dispatch_payout(payout_id, &cmd)?;
        tracing::info!(%payout_id, deleted_by = %actor.user_id, "payout deleted");
        Ok(())
    }

    pub fn get_payout(&self, actor: Actor, payout_id: PayoutId) -> Result<Payout, DispatchError> {
        let payout = self
            .dispatcher
            .load(payout_id.0, |id| Payout::empty(PayoutId::new(id)))?;
        if !payout.exists() {
            return Err(DomainError::not_found("payout").into());
        }
        if !payout.is_visible_to(&actor) {
            return Err(DomainError::not_authorized("payout is addressed to another user").into());
        }
        Ok(payout)
    }

    pub fn list_payouts(&self, actor: Actor) -> Vec<PayoutReadModel> {
        self.read_models.sync();
        self.read_models.payouts.list_visible_to(&actor)
    }

    fn dispatch_payout(&self, payout_id: PayoutId, cmd: &PayoutCommand) -> Result<Payout, DispatchError> {
        let (payout, committed) = self.dispatcher.dispatch_with_retry(
            payout_id.0,
            streams::PAYOUT,
            self.config.max_dispatch_attempts,
            cmd,
            |id| Payout::empty(PayoutId::new(id)),
        )?;
        self.read_models.absorb(&committed);
        Ok(payout)
    }

    // ---- wallet ------------------------------------------------------------

    /// The caller's wallet, opened on first access.
    pub fn wallet(&self, user_id: UserId) -> Result<Wallet, DispatchError> {
        let wallet_id = WalletId::for_user(user_id);
        let cmd = WalletCommand::OpenWallet(OpenWallet {
            wallet_id,
            user_id,
            occurred_at: Utc::now(),
        });
        self.dispatch_wallet(wallet_id, &cmd)
    }

    pub fn wallet_balance(&self, actor: Actor) -> Result<u64, DispatchError> {
        Ok(self.wallet(actor.user_id)?.balance())
    }

    /// Newest first.
    pub fn wallet_transactions(
        &self,
        actor: Actor,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<WalletTransaction>, DispatchError> {
        let wallet = self.wallet(actor.user_id)?;
        Ok(wallet
            .get_transactions(limit, offset)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn add_funds(
        &self,
        actor: Actor,
        amount: u64,
        description: Option<String>,
    ) -> Result<WalletReceipt, DispatchError> {
        let wallet_id = WalletId::for_user(actor.user_id);
        let transaction_id = AggregateId::new();
        let cmd = WalletCommand::CreditWallet(CreditWallet {
            wallet_id,
            user_id: actor.user_id,
            transaction_id,
            amount,
            description: description.unwrap_or_else(|| "funds added".to_string()),
            occurred_at: Utc::now(),
        });
        let wallet = self.dispatch_wallet(wallet_id, &cmd)?;
        tracing::info!(%wallet_id, amount, balance = wallet.balance(), "wallet credited");
        receipt(&wallet, transaction_id)
    }

    /// Debit now; the transaction stays pending until an admin settles it.
    pub fn withdraw(
        &self,
        actor: Actor,
        amount: u64,
        description: Option<String>,
    ) -> Result<WalletReceipt, DispatchError> {
        let wallet_id = WalletId::for_user(actor.user_id);
        let transaction_id = AggregateId::new();
        let cmd = WalletCommand::DebitWallet(DebitWallet {
            wallet_id,
            user_id: actor.user_id,
            transaction_id,
            amount,
            description: description.unwrap_or_else(|| "withdrawal".to_string()),
            withdrawal: true,
            occurred_at: Utc::now(),
        });
        let wallet = self.dispatch_wallet(wallet_id, &cmd)?;
        tracing::info!(%wallet_id, amount, balance = wallet.balance(), "withdrawal requested");
        receipt(&wallet, transaction_id)
    }

    pub fn settle_withdrawal(
        &self,
        actor: Actor,
        user_id: UserId,
        transaction_id: AggregateId,
        outcome: WithdrawalOutcome,
    ) -> Result<WalletReceipt, DispatchError> {
        let wallet_id = WalletId::for_user(user_id);
        let cmd = WalletCommand::SettleWithdrawal(SettleWithdrawal {
            wallet_id,
            actor,
            transaction_id,
            outcome,
            reversal_transaction_id: AggregateId::new(),
            occurred_at: Utc::now(),
        });
        let wallet = self.dispatch_wallet(wallet_id, &cmd)?;
        tracing::info!(%wallet_id, %transaction_id, ?outcome, "withdrawal settled");

        let receipt = receipt(&wallet, transaction_id)?;
        notify_best_effort(
            self.collaborators.notifier.as_ref(),
            Notification {
                recipient: user_id,
                title: "Withdrawal settled".to_string(),
                message: match outcome {
                    WithdrawalOutcome::Completed => {
                        format!("Your withdrawal of {} was completed", receipt.transaction.amount)
                    }
                    WithdrawalOutcome::Failed => format!(
                        "Your withdrawal of {} failed and was returned to your wallet",
                        receipt.transaction.amount
                    ),
                },
                kind: NotificationKind::WithdrawalSettled,
                entity_ref: Some(EntityRef::new("wallet", wallet_id.0)),
            },
        );
        Ok(receipt)
    }

    fn dispatch_wallet(&self, wallet_id: WalletId, cmd: &WalletCommand) -> Result<Wallet, DispatchError> {
        let (wallet, _) = self.dispatcher.dispatch_with_retry(
            wallet_id.0,
            streams::WALLET,
            self.config.max_dispatch_attempts,
            cmd,
            |id| Wallet::empty(WalletId::new(id)),
        )?;
        Ok(wallet)
    }

    // ---- users -------------------------------------------------------------

    pub fn register_user(
        &self,
        actor: Actor,
        name: String,
        email: String,
        role: Role,
    ) -> Result<UserRecord, DispatchError> {
        actor.require_admin("register users")?;
        if role == Role::SuperAdmin && actor.role != Role::SuperAdmin {
            return Err(DomainError::not_authorized("only super admins may register super admins").into());
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("name is required").into());
        }
        if !email.contains('@') {
            return Err(DomainError::validation("email is invalid").into());
        }

        let user = UserRecord::new(UserId::new(), name.trim(), email.trim(), role);
        self.collaborators
            .directory
            .register(user.clone())
            .map_err(directory_error)?;
        tracing::info!(user_id = %user.id, role = %user.role, "user registered");

        publish_best_effort(
            self.collaborators.realtime.as_ref(),
            RealtimeEvent {
                topic: "user.registered".to_string(),
                payload: json!({ "user_id": user.id, "role": user.role, "email": user.email }),
            },
        );
        Ok(user)
    }

    pub fn list_users(&self, actor: Actor) -> Result<Vec<UserRecord>, DispatchError> {
        actor.require_admin("list users")?;
        self.collaborators
            .directory
            .find_by_roles(&[Role::Seller, Role::Supplier, Role::Admin, Role::SuperAdmin])
            .map_err(directory_error)
    }
}

fn receipt(wallet: &Wallet, transaction_id: AggregateId) -> Result<WalletReceipt, DispatchError> {
    let transaction = wallet
        .transaction(transaction_id)
        .cloned()
        .ok_or_else(|| DomainError::not_found("transaction"))?;
    Ok(WalletReceipt {
        transaction,
        balance: wallet.balance(),
    })
}

fn directory_error(e: DirectoryError) -> DispatchError {
    match e {
        DirectoryError::Duplicate(email) => DomainError::conflict(format!("user {email} already registered")).into(),
        DirectoryError::NotFound(_) => DomainError::not_found("user").into(),
        DirectoryError::Unavailable(msg) => DispatchError::Unavailable(format!("user directory: {msg}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tradelane_auth::InMemoryUserDirectory;
    use tradelane_orders::ShippingAddress;

    use crate::event_store::InMemoryEventStore;
    use crate::notify::InMemoryNotifier;
    use crate::order_number::InMemoryOrderNumberIndex;

    struct Harness {
        service: SettlementService,
        notifier: Arc<InMemoryNotifier>,
        admin: Actor,
        supplier: Actor,
        seller: Actor,
    }

    fn harness_with(config: SettlementConfig) -> Harness {
        let directory = Arc::new(InMemoryUserDirectory::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let admin = Actor::new(UserId::new(), Role::Admin);
        let supplier = Actor::new(UserId::new(), Role::Supplier);
        let seller = Actor::new(UserId::new(), Role::Seller);
        for (actor, email) in [
            (admin, "admin@example.com"),
            (supplier, "supplier@example.com"),
            (seller, "seller@example.com"),
        ] {
            directory
                .register(UserRecord::new(actor.user_id, email, email, actor.role))
                .unwrap();
        }

        let service = SettlementService::new(
            Arc::new(InMemoryEventStore::new()),
            Collaborators {
                directory,
                notifier: notifier.clone(),
                realtime: notifier.clone(),
                order_numbers: Arc::new(InMemoryOrderNumberIndex::new()),
            },
            config,
        )
        .unwrap();

        Harness {
            service,
            notifier,
            admin,
            supplier,
            seller,
        }
    }

    fn harness() -> Harness {
        harness_with(SettlementConfig::default())
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient_name: None,
            phone: None,
            street: "4 Mill Lane".to_string(),
            city: "Leeds".to_string(),
            state: None,
            postal_code: None,
            country: None,
        }
    }

    impl Harness {
        fn product(&self, stock: u64) -> ProductId {
            let new = NewProduct {
                name: "Oak stool".to_string(),
                price: 180,
                margin: 20,
                stock,
            };
            self.service.create_product(self.supplier, new).unwrap().id_typed()
        }

        fn order(&self, product_id: ProductId, quantity: u64) -> Order {
            self.service
                .place_order(PlaceOrderRequest {
                    actor: self.seller,
                    product_id,
                    quantity,
                    shipping_address: address(),
                    notes: None,
                })
                .unwrap()
        }

        fn approved_order(&self, product_id: ProductId, quantity: u64) -> Order {
            let order = self.order(product_id, quantity);
            self.service
                .approve_order(self.admin, order.id_typed(), None)
                .unwrap()
        }
    }

    #[test]
    fn listings_see_writes_immediately() {
        let h = harness();
        let product = h.product(5);
        let order = h.order(product, 2);

        assert_eq!(h.service.list_products()[0].stock, 3);
        let orders = h.service.list_orders(h.seller);
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, order.id_typed());
        assert!(h.service.list_orders(Actor::new(UserId::new(), Role::Seller)).is_empty());
    }

    #[test]
    fn rejection_restores_stock_and_tells_the_seller() {
        let h = harness();
        let product = h.product(5);
        let order = h.order(product, 5);
        assert_eq!(h.service.get_product(product).unwrap().stock(), 0);

        let rejected = h
            .service
            .reject_order(h.admin, order.id_typed(), "duplicate".to_string())
            .unwrap();

        assert_eq!(rejected.status(), OrderStatus::AdminRejected);
        assert_eq!(h.service.get_product(product).unwrap().stock(), 5);
        assert!(
            h.notifier
                .sent_to(h.seller.user_id)
                .iter()
                .any(|n| n.kind == NotificationKind::OrderRejected)
        );

        let again = h
            .service
            .reject_order(h.admin, order.id_typed(), "again".to_string())
            .unwrap_err();
        assert!(matches!(again.as_domain(), Some(DomainError::InvariantViolation(_))));
        assert_eq!(h.service.get_product(product).unwrap().stock(), 5);
    }

    #[test]
    fn cancellation_keeps_stock_by_default() {
        let h = harness();
        let product = h.product(5);
        let order = h.order(product, 2);

        h.service
            .update_order_status(h.seller, order.id_typed(), OrderStatus::Cancelled, None)
            .unwrap();

        assert_eq!(h.service.get_product(product).unwrap().stock(), 3);
    }

    #[test]
    fn restore_policy_returns_stock_on_cancellation() {
        let config = SettlementConfig {
            cancellation_stock_policy: CancellationStockPolicy::Restore,
            ..SettlementConfig::default()
        };
        let h = harness_with(config);
        let product = h.product(5);
        let order = h.order(product, 2);

        h.service
            .update_order_status(h.seller, order.id_typed(), OrderStatus::Cancelled, None)
            .unwrap();

        assert_eq!(h.service.get_product(product).unwrap().stock(), 5);
    }

    #[test]
    fn strangers_cannot_read_an_order() {
        let h = harness();
        let order = h.order(h.product(3), 1);
        let other_supplier = Actor::new(UserId::new(), Role::Supplier);

        let err = h.service.get_order(other_supplier, order.id_typed()).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotAuthorized(_))));

        let history = h.service.order_history(h.supplier, order.id_typed()).unwrap();
        assert_eq!(history.order_number, order.order_number());
        assert_eq!(history.status_history.len(), 1);
    }

    fn new_payout(order_id: OrderId, payee: Actor, payee_role: PayeeRole) -> NewPayout {
        NewPayout {
            order_id,
            payee_id: payee.user_id,
            payee_role,
            payable_amount: 1_000,
            mode: PayoutMode::BankTransfer,
            reference_number: None,
            remarks: None,
            proof_images: vec![],
            due_date: None,
        }
    }

    #[test]
    fn payout_defaults_due_date_and_notifies_payee() {
        let h = harness();
        let order = h.approved_order(h.product(3), 1);

        let before = Utc::now();
        let payout = h
            .service
            .create_payout(h.admin, new_payout(order.id_typed(), h.supplier, PayeeRole::Supplier))
            .unwrap();

        let due = payout.due_date().unwrap();
        assert!(due >= before + Duration::days(7));
        assert!(due <= Utc::now() + Duration::days(7));
        assert!(
            h.notifier
                .sent_to(h.supplier.user_id)
                .iter()
                .any(|n| n.kind == NotificationKind::PayoutCreated)
        );
    }

    #[test]
    fn payout_payee_must_exist_with_the_matching_role() {
        let h = harness();
        let order = h.order(h.product(3), 1);

        let wrong_role = h
            .service
            .create_payout(h.admin, new_payout(order.id_typed(), h.seller, PayeeRole::Supplier))
            .unwrap_err();
        assert!(matches!(wrong_role.as_domain(), Some(DomainError::InvalidPayee(_))));

        let unknown = Actor::new(UserId::new(), Role::Seller);
        let missing = h
            .service
            .create_payout(h.admin, new_payout(order.id_typed(), unknown, PayeeRole::Seller))
            .unwrap_err();
        assert!(matches!(missing.as_domain(), Some(DomainError::InvalidPayee(_))));

        let no_order = h
            .service
            .create_payout(
                h.admin,
                new_payout(OrderId::new(AggregateId::new()), h.seller, PayeeRole::Seller),
            )
            .unwrap_err();
        assert_eq!(no_order.as_domain(), Some(&DomainError::not_found("order")));
    }

    #[test]
    fn payouts_wait_for_admin_approval() {
        let h = harness();
        let product = h.product(3);
        let pending = h.order(product, 1);
        let rejected = h.order(product, 1);
        h.service
            .reject_order(h.admin, rejected.id_typed(), "duplicate".to_string())
            .unwrap();

        for order_id in [pending.id_typed(), rejected.id_typed()] {
            let err = h
                .service
                .create_payout(h.admin, new_payout(order_id, h.supplier, PayeeRole::Supplier))
                .unwrap_err();
            assert!(matches!(err.as_domain(), Some(DomainError::InvariantViolation(_))));
        }
        assert!(h.service.list_payouts(h.admin).is_empty());
    }

    #[test]
    fn paying_a_payout_notifies_once_and_deleting_hides_it() {
        let h = harness();
        let order = h.approved_order(h.product(3), 1);
        let payout = h
            .service
            .create_payout(h.admin, new_payout(order.id_typed(), h.seller, PayeeRole::Seller))
            .unwrap();
        let payout_id = payout.id_typed();

        let paid = h
            .service
            .update_payout(
                h.admin,
                payout_id,
                PayoutChanges {
                    paid_amount: Some(1_000),
                    ..PayoutChanges::default()
                },
            )
            .unwrap();
        assert_eq!(paid.status(), PayoutStatus::Paid);
        assert!(paid.paid_at().is_some());

        h.service
            .update_payout(
                h.admin,
                payout_id,
                PayoutChanges {
                    remarks: Some("receipt attached".to_string()),
                    ..PayoutChanges::default()
                },
            )
            .unwrap();
        let paid_notices = h
            .notifier
            .sent_to(h.seller.user_id)
            .into_iter()
            .filter(|n| n.kind == NotificationKind::PayoutPaid)
            .count();
        assert_eq!(paid_notices, 1);

        assert_eq!(h.service.list_payouts(h.seller).len(), 1);
        h.service.delete_payout(h.admin, payout_id).unwrap();
        assert!(h.service.list_payouts(h.admin).is_empty());
        let err = h.service.get_payout(h.admin, payout_id).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
    }

    #[test]
    fn wallet_is_opened_lazily_and_withdrawals_stay_pending() {
        let h = harness();
        assert_eq!(h.service.wallet_balance(h.seller).unwrap(), 0);

        h.service.add_funds(h.seller, 500, None).unwrap();
        let receipt = h.service.withdraw(h.seller, 200, None).unwrap();
        assert_eq!(receipt.balance, 300);
        assert_eq!(
            receipt.transaction.status,
            tradelane_wallet::TransactionStatus::Pending
        );

        let failed = h
            .service
            .settle_withdrawal(
                h.admin,
                h.seller.user_id,
                receipt.transaction.transaction_id,
                WithdrawalOutcome::Failed,
            )
            .unwrap();
        assert_eq!(failed.balance, 500);

        let log = h.service.wallet_transactions(h.seller, 10, 0).unwrap();
        assert_eq!(log.len(), 3);
        assert!(log[0].description.starts_with("withdrawal reversal"));
        assert!(h.service.wallet(h.seller.user_id).unwrap().is_conserved());
    }

    #[test]
    fn registering_a_user_publishes_after_commit() {
        let h = harness();
        let user = h
            .service
            .register_user(
                h.admin,
                "Noor".to_string(),
                "noor@example.com".to_string(),
                Role::Seller,
            )
            .unwrap();

        assert!(
            h.notifier
                .published()
                .iter()
                .any(|e| e.topic == "user.registered")
        );
        assert!(h.service.list_users(h.admin).unwrap().contains(&user));

        let dup = h
            .service
            .register_user(
                h.admin,
                "Noor again".to_string(),
                "NOOR@example.com".to_string(),
                Role::Seller,
            )
            .unwrap_err();
        assert!(matches!(dup.as_domain(), Some(DomainError::Conflict(_))));

        let err = h.service.list_users(h.seller).unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotAuthorized(_))));
    }

    #[test]
    fn rebuild_restores_read_models_and_order_numbers() {
        let h = harness();
        let order = h.order(h.product(4), 1);

        h.service.rebuild().unwrap();

        assert_eq!(h.service.list_orders(h.admin).len(), 1);
        assert_eq!(
            h.service
                .collaborators
                .order_numbers
                .lookup(order.order_number())
                .unwrap(),
            Some(order.id_typed().0)
        );
    }
}
