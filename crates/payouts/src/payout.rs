use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradelane_core::{
    Actor, Aggregate, AggregateId, AggregateRoot, DomainError, RecordState, Role, UserId,
};
use tradelane_events::Event;
use tradelane_orders::OrderId;

/// Payout identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PayoutId(pub AggregateId);

impl PayoutId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PayoutId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Which side of the order receives the money.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayeeRole {
    Seller,
    Supplier,
}

impl PayeeRole {
    pub fn matches(self, role: Role) -> bool {
        matches!(
            (self, role),
            (PayeeRole::Seller, Role::Seller) | (PayeeRole::Supplier, Role::Supplier)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    /// Kept for wire compatibility. Nothing derives it.
    Partial,
    Paid,
}

impl PayoutStatus {
    /// The only derivation rule: any payment at all means paid.
    pub fn derive(paid_amount: u64) -> Self {
        if paid_amount > 0 {
            PayoutStatus::Paid
        } else {
            PayoutStatus::Pending
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutMode {
    BankTransfer,
    Upi,
    Cash,
    Cheque,
}

/// Aggregate root: Payout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payout {
    id: PayoutId,
    order_id: Option<OrderId>,
    payer_id: Option<UserId>,
    payee_id: Option<UserId>,
    payee_role: PayeeRole,
    payable_amount: u64,
    paid_amount: u64,
    status: PayoutStatus,
    mode: PayoutMode,
    reference_number: Option<String>,
    remarks: Option<String>,
    proof_images: Vec<String>,
    due_date: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    processed_by: Option<UserId>,
    created_at: Option<DateTime<Utc>>,
    record: RecordState,
    version: u64,
    created: bool,
}

impl Payout {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PayoutId) -> Self {
        Self {
            id,
            order_id: None,
            payer_id: None,
            payee_id: None,
            payee_role: PayeeRole::Seller,
            payable_amount: 0,
            paid_amount: 0,
            status: PayoutStatus::Pending,
            mode: PayoutMode::BankTransfer,
            reference_number: None,
            remarks: None,
            proof_images: Vec::new(),
            due_date: None,
            paid_at: None,
            processed_by: None,
            created_at: None,
            record: RecordState::Active,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> PayoutId {
        self.id
    }

    /// Created and not soft-deleted.
    pub fn exists(&self) -> bool {
        self.created && self.record.is_active()
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.order_id
    }

    pub fn payer_id(&self) -> Option<UserId> {
        self.payer_id
    }

    pub fn payee_id(&self) -> Option<UserId> {
        self.payee_id
    }

    pub fn payee_role(&self) -> PayeeRole {
        self.payee_role
    }

    pub fn payable_amount(&self) -> u64 {
        self.payable_amount
    }

    pub fn paid_amount(&self) -> u64 {
        self.paid_amount
    }

    pub fn status(&self) -> PayoutStatus {
        self.status
    }

    pub fn mode(&self) -> PayoutMode {
        self.mode
    }

    pub fn reference_number(&self) -> Option<&str> {
        self.reference_number.as_deref()
    }

    pub fn remarks(&self) -> Option<&str> {
        self.remarks.as_deref()
    }

    pub fn proof_images(&self) -> &[String] {
        &self.proof_images
    }

    pub fn due_date(&self) -> Option<DateTime<Utc>> {
        self.due_date
    }

    pub fn paid_at(&self) -> Option<DateTime<Utc>> {
        self.paid_at
    }

    pub fn processed_by(&self) -> Option<UserId> {
        self.processed_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn record(&self) -> &RecordState {
        &self.record
    }

    /// Admins see every live payout; payees see their own.
    pub fn is_visible_to(&self, actor: &Actor) -> bool {
        self.exists() && (actor.is_admin() || self.payee_id == Some(actor.user_id))
    }
}

impl AggregateRoot for Payout {
    type Id = PayoutId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreatePayout.
///
/// Payee and order existence are checked by the caller, which owns the user
/// directory and the order streams. `due_date` is already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePayout {
    pub payout_id: PayoutId,
    pub actor: Actor,
    pub order_id: OrderId,
    pub payee_id: UserId,
    pub payee_role: PayeeRole,
    pub payable_amount: u64,
    pub mode: PayoutMode,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Vec<String>,
    pub due_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdatePayout. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePayout {
    pub payout_id: PayoutId,
    pub actor: Actor,
    pub paid_amount: Option<u64>,
    pub mode: Option<PayoutMode>,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Option<Vec<String>>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeletePayout (soft delete).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletePayout {
    pub payout_id: PayoutId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutCommand {
    CreatePayout(CreatePayout),
    UpdatePayout(UpdatePayout),
    DeletePayout(DeletePayout),
}

/// Event: PayoutCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutCreated {
    pub payout_id: PayoutId,
    pub order_id: OrderId,
    pub payer_id: UserId,
    pub payee_id: UserId,
    pub payee_role: PayeeRole,
    pub payable_amount: u64,
    pub mode: PayoutMode,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Vec<String>,
    pub due_date: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PayoutUpdated. Carries the full resulting payment state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutUpdated {
    pub payout_id: PayoutId,
    pub paid_amount: u64,
    pub status: PayoutStatus,
    pub mode: PayoutMode,
    pub reference_number: Option<String>,
    pub remarks: Option<String>,
    pub proof_images: Vec<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub processed_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PayoutDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutDeleted {
    pub payout_id: PayoutId,
    pub deleted_by: UserId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayoutEvent {
    PayoutCreated(PayoutCreated),
    PayoutUpdated(PayoutUpdated),
    PayoutDeleted(PayoutDeleted),
}

impl PayoutEvent {
    pub fn payout_id(&self) -> PayoutId {
        match self {
            PayoutEvent::PayoutCreated(e) => e.payout_id,
            PayoutEvent::PayoutUpdated(e) => e.payout_id,
            PayoutEvent::PayoutDeleted(e) => e.payout_id,
        }
    }
}

impl Event for PayoutEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PayoutEvent::PayoutCreated(_) => "payouts.payout.created",
            PayoutEvent::PayoutUpdated(_) => "payouts.payout.updated",
            PayoutEvent::PayoutDeleted(_) => "payouts.payout.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PayoutEvent::PayoutCreated(e) => e.occurred_at,
            PayoutEvent::PayoutUpdated(e) => e.occurred_at,
            PayoutEvent::PayoutDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Payout {
    type Command = PayoutCommand;
    type Event = PayoutEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PayoutEvent::PayoutCreated(e) => {
                self.id = e.payout_id;
                self.order_id = Some(e.order_id);
                self.payer_id = Some(e.payer_id);
                self.payee_id = Some(e.payee_id);
                self.payee_role = e.payee_role;
                self.payable_amount = e.payable_amount;
                self.paid_amount = 0;
                self.status = PayoutStatus::Pending;
                self.mode = e.mode;
                self.reference_number = e.reference_number.clone();
                self.remarks = e.remarks.clone();
                self.proof_images = e.proof_images.clone();
                self.due_date = Some(e.due_date);
                self.paid_at = None;
                self.processed_by = Some(e.payer_id);
                self.created_at = Some(e.occurred_at);
                self.record = RecordState::Active;
                self.created = true;
            }
            PayoutEvent::PayoutUpdated(e) => {
                self.paid_amount = e.paid_amount;
                self.status = e.status;
                self.mode = e.mode;
                self.reference_number = e.reference_number.clone();
                self.remarks = e.remarks.clone();
                self.proof_images = e.proof_images.clone();
                self.paid_at = e.paid_at;
                self.processed_by = Some(e.processed_by);
            }
            PayoutEvent::PayoutDeleted(e) => {
                self.record = RecordState::Deleted {
                    deleted_at: e.occurred_at,
                    deleted_by: Some(e.deleted_by),
                };
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PayoutCommand::CreatePayout(cmd) => self.handle_create(cmd),
            PayoutCommand::UpdatePayout(cmd) => self.handle_update(cmd),
            PayoutCommand::DeletePayout(cmd) => self.handle_delete(cmd),
        }
    }
}

impl Payout {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        // Soft-deleted payouts are gone as far as every command is concerned.
        if self.exists() {
            Ok(())
        } else {
            Err(DomainError::not_found("payout"))
        }
    }

    fn ensure_payout_id(&self, payout_id: PayoutId) -> Result<(), DomainError> {
        if self.id != payout_id {
            return Err(DomainError::invariant("payout_id mismatch"));
        }
        Ok(())
    }

    fn handle_create(&self, cmd: &CreatePayout) -> Result<Vec<PayoutEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payout already exists"));
        }
        cmd.actor.require_admin("create payouts")?;

        Ok(vec![PayoutEvent::PayoutCreated(PayoutCreated {
            payout_id: cmd.payout_id,
            order_id: cmd.order_id,
            payer_id: cmd.actor.user_id,
            payee_id: cmd.payee_id,
            payee_role: cmd.payee_role,
            payable_amount: cmd.payable_amount,
            mode: cmd.mode,
            reference_number: normalize(cmd.reference_number.as_deref()),
            remarks: normalize(cmd.remarks.as_deref()),
            proof_images: cmd.proof_images.clone(),
            due_date: cmd.due_date,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdatePayout) -> Result<Vec<PayoutEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_payout_id(cmd.payout_id)?;
        cmd.actor.require_admin("update payouts")?;

        if cmd.paid_amount.is_none()
            && cmd.mode.is_none()
            && cmd.reference_number.is_none()
            && cmd.remarks.is_none()
            && cmd.proof_images.is_none()
        {
            return Err(DomainError::validation("update must change at least one field"));
        }

        let paid_amount = cmd.paid_amount.unwrap_or(self.paid_amount);
        let status = PayoutStatus::derive(paid_amount);
        // Every update that leaves the payout paid restamps the payment time.
        let paid_at = match status {
            PayoutStatus::Paid => Some(cmd.occurred_at),
            PayoutStatus::Pending | PayoutStatus::Partial => None,
        };

        let reference_number = match &cmd.reference_number {
            Some(r) => normalize(Some(r)),
            None => self.reference_number.clone(),
        };
        let remarks = match &cmd.remarks {
            Some(r) => normalize(Some(r)),
            None => self.remarks.clone(),
        };

        Ok(vec![PayoutEvent::PayoutUpdated(PayoutUpdated {
            payout_id: cmd.payout_id,
            paid_amount,
            status,
            mode: cmd.mode.unwrap_or(self.mode),
            reference_number,
            remarks,
            proof_images: cmd
                .proof_images
                .clone()
                .unwrap_or_else(|| self.proof_images.clone()),
            paid_at,
            processed_by: cmd.actor.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeletePayout) -> Result<Vec<PayoutEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_payout_id(cmd.payout_id)?;
        cmd.actor.require_admin("delete payouts")?;

        Ok(vec![PayoutEvent::PayoutDeleted(PayoutDeleted {
            payout_id: cmd.payout_id,
            deleted_by: cmd.actor.user_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn normalize(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}
