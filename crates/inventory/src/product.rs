use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tradelane_core::{Actor, Aggregate, AggregateId, AggregateRoot, DomainError, Role, UserId};
use tradelane_events::Event;

/// Product identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProductId(pub AggregateId);

impl ProductId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ProductId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Catalogue status as seen by sellers.
///
/// Derived from stock and the supplier's listing switch, never stored on its
/// own, so `stock == 0 => OutOfStock` cannot drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus {
    Active,
    Inactive,
    OutOfStock,
}

impl ProductStatus {
    pub fn derive(stock: u64, listed: bool) -> Self {
        if stock == 0 {
            ProductStatus::OutOfStock
        } else if listed {
            ProductStatus::Active
        } else {
            ProductStatus::Inactive
        }
    }
}

/// Aggregate root: Product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    id: ProductId,
    supplier_id: Option<UserId>,
    name: String,
    /// Supplier price in minor units.
    price: u64,
    /// Absolute marketplace markup in minor units.
    margin: u64,
    stock: u64,
    listed: bool,
    /// Outstanding reservations per order, so a release can never exceed what
    /// the order actually took.
    reservations: HashMap<AggregateId, u64>,
    version: u64,
    created: bool,
}

impl Product {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ProductId) -> Self {
        Self {
            id,
            supplier_id: None,
            name: String::new(),
            price: 0,
            margin: 0,
            stock: 0,
            listed: true,
            reservations: HashMap::new(),
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ProductId {
        self.id
    }

    pub fn exists(&self) -> bool {
        self.created
    }

    pub fn supplier_id(&self) -> Option<UserId> {
        self.supplier_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u64 {
        self.price
    }

    pub fn margin(&self) -> u64 {
        self.margin
    }

    /// Price a seller pays per unit.
    pub fn final_price(&self) -> u64 {
        // Overflow is rejected when price or margin are set.
        self.price.saturating_add(self.margin)
    }

    pub fn stock(&self) -> u64 {
        self.stock
    }

    pub fn status(&self) -> ProductStatus {
        ProductStatus::derive(self.stock, self.listed)
    }

    pub fn reserved_for(&self, order_id: AggregateId) -> u64 {
        self.reservations.get(&order_id).copied().unwrap_or(0)
    }
}

impl AggregateRoot for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateProduct (supplier lists a new product).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub name: String,
    pub price: u64,
    pub margin: u64,
    pub stock: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateProduct. `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    pub actor: Actor,
    pub name: Option<String>,
    pub price: Option<u64>,
    pub margin: Option<u64>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Restock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restock {
    pub product_id: ProductId,
    pub actor: Actor,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetAvailability (supplier listing switch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetAvailability {
    pub product_id: ProductId,
    pub actor: Actor,
    pub available: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveStock (issued by order placement only).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveStock {
    pub product_id: ProductId,
    pub order_id: AggregateId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReleaseStock (rejection, compensation, or restoring cancellation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseStock {
    pub product_id: ProductId,
    pub order_id: AggregateId,
    pub quantity: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductCommand {
    CreateProduct(CreateProduct),
    UpdateProduct(UpdateProduct),
    Restock(Restock),
    SetAvailability(SetAvailability),
    ReserveStock(ReserveStock),
    ReleaseStock(ReleaseStock),
}

/// Event: ProductCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCreated {
    pub product_id: ProductId,
    pub supplier_id: UserId,
    pub name: String,
    pub price: u64,
    pub margin: u64,
    pub stock: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ProductUpdated (carries the resolved values, not the patch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductUpdated {
    pub product_id: ProductId,
    pub name: String,
    pub price: u64,
    pub margin: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Restocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Restocked {
    pub product_id: ProductId,
    pub quantity: u64,
    pub stock_after: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AvailabilityChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityChanged {
    pub product_id: ProductId,
    pub listed: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub product_id: ProductId,
    pub order_id: AggregateId,
    pub quantity: u64,
    pub stock_after: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReleased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReleased {
    pub product_id: ProductId,
    pub order_id: AggregateId,
    pub quantity: u64,
    pub stock_after: u64,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductEvent {
    ProductCreated(ProductCreated),
    ProductUpdated(ProductUpdated),
    Restocked(Restocked),
    AvailabilityChanged(AvailabilityChanged),
    StockReserved(StockReserved),
    StockReleased(StockReleased),
}

impl ProductEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            ProductEvent::ProductCreated(e) => e.product_id,
            ProductEvent::ProductUpdated(e) => e.product_id,
            ProductEvent::Restocked(e) => e.product_id,
            ProductEvent::AvailabilityChanged(e) => e.product_id,
            ProductEvent::StockReserved(e) => e.product_id,
            ProductEvent::StockReleased(e) => e.product_id,
        }
    }
}

impl Event for ProductEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated(_) => "inventory.product.created",
            ProductEvent::ProductUpdated(_) => "inventory.product.updated",
            ProductEvent::Restocked(_) => "inventory.product.restocked",
            ProductEvent::AvailabilityChanged(_) => "inventory.product.availability_changed",
            ProductEvent::StockReserved(_) => "inventory.product.stock_reserved",
            ProductEvent::StockReleased(_) => "inventory.product.stock_released",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ProductEvent::ProductCreated(e) => e.occurred_at,
            ProductEvent::ProductUpdated(e) => e.occurred_at,
            ProductEvent::Restocked(e) => e.occurred_at,
            ProductEvent::AvailabilityChanged(e) => e.occurred_at,
            ProductEvent::StockReserved(e) => e.occurred_at,
            ProductEvent::StockReleased(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Product {
    type Command = ProductCommand;
    type Event = ProductEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProductEvent::ProductCreated(e) => {
                self.id = e.product_id;
                self.supplier_id = Some(e.supplier_id);
                self.name = e.name.clone();
                self.price = e.price;
                self.margin = e.margin;
                self.stock = e.stock;
                self.listed = true;
                self.reservations.clear();
                self.created = true;
            }
            ProductEvent::ProductUpdated(e) => {
                self.name = e.name.clone();
                self.price = e.price;
                self.margin = e.margin;
            }
            ProductEvent::Restocked(e) => {
                self.stock = e.stock_after;
            }
            ProductEvent::AvailabilityChanged(e) => {
                self.listed = e.listed;
            }
            ProductEvent::StockReserved(e) => {
                self.stock = e.stock_after;
                *self.reservations.entry(e.order_id).or_insert(0) += e.quantity;
            }
            ProductEvent::StockReleased(e) => {
                self.stock = e.stock_after;
                let remaining = self.reserved_for(e.order_id).saturating_sub(e.quantity);
                if remaining == 0 {
                    self.reservations.remove(&e.order_id);
                } else {
                    self.reservations.insert(e.order_id, remaining);
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProductCommand::CreateProduct(cmd) => self.handle_create(cmd),
            ProductCommand::UpdateProduct(cmd) => self.handle_update(cmd),
            ProductCommand::Restock(cmd) => self.handle_restock(cmd),
            ProductCommand::SetAvailability(cmd) => self.handle_set_availability(cmd),
            ProductCommand::ReserveStock(cmd) => self.handle_reserve(cmd),
            ProductCommand::ReleaseStock(cmd) => self.handle_release(cmd),
        }
    }
}

impl Product {
    fn ensure_exists(&self) -> Result<(), DomainError> {
        if self.created {
            Ok(())
        } else {
            Err(DomainError::not_found("product"))
        }
    }

    fn ensure_product_id(&self, product_id: ProductId) -> Result<(), DomainError> {
        if self.id != product_id {
            return Err(DomainError::invariant("product_id mismatch"));
        }
        Ok(())
    }

    /// Owning supplier or any admin.
    fn ensure_can_manage(&self, actor: &Actor) -> Result<(), DomainError> {
        if actor.is_admin() || self.supplier_id == Some(actor.user_id) {
            Ok(())
        } else {
            Err(DomainError::not_authorized(
                "only the owning supplier or an admin may manage this product",
            ))
        }
    }

    fn handle_create(&self, cmd: &CreateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("product already exists"));
        }
        if cmd.actor.role != Role::Supplier {
            return Err(DomainError::not_authorized("only suppliers may list products"));
        }

        let name = validate_name(&cmd.name)?;
        validate_pricing(cmd.price, cmd.margin)?;

        Ok(vec![ProductEvent::ProductCreated(ProductCreated {
            product_id: cmd.product_id,
            supplier_id: cmd.actor.user_id,
            name,
            price: cmd.price,
            margin: cmd.margin,
            stock: cmd.stock,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(&self, cmd: &UpdateProduct) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        self.ensure_can_manage(&cmd.actor)?;

        if cmd.name.is_none() && cmd.price.is_none() && cmd.margin.is_none() {
            return Err(DomainError::validation("nothing to update"));
        }

        let name = match &cmd.name {
            Some(n) => validate_name(n)?,
            None => self.name.clone(),
        };
        let price = cmd.price.unwrap_or(self.price);
        let margin = cmd.margin.unwrap_or(self.margin);
        validate_pricing(price, margin)?;

        Ok(vec![ProductEvent::ProductUpdated(ProductUpdated {
            product_id: cmd.product_id,
            name,
            price,
            margin,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_restock(&self, cmd: &Restock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        self.ensure_can_manage(&cmd.actor)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        let stock_after = self
            .stock
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("stock would overflow"))?;

        Ok(vec![ProductEvent::Restocked(Restocked {
            product_id: cmd.product_id,
            quantity: cmd.quantity,
            stock_after,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_availability(
        &self,
        cmd: &SetAvailability,
    ) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;
        self.ensure_can_manage(&cmd.actor)?;

        if self.listed == cmd.available {
            return Ok(vec![]);
        }

        Ok(vec![ProductEvent::AvailabilityChanged(AvailabilityChanged {
            product_id: cmd.product_id,
            listed: cmd.available,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve(&self, cmd: &ReserveStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if !self.listed {
            return Err(DomainError::validation("product is not available for ordering"));
        }
        if self.reservations.contains_key(&cmd.order_id) {
            return Err(DomainError::conflict("stock already reserved for this order"));
        }
        if self.final_price().checked_mul(cmd.quantity).is_none() {
            return Err(DomainError::validation("order total overflows"));
        }
        if self.stock < cmd.quantity {
            return Err(DomainError::InsufficientStock {
                requested: cmd.quantity,
                available: self.stock,
            });
        }

        Ok(vec![ProductEvent::StockReserved(StockReserved {
            product_id: cmd.product_id,
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            stock_after: self.stock - cmd.quantity,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_release(&self, cmd: &ReleaseStock) -> Result<Vec<ProductEvent>, DomainError> {
        self.ensure_exists()?;
        self.ensure_product_id(cmd.product_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        let outstanding = self.reserved_for(cmd.order_id);
        if outstanding < cmd.quantity {
            return Err(DomainError::invariant(format!(
                "cannot release {} units for order {}: {} outstanding",
                cmd.quantity, cmd.order_id, outstanding
            )));
        }
        let stock_after = self
            .stock
            .checked_add(cmd.quantity)
            .ok_or_else(|| DomainError::validation("stock would overflow"))?;

        Ok(vec![ProductEvent::StockReleased(StockReleased {
            product_id: cmd.product_id,
            order_id: cmd.order_id,
            quantity: cmd.quantity,
            stock_after,
            occurred_at: cmd.occurred_at,
        })])
    }
}

fn validate_name(name: &str) -> Result<String, DomainError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DomainError::validation("product name cannot be empty"));
    }
    Ok(name.to_string())
}

fn validate_pricing(price: u64, margin: u64) -> Result<(), DomainError> {
    if price == 0 {
        return Err(DomainError::validation("price must be positive"));
    }
    if price.checked_add(margin).is_none() {
        return Err(DomainError::validation("price plus margin overflows"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use tradelane_events::execute;

    fn test_product_id() -> ProductId {
        ProductId::new(AggregateId::new())
    }

    fn test_supplier() -> Actor {
        Actor::new(UserId::new(), Role::Supplier)
    }

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn created_product(stock: u64) -> (Product, Actor) {
        let product_id = test_product_id();
        let supplier = test_supplier();
        let mut product = Product::empty(product_id);
        execute(
            &mut product,
            &ProductCommand::CreateProduct(CreateProduct {
                product_id,
                actor: supplier,
                name: "Cotton kurta".to_string(),
                price: 400,
                margin: 100,
                stock,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        (product, supplier)
    }

    fn reserve(product: &Product, order_id: AggregateId, quantity: u64) -> ProductCommand {
        ProductCommand::ReserveStock(ReserveStock {
            product_id: product.id_typed(),
            order_id,
            quantity,
            occurred_at: test_time(),
        })
    }

    fn release(product: &Product, order_id: AggregateId, quantity: u64) -> ProductCommand {
        ProductCommand::ReleaseStock(ReleaseStock {
            product_id: product.id_typed(),
            order_id,
            quantity,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn create_product_records_supplier_and_final_price() {
        let (product, supplier) = created_product(5);
        assert_eq!(product.supplier_id(), Some(supplier.user_id));
        assert_eq!(product.final_price(), 500);
        assert_eq!(product.status(), ProductStatus::Active);
        assert_eq!(product.version(), 1);
    }

    #[test]
    fn only_suppliers_can_create_products() {
        let product_id = test_product_id();
        let product = Product::empty(product_id);
        let err = product
            .handle(&ProductCommand::CreateProduct(CreateProduct {
                product_id,
                actor: Actor::new(UserId::new(), Role::Seller),
                name: "Rug".to_string(),
                price: 10,
                margin: 0,
                stock: 1,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        match err {
            DomainError::NotAuthorized(_) => {}
            _ => panic!("Expected NotAuthorized for seller creating a product"),
        }
    }

    #[test]
    fn zero_initial_stock_is_out_of_stock() {
        let (product, _) = created_product(0);
        assert_eq!(product.status(), ProductStatus::OutOfStock);
    }

    #[test]
    fn reserving_all_stock_marks_out_of_stock_and_release_restores_active() {
        let (mut product, _) = created_product(5);
        let order_id = AggregateId::new();

        let cmd = reserve(&product, order_id, 5);
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.stock(), 0);
        assert_eq!(product.status(), ProductStatus::OutOfStock);

        let cmd = release(&product, order_id, 5);
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.stock(), 5);
        assert_eq!(product.status(), ProductStatus::Active);
        assert_eq!(product.reserved_for(order_id), 0);
    }

    #[test]
    fn reserve_more_than_stock_fails_without_events() {
        let (product, _) = created_product(5);
        let err = product.handle(&reserve(&product, AggregateId::new(), 10)).unwrap_err();
        assert_eq!(
            err,
            DomainError::InsufficientStock {
                requested: 10,
                available: 5
            }
        );
        assert_eq!(product.stock(), 5);
    }

    #[test]
    fn reservation_whose_total_overflows_is_refused() {
        let product_id = test_product_id();
        let mut product = Product::empty(product_id);
        execute(
            &mut product,
            &ProductCommand::CreateProduct(CreateProduct {
                product_id,
                actor: test_supplier(),
                name: "Gold bar".to_string(),
                price: u64::MAX / 2,
                margin: 0,
                stock: 3,
                occurred_at: test_time(),
            }),
        )
        .unwrap();

        let err = product.handle(&reserve(&product, AggregateId::new(), 3)).unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(product.stock(), 3);
    }

    #[test]
    fn release_cannot_exceed_the_orders_reservation() {
        let (mut product, _) = created_product(5);
        let order_id = AggregateId::new();
        let cmd = reserve(&product, order_id, 2);
        execute(&mut product, &cmd).unwrap();
        let cmd = release(&product, order_id, 2);
        execute(&mut product, &cmd).unwrap();

        // Second release for the same order would double-restore stock.
        let err = product.handle(&release(&product, order_id, 2)).unwrap_err();
        match err {
            DomainError::InvariantViolation(msg) if msg.contains("0 outstanding") => {}
            _ => panic!("Expected InvariantViolation for double release"),
        }
        assert_eq!(product.stock(), 5);
    }

    #[test]
    fn unlisted_products_cannot_be_reserved() {
        let (mut product, supplier) = created_product(5);
        let product_id = product.id_typed();
        execute(
            &mut product,
            &ProductCommand::SetAvailability(SetAvailability {
                product_id: product_id,
                actor: supplier,
                available: false,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(product.status(), ProductStatus::Inactive);

        match product.handle(&reserve(&product, AggregateId::new(), 1)).unwrap_err() {
            DomainError::Validation(msg) if msg.contains("not available") => {}
            other => panic!("Expected Validation, got {other:?}"),
        }
    }

    #[test]
    fn release_on_unlisted_product_does_not_relist_it() {
        let (mut product, supplier) = created_product(1);
        let order_id = AggregateId::new();
        let cmd = reserve(&product, order_id, 1);
        execute(&mut product, &cmd).unwrap();
        let product_id = product.id_typed();
        execute(
            &mut product,
            &ProductCommand::SetAvailability(SetAvailability {
                product_id: product_id,
                actor: supplier,
                available: false,
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(product.status(), ProductStatus::OutOfStock);

        let cmd = release(&product, order_id, 1);
        execute(&mut product, &cmd).unwrap();
        assert_eq!(product.status(), ProductStatus::Inactive);
    }

    #[test]
    fn other_suppliers_cannot_update_or_restock() {
        let (product, _) = created_product(5);
        let stranger = test_supplier();

        let err = product
            .handle(&ProductCommand::Restock(Restock {
                product_id: product.id_typed(),
                actor: stranger,
                quantity: 3,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotAuthorized(_)));

        let err = product
            .handle(&ProductCommand::UpdateProduct(UpdateProduct {
                product_id: product.id_typed(),
                actor: stranger,
                name: None,
                price: Some(1),
                margin: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotAuthorized(_)));
    }

    #[test]
    fn admin_update_recomputes_final_price() {
        let (mut product, _) = created_product(5);
        let admin = Actor::new(UserId::new(), Role::Admin);
        let product_id = product.id_typed();
        execute(
            &mut product,
            &ProductCommand::UpdateProduct(UpdateProduct {
                product_id: product_id,
                actor: admin,
                name: None,
                price: Some(450),
                margin: Some(50),
                occurred_at: test_time(),
            }),
        )
        .unwrap();
        assert_eq!(product.final_price(), 500);
        assert_eq!(product.name(), "Cotton kurta");
    }

    #[test]
    fn handle_does_not_mutate_state() {
        let (product, _) = created_product(5);
        let before = product.clone();
        let cmd = reserve(&product, AggregateId::new(), 3);

        let first = product.handle(&cmd).unwrap();
        let second = product.handle(&cmd).unwrap();

        assert_eq!(product, before);
        assert_eq!(first, second);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Reserve(u64),
        ReleaseOldest,
        Restock(u64),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (1u64..8).prop_map(Op::Reserve),
            Just(Op::ReleaseOldest),
            (1u64..5).prop_map(Op::Restock),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: whatever sequence of reservations, releases and restocks is
        /// attempted, stock equals initial + restocked - outstanding reservations,
        /// and zero stock always reads as out_of_stock.
        #[test]
        fn stock_is_conserved_and_status_tracks_zero(
            initial in 0u64..10,
            ops in prop::collection::vec(op_strategy(), 1..40)
        ) {
            let (mut product, supplier) = created_product(initial);
            let mut open_orders: Vec<(AggregateId, u64)> = Vec::new();
            let mut restocked = 0u64;

            for op in ops {
                match op {
                    Op::Reserve(qty) => {
                        let order_id = AggregateId::new();
                        let available = product.stock();
                        let cmd = reserve(&product, order_id, qty);
                        match execute(&mut product, &cmd) {
                            Ok(_) => open_orders.push((order_id, qty)),
                            Err(DomainError::InsufficientStock { .. }) => prop_assert!(qty > available),
                            Err(e) => prop_assert!(false, "unexpected error {e:?}"),
                        }
                    }
                    Op::ReleaseOldest => {
                        if !open_orders.is_empty() {
                            let (order_id, qty) = open_orders.remove(0);
                            let cmd = release(&product, order_id, qty);
                            execute(&mut product, &cmd).unwrap();
                        }
                    }
                    Op::Restock(qty) => {
                        let cmd = ProductCommand::Restock(Restock {
                            product_id: product.id_typed(),
                            actor: supplier,
                            quantity: qty,
                            occurred_at: test_time(),
                        });
                        execute(&mut product, &cmd).unwrap();
                        restocked += qty;
                    }
                }

                let outstanding: u64 = open_orders.iter().map(|(_, q)| q).sum();
                prop_assert_eq!(product.stock() + outstanding, initial + restocked);
                if product.stock() == 0 {
                    prop_assert_eq!(product.status(), ProductStatus::OutOfStock);
                } else {
                    prop_assert_eq!(product.status(), ProductStatus::Active);
                }
            }
        }
    }
}
