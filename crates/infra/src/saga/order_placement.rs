//! Order placement: reserve stock → claim an order number → place the order.
//!
//! Stock and order live in different streams, so there is no single atomic
//! write. Request checks run before anything is written. The reservation
//! commits first; if anything after it fails, the compensation releases
//! exactly the reserved quantity for this order.

use chrono::Utc;
use serde_json::Value as JsonValue;
use serde_json::json;

use tradelane_auth::UserDirectory;
use tradelane_core::{Actor, AggregateId, DomainError, Role};
use tradelane_events::{EventBus, EventEnvelope};
use tradelane_inventory::{Product, ProductCommand, ProductId, ReleaseStock, ReserveStock};
use tradelane_orders::{
    Order, OrderCommand, OrderId, PlaceOrder, ShippingAddress, validate_placement,
};

use super::CompensationLog;
use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::config::SettlementConfig;
use crate::event_store::{EventStore, StoredEvent};
use crate::notify::{
    EntityRef, Notification, NotificationKind, Notifier, RealtimeEvent, RealtimePublisher,
    notify_best_effort, publish_best_effort,
};
use crate::order_number::{self, OrderNumberError, OrderNumberIndex};
use crate::streams;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub actor: Actor,
    pub product_id: ProductId,
    pub quantity: u64,
    pub shipping_address: ShippingAddress,
    pub notes: Option<String>,
}

/// Collaborators the placement saga needs besides the dispatcher.
#[derive(Clone, Copy)]
pub struct PlacementContext<'a> {
    pub config: &'a SettlementConfig,
    pub order_numbers: &'a dyn OrderNumberIndex,
    pub directory: &'a dyn UserDirectory,
    pub notifier: &'a dyn Notifier,
    pub realtime: &'a dyn RealtimePublisher,
}

/// The placed order plus every event the placement committed (the stock
/// reservation and the order itself).
pub type Placement = (Order, Vec<StoredEvent>);

pub fn place_order<S, B>(
    dispatcher: &CommandDispatcher<S, B>,
    ctx: PlacementContext<'_>,
    request: PlaceOrderRequest,
) -> Result<Placement, DispatchError>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    let PlaceOrderRequest {
        actor,
        product_id,
        quantity,
        shipping_address,
        notes,
    } = request;

    if actor.role != Role::Seller {
        return Err(DomainError::not_authorized("only sellers may place orders").into());
    }
    validate_placement(quantity, &shipping_address)?;

    let order_id = OrderId::new(AggregateId::new());
    let span = tracing::info_span!("place_order", %order_id, %product_id, quantity);
    let _guard = span.enter();

    let mut compensations = CompensationLog::new("order_placement");

    // 1) Reserve. Retries re-check stock against the latest revision.
    let reserve = ProductCommand::ReserveStock(ReserveStock {
        product_id,
        order_id: order_id.0,
        quantity,
        occurred_at: Utc::now(),
    });
    let (product, mut committed) = dispatcher.dispatch_with_retry(
        product_id.0,
        streams::PRODUCT,
        ctx.config.max_dispatch_attempts,
        &reserve,
        |id| Product::empty(ProductId::new(id)),
    )?;
    tracing::debug!(stock_after = product.stock(), "stock reserved");

    compensations.record("release_stock", move || {
        let release = ProductCommand::ReleaseStock(ReleaseStock {
            product_id,
            order_id: order_id.0,
            quantity,
            occurred_at: Utc::now(),
        });
        dispatcher
            .dispatch_with_retry(
                product_id.0,
                streams::PRODUCT,
                ctx.config.max_dispatch_attempts,
                &release,
                |id| Product::empty(ProductId::new(id)),
            )
            .map(|_| ())
            .map_err(|e| e.to_string())
    });

    let Some(supplier_id) = product.supplier_id() else {
        compensations.compensate();
        return Err(DomainError::invariant("product has no supplier").into());
    };

    // 2) Order number.
    let placed_at = Utc::now();
    let order_number = match order_number::allocate(
        ctx.order_numbers,
        order_id.0,
        placed_at,
        ctx.config.order_number_attempts,
    ) {
        Ok(n) => n,
        Err(e) => {
            compensations.compensate();
            let message = e.to_string();
            return Err(match e {
                OrderNumberError::Exhausted(_) => DispatchError::Domain(DomainError::conflict(message)),
                OrderNumberError::Unavailable(_) => DispatchError::Unavailable(message),
            });
        }
    };

    let claimed = order_number.clone();
    compensations.record("release_order_number", move || {
        ctx.order_numbers
            .release(&claimed, order_id.0)
            .map_err(|e| e.to_string())
    });

    // 3) Place. Price is the one the reservation decided against.
    let place = OrderCommand::PlaceOrder(PlaceOrder {
        order_id,
        order_number,
        actor,
        product_id,
        supplier_id,
        unit_price: product.final_price(),
        quantity,
        shipping_address,
        notes,
        occurred_at: placed_at,
    });
    // Only a decision or store error lands here. A publish failure after the
    // append is logged by the dispatcher and the order counts as placed.
    let order = match dispatcher.dispatch::<Order>(order_id.0, streams::ORDER, &place, |id| {
        Order::empty(OrderId::new(id))
    }) {
        Ok((order, placed)) => {
            committed.extend(placed);
            order
        }
        Err(e) => {
            tracing::warn!(error = %e, "order placement failed, compensating");
            compensations.compensate();
            return Err(e);
        }
    };

    compensations.commit();
    tracing::info!(order_number = order.order_number(), "order placed");

    announce(ctx, &order, supplier_id);
    Ok((order, committed))
}

/// Post-commit fan-out: admins review the order, the supplier gets a heads-up.
fn announce(ctx: PlacementContext<'_>, order: &Order, supplier_id: tradelane_core::UserId) {
    let order_ref = EntityRef::new("order", order.id_typed().0);
    let message = format!(
        "Order {} ({} units, total {}) is awaiting admin review",
        order.order_number(),
        order.quantity(),
        order.total_price()
    );

    let mut recipients = match ctx.directory.find_by_roles(&[Role::Admin, Role::SuperAdmin]) {
        Ok(admins) => admins.into_iter().map(|u| u.id).collect::<Vec<_>>(),
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve admins for order notification");
            vec![]
        }
    };
    recipients.push(supplier_id);

    for recipient in recipients {
        notify_best_effort(
            ctx.notifier,
            Notification {
                recipient,
                title: "New order".to_string(),
                message: message.clone(),
                kind: NotificationKind::OrderPlaced,
                entity_ref: Some(order_ref.clone()),
            },
        );
    }

    publish_best_effort(
        ctx.realtime,
        RealtimeEvent {
            topic: "order.placed".to_string(),
            payload: json!({
                "order_id": order.id_typed(),
                "order_number": order.order_number(),
                "seller_id": order.seller_id(),
                "supplier_id": supplier_id,
                "status": order.status(),
            }),
        },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tradelane_auth::{InMemoryUserDirectory, UserRecord};
    use tradelane_core::UserId;
    use tradelane_events::InMemoryEventBus;
    use tradelane_inventory::CreateProduct;
    use tradelane_orders::OrderStatus;

    use crate::event_store::InMemoryEventStore;
    use crate::notify::InMemoryNotifier;
    use crate::order_number::InMemoryOrderNumberIndex;

    type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>>;

    struct Fixture {
        dispatcher: Dispatcher,
        config: SettlementConfig,
        numbers: InMemoryOrderNumberIndex,
        directory: InMemoryUserDirectory,
        notifier: InMemoryNotifier,
        admin: UserId,
        supplier: UserId,
        seller: Actor,
    }

    impl Fixture {
        fn new() -> Self {
            let directory = InMemoryUserDirectory::new();
            let admin = UserId::new();
            let supplier = UserId::new();
            let seller = UserId::new();
            directory
                .register(UserRecord::new(admin, "Ada", "ada@example.com", Role::Admin))
                .unwrap();
            directory
                .register(UserRecord::new(supplier, "Sam", "sam@example.com", Role::Supplier))
                .unwrap();
            directory
                .register(UserRecord::new(seller, "Lee", "lee@example.com", Role::Seller))
                .unwrap();

            Self {
                dispatcher: CommandDispatcher::new(
                    Arc::new(InMemoryEventStore::new()),
                    Arc::new(InMemoryEventBus::new()),
                ),
                config: SettlementConfig::default(),
                numbers: InMemoryOrderNumberIndex::new(),
                directory,
                notifier: InMemoryNotifier::new(),
                admin,
                supplier,
                seller: Actor::new(seller, Role::Seller),
            }
        }

        fn ctx(&self) -> PlacementContext<'_> {
            self.ctx_with(&self.numbers)
        }

        fn ctx_with<'a>(&'a self, numbers: &'a dyn OrderNumberIndex) -> PlacementContext<'a> {
            PlacementContext {
                config: &self.config,
                order_numbers: numbers,
                directory: &self.directory,
                notifier: &self.notifier,
                realtime: &self.notifier,
            }
        }

        fn product(&self, stock: u64) -> ProductId {
            create_product(&self.dispatcher, self.supplier, stock)
        }

        fn stock(&self, id: ProductId) -> u64 {
            load_product(&self.dispatcher, id).stock()
        }

        fn request(&self, product_id: ProductId, quantity: u64) -> PlaceOrderRequest {
            PlaceOrderRequest {
                actor: self.seller,
                product_id,
                quantity,
                shipping_address: address(),
                notes: None,
            }
        }
    }

    fn address() -> ShippingAddress {
        ShippingAddress {
            recipient_name: Some("Lee".to_string()),
            phone: None,
            street: "12 Harbour Road".to_string(),
            city: "Pune".to_string(),
            state: None,
            postal_code: Some("411001".to_string()),
            country: Some("IN".to_string()),
        }
    }

    fn create_product<B>(
        dispatcher: &CommandDispatcher<Arc<InMemoryEventStore>, B>,
        supplier: UserId,
        stock: u64,
    ) -> ProductId
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        let id = ProductId::new(AggregateId::new());
        let cmd = ProductCommand::CreateProduct(CreateProduct {
            product_id: id,
            actor: Actor::new(supplier, Role::Supplier),
            name: "Linen shirt".to_string(),
            price: 900,
            margin: 100,
            stock,
            occurred_at: Utc::now(),
        });
        dispatcher
            .dispatch(id.0, streams::PRODUCT, &cmd, |aid| Product::empty(ProductId::new(aid)))
            .unwrap();
        id
    }

    fn load_product<B>(
        dispatcher: &CommandDispatcher<Arc<InMemoryEventStore>, B>,
        id: ProductId,
    ) -> Product
    where
        B: EventBus<EventEnvelope<JsonValue>>,
    {
        dispatcher
            .load(id.0, |aid| Product::empty(ProductId::new(aid)))
            .unwrap()
    }

    /// Bus that delivers everything except placed-order events.
    struct OrderPlacedFails(InMemoryEventBus<EventEnvelope<JsonValue>>);

    impl EventBus<EventEnvelope<JsonValue>> for OrderPlacedFails {
        type Error = &'static str;

        fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
            if message.event_type() == "orders.order.placed" {
                return Err("bus down");
            }
            self.0.publish(message).map_err(|_| "bus poisoned")
        }

        fn subscribe(&self) -> tradelane_events::Subscription<EventEnvelope<JsonValue>> {
            self.0.subscribe()
        }
    }

    /// Index where every number is already taken.
    struct FullIndex;

    impl OrderNumberIndex for FullIndex {
        fn claim(&self, _: &str, _: AggregateId) -> Result<bool, OrderNumberError> {
            Ok(false)
        }
        fn release(&self, _: &str, _: AggregateId) -> Result<(), OrderNumberError> {
            Ok(())
        }
        fn lookup(&self, _: &str) -> Result<Option<AggregateId>, OrderNumberError> {
            Ok(None)
        }
    }

    #[test]
    fn placement_reserves_stock_and_enters_review() {
        let f = Fixture::new();
        let product = f.product(5);

        let (order, committed) =
            place_order(&f.dispatcher, f.ctx(), f.request(product, 3)).unwrap();

        assert_eq!(committed.len(), 2);
        assert_eq!(order.status(), OrderStatus::AdminReview);
        assert_eq!(order.total_price(), 3_000);
        assert_eq!(order.supplier_id(), Some(f.supplier));
        assert_eq!(order.status_history().len(), 1);
        assert_eq!(f.stock(product), 2);
        assert_eq!(
            f.numbers.lookup(order.order_number()).unwrap(),
            Some(order.id_typed().0)
        );
    }

    #[test]
    fn admins_and_supplier_are_told_after_commit() {
        let f = Fixture::new();
        let product = f.product(5);

        place_order(&f.dispatcher, f.ctx(), f.request(product, 1)).unwrap();

        assert_eq!(f.notifier.sent_to(f.admin).len(), 1);
        assert_eq!(f.notifier.sent_to(f.supplier).len(), 1);
        assert!(f.notifier.sent_to(f.seller.user_id).is_empty());
        let published = f.notifier.published();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].topic, "order.placed");
    }

    #[test]
    fn only_sellers_place_orders() {
        let f = Fixture::new();
        let product = f.product(5);
        let mut request = f.request(product, 1);
        request.actor = Actor::new(f.supplier, Role::Supplier);

        let err = place_order(&f.dispatcher, f.ctx(), request).unwrap_err();

        assert!(matches!(err.as_domain(), Some(DomainError::NotAuthorized(_))));
        assert_eq!(f.stock(product), 5);
    }

    #[test]
    fn oversized_order_commits_nothing() {
        let f = Fixture::new();
        let product = f.product(5);

        let err = place_order(&f.dispatcher, f.ctx(), f.request(product, 10)).unwrap_err();

        assert_eq!(
            err.as_domain(),
            Some(&DomainError::InsufficientStock {
                requested: 10,
                available: 5
            })
        );
        assert_eq!(f.stock(product), 5);
        assert_eq!(f.dispatcher.store().load_all().unwrap().len(), 1);
        assert!(f.notifier.sent().is_empty());
    }

    #[test]
    fn unknown_product_is_not_found() {
        let f = Fixture::new();
        let err = place_order(
            &f.dispatcher,
            f.ctx(),
            f.request(ProductId::new(AggregateId::new()), 1),
        )
        .unwrap_err();
        assert!(matches!(err.as_domain(), Some(DomainError::NotFound(_))));
    }

    #[test]
    fn exhausted_order_numbers_release_the_reservation() {
        let f = Fixture::new();
        let product = f.product(5);
        let full = FullIndex;

        let err = place_order(&f.dispatcher, f.ctx_with(&full), f.request(product, 4)).unwrap_err();

        assert!(matches!(err.as_domain(), Some(DomainError::Conflict(_))));
        assert_eq!(f.stock(product), 5);
    }

    #[test]
    fn malformed_request_touches_no_stock() {
        let f = Fixture::new();
        let product = f.product(5);
        let feed = f.dispatcher.bus().subscribe();
        let mut request = f.request(product, 2);
        request.shipping_address.street = "  ".to_string();

        let err = place_order(&f.dispatcher, f.ctx(), request).unwrap_err();

        assert_eq!(
            err.as_domain(),
            Some(&DomainError::validation("shipping street is required"))
        );
        let product_events: Vec<String> = f
            .dispatcher
            .store()
            .load_stream(product.0)
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(product_events, vec!["inventory.product.created"]);
        assert!(feed.try_recv().is_err());
        assert!(f.notifier.sent().is_empty());
    }

    #[test]
    fn order_stays_placed_when_its_event_is_not_published() {
        let f = Fixture::new();
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            OrderPlacedFails(InMemoryEventBus::new()),
        );
        let product = create_product(&dispatcher, f.supplier, 5);

        let (order, _) = place_order(&dispatcher, f.ctx(), f.request(product, 5)).unwrap();

        let stored: Order = dispatcher
            .load(order.id_typed().0, |id| Order::empty(OrderId::new(id)))
            .unwrap();
        assert_eq!(stored.status(), OrderStatus::AdminReview);
        assert_eq!(stored.quantity(), 5);

        let product = load_product(&dispatcher, product);
        assert_eq!(product.stock(), 0);
        assert_eq!(product.reserved_for(order.id_typed().0), 5);
        assert_eq!(
            f.numbers.lookup(order.order_number()).unwrap(),
            Some(order.id_typed().0)
        );
    }
}
