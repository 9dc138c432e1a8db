use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use tradelane_core::{Actor, AggregateId, Role, UserId};
use tradelane_events::{EventEnvelope, InMemoryEventBus};
use tradelane_infra::command_dispatcher::CommandDispatcher;
use tradelane_infra::event_store::InMemoryEventStore;
use tradelane_infra::streams;
use tradelane_inventory::{CreateProduct, Product, ProductCommand, ProductId, ReleaseStock, ReserveStock};

type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;

fn dispatcher() -> Dispatcher {
    CommandDispatcher::new(Arc::new(InMemoryEventStore::new()), Arc::new(InMemoryEventBus::new()))
}

fn create_product(d: &Dispatcher, stock: u64) -> ProductId {
    let product_id = ProductId::new(AggregateId::new());
    let cmd = ProductCommand::CreateProduct(CreateProduct {
        product_id,
        actor: Actor::new(UserId::new(), Role::Supplier),
        name: "Bench widget".to_string(),
        price: 100,
        margin: 10,
        stock,
        occurred_at: Utc::now(),
    });
    d.dispatch(product_id.0, streams::PRODUCT, &cmd, |id| Product::empty(ProductId::new(id)))
        .expect("create product");
    product_id
}

fn reserve(d: &Dispatcher, product_id: ProductId, order_id: AggregateId) {
    let cmd = ProductCommand::ReserveStock(ReserveStock {
        product_id,
        order_id,
        quantity: 1,
        occurred_at: Utc::now(),
    });
    d.dispatch_with_retry(product_id.0, streams::PRODUCT, 8, &cmd, |id| {
        Product::empty(ProductId::new(id))
    })
    .expect("reserve");
}

/// A single reservation against streams of growing length: the dispatcher
/// replays the whole stream on every command.
fn bench_reserve_by_stream_length(c: &mut Criterion) {
    let mut group = c.benchmark_group("reserve_by_stream_length");

    for history in [10usize, 100, 1_000] {
        let d = dispatcher();
        let product_id = create_product(&d, u64::MAX / 2);
        for _ in 0..history {
            reserve(&d, product_id, AggregateId::new());
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(history), &history, |b, _| {
            b.iter(|| reserve(&d, black_box(product_id), AggregateId::new()));
        });
    }

    group.finish();
}

/// Reserve then release the same order: the compensation path of placement.
fn bench_reserve_release_cycle(c: &mut Criterion) {
    let d = dispatcher();
    let product_id = create_product(&d, 1_000);

    c.bench_function("reserve_release_cycle", |b| {
        b.iter(|| {
            let order_id = AggregateId::new();
            reserve(&d, product_id, order_id);
            let release = ProductCommand::ReleaseStock(ReleaseStock {
                product_id,
                order_id,
                quantity: 1,
                occurred_at: Utc::now(),
            });
            d.dispatch_with_retry(product_id.0, streams::PRODUCT, 8, &release, |id| {
                Product::empty(ProductId::new(id))
            })
            .expect("release");
        });
    });
}

criterion_group!(benches, bench_reserve_by_stream_length, bench_reserve_release_cycle);
criterion_main!(benches);
