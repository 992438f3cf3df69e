//! Benchmarks for order book operations

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rust_decimal::Decimal;

use bookfeed::orderbook::{compute_metrics, L3Event, OrderBook, Side, SnapshotLevel};

fn open(id: String, side: Side, price: Decimal, size: Decimal) -> L3Event {
    L3Event::Open {
        id,
        side,
        price,
        size,
    }
}

fn seed_book(levels: usize, orders_per_level: usize) -> OrderBook {
    let book = OrderBook::new("BTC-USD");
    for i in 0..levels {
        for j in 0..orders_per_level {
            book.apply_l3(open(
                format!("b-{i}-{j}"),
                Side::Buy,
                Decimal::from(50_000 - i as i64),
                Decimal::new(15, 1),
            ));
            book.apply_l3(open(
                format!("a-{i}-{j}"),
                Side::Sell,
                Decimal::from(50_001 + i as i64),
                Decimal::new(15, 1),
            ));
        }
    }
    book
}

fn snapshot_levels(count: usize, base: i64, ascending: bool) -> Vec<SnapshotLevel> {
    (0..count as i64)
        .map(|i| SnapshotLevel {
            price: Decimal::from(if ascending { base + i } else { base - i }),
            size: Decimal::new(15, 1),
            order_id: None,
        })
        .collect()
}

fn benchmark_add_orders(c: &mut Criterion) {
    c.bench_function("add_1000_orders", |b| {
        b.iter(|| black_box(seed_book(100, 5)))
    });
}

fn benchmark_apply_snapshot(c: &mut Criterion) {
    let book = OrderBook::new("BTC-USD");
    let bids = snapshot_levels(100, 50_000, false);
    let asks = snapshot_levels(100, 50_001, true);

    c.bench_function("apply_snapshot_100_levels", |b| {
        b.iter(|| book.apply_snapshot(black_box(&bids), black_box(&asks)))
    });
}

fn benchmark_l2_replace(c: &mut Criterion) {
    let book = seed_book(100, 1);

    c.bench_function("l2_replace_level", |b| {
        b.iter(|| {
            book.apply_l2(
                black_box(Side::Buy),
                black_box(Decimal::from(49_950)),
                black_box(Decimal::new(25, 1)),
            )
        })
    });
}

fn benchmark_modify_order(c: &mut Criterion) {
    let book = seed_book(100, 5);
    let mut size = 1i64;

    c.bench_function("modify_order", |b| {
        b.iter(|| {
            size = if size == 1 { 2 } else { 1 };
            book.modify_order(black_box("b-50-2"), Decimal::new(size, 1))
        })
    });
}

fn benchmark_snapshot_view(c: &mut Criterion) {
    let book = seed_book(100, 5);

    c.bench_function("snapshot_top_20_with_metrics", |b| {
        b.iter(|| black_box(book.snapshot(20)))
    });
}

fn benchmark_metrics(c: &mut Criterion) {
    let book = seed_book(100, 5);
    let bids = book.bid_levels(50);
    let asks = book.ask_levels(50);

    c.bench_function("compute_metrics_50_levels", |b| {
        b.iter(|| black_box(compute_metrics(black_box(&bids), black_box(&asks))))
    });
}

criterion_group!(
    benches,
    benchmark_add_orders,
    benchmark_apply_snapshot,
    benchmark_l2_replace,
    benchmark_modify_order,
    benchmark_snapshot_view,
    benchmark_metrics
);
criterion_main!(benches);
