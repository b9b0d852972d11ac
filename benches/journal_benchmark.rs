use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio_util::sync::CancellationToken;
use trade_ledger::config::LedgerConfig;
use trade_ledger::connectors::MockVenue;
use trade_ledger::core::{Order, Position};
use trade_ledger::journal::{kinds, EventLog};
use trade_ledger::monitoring::score_health;
use trade_ledger::oms::ExecutionLedger;
use trade_ledger::types::{Price, Size};

fn sample_position(i: usize) -> Position {
    let order = Order::buy(
        format!("SYM{}USDT", i),
        Size::new(dec!(0.5)),
        Price::new(dec!(100) + Decimal::from(i)),
    );
    Position::from_fill(&order)
}

fn bench_append(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let log = rt.block_on(EventLog::create(dir.path())).unwrap();
    let position = sample_position(1);

    let mut group = c.benchmark_group("journal_append");
    group.sample_size(20);
    group.bench_function("position_opened", |b| {
        b.iter(|| {
            let entry = rt
                .block_on(log.append(kinds::POSITION_OPENED, black_box(&position)))
                .unwrap();
            black_box(entry)
        })
    });
    group.finish();
}

fn bench_replay(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("journal_replay");
    group.sample_size(20);

    for entries in [100usize, 1000] {
        let dir = tempfile::tempdir().unwrap();
        let log = rt.block_on(EventLog::create(dir.path())).unwrap();
        rt.block_on(async {
            for i in 0..entries {
                log.append(kinds::POSITION_OPENED, &sample_position(i))
                    .await
                    .unwrap();
            }
        });

        group.bench_with_input(BenchmarkId::new("entries", entries), &entries, |b, _| {
            b.iter(|| {
                let mut decoded = 0usize;
                rt.block_on(log.replay_all(&CancellationToken::new(), |entry| {
                    let position: Position = entry.decode()?;
                    black_box(position);
                    decoded += 1;
                    Ok(())
                }))
                .unwrap();
                black_box(decoded)
            })
        });
    }
    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let journal = Arc::new(rt.block_on(EventLog::create(dir.path())).unwrap());
    let venue = Arc::new(MockVenue::new(dec!(1000000000)));
    let ledger = ExecutionLedger::new(LedgerConfig { max_positions: 1 }, venue, journal);

    let mut group = c.benchmark_group("ledger_execute");
    group.sample_size(20);
    // sells never open a position, so the cap is never hit
    group.bench_function("filled_sell", |b| {
        b.iter(|| {
            let order = Order::sell("BTCUSDT", Size::new(dec!(0.01)), Price::new(dec!(50000)));
            black_box(rt.block_on(ledger.execute(order)).unwrap())
        })
    });
    group.finish();
}

fn bench_score_health(c: &mut Criterion) {
    let samples: Vec<Decimal> = (-120..120).map(|i| Decimal::new(i, 1)).collect();
    c.bench_function("score_health", |b| {
        b.iter(|| {
            for pnl in &samples {
                black_box(score_health(black_box(*pnl)));
            }
        })
    });
}

criterion_group!(
    benches,
    bench_append,
    bench_replay,
    bench_execute,
    bench_score_health
);
criterion_main!(benches);
