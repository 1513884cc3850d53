//! Benchmarks for change suppression and cleanup.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use serde_json::{json, Value};

use routesig_core::{is_equal, SignalOptions, SignalStore};

fn payload(rows: usize) -> Value {
    let rows: Vec<Value> = (0..rows)
        .map(|i| json!({ "id": i, "name": format!("row-{i}"), "tags": ["a", "b"], "meta": { "active": i % 2 == 0 } }))
        .collect();
    json!({ "rows": rows, "total": rows.len() })
}

fn bench_is_equal(c: &mut Criterion) {
    let a = payload(1_000);
    let b = payload(1_000);
    c.bench_function("is_equal_1000_rows", |bench| {
        bench.iter(|| is_equal(black_box(&a), black_box(&b)))
    });
}

fn bench_cleanup_pass(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    c.bench_function("cleanup_500_cells", |bench| {
        bench.iter(|| {
            runtime.block_on(async {
                let store = SignalStore::new().unwrap();
                for i in 0..500 {
                    store
                        .signal(&format!("cell-{i}"), SignalOptions::new().scope("old"))
                        .unwrap();
                }
                store.wait_for_cleanup().await;
                store.cleanup_old_scopes("new");
                store.wait_for_cleanup().await;
                assert!(store.is_empty());
            })
        })
    });
}

criterion_group!(benches, bench_is_equal, bench_cleanup_pass);
criterion_main!(benches);
