use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pydron_core::graph::{Endpoint, Graph};
use pydron_core::task::catalog::const_task::Const;
use pydron_core::task::catalog::ops::{BinOp, BinOpCode};
use pydron_core::tick::Tick;
use pydron_core::traverser::{CancellationHandle, Traverser};
use pydron_core::value::Value;

fn binary_op_graph() -> Graph {
    let mut g = Graph::new();
    let t1 = Tick::start().incremented(1);
    let t2 = Tick::start().incremented(2);
    let t3 = Tick::start().incremented(3);
    g.add_task(t1.clone(), Arc::new(Const::new(Value::Int(40)))).unwrap();
    g.add_task(t2.clone(), Arc::new(Const::new(Value::Int(2)))).unwrap();
    g.add_task(t3.clone(), Arc::new(BinOp::new(BinOpCode::Add))).unwrap();
    g.connect(Endpoint::new(t1, "value"), Endpoint::new(t3.clone(), "left")).unwrap();
    g.connect(Endpoint::new(t2, "value"), Endpoint::new(t3.clone(), "right")).unwrap();
    g.connect(Endpoint::new(t3, "value"), Endpoint::new(Tick::final_tick(), "retval")).unwrap();
    g
}

fn traversal_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("traverse binary op graph", |b| {
        b.to_async(&runtime).iter(|| async {
            let traverser = Traverser::new();
            let out = traverser
                .execute(black_box(binary_op_graph()), HashMap::new(), &CancellationHandle::new())
                .await
                .unwrap();
            black_box(out);
        });
    });
}

criterion_group!(benches, traversal_benchmark);
criterion_main!(benches);
