//! Benchmarks for the tensor compiler.
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tensorforge::prelude::*;

fn tensor(name: &str, shape: &[usize]) -> TensorRef {
    Tensor::new(name, shape).unwrap().into_ref()
}

/// `Q[kp] <= Q[kp] + I[kl] * A[lq] * S[qp]`, a typical element-local update.
fn update_statement() -> Node {
    let q = tensor("Q", &[56, 9]);
    let i = tensor("I", &[56, 56]);
    let a = tensor("A", &[56, 9]);
    let s = tensor("S", &[9, 9]);
    let product = Node::indexed(&i, "kl")
        .unwrap()
        .times(Node::indexed(&a, "lq").unwrap())
        .unwrap()
        .times(Node::indexed(&s, "qp").unwrap())
        .unwrap();
    Node::indexed(&q, "kp")
        .unwrap()
        .assign(Node::indexed(&q, "kp").unwrap().plus(product).unwrap())
        .unwrap()
}

/// Benchmark index resolution alone.
fn bench_resolve(c: &mut Criterion) {
    let stmt = update_statement();
    c.bench_function("resolve_update", |b| {
        b.iter(|| tensorforge::ast::resolve(black_box(stmt.clone())).unwrap())
    });
}

/// Benchmark the full preparation pipeline.
fn bench_prepare(c: &mut Criterion) {
    let stmt = update_statement();
    let config = CompilerConfig::default();
    c.bench_function("prepare_update", |b| {
        b.iter(|| prepare(black_box(stmt.clone()), &config).unwrap())
    });
}

/// Benchmark lowering and copy elimination.
fn bench_lowering(c: &mut Criterion) {
    let kernel = Kernel::new("update", vec![update_statement()], CompilerConfig::default()).unwrap();
    c.bench_function("lower_update", |b| {
        b.iter(|| black_box(kernel.cfg().unwrap()).len())
    });
}

/// Benchmark sparsity propagation on a sparse operand.
fn bench_sparse_flops(c: &mut Criterion) {
    let entries: Vec<Vec<usize>> = (0..56).map(|k| vec![k, k]).collect();
    let spp = Pattern::from_entries(&[56, 56], &entries).unwrap();
    let i = Tensor::new("I", &[56, 56]).unwrap().with_pattern(spp).unwrap().into_ref();
    let a = tensor("A", &[56, 9]);
    let q = tensor("Q", &[56, 9]);
    let stmt = Node::indexed(&q, "kp")
        .unwrap()
        .assign(Node::indexed(&i, "kl").unwrap().times(Node::indexed(&a, "lp").unwrap()).unwrap())
        .unwrap();
    let kernel = Kernel::new("sparse", vec![stmt], CompilerConfig::default()).unwrap();
    c.bench_function("sparse_flops", |b| {
        b.iter(|| black_box(&kernel).non_zero_flops().unwrap())
    });
}

criterion_group!(
    benches,
    bench_resolve,
    bench_prepare,
    bench_lowering,
    bench_sparse_flops,
);

criterion_main!(benches);
