//! Benchmarks for fixpoint evaluation
//!
//! Transitive closure over chains and random graphs, naive against
//! semi-naive, plus query answering over an evaluated model.
//!
//! Run: cargo bench --bench evaluation

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use stratalog::{
    Atom, EvaluationMode, Head, KbConfig, KnowledgeBase, Literal, Program, Query, Rule, Term,
    Value,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn v(name: &str) -> Term {
    Term::var(name)
}

fn closure_program(edges: impl IntoIterator<Item = (i64, i64)>) -> Program {
    let mut program = Program::new()
        .rule(Rule::new(
            Head::atom("path", vec![v("X"), v("Y")]),
            vec![Literal::positive(Atom::new("edge", vec![v("X"), v("Y")]))],
        ))
        .rule(Rule::new(
            Head::atom("path", vec![v("X"), v("Z")]),
            vec![
                Literal::positive(Atom::new("path", vec![v("X"), v("Y")])),
                Literal::positive(Atom::new("edge", vec![v("Y"), v("Z")])),
            ],
        ));
    for (a, b) in edges {
        program = program.fact("edge", vec![Value::from(a), Value::from(b)]);
    }
    program
}

fn chain(len: i64) -> Program {
    closure_program((0..len).map(|i| (i, i + 1)))
}

/// Deterministic pseudo-random graph (LCG) with `nodes` nodes and `edges` edges
fn random_graph(nodes: i64, edges: usize) -> Program {
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 33) % nodes as u64) as i64
    };
    let pairs: Vec<(i64, i64)> = (0..edges).map(|_| (next(), next())).collect();
    closure_program(pairs)
}

fn evaluate(program: &Program, mode: EvaluationMode) -> usize {
    let mut kb = KnowledgeBase::new(program.clone(), KbConfig::default().evaluation(mode)).unwrap();
    kb.evaluate().unwrap().tuples_derived
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_chain_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("chain_closure");
    group.sample_size(10);

    for len in [50i64, 100, 200] {
        let program = chain(len);
        group.bench_with_input(BenchmarkId::new("naive", len), &program, |b, program| {
            b.iter(|| black_box(evaluate(program, EvaluationMode::Naive)));
        });
        group.bench_with_input(BenchmarkId::new("semi_naive", len), &program, |b, program| {
            b.iter(|| black_box(evaluate(program, EvaluationMode::SemiNaive)));
        });
    }

    group.finish();
}

fn bench_random_closure(c: &mut Criterion) {
    let mut group = c.benchmark_group("random_closure");
    group.sample_size(10);

    for (nodes, edges) in [(100i64, 150usize), (200, 300)] {
        let program = random_graph(nodes, edges);
        let id = format!("{}n_{}e", nodes, edges);
        group.bench_with_input(BenchmarkId::new("naive", &id), &program, |b, program| {
            b.iter(|| black_box(evaluate(program, EvaluationMode::Naive)));
        });
        group.bench_with_input(BenchmarkId::new("semi_naive", &id), &program, |b, program| {
            b.iter(|| black_box(evaluate(program, EvaluationMode::SemiNaive)));
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let query = Query::new(vec![Literal::positive(Atom::new(
        "path",
        vec![Term::constant(0i64), v("Y")],
    ))]);

    c.bench_function("query_evaluated_model", |b| {
        b.iter_batched(
            || {
                let mut kb = KnowledgeBase::new(chain(100), KbConfig::default()).unwrap();
                kb.evaluate().unwrap();
                kb
            },
            |mut kb| black_box(kb.execute(&query).unwrap().len()),
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_chain_closure, bench_random_closure, bench_query);
criterion_main!(benches);
