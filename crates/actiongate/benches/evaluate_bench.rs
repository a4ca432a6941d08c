//! Performance benchmarks for access decisions.
//!
//! These measure the hot paths a request handler hits on every call:
//! pattern expansion, boolean decisions and read-filter derivation.
//!
//! Run with: `cargo bench -p actiongate`

use std::sync::Arc;

use actiongate::policy::pattern::ActionName;
use actiongate::policy::{
    AccessRequest, EvaluatorConfig, PolicyDocument, PolicyEvaluator, PolicyStore, Session,
    to_policy_entries,
};
use criterion::{Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;

/// Build a realistic policy set: a few role entries plus per-team noise.
fn create_benchmark_evaluator(noise: usize) -> PolicyEvaluator {
    let mut documents: Vec<PolicyDocument> = serde_json::from_value(json!([
        {"key": "admins", "session": {"user.role.name": "admin"},
         "actions": {"*": true, "*.*": true, "*.*.*": true}},
        {"key": "editors", "session": {"user.role.name": "editor"},
         "actions": {
            "posts.*": true,
            "posts.delete": false,
            "posts.find": {"objects": [
                {"status": "published"},
                {"author.id": "$session.user.id"}
            ]}
         }},
        {"key": "everyone", "session": {},
         "actions": {"posts.find": {"objects": [{"status": "published"}]},
                     "health": true}}
    ]))
    .unwrap();

    for i in 0..noise {
        documents.push(
            serde_json::from_value(json!({
                "key": format!("team-{i}"),
                "session": {"user.team": format!("team-{i}")},
                "actions": {
                    (format!("team{i}.*")): true,
                    "*.archive": false
                }
            }))
            .unwrap(),
        );
    }

    let entries = to_policy_entries(&documents).unwrap();
    PolicyEvaluator::new(
        Arc::new(PolicyStore::with_entries(entries)),
        EvaluatorConfig::default(),
    )
}

fn editor_session() -> Session {
    Session::new(json!({
        "user": {
            "id": "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "team": "team-3",
            "role": {"name": "editor"}
        }
    }))
}

/// Benchmark: Wildcard candidate expansion.
fn bench_pattern_expansion(c: &mut Criterion) {
    c.bench_function("pattern_expansion_2_segments", |b| {
        b.iter(|| {
            let action = ActionName::parse(black_box("posts.find")).unwrap();
            black_box(action.candidates().count())
        });
    });

    c.bench_function("pattern_expansion_4_segments", |b| {
        b.iter(|| {
            let action = ActionName::parse(black_box("org.team.posts.find")).unwrap();
            black_box(action.candidates().count())
        });
    });
}

/// Benchmark: Boolean decision without an object.
///
/// This is the hot path for most route guards.
fn bench_is_allowed(c: &mut Criterion) {
    let evaluator = create_benchmark_evaluator(50);
    let session = editor_session();

    c.bench_function("is_allowed_granted", |b| {
        b.iter(|| black_box(evaluator.is_allowed(&AccessRequest::new("posts.update", &session))));
    });

    c.bench_function("is_allowed_denied", |b| {
        b.iter(|| black_box(evaluator.is_allowed(&AccessRequest::new("users.delete", &session))));
    });
}

/// Benchmark: Decision against a concrete object.
fn bench_is_allowed_with_object(c: &mut Criterion) {
    let evaluator = create_benchmark_evaluator(50);
    let session = editor_session();
    let object = json!({"status": "published", "author": {"id": "someone"}});

    c.bench_function("is_allowed_with_object", |b| {
        b.iter(|| {
            black_box(
                evaluator.is_allowed(&AccessRequest::new("posts.find", &session).with_object(&object)),
            )
        });
    });
}

/// Benchmark: Read-filter derivation with session substitution.
fn bench_filter_expression(c: &mut Criterion) {
    let evaluator = create_benchmark_evaluator(50);
    let session = editor_session();

    c.bench_function("build_filter_expression", |b| {
        b.iter(|| black_box(evaluator.build_filter_expression("posts.find", &session)));
    });
}

/// Benchmark: Scaling with the number of entries.
///
/// Evaluation scans every session-matching entry, so the session match
/// dominates on large policy sets.
fn bench_policy_set_size(c: &mut Criterion) {
    let session = editor_session();
    let mut group = c.benchmark_group("policy_set_size");

    for size in [10, 100, 1000] {
        let evaluator = create_benchmark_evaluator(size);
        group.bench_function(format!("is_allowed_{size}"), |b| {
            b.iter(|| black_box(evaluator.is_allowed(&AccessRequest::new("posts.update", &session))));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pattern_expansion,
    bench_is_allowed,
    bench_is_allowed_with_object,
    bench_filter_expression,
    bench_policy_set_size,
);
criterion_main!(benches);
