//! Readers evaluating while the policy set is mutated.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use actiongate::policy::{
    AccessRequest, ActionSpec, EvaluatorConfig, PolicyEvaluator, PolicyKey, PolicyStore, Session,
    SessionCondition,
};
use indexmap::IndexMap;
use serde_json::json;

#[test]
fn readers_never_observe_partial_mutations() {
    let store = Arc::new(PolicyStore::new());
    let evaluator = Arc::new(PolicyEvaluator::new(store.clone(), EvaluatorConfig::default()));

    // The "stable" entry always grants reports.read; mutations never touch it.
    evaluator.upsert_policy(
        "stable",
        SessionCondition::any(),
        IndexMap::from([("reports.read".to_string(), ActionSpec::Allow)]),
    );

    let stop = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let evaluator = evaluator.clone();
            let stop = stop.clone();
            thread::spawn(move || {
                let session = Session::anonymous();
                let mut checks = 0u64;
                while !stop.load(Ordering::Relaxed) {
                    assert!(evaluator.is_allowed(&AccessRequest::new("reports.read", &session)));

                    let snapshot = evaluator.store().snapshot();
                    let keys: Vec<&str> = snapshot.entries().iter().map(|e| e.key.as_str()).collect();
                    assert_eq!(keys.first(), Some(&"stable"));
                    checks += 1;
                }
                checks
            })
        })
        .collect();

    for i in 0..500 {
        let key = format!("churn-{}", i % 7);
        evaluator.upsert_policy(
            key.as_str(),
            SessionCondition::any(),
            IndexMap::from([("reports.read".to_string(), ActionSpec::Deny)]),
        );
        if i % 3 == 0 {
            evaluator.remove_policy(&PolicyKey::from(key.as_str()));
        }
    }

    stop.store(true, Ordering::Relaxed);
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(store.len() <= 8);
    assert!(store.version() > 500);
}

#[test]
fn snapshot_version_is_monotonic_under_concurrent_writers() {
    let store = Arc::new(PolicyStore::new());

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let store = store.clone();
            thread::spawn(move || {
                for i in 0..100 {
                    store.upsert(actiongate::PolicyEntry::new(
                        format!("{w}-{i}"),
                        SessionCondition::any(),
                        IndexMap::new(),
                    ));
                }
            })
        })
        .collect();

    let mut last = 0;
    while writers.iter().any(|w| !w.is_finished()) {
        let version = store.version();
        assert!(version >= last);
        last = version;
    }
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(store.len(), 400);
    assert_eq!(store.version(), 400);
    assert_eq!(store.stats().entry_count, 400);
}

#[test]
fn filter_derivation_is_consistent_with_decisions_under_churn() {
    let evaluator = Arc::new(PolicyEvaluator::new(
        Arc::new(PolicyStore::new()),
        EvaluatorConfig::default(),
    ));
    let admin = Session::new(json!({"user": {"role": {"name": "admin"}}}));

    evaluator.upsert_policy(
        "admins",
        SessionCondition::from_pairs([("user.role.name", json!("admin"))]),
        IndexMap::from([("*.*".to_string(), ActionSpec::Allow)]),
    );

    let writer = {
        let evaluator = evaluator.clone();
        thread::spawn(move || {
            for i in 0..200 {
                evaluator.upsert_policy(
                    format!("noise-{i}"),
                    SessionCondition::from_pairs([("user.id", json!(i))]),
                    IndexMap::from([("*.*".to_string(), ActionSpec::Deny)]),
                );
            }
        })
    };

    for _ in 0..200 {
        assert!(evaluator.is_allowed(&AccessRequest::new("docs.read", &admin)));
        assert!(evaluator.build_filter_expression("docs.read", &admin).is_unrestricted());
    }
    writer.join().unwrap();
}
