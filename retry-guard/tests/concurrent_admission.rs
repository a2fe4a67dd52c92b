//! Concurrent admission of identical calls from multiple dispatch threads.

use std::sync::Barrier;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

use retry_guard::guard::Admission;
use retry_guard::test_support::{manual_guard, not_found};
use serde_json::json;

#[test]
fn only_one_identical_call_is_admitted_at_a_time() {
    let (guard, _) = manual_guard();
    let params = json!({"file": "x", "old": "a", "new": "b"});
    let threads = 8;
    let barrier = Barrier::new(threads);
    let admitted = AtomicUsize::new(0);
    let done = Barrier::new(threads);

    thread::scope(|scope| {
        for _ in 0..threads {
            scope.spawn(|| {
                barrier.wait();
                let admission = guard.admit("replace", &params);
                if admission.is_admitted() {
                    admitted.fetch_add(1, Ordering::SeqCst);
                }
                // Hold any permit until every thread has tried.
                done.wait();
                if let Admission::Admitted(permit) = admission {
                    permit.failed(not_found("x", "read file first"));
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), 1);
    assert!(!guard.validate_before_execution("replace", &params).allowed);
}

#[test]
fn distinct_calls_are_admitted_concurrently() {
    let (guard, _) = manual_guard();
    let threads = 6;
    let barrier = Barrier::new(threads);
    let admitted = AtomicUsize::new(0);

    thread::scope(|scope| {
        for i in 0..threads {
            let guard = &guard;
            let barrier = &barrier;
            let admitted = &admitted;
            scope.spawn(move || {
                let params = json!({"file": format!("f{i}")});
                barrier.wait();
                if let Admission::Admitted(permit) = guard.admit("replace", &params) {
                    admitted.fetch_add(1, Ordering::SeqCst);
                    barrier.wait();
                    permit.succeeded();
                } else {
                    barrier.wait();
                }
            });
        }
    });

    assert_eq!(admitted.load(Ordering::SeqCst), threads);
    assert_eq!(guard.failure_stats().total_failures, 0);
}
