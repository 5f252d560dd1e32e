//! End-to-end coverage of the testable property "log reconstruction" and
//! the "Fibonacci-via-ProofC" scenario: record `fib(5)` under a `ProofC`,
//! then check every prefix of the flattened log resolves the way the
//! spec requires — the full log resolves with `Ok(None)`, every strict
//! prefix resolves with `Ok(Some(next_entry))` equal to the real next
//! entry of the full log.

use ivc::prelude::*;
use std::sync::Once;

const FIB_FUNC_ID: i8 = 5;

fn as_i64(v: &Value) -> i64 {
    match v {
        Value::I64(n) => *n,
        other => panic!("expected Value::I64, got {other:?}"),
    }
}

/// The body `fib`'s calls run under: the same closure is handed to
/// `ProofC` (via `c.call`) while recording and to `resolve` while
/// replaying, so both see exactly the same recursive structure.
fn fib_body(args: &[Value], c: &dyn C, func: FuncRef) -> Vec<Value> {
    let i = as_i64(&args[0]);
    let result = if i <= 1 { 1 } else { fib(i - 2, func, c) + fib(i - 1, func, c) };
    vec![Value::I64(result)]
}

fn fib(i: i64, func: FuncRef, c: &dyn C) -> i64 {
    let results = c.call(func, &[Value::I64(i)], &|c, args| fib_body(args, c, func));
    as_i64(&results[0])
}

fn registered_fib() -> FuncRef {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        FuncRef::register(FIB_FUNC_ID, "fib_e2e_test");
    });
    FuncRef::resolve(FIB_FUNC_ID).unwrap()
}

#[test]
fn fib_five_is_eight() {
    let func = registered_fib();
    let nil = NilC::new();
    let proof = ProofC::new(&nil);
    assert_eq!(fib(5, func, &proof), 8);
}

#[test]
fn every_log_prefix_resolves_as_the_spec_requires() {
    let func = registered_fib();
    let nil = NilC::new();
    let proof = ProofC::new(&nil);
    fib(5, func, &proof);

    let full_log = proof.log();
    let full_flat = full_log.flatten();
    let total = full_log.count();
    assert!(total > 0);

    for i in 1..=total {
        let prefix = full_log.slice(0, i);
        let outcome = resolve(&prefix, |args, c| fib_body(args, c, func)).expect("a recorded prefix must never mismatch");

        if i == total {
            assert!(outcome.is_none(), "the complete log must fully account for the call");
            continue;
        }

        let next = outcome.expect("a strict prefix must always predict a next entry");
        let expected_next = full_flat[i].as_ref().clone();
        match (next, expected_next) {
            (LogEntry::Entry { func: a, args: aa }, LogEntry::Entry { func: b, args: ba }) => {
                assert_eq!(a.id, b.id);
                assert!(values_eq(&aa, &ba));
            }
            (LogEntry::Exit { results: ar, length: al }, LogEntry::Exit { results: br, length: bl }) => {
                assert!(values_eq(&ar, &br));
                assert_eq!(al, bl);
            }
            other => panic!("resolve's predicted next entry didn't match the real one: {other:?}"),
        }
    }
}

#[test]
fn a_replay_that_diverges_from_the_recorded_log_is_caught_as_a_mismatch() {
    let func = registered_fib();
    let nil = NilC::new();
    let proof = ProofC::new(&nil);
    fib(5, func, &proof);
    let full_log = proof.log();
    let full_flat = full_log.flatten();

    // fib(5)'s body calls fib(3) before fib(4); full_flat[1] is fib(3)'s
    // recorded Entry. Tamper with its argument, then rebuild a log over
    // the tampered entries and resolve a prefix that includes this whole
    // closed pair as a "trust it" sibling. The real replay will call
    // fib(3) with the true argument, which no longer matches what's
    // recorded.
    let tampered: Vec<LogEntry> = full_flat
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            if i == 1 {
                LogEntry::Entry {
                    func,
                    args: vec![Value::I64(999)],
                }
            } else {
                entry.as_ref().clone()
            }
        })
        .collect();

    let mut log = LogTreap::empty();
    for entry in tampered {
        log = LogTreap::merge(&log, &LogTreap::new(entry));
    }
    let prefix = log.slice(0, full_flat.len() - 1);

    let outcome = resolve(&prefix, |args, c| fib_body(args, c, func));
    assert!(matches!(outcome, Err(_)));
}
