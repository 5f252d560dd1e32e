//! Mirrors the original Fibonacci walkthrough: record `fib(5)` under a
//! `ProofC`, print the commitment of every prefix of the flattened call
//! log, and confirm `resolve` accounts for each one — `Ok(None)` on the
//! full log, `Ok(Some(next_entry))` on every strict prefix.

use ivc::prelude::*;

const FIB_FUNC_ID: i8 = 0;

fn as_i64(v: &Value) -> i64 {
    match v {
        Value::I64(n) => *n,
        other => panic!("expected Value::I64, got {other:?}"),
    }
}

fn fib_body(args: &[Value], c: &dyn C, func: FuncRef) -> Vec<Value> {
    let i = as_i64(&args[0]);
    let result = if i <= 1 { 1 } else { fib(i - 2, func, c) + fib(i - 1, func, c) };
    vec![Value::I64(result)]
}

fn fib(i: i64, func: FuncRef, c: &dyn C) -> i64 {
    let results = c.call(func, &[Value::I64(i)], &|c, args| fib_body(args, c, func));
    as_i64(&results[0])
}

fn main() {
    tracing_subscriber::fmt::init();
    ivc::register_core();
    FuncRef::register(FIB_FUNC_ID, "fib");
    let fib_func = FuncRef::resolve(FIB_FUNC_ID).unwrap();

    let nil = NilC::new();
    let proof = ProofC::new(&nil);
    let result = fib(5, fib_func, &proof);
    println!("fib(5) = {result}");

    let log = proof.log();
    let total = log.count();

    for i in 1..=total {
        let prefix = log.slice(0, i);
        println!("commitment {}", prefix.commitment());
        println!("printing prefix of length {i}");

        for (j, entry) in prefix.flatten().iter().enumerate() {
            match entry.as_ref() {
                LogEntry::Entry { args, .. } => {
                    println!("{j}: enter fib({})", as_i64(&args[0]));
                }
                LogEntry::Exit { results, length } => {
                    let entry_idx = j as i64 - length - 1;
                    let entry_entry = prefix.index(entry_idx as usize);
                    if let LogEntry::Entry { args, .. } = entry_entry.as_ref() {
                        println!(
                            "{j}: exit fib({})@{} -> {}",
                            as_i64(&args[0]),
                            entry_idx,
                            as_i64(&results[0])
                        );
                    }
                }
            }
        }

        let outcome = resolve(&prefix, |args, c| fib_body(args, c, fib_func));

        match outcome {
            Ok(None) => println!("log fully accounts for fib(5)"),
            Ok(Some(next)) => {
                let expected = LogTreap::merge(&prefix, &LogTreap::new(next));
                println!("predicted  {}", expected.commitment());
            }
            Err(e) => panic!("resolve mismatch on a recorded proof: {e}"),
        }
    }
}
