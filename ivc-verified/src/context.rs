use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ivc_ads::comp::{CallBody, C};
use ivc_ads::{Ads, FuncRef, Value};
use ivc_types::ResolveError;

use crate::log_entry::{values_eq, LogEntry, LogTree, LogTreap};

/// A context that asserts transparency on every `use_nodes` call and
/// otherwise invokes calls directly, like `NilC`, but named separately so
/// call sites can document that they're running in "just verify the
/// reads, don't record anything" mode.
#[derive(Default)]
pub struct VerifyC;

impl VerifyC {
    pub fn new() -> VerifyC {
        VerifyC
    }
}

impl C for VerifyC {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]) {
        for v in vals {
            v.assert_transparent();
        }
    }

    fn call(&self, _func: FuncRef, args: &[Value], body: &CallBody<'_>) -> Vec<Value> {
        body(self, args)
    }
}

/// Records a call log while the computation runs. Every `call` pushes a
/// fresh frame, lets the callee (and anything it itself calls through
/// `self`) accumulate nested entries into that frame, then wraps the
/// frame in its own `Entry`/`Exit` pair and merges it into the caller's
/// frame. `Stack[0]`, available via [`ProofC::log`] once the outermost
/// call returns, is the commitment a verifier checks proofs against.
///
/// `to_cache`, when set, names a function whose first call for a given
/// argument list is memoised: a later call with the same function and
/// (structurally) equal arguments replays the cached Entry/Exit subtree
/// instead of re-running the callee.
pub struct ProofC<'a> {
    outer: &'a dyn C,
    stack: RefCell<Vec<LogTreap>>,
    to_cache: Option<FuncRef>,
    cached: RefCell<Option<(FuncRef, Vec<Value>, Vec<Value>, LogTreap)>>,
}

impl<'a> ProofC<'a> {
    pub fn new(outer: &'a dyn C) -> ProofC<'a> {
        ProofC {
            outer,
            stack: RefCell::new(vec![LogTreap::empty()]),
            to_cache: None,
            cached: RefCell::new(None),
        }
    }

    pub fn with_cached_func(outer: &'a dyn C, to_cache: FuncRef) -> ProofC<'a> {
        ProofC {
            outer,
            stack: RefCell::new(vec![LogTreap::empty()]),
            to_cache: Some(to_cache),
            cached: RefCell::new(None),
        }
    }

    /// The full call log recorded so far. Valid to call once the
    /// outermost `call` has returned (the stack has settled back to its
    /// single root frame).
    pub fn log(&self) -> LogTreap {
        self.stack.borrow()[0].clone()
    }

    fn push_into_top(&self, subtree: &LogTreap) {
        let mut stack = self.stack.borrow_mut();
        let top = stack.last_mut().expect("ProofC stack always has a root frame");
        *top = LogTreap::merge(top, subtree);
    }
}

impl<'a> C for ProofC<'a> {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]) {
        self.outer.use_nodes(vals);
    }

    fn call(&self, func: FuncRef, args: &[Value], body: &CallBody<'_>) -> Vec<Value> {
        if self.to_cache == Some(func) {
            if let Some((cf, cargs, cresults, csubtree)) = self.cached.borrow().clone() {
                if cf.id == func.id && values_eq(&cargs, args) {
                    self.push_into_top(&csubtree);
                    return cresults;
                }
            }
        }

        self.stack.borrow_mut().push(LogTreap::empty());
        let results = body(self, args);
        let frame = self.stack.borrow_mut().pop().expect("frame pushed at call entry");

        let entry = LogEntry::Entry {
            func,
            args: args.to_vec(),
        };
        let exit = LogEntry::Exit {
            results: results.clone(),
            length: frame.count() as i64,
        };
        let subtree = LogTreap::merge(
            &LogTreap::new(entry),
            &LogTreap::merge(&frame, &LogTreap::new(exit)),
        );

        if self.to_cache == Some(func) {
            *self.cached.borrow_mut() = Some((func, args.to_vec(), results.clone(), subtree.clone()));
        }

        self.push_into_top(&subtree);
        results
    }
}

/// The signal a [`ResolveC`] raises to unwind out of the call it couldn't
/// satisfy from the recorded log. Only [`resolve`] catches this; any
/// other panic during replay is a genuine bug and is left to propagate.
#[derive(Debug, Clone)]
enum ResolveSignal {
    NextEntry(LogEntry),
    Mismatch(String),
}

/// Walks `log` backward from its last entry to find the entries a
/// replay still needs in order to pick up where the log leaves off:
/// the currently-open call's `Entry` (always `expected[0]`), followed
/// by the `Entry`/`Exit` pair of every sibling call already closed
/// after it.
///
/// Reaching position `-1` while scanning means whatever pair was just
/// found sits at position `0` — the very start of the log — so there
/// is no open ancestor above it, and the log is fully closed at the
/// top: `expected` is discarded and this returns empty, regardless of
/// how many closed sibling pairs were walked past to get there.
fn expected_entries(log: &LogTree) -> Vec<Rc<LogEntry>> {
    let mut expected = Vec::new();
    let mut pos: i64 = log.count() as i64 - 1;
    loop {
        if pos == -1 {
            return Vec::new();
        }
        let entry = log.index(pos as usize);
        let is_entry = entry.is_entry();
        expected.push(entry.clone());
        if is_entry {
            break;
        }
        let length = match entry.as_ref() {
            LogEntry::Exit { length, .. } => *length,
            LogEntry::Entry { .. } => unreachable!("already matched on is_entry"),
        };
        pos -= length + 1;
        let entry_entry = log.index(pos as usize);
        expected.push(entry_entry);
        pos -= 1;
    }
    expected.reverse();
    expected
}

/// Replays the currently-open call's real body, trusting every already
/// closed sibling call ([`expected_entries`]'s pairs) without
/// re-running it: each nested `call` during the replay consumes the
/// next recorded `Entry`/`Exit` pair directly and returns its results.
/// If the replay makes a call the log doesn't account for,
/// [`ResolveC`] aborts via `panic_any` carrying a [`ResolveSignal`];
/// only [`resolve`], at the top of the replay, catches it.
struct ResolveC {
    expected: Vec<Rc<LogEntry>>,
    idx: Cell<usize>,
    length: Cell<i64>,
}

impl C for ResolveC {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]) {
        for v in vals {
            v.assert_transparent();
        }
    }

    fn call(&self, func: FuncRef, args: &[Value], _body: &CallBody<'_>) -> Vec<Value> {
        let idx = self.idx.get();
        if idx == self.expected.len() {
            std::panic::panic_any(ResolveSignal::NextEntry(LogEntry::Entry {
                func,
                args: args.to_vec(),
            }));
        }

        match self.expected[idx].as_ref() {
            LogEntry::Entry {
                func: recorded_func,
                args: recorded_args,
            } => {
                if recorded_func.id != func.id || !values_eq(recorded_args, args) {
                    std::panic::panic_any(ResolveSignal::Mismatch(format!(
                        "expected call to {} with matching args, got call to {}",
                        recorded_func.name, func.name
                    )));
                }
            }
            LogEntry::Exit { .. } => {
                std::panic::panic_any(ResolveSignal::Mismatch(
                    "expected an Entry, found an Exit".to_string(),
                ));
            }
        }

        let exit_idx = idx + 1;
        let (results, length) = match self.expected[exit_idx].as_ref() {
            LogEntry::Exit { results, length } => (results.clone(), *length),
            LogEntry::Entry { .. } => {
                std::panic::panic_any(ResolveSignal::Mismatch(
                    "expected an Exit, found an Entry".to_string(),
                ));
            }
        };

        self.idx.set(exit_idx + 1);
        self.length.set(self.length.get() + length + 2);
        results
    }
}

/// Replays the call whose log is `expected_log` by re-running its real
/// body `f`, trusting everything the log already accounts for.
///
/// Returns `Ok(None)` if `expected_log` is itself fully closed at the
/// top (a complete proof — nothing left to predict). Returns
/// `Ok(Some(entry))` if the replay either made a call the log ran out
/// before recording (`entry` is the `Entry` it attempted) or returned
/// normally because every nested call was already accounted for
/// (`entry` is the synthesised top-level `Exit`) — either way, `entry`
/// equals the next entry of the full log whenever `f` is deterministic.
/// Returns `Err` if a recorded entry contradicts the call being
/// replayed.
pub fn resolve<F>(expected_log: &LogTreap, f: F) -> Result<Option<LogEntry>, ResolveError>
where
    F: Fn(&[Value], &dyn C) -> Vec<Value>,
{
    let tree = match expected_log.finish() {
        Some(tree) => tree,
        None => return Ok(None),
    };
    let expected = expected_entries(&tree);
    if expected.is_empty() {
        return Ok(None);
    }
    let args = match expected[0].as_ref() {
        LogEntry::Entry { args, .. } => args.clone(),
        LogEntry::Exit { .. } => unreachable!("expected_entries always starts with an Entry"),
    };

    let ctx = ResolveC {
        expected,
        idx: Cell::new(1),
        length: Cell::new(0),
    };
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&args, &ctx)));
    match outcome {
        Ok(results) => Ok(Some(LogEntry::Exit {
            results,
            length: ctx.length.get(),
        })),
        Err(payload) => match payload.downcast::<ResolveSignal>() {
            Ok(signal) => match *signal {
                ResolveSignal::NextEntry(entry) => Ok(Some(entry)),
                ResolveSignal::Mismatch(msg) => Err(ResolveError::Mismatch(msg)),
            },
            Err(payload) => std::panic::resume_unwind(payload),
        },
    }
}
