use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::base::Ads;
use crate::value::{FuncRef, Value};

thread_local! {
    static USES: Cell<u64> = Cell::new(0);
    static CALLS: Cell<u64> = Cell::new(0);
}

pub fn uses() -> u64 {
    USES.with(|c| c.get())
}

pub fn calls() -> u64 {
    CALLS.with(|c| c.get())
}

/// The body of a tracked call: given the (possibly wrapped) context and
/// the call's arguments, produces the call's results. Implementations of
/// [`C::call`] invoke this once, instrumenting around it as their variant
/// requires.
pub type CallBody<'a> = dyn Fn(&dyn C, &[Value]) -> Vec<Value> + 'a;

/// A computation context. Application code threads a `&dyn C` through
/// every call; before reading any field of an ADS it calls `use_nodes`,
/// and every sub-computation goes through `call` rather than being
/// invoked directly, so the context can decide what (if anything) to
/// record or verify.
pub trait C {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]);
    fn call(&self, func: FuncRef, args: &[Value], body: &CallBody<'_>) -> Vec<Value>;
}

/// The context used outside of any proof machinery: asserts nodes are
/// transparent and otherwise gets out of the way.
#[derive(Default)]
pub struct NilC;

impl NilC {
    pub fn new() -> NilC {
        NilC
    }
}

impl C for NilC {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]) {
        for v in vals {
            v.assert_transparent();
        }
        USES.with(|c| c.set(c.get() + vals.len() as u64));
    }

    fn call(&self, _func: FuncRef, args: &[Value], body: &CallBody<'_>) -> Vec<Value> {
        CALLS.with(|c| c.set(c.get() + 1));
        body(self, args)
    }
}

/// Wraps an outer context and records every node passed to `use_nodes`,
/// without altering call semantics. Useful for auditing which nodes a
/// function actually touches.
pub struct TrackC<'a> {
    outer: &'a dyn C,
    used: RefCell<Vec<Rc<dyn Ads>>>,
}

impl<'a> TrackC<'a> {
    pub fn new(outer: &'a dyn C) -> TrackC<'a> {
        TrackC {
            outer,
            used: RefCell::new(Vec::new()),
        }
    }

    pub fn used_nodes(&self) -> Vec<Rc<dyn Ads>> {
        self.used.borrow().clone()
    }
}

impl<'a> C for TrackC<'a> {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]) {
        self.outer.use_nodes(vals);
        self.used.borrow_mut().extend(vals.iter().cloned());
    }

    fn call(&self, _func: FuncRef, args: &[Value], body: &CallBody<'_>) -> Vec<Value> {
        CALLS.with(|c| c.set(c.get() + 1));
        body(self, args)
    }
}
