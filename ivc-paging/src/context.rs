//! The disk-backed computation context: wraps an outer [`C`] and routes
//! every `use_nodes` call through the [`PagingStore`], loading opaque
//! nodes back into memory on demand and pinning whatever is touched
//! against eviction. Mirrors the wrapping shape of `ivc_ads::comp::TrackC`.

use std::rc::Rc;

use ivc_ads::comp::{CallBody, C};
use ivc_ads::{Ads, FuncRef, Value};

use crate::store::PagingStore;
use crate::token::Token;

/// A computation context backed by a [`PagingStore`]. Paging I/O failures
/// are fatal per this framework's error taxonomy (unlike a `Resolve`
/// mismatch, there is no recoverable path for a corrupt or missing
/// segment), so `use_nodes` panics rather than threading a `Result`
/// through the `C` trait.
pub struct PagingC<'a> {
    outer: &'a dyn C,
    store: &'a PagingStore,
}

impl<'a> PagingC<'a> {
    pub fn new(outer: &'a dyn C, store: &'a PagingStore) -> PagingC<'a> {
        PagingC { outer, store }
    }

    /// Recursively pins a freshly constructed subtree against eviction.
    /// Call this once after building new nodes, before they might be
    /// swept out by an `unload` triggered on some unrelated part of the
    /// tree.
    pub fn pin_new(&self, node: &Rc<dyn Ads>) {
        self.store.pin_new(node);
    }

    /// Persists `node` (and any not-yet-stored transparent descendants)
    /// durably, returning the token that locates it.
    pub fn store_root(&self, node: &Rc<dyn Ads>) -> Result<Token, ivc_types::PagingError> {
        self.store.store(node)
    }

    /// Evicts least-recently-used nodes until the working set bound is
    /// met. The host calls this explicitly between units of work; nothing
    /// here does it automatically.
    pub fn unload(&self) -> Result<usize, ivc_types::PagingError> {
        self.store.unload()
    }
}

impl<'a> C for PagingC<'a> {
    fn use_nodes(&self, vals: &[Rc<dyn Ads>]) {
        self.outer.use_nodes(vals);
        for v in vals {
            self.store
                .load(v)
                .expect("paging store load failed (fatal: disk I/O or a corrupt segment)");
        }
    }

    fn call(&self, _func: FuncRef, args: &[Value], body: &CallBody<'_>) -> Vec<Value> {
        body(self, args)
    }
}
