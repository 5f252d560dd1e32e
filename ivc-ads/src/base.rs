use std::cell::{Cell, RefCell};
use std::rc::Rc;

use ivc_types::Hash;

use crate::codec::Encoder;

/// Per-node pager bookkeeping: the doubly-linked eviction list threaded
/// directly through live nodes, and the on-disk token once the node has
/// been persisted at least once.
///
/// `prev`/`next` are `Rc` handles into the eviction list maintained by the
/// paging store (ivc-paging); a node with `token == 0` has never been
/// written to disk.
#[derive(Default)]
pub struct Info {
    pub prev: RefCell<Option<Rc<dyn Ads>>>,
    pub next: RefCell<Option<Rc<dyn Ads>>>,
    pub token: Cell<u64>,
}

/// Embedded in every concrete ADS node. Carries the memoised hash, the
/// opaque/transparent flag, and the pager `Info`.
///
/// All fields use interior mutability (`Cell`/`RefCell`) rather than
/// requiring `&mut self` on the node: the framework is single-threaded
/// (see the concurrency model), so there is no need for `Arc`/`RwLock`
/// here, only `Rc`/`Cell`.
#[derive(Default)]
pub struct Base {
    cached_hash: Cell<Option<Hash>>,
    opaque: Cell<bool>,
    pub info: Info,
}

impl Base {
    pub fn new() -> Base {
        Base::default()
    }

    /// Builds a `Base` already marked opaque with a fixed hash. Concrete
    /// types use this from their registered "empty opaque placeholder"
    /// constructor (see `registry::OpaqueFn`) and from the pager's
    /// `make_opaque` path.
    pub fn opaque_with_hash(h: Hash) -> Base {
        let base = Base::default();
        base.opaque.set(true);
        base.cached_hash.set(Some(h));
        base
    }

    /// Forgets a memoised hash. Used only when a placeholder was built with
    /// a hash that isn't actually known yet (the pager reopening a root
    /// from a bare token), so the next real computation isn't shadowed by
    /// a stale cached value.
    pub fn clear_cached_hash(&self) {
        self.cached_hash.set(None);
    }
}

/// The capability set every authenticated node implements.
///
/// Default methods operate purely through [`Base`], so concrete types need
/// only supply `base()`, `node_type_id()`, `encode_body()` and
/// `clear_body()` (plus `collect_children()`/`compute_hash_override()`
/// when they have children or a faster hash).
pub trait Ads: std::fmt::Debug + std::any::Any {
    /// Accessor for the embedded `Base`.
    fn base(&self) -> &Base;

    /// Enables downcasting a `&dyn Ads` back to its concrete type, used by
    /// structures (like the bit-trie) that need to inspect which variant
    /// a generic child handle actually is.
    fn as_any(&self) -> &dyn std::any::Any;

    /// The registry id for this node's concrete variant.
    fn node_type_id(&self) -> i8;

    /// Writes this node's content-bearing fields (not the `Base`
    /// bookkeeping) to `enc`. Only ever called while `self` is transparent.
    fn encode_body(&self, enc: &mut Encoder);

    /// Child ADS nodes reachable from this node, for the pager to walk
    /// when storing or pinning a subtree. Leaf types return an empty Vec.
    fn collect_children(&self) -> Vec<Rc<dyn Ads>> {
        Vec::new()
    }

    /// A node-specific shortcut that bypasses the generic encode-then-hash
    /// path (e.g. Bitrie nodes hash their canonical fields directly).
    /// Returning `None` falls back to `Hash::sum(encode(self))`.
    fn compute_hash_override(&self) -> Option<Hash> {
        None
    }

    /// Zeroes this node's content-bearing fields. Called only when
    /// transitioning transparent -> opaque.
    fn clear_body(&self);

    /// Copies `decoded`'s content-bearing fields into `self`, which must be
    /// the same concrete type. Used by the pager's `Load` to splice freshly
    /// decoded content into an existing (possibly aliased) opaque node
    /// in place, so every outstanding `Rc` to it observes the same update.
    /// Types with no content fields (e.g. a nil sentinel) can rely on the
    /// default no-op.
    fn adopt_body(&self, _decoded: &dyn Ads) {}

    fn is_opaque(&self) -> bool {
        self.base().opaque.get()
    }

    /// Panics if this node is opaque. Every read path must call this (or
    /// go through a context's `Use`) before touching content fields.
    fn assert_transparent(&self) {
        if self.is_opaque() {
            panic!("attempted to read field of opaque ADS node");
        }
    }

    fn cached_hash(&self) -> Option<Hash> {
        self.base().cached_hash.get()
    }

    fn set_cached_hash(&self, h: Hash) {
        self.base().cached_hash.set(Some(h));
    }

    fn make_opaque(&self) {
        if !self.is_opaque() {
            self.clear_body();
            self.base().opaque.set(true);
        }
    }

    fn make_transparent(&self) {
        self.base().opaque.set(false);
    }
}
