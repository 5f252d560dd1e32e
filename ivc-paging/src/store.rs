//! The disk-backed node store: durable `Store`/`Load` on top of a
//! [`crate::segment::SegmentedLog`], plus the intrusive LRU list (threaded
//! through each node's own `Base.info.prev`/`info.next`) that bounds how
//! many nodes are resident at once. Grounded in `ioi-scs::store`'s
//! create/open/append shape and `ioi-storage::wal`'s durability ordering,
//! adapted to the single-owner `Rc`-graph eviction scheme this framework
//! uses in place of a page cache.

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::path::Path;
use std::rc::Rc;

use ivc_ads::{decode_by_id, opaque_by_id, Ads, Decoder, Encoder};
use ivc_types::{Hash, PagingError};

use crate::config::PagingConfig;
use crate::segment::SegmentedLog;
use crate::token::Token;

thread_local! {
    static LOADS: Cell<u64> = Cell::new(0);
    static UNLOADS: Cell<u64> = Cell::new(0);
}

/// Total number of `Load`s serviced by any [`PagingStore`] in this thread.
pub fn loads() -> u64 {
    LOADS.with(|c| c.get())
}

/// Total number of evictions (`Unload`s) performed by any [`PagingStore`]
/// in this thread.
pub fn unloads() -> u64 {
    UNLOADS.with(|c| c.get())
}

fn identity(node: &Rc<dyn Ads>) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

/// A node store backed by a segmented on-disk log, bounding resident nodes
/// to [`PagingConfig::working_set`] via LRU eviction.
pub struct PagingStore {
    log: SegmentedLog,
    config: PagingConfig,
    head: RefCell<Option<Rc<dyn Ads>>>,
    tail: RefCell<Option<Rc<dyn Ads>>>,
    resident: RefCell<HashSet<usize>>,
}

impl PagingStore {
    pub fn open(dir: &Path, config: PagingConfig) -> Result<PagingStore, PagingError> {
        Ok(PagingStore {
            log: SegmentedLog::open(dir, config)?,
            config,
            head: RefCell::new(None),
            tail: RefCell::new(None),
            resident: RefCell::new(HashSet::new()),
        })
    }

    fn link_front(&self, node: &Rc<dyn Ads>) {
        let old_head = self.head.borrow_mut().take();
        *node.base().info.next.borrow_mut() = old_head.clone();
        *node.base().info.prev.borrow_mut() = None;
        match &old_head {
            Some(oh) => *oh.base().info.prev.borrow_mut() = Some(node.clone()),
            None => *self.tail.borrow_mut() = Some(node.clone()),
        }
        *self.head.borrow_mut() = Some(node.clone());
    }

    fn unlink(&self, node: &Rc<dyn Ads>) {
        let prev = node.base().info.prev.borrow_mut().take();
        let next = node.base().info.next.borrow_mut().take();
        match (&prev, &next) {
            (Some(p), Some(n)) => {
                *p.base().info.next.borrow_mut() = Some(n.clone());
                *n.base().info.prev.borrow_mut() = Some(p.clone());
            }
            (Some(p), None) => {
                *p.base().info.next.borrow_mut() = None;
                *self.tail.borrow_mut() = Some(p.clone());
            }
            (None, Some(n)) => {
                *n.base().info.prev.borrow_mut() = None;
                *self.head.borrow_mut() = Some(n.clone());
            }
            (None, None) => {
                *self.head.borrow_mut() = None;
                *self.tail.borrow_mut() = None;
            }
        }
    }

    /// Marks `node` as the most recently used, pinning it against eviction
    /// until enough other nodes overtake it. Does not recurse into
    /// children — see [`PagingStore::pin_new`] for that.
    pub fn mark_used(&self, node: &Rc<dyn Ads>) {
        let id = identity(node);
        if self.resident.borrow().contains(&id) {
            self.unlink(node);
        } else {
            self.resident.borrow_mut().insert(id);
        }
        self.link_front(node);
    }

    /// Recursively pins a freshly built subtree: `node` and every
    /// still-transparent descendant. Stops at opaque children, which are
    /// already durable elsewhere and have no business being forced
    /// resident just because a sibling was touched.
    pub fn pin_new(&self, node: &Rc<dyn Ads>) {
        self.mark_used(node);
        if !node.is_opaque() {
            for child in node.collect_children() {
                self.pin_new(&child);
            }
        }
    }

    /// Durably persists `node` and, recursively, any not-yet-stored
    /// transparent children, returning the token locating `node`'s own
    /// record. A no-op returning the existing token if `node` was already
    /// stored — storage is idempotent.
    pub fn store(&self, node: &Rc<dyn Ads>) -> Result<Token, PagingError> {
        let existing = node.base().info.token.get();
        if existing != 0 {
            return Ok(Token(existing));
        }

        let children = node.collect_children();
        let mut child_tokens = Vec::with_capacity(children.len());
        for child in &children {
            let token = if child.is_opaque() {
                let t = child.base().info.token.get();
                assert!(t != 0, "opaque child has no durable token to reference");
                Token(t)
            } else {
                self.store(child)?
            };
            child_tokens.push(token);
        }

        let mut enc = Encoder::singleton(node);
        enc.write_i8(node.node_type_id());
        node.encode_body(&mut enc);
        let mut bytes = enc.into_bytes();
        for t in &child_tokens {
            bytes.extend_from_slice(&t.0.to_le_bytes());
        }

        let token = self.log.append(&bytes)?;
        node.base().info.token.set(token.0);
        Ok(token)
    }

    /// Rematerialises `node`'s content in place if it is currently opaque,
    /// splicing the decoded fields in via [`Ads::adopt_body`] so every
    /// outstanding `Rc` to `node` observes the load. A no-op if `node` is
    /// already transparent. Either way, marks `node` used.
    pub fn load(&self, node: &Rc<dyn Ads>) -> Result<(), PagingError> {
        if !node.is_opaque() {
            self.mark_used(node);
            return Ok(());
        }
        let token = node.base().info.token.get();
        assert!(token != 0, "cannot load a node that was never stored");

        let bytes = self.log.read(Token(token))?;
        let mut dec = Decoder::new(&bytes);
        let id = dec.read_i8().map_err(PagingError::Codec)?;
        let decoded = decode_by_id(id, &mut dec).map_err(PagingError::Codec)?;

        for child in decoded.collect_children() {
            let t = dec.read_u64().map_err(PagingError::Codec)?;
            child.base().info.token.set(t);
        }

        node.adopt_body(decoded.as_ref());
        node.make_transparent();
        LOADS.with(|c| c.set(c.get() + 1));
        self.mark_used(node);
        Ok(())
    }

    /// Evicts least-recently-used nodes until at most `working_set` remain
    /// resident, storing each victim first if it has never been persisted.
    /// Returns the number of nodes evicted. Triggered only when the caller
    /// invokes it explicitly between units of work — there is no
    /// background thread.
    pub fn unload(&self) -> Result<usize, PagingError> {
        let mut evicted = 0;
        while self.resident.borrow().len() > self.config.working_set {
            let victim = match self.tail.borrow().clone() {
                Some(v) => v,
                None => break,
            };
            self.evict(&victim)?;
            evicted += 1;
        }
        Ok(evicted)
    }

    fn evict(&self, node: &Rc<dyn Ads>) -> Result<(), PagingError> {
        if node.base().info.token.get() == 0 {
            self.store(node)?;
        }
        self.unlink(node);
        self.resident.borrow_mut().remove(&identity(node));
        node.make_opaque();
        UNLOADS.with(|c| c.set(c.get() + 1));
        Ok(())
    }

    pub fn resident_len(&self) -> usize {
        self.resident.borrow().len()
    }

    /// Builds an opaque placeholder of `type_id` anchored at `token`, for
    /// reopening a previously stored root from nothing but its token. The
    /// placeholder's hash is unknown until the first `Load`, so its
    /// memoised hash (set to a dummy zero value by the registered opaque
    /// constructor) is cleared immediately — otherwise the framework's
    /// hash cache would permanently shadow the real value.
    pub fn open_root(&self, type_id: i8, token: Token) -> Result<Rc<dyn Ads>, PagingError> {
        let placeholder = opaque_by_id(type_id, Hash::ZERO)?;
        placeholder.base().clear_cached_hash();
        placeholder.base().info.token.set(token.0);
        self.mark_used(&placeholder);
        Ok(placeholder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivc_ads::comp::NilC;
    use ivc_bitrie::{nil, set};
    use ivc_types::Bits;
    use tempfile::tempdir;

    fn key(s: &str) -> Bits {
        Bits::from_hash(Hash::sum(s.as_bytes()))
    }

    fn leaf_value(v: u32) -> Rc<dyn Ads> {
        use ivc_ads::Base;
        #[derive(Debug)]
        struct IntLeaf {
            base: Base,
            v: u32,
        }
        impl Ads for IntLeaf {
            fn base(&self) -> &Base {
                &self.base
            }
            fn as_any(&self) -> &dyn std::any::Any {
                self
            }
            fn node_type_id(&self) -> i8 {
                40
            }
            fn encode_body(&self, enc: &mut Encoder) {
                enc.write_u32(self.v);
            }
            fn clear_body(&self) {}
        }
        Rc::new(IntLeaf { base: Base::new(), v })
    }

    fn register_int_leaf() {
        use std::sync::Once;
        static ONCE: Once = Once::new();
        ONCE.call_once(|| {
            ivc_ads::register_type(
                40,
                "test.IntLeaf",
                |dec| {
                    let v = dec.read_u32()?;
                    Ok(leaf_value(v))
                },
                |_h| leaf_value(0),
            );
        });
    }

    fn registered_once() {
        use std::sync::Once;
        static ONCE: Once = Once::new();
        ONCE.call_once(ivc_bitrie::register);
        register_int_leaf();
    }

    #[test]
    fn store_then_load_round_trips_a_subtree() {
        registered_once();
        let dir = tempdir().unwrap();
        let store = PagingStore::open(dir.path(), PagingConfig::default()).unwrap();

        let nil_c = NilC::new();
        let mut root = nil();
        for (k, v) in [("a", 1u32), ("b", 2), ("c", 3)] {
            root = set(&root, &key(k), leaf_value(v), &nil_c);
        }
        let root_hash = ivc_ads::hash(&root);
        let token = store.store(&root).unwrap();

        let reopened = store.open_root(ivc_bitrie::NODE_ID, token).unwrap();
        assert!(reopened.is_opaque());
        store.load(&reopened).unwrap();
        assert!(!reopened.is_opaque());
        assert_eq!(ivc_ads::hash(&reopened), root_hash);
    }

    #[test]
    fn unload_bounds_resident_count_and_is_lazy() {
        registered_once();
        let dir = tempdir().unwrap();
        let config = PagingConfig {
            working_set: 2,
            ..PagingConfig::default()
        };
        let store = PagingStore::open(dir.path(), config).unwrap();

        let a = leaf_value(1);
        let b = leaf_value(2);
        let c = leaf_value(3);
        store.mark_used(&a);
        store.mark_used(&b);
        store.mark_used(&c);
        // No eviction happens until unload() is called explicitly.
        assert_eq!(store.resident_len(), 3);

        let evicted = store.unload().unwrap();
        assert_eq!(evicted, 1);
        assert_eq!(store.resident_len(), 2);
        assert!(a.is_opaque(), "least recently used node should have been evicted");
        assert!(!b.is_opaque());
        assert!(!c.is_opaque());
    }
}
