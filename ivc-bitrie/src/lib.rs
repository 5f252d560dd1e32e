//! A persistent, path-compressed bit-trie keyed by [`Bits`], used as the
//! application state container for computations built on this framework.
//!
//! Three variants, each a registered ADS type: [`NilNode`] (the empty
//! trie), [`Leaf`] (a single key/value pair), and [`Node`] (a branch
//! holding the
//! shared prefix consumed so far plus a left/right child selected by the
//! next bit). All operations are persistent: `set`/`delete` never mutate
//! an existing node, they return a new root sharing untouched subtrees
//! with the old one.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use ivc_ads::comp::C;
use ivc_ads::{hash as ads_hash, Ads, Base};
use ivc_types::{split_point, Bits, Hash};

/// Registry id for the empty trie.
pub const NIL_ID: i8 = 20;
/// Registry id for a leaf (single key/value pair).
pub const LEAF_ID: i8 = 21;
/// Registry id for a branch node.
pub const NODE_ID: i8 = 22;

/// Registers the three bit-trie variants with the global type registry.
/// Must be called once before any bit-trie node is encoded or decoded.
pub fn register() {
    ivc_ads::register_type(NIL_ID, "bitrie.Nil", |_dec| Ok(nil()), |_h| nil());
    ivc_ads::register_type(
        LEAF_ID,
        "bitrie.Leaf",
        |dec| {
            let bytes = dec.read_bytes_raw(32)?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            let _start = dec.read_u32()?;
            let length = dec.read_u32()? as usize;
            let bits = Bits::from_canonical(arr, length);
            let value = dec.read_ref()?;
            Ok(Rc::new(Leaf {
                base: Base::new(),
                bits: RefCell::new(bits),
                value: RefCell::new(Some(value)),
            }))
        },
        |h| {
            Rc::new(Leaf {
                base: Base::opaque_with_hash(h),
                bits: RefCell::new(Bits::empty()),
                value: RefCell::new(None),
            })
        },
    );
    ivc_ads::register_type(
        NODE_ID,
        "bitrie.Node",
        |dec| {
            let bytes = dec.read_bytes_raw(32)?;
            let mut arr = [0u8; 32];
            arr.copy_from_slice(&bytes);
            let _start = dec.read_u32()?;
            let length = dec.read_u32()? as usize;
            let bits = Bits::from_canonical(arr, length);
            let left = dec.read_ref()?;
            let right = dec.read_ref()?;
            Ok(Rc::new(Node {
                base: Base::new(),
                bits: RefCell::new(bits),
                left: RefCell::new(left),
                right: RefCell::new(right),
            }))
        },
        |h| {
            Rc::new(Node {
                base: Base::opaque_with_hash(h),
                bits: RefCell::new(Bits::empty()),
                left: RefCell::new(nil()),
                right: RefCell::new(nil()),
            })
        },
    );
}

#[derive(Debug)]
pub struct NilNode {
    base: Base,
}

#[derive(Debug)]
pub struct Leaf {
    base: Base,
    bits: RefCell<Bits>,
    value: RefCell<Option<Rc<dyn Ads>>>,
}

#[derive(Debug)]
pub struct Node {
    base: Base,
    bits: RefCell<Bits>,
    left: RefCell<Rc<dyn Ads>>,
    right: RefCell<Rc<dyn Ads>>,
}

fn nil_hash() -> Hash {
    Hash::sum(b"")
}

impl Ads for NilNode {
    fn base(&self) -> &Base {
        &self.base
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn node_type_id(&self) -> i8 {
        NIL_ID
    }
    fn encode_body(&self, _enc: &mut ivc_ads::Encoder) {}
    fn clear_body(&self) {}
    fn compute_hash_override(&self) -> Option<Hash> {
        Some(nil_hash())
    }
}

fn write_bits_fields(bits: &Bits, enc: &mut ivc_ads::Encoder) {
    enc.write_bytes_raw(&bits.canonical_bytes());
    enc.write_u32(0);
    enc.write_u32(bits.len() as u32);
}

impl Ads for Leaf {
    fn base(&self) -> &Base {
        &self.base
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn node_type_id(&self) -> i8 {
        LEAF_ID
    }
    fn encode_body(&self, enc: &mut ivc_ads::Encoder) {
        self.assert_transparent();
        write_bits_fields(&self.bits.borrow(), enc);
        enc.write_ref(self.value.borrow().as_ref().expect("transparent leaf has value"));
    }
    fn clear_body(&self) {
        *self.bits.borrow_mut() = Bits::empty();
        *self.value.borrow_mut() = None;
    }
    fn adopt_body(&self, decoded: &dyn Ads) {
        let decoded = decoded
            .as_any()
            .downcast_ref::<Leaf>()
            .expect("adopt_body: decoded node is not a bitrie.Leaf");
        *self.bits.borrow_mut() = decoded.bits.borrow().clone();
        *self.value.borrow_mut() = decoded.value.borrow().clone();
    }
    fn collect_children(&self) -> Vec<Rc<dyn Ads>> {
        match self.value.borrow().as_ref() {
            Some(v) => vec![v.clone()],
            None => Vec::new(),
        }
    }
    fn compute_hash_override(&self) -> Option<Hash> {
        self.assert_transparent();
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&self.bits.borrow().canonical_bytes());
        let value = self.value.borrow().clone().expect("transparent leaf has value");
        buf.extend_from_slice(ads_hash(&value).bytes());
        Some(Hash::sum(&buf))
    }
}

impl Ads for Node {
    fn base(&self) -> &Base {
        &self.base
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn node_type_id(&self) -> i8 {
        NODE_ID
    }
    fn encode_body(&self, enc: &mut ivc_ads::Encoder) {
        self.assert_transparent();
        write_bits_fields(&self.bits.borrow(), enc);
        enc.write_ref(&self.left.borrow());
        enc.write_ref(&self.right.borrow());
    }
    fn clear_body(&self) {
        *self.bits.borrow_mut() = Bits::empty();
        *self.left.borrow_mut() = nil();
        *self.right.borrow_mut() = nil();
    }
    fn adopt_body(&self, decoded: &dyn Ads) {
        let decoded = decoded
            .as_any()
            .downcast_ref::<Node>()
            .expect("adopt_body: decoded node is not a bitrie.Node");
        *self.bits.borrow_mut() = decoded.bits.borrow().clone();
        *self.left.borrow_mut() = decoded.left.borrow().clone();
        *self.right.borrow_mut() = decoded.right.borrow().clone();
    }
    fn collect_children(&self) -> Vec<Rc<dyn Ads>> {
        vec![self.left.borrow().clone(), self.right.borrow().clone()]
    }
    fn compute_hash_override(&self) -> Option<Hash> {
        self.assert_transparent();
        let mut buf = Vec::with_capacity(96);
        buf.extend_from_slice(&self.bits.borrow().canonical_bytes());
        buf.extend_from_slice(ads_hash(&self.left.borrow()).bytes());
        buf.extend_from_slice(ads_hash(&self.right.borrow()).bytes());
        Some(Hash::sum(&buf))
    }
}

pub fn nil() -> Rc<dyn Ads> {
    Rc::new(NilNode { base: Base::new() })
}

fn is_nil(node: &Rc<dyn Ads>) -> bool {
    node.as_any().downcast_ref::<NilNode>().is_some()
}

fn make_leaf(bits: Bits, value: Rc<dyn Ads>) -> Rc<dyn Ads> {
    Rc::new(Leaf {
        base: Base::new(),
        bits: RefCell::new(bits),
        value: RefCell::new(Some(value)),
    })
}

fn make_node(bits: Bits, left: Rc<dyn Ads>, right: Rc<dyn Ads>) -> Rc<dyn Ads> {
    Rc::new(Node {
        base: Base::new(),
        bits: RefCell::new(bits),
        left: RefCell::new(left),
        right: RefCell::new(right),
    })
}

/// Looks up `key`, returning its value if present. Calls `c.use_nodes`
/// on every node visited before reading its fields, matching the
/// consumer contract every transition function must follow.
pub fn get(root: &Rc<dyn Ads>, key: &Bits, c: &dyn C) -> Option<Rc<dyn Ads>> {
    if let Some(leaf) = root.as_any().downcast_ref::<Leaf>() {
        c.use_nodes(std::slice::from_ref(root));
        let bits = leaf.bits.borrow();
        let split = split_point(&bits, key);
        if split == bits.len() && split == key.len() {
            return leaf.value.borrow().clone();
        }
        return None;
    }
    if let Some(node) = root.as_any().downcast_ref::<Node>() {
        c.use_nodes(std::slice::from_ref(root));
        let bits = node.bits.borrow();
        let split = split_point(&bits, key);
        if split < bits.len() {
            return None;
        }
        debug_assert!(key.len() > bits.len());
        let bit = key.get(bits.len());
        let tail = key.cut(bits.len() + 1, key.len());
        let child = if bit { node.right.borrow().clone() } else { node.left.borrow().clone() };
        return get(&child, &tail, c);
    }
    None
}

/// Returns a new root with `key` bound to `value` (inserting or
/// overwriting). `root` is left untouched.
pub fn set(root: &Rc<dyn Ads>, key: &Bits, value: Rc<dyn Ads>, c: &dyn C) -> Rc<dyn Ads> {
    if is_nil(root) {
        return make_leaf(key.clone(), value);
    }
    if let Some(leaf) = root.as_any().downcast_ref::<Leaf>() {
        c.use_nodes(std::slice::from_ref(root));
        let existing_bits = leaf.bits.borrow().clone();
        let split = split_point(&existing_bits, key);
        if split == existing_bits.len() && split == key.len() {
            return make_leaf(existing_bits, value);
        }
        let prefix = key.cut(0, split);
        let existing_bit = existing_bits.get(split);
        let new_bit = key.get(split);
        debug_assert_ne!(existing_bit, new_bit);
        let existing_value = leaf.value.borrow().clone().expect("transparent leaf has value");
        let existing_leaf = make_leaf(existing_bits.cut(split + 1, existing_bits.len()), existing_value);
        let new_leaf = make_leaf(key.cut(split + 1, key.len()), value);
        let (left, right) = if new_bit { (existing_leaf, new_leaf) } else { (new_leaf, existing_leaf) };
        return make_node(prefix, left, right);
    }
    if let Some(node) = root.as_any().downcast_ref::<Node>() {
        c.use_nodes(std::slice::from_ref(root));
        let bits = node.bits.borrow().clone();
        let split = split_point(&bits, key);
        if split == bits.len() {
            debug_assert!(key.len() > bits.len());
            let bit = key.get(bits.len());
            let tail = key.cut(bits.len() + 1, key.len());
            let (left, right) = if bit {
                let new_right = set(&node.right.borrow(), &tail, value, c);
                (node.left.borrow().clone(), new_right)
            } else {
                let new_left = set(&node.left.borrow(), &tail, value, c);
                (new_left, node.right.borrow().clone())
            };
            return make_node(bits, left, right);
        }
        let prefix = key.cut(0, split);
        let existing_bit = bits.get(split);
        let new_bit = key.get(split);
        debug_assert_ne!(existing_bit, new_bit);
        let existing_branch = make_node(bits.cut(split + 1, bits.len()), node.left.borrow().clone(), node.right.borrow().clone());
        let new_leaf = make_leaf(key.cut(split + 1, key.len()), value);
        let (left, right) = if new_bit { (existing_branch, new_leaf) } else { (new_leaf, existing_branch) };
        return make_node(prefix, left, right);
    }
    unreachable!("unknown bit-trie node variant");
}

/// Builds a new node with `prefix` prepended to `node`'s own bits. The
/// caller is responsible for having already called `c.use_nodes(&[node])`
/// (always true at `delete`'s call sites), so this takes no context.
fn prepend(node: &Rc<dyn Ads>, prefix: &Bits) -> Rc<dyn Ads> {
    if is_nil(node) {
        return nil();
    }
    if let Some(leaf) = node.as_any().downcast_ref::<Leaf>() {
        leaf.assert_transparent();
        let combined = Bits::cat(prefix, &leaf.bits.borrow());
        let value = leaf.value.borrow().clone().expect("transparent leaf has value");
        return make_leaf(combined, value);
    }
    if let Some(n) = node.as_any().downcast_ref::<Node>() {
        n.assert_transparent();
        let combined = Bits::cat(prefix, &n.bits.borrow());
        return make_node(combined, n.left.borrow().clone(), n.right.borrow().clone());
    }
    unreachable!("unknown bit-trie node variant");
}

/// Returns a new root with `key` removed, if present. A no-op (returns
/// `root` unchanged) if `key` is absent.
pub fn delete(root: &Rc<dyn Ads>, key: &Bits, c: &dyn C) -> Rc<dyn Ads> {
    if is_nil(root) {
        return root.clone();
    }
    if let Some(leaf) = root.as_any().downcast_ref::<Leaf>() {
        c.use_nodes(std::slice::from_ref(root));
        let bits = leaf.bits.borrow();
        let split = split_point(&bits, key);
        if split == bits.len() && split == key.len() {
            return nil();
        }
        return root.clone();
    }
    if let Some(node) = root.as_any().downcast_ref::<Node>() {
        c.use_nodes(std::slice::from_ref(root));
        let bits = node.bits.borrow().clone();
        let split = split_point(&bits, key);
        if split < bits.len() {
            return root.clone();
        }
        debug_assert!(key.len() > bits.len());
        let bit = key.get(bits.len());
        let tail = key.cut(bits.len() + 1, key.len());
        let (child, sibling) = if bit {
            (node.right.borrow().clone(), node.left.borrow().clone())
        } else {
            (node.left.borrow().clone(), node.right.borrow().clone())
        };
        let new_child = delete(&child, &tail, c);
        if is_nil(&new_child) {
            c.use_nodes(std::slice::from_ref(&sibling));
            let sibling_bit = !bit;
            let prepend_bits = bits.append(sibling_bit);
            return prepend(&sibling, &prepend_bits);
        }
        let (left, right) = if bit { (sibling, new_child) } else { (new_child, sibling) };
        return make_node(bits, left, right);
    }
    unreachable!("unknown bit-trie node variant");
}

#[cfg(test)]
mod tests {
    use super::*;
    use ivc_ads::comp::NilC;
    use ivc_ads::Encoder;
    use std::collections::HashSet;

    fn int_value(n: u32) -> Rc<dyn Ads> {
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
                30
            }
            fn encode_body(&self, enc: &mut Encoder) {
                enc.write_u32(self.v);
            }
            fn clear_body(&self) {}
        }
        Rc::new(IntLeaf { base: Base::new(), v: n })
    }

    fn key(s: &str) -> Bits {
        Bits::from_hash(Hash::sum(s.as_bytes()))
    }

    #[test]
    fn bitrie_simple_insert_delete() {
        let c = NilC::new();
        let mut root = nil();
        for (k, v) in [("a", 1u32), ("b", 2), ("c", 3), ("d", 4)] {
            root = set(&root, &key(k), int_value(v), &c);
        }
        root = delete(&root, &key("b"), &c);

        assert!(get(&root, &key("b"), &c).is_none());
        for (k, v) in [("a", 1u32), ("c", 3), ("d", 4)] {
            let got = get(&root, &key(k), &c).expect("key present");
            let leaf_hash = ads_hash(&got);
            let expected_hash = ads_hash(&int_value(v));
            assert_eq!(leaf_hash, expected_hash);
        }
    }

    #[test]
    fn bitrie_stress_insert_delete_even_keys() {
        let c = NilC::new();
        let mut root = nil();
        let keys: Vec<(Bits, u32)> = (0..2000u32)
            .map(|i| (key(&i.to_string()), i))
            .collect();
        for (k, v) in &keys {
            root = set(&root, k, int_value(*v), &c);
        }
        for (k, v) in &keys {
            if *v % 2 == 0 {
                root = delete(&root, k, &c);
            }
        }
        let mut seen_present = HashSet::new();
        for (k, v) in &keys {
            let found = get(&root, k, &c);
            if *v % 2 == 0 {
                assert!(found.is_none(), "even key {v} should be absent");
            } else {
                assert!(found.is_some(), "odd key {v} should be present");
                seen_present.insert(*v);
            }
        }
        assert_eq!(seen_present.len(), 1000);
    }

    #[test]
    fn nil_hash_is_stable() {
        assert_eq!(ads_hash(&nil()), ads_hash(&nil()));
    }
}
