use std::collections::HashSet;
use std::rc::Rc;

use ivc_types::{CodecError, Hash};

use crate::base::Ads;
use crate::registry::{decode_by_id, opaque_by_id};

fn identity(node: &Rc<dyn Ads>) -> usize {
    Rc::as_ptr(node) as *const () as usize
}

/// A deterministic little-endian byte-stream encoder for ADS nodes.
///
/// `transparent` names the set of nodes (by pointer identity) that should
/// be fully recursed into; any `Ads` reference reached while encoding that
/// is *not* in this set is pruned to a bare 32-byte hash. For a plain
/// `Hash(v)` call this set is `{v}`, which is what gives node hashes their
/// compact, DAG-shaped form: a node's hash commits to its immediate fields
/// and its children's hashes, never to the children's own contents.
pub struct Encoder {
    transparent: HashSet<usize>,
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new(transparent: HashSet<usize>) -> Encoder {
        Encoder {
            transparent,
            buf: Vec::with_capacity(128),
        }
    }

    pub fn singleton(v: &Rc<dyn Ads>) -> Encoder {
        let mut set = HashSet::with_capacity(1);
        set.insert(identity(v));
        Encoder::new(set)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn write_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn write_i8(&mut self, v: i8) {
        self.buf.push(v as u8);
    }

    pub fn write_bool(&mut self, v: bool) {
        self.write_u8(v as u8);
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_bytes_raw(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }

    pub fn write_bytes(&mut self, b: &[u8]) {
        self.write_u32(b.len() as u32);
        self.write_bytes_raw(b);
    }

    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Encodes a reference to a child ADS node: a presence-independent tag
    /// (`1` = recurse, `0` = hash-only), then the child's registry type id
    /// (recorded in both cases, so a pruned reference can still be
    /// rematerialised later by id), then either the child's body or its
    /// 32-byte hash.
    pub fn write_ref(&mut self, child: &Rc<dyn Ads>) {
        self.write_i8(child.node_type_id());
        if self.transparent.contains(&identity(child)) {
            child.assert_transparent();
            self.write_u8(1);
            child.encode_body(self);
        } else {
            self.write_u8(0);
            let h = hash(child);
            self.write_bytes_raw(h.bytes());
        }
    }
}

/// Mirrors [`Encoder`]: reads the deterministic byte stream back into ADS
/// nodes, using the type registry to pick the right concrete variant for
/// each recursed reference.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Decoder<'a> {
        Decoder { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.pos + n > self.buf.len() {
            return Err(CodecError::Malformed(format!(
                "need {n} bytes at offset {}, only {} available",
                self.pos,
                self.buf.len() - self.pos
            )));
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CodecError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes(b.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> Result<i64, CodecError> {
        Ok(self.read_u64()? as i64)
    }

    pub fn read_bytes_raw(&mut self, n: usize) -> Result<Vec<u8>, CodecError> {
        Ok(self.take(n)?.to_vec())
    }

    pub fn read_bytes(&mut self) -> Result<Vec<u8>, CodecError> {
        let n = self.read_u32()? as usize;
        self.read_bytes_raw(n)
    }

    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let b = self.read_bytes()?;
        String::from_utf8(b).map_err(|e| CodecError::Malformed(e.to_string()))
    }

    pub fn read_hash(&mut self) -> Result<Hash, CodecError> {
        let b = self.take(32)?;
        let mut out = [0u8; 32];
        out.copy_from_slice(b);
        Ok(Hash(out))
    }

    /// Mirrors [`Encoder::write_ref`]: reads the type id and presence tag,
    /// and either decodes a fresh transparent node via the registry or
    /// builds an opaque placeholder of that same registered type carrying
    /// just the hash, to be rematerialised later by the pager.
    pub fn read_ref(&mut self) -> Result<Rc<dyn Ads>, CodecError> {
        let id = self.read_i8()?;
        let tag = self.read_u8()?;
        if tag == 1 {
            decode_by_id(id, self)
        } else {
            let h = self.read_hash()?;
            opaque_by_id(id, h)
        }
    }
}

/// Returns the content hash of `v`, computing and caching it on first use.
///
/// If `v` supplies a `compute_hash_override`, that is used directly;
/// otherwise `v` is encoded with `transparent = {v}` and the result is
/// hashed with SHA-256. Two calls on the same node always agree, even if
/// made through encoders with different transparent sets elsewhere in the
/// tree, because the hash is memoised in `Base` the first time it is
/// computed.
pub fn hash(v: &Rc<dyn Ads>) -> Hash {
    if let Some(h) = v.cached_hash() {
        return h;
    }
    let h = if let Some(h) = v.compute_hash_override() {
        h
    } else {
        v.assert_transparent();
        let mut enc = Encoder::singleton(v);
        enc.write_i8(v.node_type_id());
        v.encode_body(&mut enc);
        Hash::sum(&enc.into_bytes())
    };
    v.set_cached_hash(h);
    h
}

/// Two ADS values are equal iff they have the same registry type id and
/// the same content hash.
pub fn equals(a: &Rc<dyn Ads>, b: &Rc<dyn Ads>) -> bool {
    a.node_type_id() == b.node_type_id() && hash(a) == hash(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::Base;

    #[derive(Debug, Default)]
    struct Leaf {
        base: Base,
        value: u32,
    }

    impl Ads for Leaf {
        fn base(&self) -> &Base {
            &self.base
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn node_type_id(&self) -> i8 {
            1
        }
        fn encode_body(&self, enc: &mut Encoder) {
            self.assert_transparent();
            enc.write_u32(self.value);
        }
        fn clear_body(&self) {
            // value is Copy and immaterial once opaque; nothing to zero
            // beyond what Base already tracks.
        }
    }

    fn leaf(value: u32) -> Rc<dyn Ads> {
        Rc::new(Leaf {
            base: Base::new(),
            value,
        })
    }

    #[test]
    fn hash_is_memoised_and_deterministic() {
        let a = leaf(42);
        let h1 = hash(&a);
        let h2 = hash(&a);
        assert_eq!(h1, h2);

        let b = leaf(42);
        assert_eq!(hash(&a), hash(&b));

        let c = leaf(43);
        assert_ne!(hash(&a), hash(&c));
    }

    #[test]
    fn equals_checks_type_and_hash() {
        let a = leaf(7);
        let b = leaf(7);
        assert!(equals(&a, &b));
    }
}
