use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use ivc_types::{CodecError, Hash};

use crate::base::Ads;
use crate::codec::Decoder;

/// Reserved type id marking a slot as "this is a function reference, not a
/// registered ADS variant". Never usable as a real type id.
pub const FUNCTION_ID: i8 = -127;

pub type DecodeFn = fn(&mut Decoder) -> Result<Rc<dyn Ads>, CodecError>;

/// Builds an empty, opaque placeholder of this registered type carrying
/// only `h` as its content hash — the "hash-only reference" and "evicted
/// node" cases both start from one of these. Keeping placeholders the same
/// concrete type as the real node (rather than a single generic stand-in)
/// is what lets `Ads::adopt_body` later splice decoded content into them
/// in place.
pub type OpaqueFn = fn(Hash) -> Rc<dyn Ads>;

struct TypeEntry {
    name: &'static str,
    decode_fn: DecodeFn,
    opaque_fn: OpaqueFn,
}

thread_local! {
    static TYPES: RefCell<HashMap<i8, TypeEntry>> = RefCell::new(HashMap::new());
    static FUNCS: RefCell<HashMap<i8, &'static str>> = RefCell::new(HashMap::new());
}

/// Registers a concrete ADS variant under `id`. Panics on collision or on
/// an attempt to register the reserved `FUNCTION_ID` — registration is a
/// one-shot, process-startup operation; failures here are configuration
/// bugs, not runtime conditions.
pub fn register_type(id: i8, name: &'static str, decode_fn: DecodeFn, opaque_fn: OpaqueFn) {
    assert_ne!(id, FUNCTION_ID, "type id {id} collides with FUNCTION_ID");
    TYPES.with(|t| {
        let mut t = t.borrow_mut();
        if let Some(existing) = t.insert(
            id,
            TypeEntry {
                name,
                decode_fn,
                opaque_fn,
            },
        ) {
            panic!("type id {id} already registered as {}", existing.name);
        }
    });
}

pub fn decode_by_id(id: i8, dec: &mut Decoder) -> Result<Rc<dyn Ads>, CodecError> {
    let decode_fn = TYPES.with(|t| {
        t.borrow()
            .get(&id)
            .map(|e| e.decode_fn)
            .ok_or(CodecError::UnregisteredType(id))
    })?;
    decode_fn(dec)
}

/// Builds an opaque placeholder of registered type `id` with content hash
/// `h`, for a hash-only wire reference (`Decoder::read_ref`) or for the
/// pager rematerialising a token it hasn't loaded yet.
pub fn opaque_by_id(id: i8, h: Hash) -> Result<Rc<dyn Ads>, CodecError> {
    let opaque_fn = TYPES.with(|t| {
        t.borrow()
            .get(&id)
            .map(|e| e.opaque_fn)
            .ok_or(CodecError::UnregisteredType(id))
    })?;
    Ok(opaque_fn(h))
}

pub fn type_name(id: i8) -> Option<&'static str> {
    TYPES.with(|t| t.borrow().get(&id).map(|e| e.name))
}

/// Registers a named function under `id`, used so `LogEntry`/`FuncRef`
/// values can be compared by stable id across a proof-record/verify
/// round-trip. Shares its id space with `register_type` — `id` must not
/// be `FUNCTION_ID` itself, since that's the wire sentinel marking a
/// `Value` as a function reference rather than an ADS type. Panics on
/// collision, matching `register_type`.
pub fn register_func(id: i8, name: &'static str) {
    assert_ne!(id, FUNCTION_ID, "func id {id} collides with FUNCTION_ID");
    FUNCS.with(|f| {
        let mut f = f.borrow_mut();
        if let Some(existing) = f.insert(id, name) {
            panic!("function id {id} already registered as {existing}");
        }
    });
}

pub fn func_name(id: i8) -> Result<&'static str, CodecError> {
    FUNCS
        .with(|f| f.borrow().get(&id).copied())
        .ok_or(CodecError::UnregisteredFunc(id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_func_registration_panics() {
        register_func(90, "dup_test_a");
        register_func(90, "dup_test_b");
    }

    #[test]
    #[should_panic(expected = "collides with FUNCTION_ID")]
    fn registering_function_id_as_func_panics() {
        register_func(FUNCTION_ID, "bogus");
    }

    #[test]
    #[should_panic(expected = "FUNCTION_ID")]
    fn registering_function_id_as_type_panics() {
        register_type(FUNCTION_ID, "bogus", |_| unreachable!(), |_| unreachable!());
    }
}
