use std::rc::Rc;

use ivc_types::{CodecError, Hash};

use crate::base::Ads;
use crate::codec::{hash, Decoder, Encoder};
use crate::registry::{func_name, register_func, FUNCTION_ID};

/// A reference to a registered function: a stable small integer id plus
/// its name. Never compared or hashed by pointer — only by `id` — so that
/// a proof recorded in one process replays identically in another. Shares
/// its id space with registered ADS types (see [`FUNCTION_ID`]), which is
/// why it's an `i8` rather than something wider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FuncRef {
    pub id: i8,
    pub name: &'static str,
}

impl FuncRef {
    /// Registers `name` under `id` and returns the handle. Panics on
    /// collision, matching [`crate::registry::register_func`].
    pub fn register(id: i8, name: &'static str) -> FuncRef {
        register_func(id, name);
        FuncRef { id, name }
    }

    pub fn resolve(id: i8) -> Result<FuncRef, CodecError> {
        Ok(FuncRef {
            id,
            name: func_name(id)?,
        })
    }
}

/// The "ADS-or-primitive" slot that appears in call log entries: either a
/// reference to an authenticated node, or one of a small set of inline
/// primitives, or a function reference, or nothing.
#[derive(Clone, Debug)]
pub enum Value {
    None,
    Ads(Rc<dyn Ads>),
    I64(i64),
    U64(u64),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    Func(FuncRef),
}

const TAG_NONE: u8 = 0;
const TAG_ADS: u8 = 1;
const TAG_I64: u8 = 2;
const TAG_U64: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_BYTES: u8 = 5;
const TAG_STR: u8 = 6;

impl Value {
    pub fn encode(&self, enc: &mut Encoder) {
        match self {
            Value::None => enc.write_u8(TAG_NONE),
            Value::Ads(v) => {
                enc.write_u8(TAG_ADS);
                enc.write_ref(v);
            }
            Value::I64(v) => {
                enc.write_u8(TAG_I64);
                enc.write_i64(*v);
            }
            Value::U64(v) => {
                enc.write_u8(TAG_U64);
                enc.write_u64(*v);
            }
            Value::Bool(v) => {
                enc.write_u8(TAG_BOOL);
                enc.write_bool(*v);
            }
            Value::Bytes(v) => {
                enc.write_u8(TAG_BYTES);
                enc.write_bytes(v);
            }
            Value::Str(v) => {
                enc.write_u8(TAG_STR);
                enc.write_string(v);
            }
            Value::Func(f) => {
                enc.write_i8(FUNCTION_ID);
                enc.write_i8(f.id);
            }
        }
    }

    pub fn decode(dec: &mut Decoder) -> Result<Value, CodecError> {
        let tag = dec.read_i8()?;
        if tag == FUNCTION_ID {
            let id = dec.read_i8()?;
            return Ok(Value::Func(FuncRef::resolve(id)?));
        }
        match tag as u8 {
            TAG_NONE => Ok(Value::None),
            TAG_ADS => Ok(Value::Ads(dec.read_ref()?)),
            TAG_I64 => Ok(Value::I64(dec.read_i64()?)),
            TAG_U64 => Ok(Value::U64(dec.read_u64()?)),
            TAG_BOOL => Ok(Value::Bool(dec.read_bool()?)),
            TAG_BYTES => Ok(Value::Bytes(dec.read_bytes()?)),
            TAG_STR => Ok(Value::Str(dec.read_string()?)),
            other => Err(CodecError::Malformed(format!("unknown value tag {other}"))),
        }
    }

    /// Structural equality used to compare a recorded call's arguments
    /// against a replayed call's arguments during resolve.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Ads(a), Value::Ads(b)) => crate::codec::equals(a, b),
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::U64(a), Value::U64(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Func(a), Value::Func(b)) => a.id == b.id,
            _ => false,
        }
    }

    /// A content hash for this value, used when a `Value` itself needs to
    /// participate in a `Hashable` sequence (e.g. as a log entry field).
    pub fn content_hash(&self) -> Hash {
        match self {
            Value::Ads(v) => hash(v),
            other => {
                let mut enc = Encoder::new(Default::default());
                other.encode(&mut enc);
                Hash::sum(&enc.into_bytes())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_values_compare_by_content() {
        assert!(Value::I64(5).value_eq(&Value::I64(5)));
        assert!(!Value::I64(5).value_eq(&Value::I64(6)));
        assert!(!Value::I64(5).value_eq(&Value::U64(5)));
    }
}
