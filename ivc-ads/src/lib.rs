//! Authenticated data structure (ADS) machinery: the [`Ads`] trait and its
//! embedded [`Base`]/[`Info`] bookkeeping, the type/function [`registry`],
//! the deterministic wire [`codec`], the "ADS-or-primitive" [`Value`]
//! slot, and the computation-context [`comp::C`] trait with its
//! non-recording implementations.
//!
//! Proof-recording and proof-verifying context variants (`ProofC`,
//! `VerifyC`, `ResolveC`) live in `ivc-verified`, since they operate on
//! the call log types defined there; the disk-backed `PagingC` lives in
//! `ivc-paging`.

mod base;
pub mod codec;
pub mod comp;
mod registry;
mod value;

pub use base::{Ads, Base, Info};
pub use codec::{equals, hash, Decoder, Encoder};
pub use registry::{
    decode_by_id, func_name, opaque_by_id, register_func, register_type, type_name, DecodeFn, OpaqueFn, FUNCTION_ID,
};
pub use value::{FuncRef, Value};

pub mod prelude {
    pub use crate::comp::{CallBody, NilC, TrackC, C};
    pub use crate::{equals, hash, register_func, register_type, Ads, Base, Decoder, Encoder, FuncRef, Info, Value};
}
