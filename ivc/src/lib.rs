//! Authenticated, incrementally verifiable computation.
//!
//! This crate is a thin facade over the workspace's component crates:
//! [`ivc_ads`] (the `Ads` trait, wire codec, type/function registry and
//! the `C` computation-context trait), [`ivc_bitrie`] (the persistent
//! bit-trie used as application state), [`ivc_seqhash`] (history-
//! independent sequence hashing) and [`ivc_verified`] (the call log and
//! the proof-recording/verifying/resolving context variants built on top
//! of it), and [`ivc_paging`] (the disk-backed store and context for
//! working sets too large to keep fully resident).
//!
//! Application code typically only needs [`prelude`] plus
//! [`register_core`] to bring up the registry before running anything.

pub use ivc_ads as ads;
pub use ivc_bitrie as bitrie;
pub use ivc_paging as paging;
pub use ivc_seqhash as seqhash;
pub use ivc_verified as verified;

/// Registers every ADS variant defined by this workspace's own crates
/// (currently just the bit-trie). Application code must still register
/// its own function ids and any additional ADS variants of its own
/// before running a computation — see the registration interface in the
/// module docs.
pub fn register_core() {
    ivc_bitrie::register();
}

pub mod prelude {
    pub use crate::register_core;
    pub use ivc_ads::comp::{CallBody, NilC, TrackC, C};
    pub use ivc_ads::{equals, hash, register_func, register_type, Ads, Base, Decoder, Encoder, FuncRef, Value};
    pub use ivc_bitrie::{delete, get, nil, set};
    pub use ivc_paging::{PagingC, PagingConfig, PagingStore, Token};
    pub use ivc_seqhash::{Hashable, SeqHash};
    pub use ivc_verified::{resolve, values_eq, LogEntry, LogTreap, ProofC, VerifyC};
}
