use thiserror::Error;

/// A stable, machine-readable string code for an error variant, used in
/// logs and diagnostics so alerts can match on the code rather than the
/// human-readable message.
pub trait ErrorCode {
    fn code(&self) -> &'static str;
}

/// Errors from the wire codec (encode/decode) and the type/function
/// registry. These are configuration or implementation bugs, not runtime
/// conditions — callers generally let them escalate rather than retry.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("type id {0} is not registered")]
    UnregisteredType(i8),
    #[error("function id {0} is not registered")]
    UnregisteredFunc(i8),
    #[error("type id {0} is already registered")]
    DuplicateType(i8),
    #[error("function id {0} is already registered")]
    DuplicateFunc(i8),
    #[error("attempted to read field of opaque node")]
    OpaqueAccess,
    #[error("malformed encoding: {0}")]
    Malformed(String),
}

impl ErrorCode for CodecError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnregisteredType(_) => "CODEC_UNREGISTERED_TYPE",
            Self::UnregisteredFunc(_) => "CODEC_UNREGISTERED_FUNC",
            Self::DuplicateType(_) => "CODEC_DUPLICATE_TYPE",
            Self::DuplicateFunc(_) => "CODEC_DUPLICATE_FUNC",
            Self::OpaqueAccess => "CODEC_OPAQUE_ACCESS",
            Self::Malformed(_) => "CODEC_MALFORMED",
        }
    }
}

/// Errors surfaced by the paging store. I/O failures here are fatal per
/// the framework's error taxonomy: the caller is expected to propagate
/// with `?`, not retry.
#[derive(Debug, Error)]
pub enum PagingError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("segment {0} not found")]
    MissingSegment(u8),
    #[error("token {0:#x} out of bounds for segment {1}")]
    TokenOutOfBounds(u64, u8),
}

impl ErrorCode for PagingError {
    fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "PAGING_IO_ERROR",
            Self::Codec(_) => "PAGING_CODEC_ERROR",
            Self::MissingSegment(_) => "PAGING_MISSING_SEGMENT",
            Self::TokenOutOfBounds(_, _) => "PAGING_TOKEN_OUT_OF_BOUNDS",
        }
    }
}

/// A recoverable failure from `Resolve`: either the proof log ran out of
/// entries before the call returned (the caller should report the
/// synthesised `LogEntry` it was expecting next), or a logged entry did not
/// match the call being replayed.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("proof exhausted before call returned")]
    Exhausted,
    #[error("proof mismatch: {0}")]
    Mismatch(String),
}

impl ErrorCode for ResolveError {
    fn code(&self) -> &'static str {
        match self {
            Self::Exhausted => "RESOLVE_EXHAUSTED",
            Self::Mismatch(_) => "RESOLVE_MISMATCH",
        }
    }
}
