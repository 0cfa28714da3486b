use std::path::PathBuf;

use hgx_golix::{GolixError, PrimitiveKind};
use hgx_types::Ghid;

/// Errors from librarian operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Nothing is cached under this address.
    #[error("does not exist: {0}")]
    DoesNotExist(Ghid),

    /// Cached bytes no longer parse as a primitive.
    #[error("malformed cache entry {ghid}: {reason}")]
    Malformed { ghid: Ghid, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache directory {0} does not exist or is not a directory")]
    CacheDir(PathBuf),

    /// A blocking disk task panicked or was cancelled.
    #[error("disk task failed: {0}")]
    Task(String),
}

/// Result alias for librarian operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Reasons a primitive is refused by a validation stage.
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} does not resolve to a known identity declaration")]
    InvalidIdentity(Ghid),

    #[error("inconsistent author for {ghid}: author of record {expected}, got {actual}")]
    InconsistentAuthor {
        ghid: Ghid,
        expected: Ghid,
        actual: Ghid,
    },

    #[error("{ghid} may not target {target} ({kind})")]
    InvalidTarget {
        ghid: Ghid,
        target: Ghid,
        kind: PrimitiveKind,
    },

    #[error("dynamic frame for {ghid} has counter {proposed}, but {existing} is already known")]
    IllegalDynamicFrame {
        ghid: Ghid,
        existing: u64,
        proposed: u64,
    },

    #[error("{0} has already been debound")]
    AlreadyDebound(Ghid),

    #[error("container {0} is not bound by anything")]
    UnboundContainer(Ghid),

    /// The librarian failed while answering a lookup.
    #[error("lookup failed: {0}")]
    Lookup(#[from] StoreError),
}

/// Result alias for validation.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors from the ingest pipeline.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    #[error("unreadable primitive: {0}")]
    Malformed(#[from] GolixError),

    /// Signature does not match the author's declared key.
    #[error("verification failed for {ghid}: {reason}")]
    Verification { ghid: Ghid, reason: String },

    #[error("upstream rejected {ghid}: {reason}")]
    Upstream { ghid: Ghid, reason: String },
}

/// Result alias for ingestion.
pub type IngestResult<T> = Result<T, IngestError>;
