use hgx_golix::GolixError;
use hgx_persist::{IngestError, StoreError};
use hgx_types::Ghid;

/// Errors from accountable objects and the secret store.
#[derive(Debug, thiserror::Error)]
pub enum GaoError {
    /// The object was deleted; obtain a fresh rebinding to revive the address.
    #[error("object {0} has been deleted")]
    DeadObject(Ghid),

    /// The object has no address yet: push (dynamic) or create (static) it first.
    #[error("object has not been initialized")]
    Uninitialized,

    /// The operation does not apply to this kind of object.
    #[error("unsupported operation: {0}")]
    Unsupported(&'static str),

    /// A notification referenced a different object than the one pulled.
    #[error("notification for {actual} does not match object {expected}")]
    MismatchedNotification { expected: Ghid, actual: Ghid },

    /// No container in the target history could be opened.
    #[error("no recoverable state for {0}")]
    UnrecoverableState(Ghid),

    #[error("no secret known for {0}")]
    UnknownSecret(Ghid),

    #[error("conflicting secrets for {0}")]
    ConflictingSecrets(Ghid),

    /// The secret chain could not be advanced or healed.
    #[error("ratchet failed for {proxy}: {reason}")]
    Ratchet { proxy: Ghid, reason: String },

    /// A container failed to decrypt or authenticate. Its secret is abandoned.
    #[error("security error opening {ghid}: {reason}")]
    Security { ghid: Ghid, reason: String },

    /// Application state could not be serialized or deserialized.
    #[error("state serialization error: {0}")]
    State(String),

    #[error("primitive error: {0}")]
    Golix(#[from] GolixError),

    #[error("ingest failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("lookup failed: {0}")]
    Store(#[from] StoreError),

    /// A detached commit task panicked.
    #[error("commit task aborted: {0}")]
    Aborted(String),
}

/// Result alias for object operations.
pub type GaoResult<T> = Result<T, GaoError>;
