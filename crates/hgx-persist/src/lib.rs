//! Persistence core for Hypergolix.
//!
//! Every primitive that enters the local node, whether received from a peer
//! or produced by a local object, passes through the [`IngestPipeline`]:
//! it is validated by a fail-fast chain of [`ValidationStage`]s and then
//! cached by a [`Librarian`].
//!
//! # Components
//!
//! - [`Librarian`] — content-addressed cache of raw primitive bytes plus the
//!   bind/debind/request indices and dynamic-frame resolution.
//!   [`MemoryLibrarian`] and [`DiskLibrarian`] differ only in their shelf.
//! - [`Enforcer`] — structural rules: legal target kinds and counter monotonicity.
//! - [`Lawyer`] — authorship rules: authors resolve to identities, frames and
//!   debindings agree with their author of record.
//! - [`Bookie`] — lifetime rules: containers must be bound, debound things stay dead.
//! - [`IngestPipeline`] — the [`Ingest`] implementation tying them together.
//!
//! # Design Rules
//!
//! 1. Validators never store; the only write they can trigger is the eviction
//!    performed by [`Librarian::is_debound`].
//! 2. A dynamic frame is durably stored before its predecessor is evicted.
//! 3. Disk I/O for one reference ghid is serialized; different ghids run in parallel.
//! 4. [`Librarian::is_debound`] is a write-bearing read: it evicts debindings
//!    that fail re-validation against a target that arrived after them.

pub mod config;
pub mod error;
pub mod keyed_lock;
pub mod librarian;
pub mod pipeline;
pub mod validation;

pub use config::LibrarianConfig;
pub use error::{IngestError, IngestResult, StoreError, StoreResult, ValidationError, ValidationResult};
pub use keyed_lock::KeyedLock;
pub use librarian::{
    open_librarian, CachedLibrarian, DiskLibrarian, DiskShelf, Librarian, MemoryLibrarian,
    MemoryShelf, Shelf,
};
pub use pipeline::{Ingest, IngestPipeline, NullUpstream, Upstream};
pub use validation::{Bookie, Enforcer, Lawyer, ValidationStage};
