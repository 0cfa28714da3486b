//! Object core for Hypergolix.
//!
//! A [`Gao`] (accountable object) keeps a piece of application state in
//! sync with a Golix address. Dynamic objects advance through signed frames
//! whose container secrets form a ratchet chain; static objects are a single
//! sealed container.
//!
//! # Key Types
//!
//! - [`Gao`] — an accountable object with `push`, `pull`, `freeze`, `hold` and `delete`.
//! - [`GaoState`] — how application state is packed into a container.
//!   [`JsonState`] covers any serde type.
//! - [`Privateer`] — the secret store with staged, committed, and local tiers.
//! - [`GaoContext`] — the identity, ingest pipeline, and secrets shared by a node's objects.
//! - [`GaoObserver`] — notified after a pull applies an update or deletion.
//!
//! # Design Rules
//!
//! 1. `push` and `pull` on one object never interleave.
//! 2. Commit phases run on detached tasks and cannot be cancelled halfway.
//! 3. A frame that is not newer than the local one never replaces local state.
//! 4. A secret is committed only after it opened or sealed a container, and
//!    a secret that fails to open its container is abandoned.

pub mod config;
pub mod context;
pub mod error;
pub mod gao;
pub mod privateer;
pub mod state;

pub use config::GaoConfig;
pub use context::{GaoContext, GaoObserver};
pub use error::{GaoError, GaoResult};
pub use gao::{Gao, GaoStatus, PullOutcome};
pub use privateer::Privateer;
pub use state::{GaoState, JsonState};
