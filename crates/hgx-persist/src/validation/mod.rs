//! Validation stages run by the ingest pipeline.
//!
//! Stages are stateless: everything they know comes from librarian lookups.

mod bookie;
mod enforcer;
mod lawyer;

use async_trait::async_trait;

use hgx_golix::Primitive;

use crate::error::ValidationResult;
use crate::librarian::Librarian;

pub use bookie::Bookie;
pub use enforcer::Enforcer;
pub use lawyer::Lawyer;

/// A single validation step in the ingest pipeline.
///
/// Stages are evaluated in order; the first failure rejects the primitive.
/// Implementations never store, and validating an already-accepted
/// primitive again must succeed.
#[async_trait]
pub trait ValidationStage: Send + Sync {
    /// Human-readable stage name, used in logs.
    fn name(&self) -> &str;

    async fn validate(&self, librarian: &dyn Librarian, primitive: &Primitive)
        -> ValidationResult<()>;
}
