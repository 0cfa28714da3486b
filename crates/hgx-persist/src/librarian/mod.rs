//! Content-addressed primitive cache.

mod cached;
mod disk;
mod index;
mod shelf;

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use hgx_golix::Primitive;
use hgx_types::Ghid;

use crate::config::LibrarianConfig;
use crate::error::StoreResult;

pub use cached::{CachedLibrarian, DiskLibrarian, MemoryLibrarian};
pub use disk::DiskShelf;
pub use shelf::{MemoryShelf, Shelf};

/// Content-addressed cache of raw primitive bytes and their indices.
///
/// Every entry is keyed by its *reference ghid*: the frame ghid for dynamic
/// bindings, the primitive's own ghid otherwise. Lookups by a dynamic
/// binding's logical ghid are resolved transparently to its current frame.
///
/// The librarian trusts its callers: validation happens before
/// [`store`](Self::store) in the ingest pipeline.
#[async_trait]
pub trait Librarian: Send + Sync {
    /// Idempotent upsert.
    ///
    /// For dynamic bindings the new frame is stored and becomes the resolved
    /// frame for its logical ghid before the previous frame and its index
    /// contributions are evicted. A frame older than the current one never
    /// moves the resolver backwards.
    async fn store(&self, primitive: &Primitive, data: &[u8]) -> StoreResult<()>;

    /// Raw bytes for `ghid`, resolving dynamic addresses. Fails
    /// [`DoesNotExist`](crate::StoreError::DoesNotExist) on a miss.
    async fn retrieve(&self, ghid: &Ghid) -> StoreResult<Vec<u8>>;

    /// Parsed description for `ghid`, resolving dynamic addresses. A lookup
    /// cache miss is filled from the shelf without going through ingest.
    async fn summarize(&self, ghid: &Ghid) -> StoreResult<Primitive>;

    /// Force-remove a provably invalid entry. Never fails on a double abandon.
    async fn abandon(&self, primitive: &Primitive) -> StoreResult<()>;

    /// Existence check, resolving dynamic addresses.
    async fn contains(&self, ghid: &Ghid) -> StoreResult<bool>;

    /// Current frame ghid for a dynamic logical ghid.
    fn resolve_frame(&self, ghid: &Ghid) -> Option<Ghid>;

    /// Logical ghid of a frame that a newer frame has retired. Retired
    /// frames are no longer cached, but notifications may still name them.
    fn superseded_by(&self, frame: &Ghid) -> Option<Ghid>;

    /// Bindings (static, or dynamic by logical ghid) targeting `ghid`.
    fn bind_status(&self, ghid: &Ghid) -> BTreeSet<Ghid>;

    /// Debindings targeting `ghid`.
    fn debind_status(&self, ghid: &Ghid) -> BTreeSet<Ghid>;

    /// Requests addressed to the identity `ghid`.
    fn recipient_status(&self, ghid: &Ghid) -> BTreeSet<Ghid>;

    /// Whether anything binds the primitive.
    fn is_bound(&self, primitive: &Primitive) -> bool {
        !self.bind_status(&primitive.ghid()).is_empty()
    }

    /// Whether a valid debinding targets the primitive.
    ///
    /// **Write-bearing read.** Every cached debinding of the primitive is
    /// re-validated against it, and debindings that fail (wrong author,
    /// illegal target) are abandoned. A debinding can arrive before its
    /// target, when its legality could not yet be checked; this is where
    /// that check finally happens.
    async fn is_debound(&self, primitive: &Primitive) -> StoreResult<bool>;

    /// Rebuild indices from the shelf without writing anything back.
    /// Returns the number of primitives restored.
    async fn restore(&self) -> StoreResult<usize>;

    /// Reference ghids currently on the shelf.
    async fn walk_cache(&self) -> StoreResult<Vec<Ghid>>;
}

/// Build the librarian described by `config`.
///
/// With a cache directory the disk librarian is opened and restored;
/// otherwise an empty in-memory librarian is returned.
pub async fn open_librarian(config: &LibrarianConfig) -> StoreResult<Arc<dyn Librarian>> {
    match &config.cache_dir {
        Some(dir) => {
            let librarian = DiskLibrarian::open(dir, config).await?;
            let restored = librarian.restore().await?;
            info!(dir = %dir.display(), restored, "disk librarian ready");
            Ok(Arc::new(librarian))
        }
        None => Ok(Arc::new(MemoryLibrarian::in_memory(config))),
    }
}
