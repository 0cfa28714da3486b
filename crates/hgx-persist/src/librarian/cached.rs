use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use lru::LruCache;
use tracing::{debug, error, info, warn};

use hgx_golix::{Codec, Primitive};
use hgx_types::Ghid;

use crate::config::LibrarianConfig;
use crate::error::{StoreError, StoreResult, ValidationError};
use crate::keyed_lock::KeyedLock;
use crate::librarian::disk::DiskShelf;
use crate::librarian::index::LibraryIndex;
use crate::librarian::shelf::{MemoryShelf, Shelf};
use crate::librarian::Librarian;
use crate::validation::{Enforcer, Lawyer};

/// Librarian over any [`Shelf`].
///
/// Parsed primitives are kept in a bounded LRU lookup cache (the catalog);
/// on a catalog miss the raw bytes are re-read from the shelf and parsed.
/// The shelf and the indices are never evicted implicitly.
///
/// Frame advances of one logical ghid are serialized end to end, from
/// resolving the current frame to evicting it.
pub struct CachedLibrarian<S: Shelf> {
    shelf: S,
    index: Mutex<LibraryIndex>,
    catalog: Mutex<LruCache<Ghid, Primitive>>,
    advancing: KeyedLock<Ghid>,
}

/// Librarian keeping raw bytes in memory.
pub type MemoryLibrarian = CachedLibrarian<MemoryShelf>;

/// Librarian keeping raw bytes in a cache directory.
pub type DiskLibrarian = CachedLibrarian<DiskShelf>;

impl<S: Shelf> CachedLibrarian<S> {
    pub fn new(shelf: S, config: &LibrarianConfig) -> Self {
        let capacity = NonZeroUsize::new(config.memory_cache).unwrap_or(NonZeroUsize::MIN);
        Self {
            shelf,
            index: Mutex::new(LibraryIndex::default()),
            catalog: Mutex::new(LruCache::new(capacity)),
            advancing: KeyedLock::new(),
        }
    }

    /// The backing byte store.
    pub fn shelf(&self) -> &S {
        &self.shelf
    }

    /// Number of parsed primitives currently held by the lookup cache.
    pub fn catalog_len(&self) -> usize {
        self.catalog.lock().expect("lock poisoned").len()
    }

    fn resolve(&self, ghid: &Ghid) -> Ghid {
        self.resolve_frame(ghid).unwrap_or(*ghid)
    }

    /// Parsed primitive stored under an exact reference ghid.
    async fn load_frame(&self, reference: &Ghid) -> StoreResult<Primitive> {
        let cached = self
            .catalog
            .lock()
            .expect("lock poisoned")
            .get(reference)
            .cloned();
        if let Some(primitive) = cached {
            return Ok(primitive);
        }

        let data = self
            .shelf
            .get(reference)
            .await?
            .ok_or(StoreError::DoesNotExist(*reference))?;
        let primitive = Codec::load(&data).map_err(|e| StoreError::Malformed {
            ghid: *reference,
            reason: e.to_string(),
        })?;
        self.catalog
            .lock()
            .expect("lock poisoned")
            .put(*reference, primitive.clone());
        Ok(primitive)
    }

    async fn store_inner(
        &self,
        primitive: &Primitive,
        data: &[u8],
        write_through: bool,
    ) -> StoreResult<()> {
        let reference = primitive.reference_ghid();

        // Held until the superseded frame is gone.
        let _advance = match primitive {
            Primitive::DynamicBinding(binding) => Some(self.advancing.lock(binding.ghid).await),
            _ => None,
        };

        // The frame this one supersedes, if any.
        let mut previous = None;
        if let Primitive::DynamicBinding(binding) = primitive {
            if let Some(current) = self.resolve_frame(&binding.ghid).filter(|f| *f != reference) {
                match self.load_frame(&current).await {
                    Ok(Primitive::DynamicBinding(existing)) if existing.counter >= binding.counter => {
                        warn!(
                            ghid = %binding.ghid.short_hex(),
                            existing = existing.counter,
                            proposed = binding.counter,
                            "ignoring stale dynamic frame"
                        );
                        self.index
                            .lock()
                            .expect("lock poisoned")
                            .retire(reference, binding.ghid);
                        if !write_through {
                            self.shelf.remove(&reference).await?;
                        }
                        return Ok(());
                    }
                    Ok(existing) => previous = Some(existing),
                    Err(StoreError::DoesNotExist(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }

        if write_through {
            self.shelf.put(&reference, data).await?;
        }
        self.index
            .lock()
            .expect("lock poisoned")
            .add(primitive, previous.as_ref());
        self.catalog
            .lock()
            .expect("lock poisoned")
            .put(reference, primitive.clone());
        debug!(
            ghid = %primitive.ghid().short_hex(),
            reference = %reference.short_hex(),
            kind = %primitive.kind(),
            "stored primitive"
        );

        if let Some(old) = previous {
            debug!(frame = %old.reference_ghid().short_hex(), "retiring superseded frame");
            self.evict(&old).await?;
        }
        Ok(())
    }

    async fn evict(&self, primitive: &Primitive) -> StoreResult<()> {
        let reference = primitive.reference_ghid();
        self.index.lock().expect("lock poisoned").remove(primitive);
        self.catalog.lock().expect("lock poisoned").pop(&reference);
        self.shelf.remove(&reference).await?;
        Ok(())
    }
}

impl MemoryLibrarian {
    /// An empty in-memory librarian.
    pub fn in_memory(config: &LibrarianConfig) -> Self {
        Self::new(MemoryShelf::new(), config)
    }
}

impl Default for MemoryLibrarian {
    fn default() -> Self {
        Self::in_memory(&LibrarianConfig::default())
    }
}

impl DiskLibrarian {
    /// Open (but do not restore) a librarian over an existing cache directory.
    pub async fn open(dir: impl AsRef<Path>, config: &LibrarianConfig) -> StoreResult<Self> {
        Ok(Self::new(DiskShelf::open(dir).await?, config))
    }
}

impl<S: Shelf> std::fmt::Debug for CachedLibrarian<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedLibrarian")
            .field("catalog_len", &self.catalog_len())
            .finish()
    }
}

#[async_trait]
impl<S: Shelf> Librarian for CachedLibrarian<S> {
    async fn store(&self, primitive: &Primitive, data: &[u8]) -> StoreResult<()> {
        self.store_inner(primitive, data, true).await
    }

    async fn retrieve(&self, ghid: &Ghid) -> StoreResult<Vec<u8>> {
        self.shelf
            .get(&self.resolve(ghid))
            .await?
            .ok_or(StoreError::DoesNotExist(*ghid))
    }

    async fn summarize(&self, ghid: &Ghid) -> StoreResult<Primitive> {
        match self.load_frame(&self.resolve(ghid)).await {
            Err(StoreError::DoesNotExist(_)) => Err(StoreError::DoesNotExist(*ghid)),
            other => other,
        }
    }

    async fn abandon(&self, primitive: &Primitive) -> StoreResult<()> {
        debug!(reference = %primitive.reference_ghid().short_hex(), "abandoning primitive");
        self.evict(primitive).await
    }

    async fn contains(&self, ghid: &Ghid) -> StoreResult<bool> {
        let reference = self.resolve(ghid);
        let cached = self
            .catalog
            .lock()
            .expect("lock poisoned")
            .contains(&reference);
        if cached {
            return Ok(true);
        }
        self.shelf.exists(&reference).await
    }

    fn resolve_frame(&self, ghid: &Ghid) -> Option<Ghid> {
        self.index.lock().expect("lock poisoned").resolve(ghid)
    }

    fn superseded_by(&self, frame: &Ghid) -> Option<Ghid> {
        self.index.lock().expect("lock poisoned").superseded_by(frame)
    }

    fn bind_status(&self, ghid: &Ghid) -> BTreeSet<Ghid> {
        self.index.lock().expect("lock poisoned").bound(ghid)
    }

    fn debind_status(&self, ghid: &Ghid) -> BTreeSet<Ghid> {
        self.index.lock().expect("lock poisoned").debound(ghid)
    }

    fn recipient_status(&self, ghid: &Ghid) -> BTreeSet<Ghid> {
        self.index.lock().expect("lock poisoned").requests(ghid)
    }

    async fn is_debound(&self, primitive: &Primitive) -> StoreResult<bool> {
        let debindings = self.debind_status(&primitive.ghid());
        let mut invalidated = 0;

        for ghid in &debindings {
            let debinding = match self.summarize(ghid).await {
                Ok(Primitive::Debinding(d)) => d,
                Ok(_) | Err(StoreError::DoesNotExist(_)) => {
                    invalidated += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let verdict = match Enforcer
                .validate_debinding(self, &debinding, Some(primitive))
                .await
            {
                Ok(()) => {
                    Lawyer
                        .validate_debinding(self, &debinding, Some(primitive))
                        .await
                }
                err => err,
            };

            match verdict {
                Ok(()) => {}
                Err(
                    e @ (ValidationError::InvalidTarget { .. }
                    | ValidationError::InconsistentAuthor { .. }),
                ) => {
                    error!(
                        debinding = %ghid.short_hex(),
                        target = %primitive.ghid().short_hex(),
                        error = %e,
                        "evicting debinding that fails re-validation"
                    );
                    self.abandon(&Primitive::Debinding(debinding)).await?;
                    invalidated += 1;
                }
                Err(ValidationError::Lookup(e)) => return Err(e),
                Err(e) => {
                    debug!(debinding = %ghid.short_hex(), error = %e, "debinding kept");
                }
            }
        }

        Ok(debindings.len() > invalidated)
    }

    async fn restore(&self) -> StoreResult<usize> {
        let mut restored = 0;
        for ghid in self.shelf.list().await? {
            let Some(data) = self.shelf.get(&ghid).await? else {
                continue;
            };
            let primitive = match Codec::load(&data) {
                Ok(p) => p,
                Err(e) => {
                    warn!(ghid = %ghid.short_hex(), error = %e, "skipping unreadable cache entry");
                    continue;
                }
            };
            if primitive.reference_ghid() != ghid {
                warn!(ghid = %ghid.short_hex(), "skipping cache entry stored under the wrong name");
                continue;
            }
            self.store_inner(&primitive, &data, false).await?;
            restored += 1;
        }
        info!(restored, "librarian restored from shelf");
        Ok(restored)
    }

    async fn walk_cache(&self) -> StoreResult<Vec<Ghid>> {
        self.shelf.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hgx_golix::{FirstParty, IdentityProvider, Packed};

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    async fn with_identity(lib: &dyn Librarian, party: &FirstParty) {
        let decl = party.declaration();
        lib.store(&decl.to_primitive(), &decl.bytes).await.unwrap();
    }

    async fn put<T: Clone + Into<Primitive>>(lib: &dyn Librarian, packed: &Packed<T>) {
        lib.store(&packed.to_primitive(), &packed.bytes).await.unwrap();
    }

    fn small_config(memory_cache: usize) -> LibrarianConfig {
        LibrarianConfig {
            memory_cache,
            cache_dir: None,
        }
    }

    // ---------------------------------------------------------------
    // Storage and lookup
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn retrieve_returns_exact_bytes() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let payloads: [&[u8]; 4] = [b"", b"hello", &[0u8; 1024], &[0xff, 0x00, 0x7f]];

        for payload in payloads {
            let container = alice.make_container(payload, &alice.new_secret()).unwrap();
            put(&lib, &container).await;
            let ghid = Codec::address(&container.bytes);
            assert_eq!(lib.retrieve(&ghid).await.unwrap(), container.bytes);
        }
    }

    #[tokio::test]
    async fn store_is_idempotent() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();

        put(&lib, &binding).await;
        put(&lib, &binding).await;

        assert_eq!(lib.bind_status(&Ghid::from_bytes(b"t")).len(), 1);
        assert_eq!(lib.walk_cache().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn missing_entry_does_not_exist() {
        let lib = MemoryLibrarian::default();
        let ghid = Ghid::from_bytes(b"nothing");
        assert!(matches!(
            lib.retrieve(&ghid).await,
            Err(StoreError::DoesNotExist(g)) if g == ghid
        ));
        assert!(matches!(
            lib.summarize(&ghid).await,
            Err(StoreError::DoesNotExist(_))
        ));
        assert!(!lib.contains(&ghid).await.unwrap());
    }

    #[tokio::test]
    async fn summarize_reloads_after_catalog_eviction() {
        let lib = MemoryLibrarian::in_memory(&small_config(1));
        let alice = FirstParty::generate().unwrap();
        let first = alice.make_binding_stat(Ghid::from_bytes(b"a")).unwrap();
        let second = alice.make_binding_stat(Ghid::from_bytes(b"b")).unwrap();

        put(&lib, &first).await;
        put(&lib, &second).await;
        assert_eq!(lib.catalog_len(), 1);

        let summary = lib.summarize(&first.primitive.ghid).await.unwrap();
        assert_eq!(summary, first.to_primitive());
    }

    #[tokio::test]
    async fn abandon_is_idempotent() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        put(&lib, &binding).await;

        lib.abandon(&binding.to_primitive()).await.unwrap();
        lib.abandon(&binding.to_primitive()).await.unwrap();

        assert!(!lib.contains(&binding.primitive.ghid).await.unwrap());
        assert!(lib.bind_status(&Ghid::from_bytes(b"t")).is_empty());
    }

    #[tokio::test]
    async fn recipient_index_tracks_requests() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let bob = Ghid::from_bytes(b"bob");
        let request = alice.make_request(bob, b"handshake").unwrap();
        put(&lib, &request).await;
        assert!(lib.recipient_status(&bob).contains(&request.primitive.ghid));
    }

    // ---------------------------------------------------------------
    // Dynamic frames
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn new_frame_retires_previous() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let c0 = Ghid::from_bytes(b"c0");
        let c1 = Ghid::from_bytes(b"c1");

        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice.make_binding_dyn(c1, Some(logical), 1, &[c0]).unwrap();

        put(&lib, &f0).await;
        assert_eq!(lib.resolve_frame(&logical), Some(f0.primitive.frame_ghid));
        put(&lib, &f1).await;

        assert_eq!(lib.resolve_frame(&logical), Some(f1.primitive.frame_ghid));
        assert_eq!(lib.retrieve(&logical).await.unwrap(), f1.bytes);
        assert!(!lib.contains(&f0.primitive.frame_ghid).await.unwrap());
        assert!(lib.bind_status(&c0).is_empty());
        assert!(lib.bind_status(&c1).contains(&logical));
        assert_eq!(lib.walk_cache().await.unwrap(), vec![f1.primitive.frame_ghid]);
    }

    #[tokio::test]
    async fn stale_frame_never_moves_resolver_back() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let c0 = Ghid::from_bytes(b"c0");
        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice
            .make_binding_dyn(Ghid::from_bytes(b"c1"), Some(logical), 1, &[c0])
            .unwrap();

        put(&lib, &f1).await;
        put(&lib, &f0).await;

        assert_eq!(lib.resolve_frame(&logical), Some(f1.primitive.frame_ghid));
        assert_eq!(lib.superseded_by(&f0.primitive.frame_ghid), Some(logical));
    }

    #[tokio::test]
    async fn retired_frame_names_its_logical_ghid() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let c0 = Ghid::from_bytes(b"c0");
        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice
            .make_binding_dyn(Ghid::from_bytes(b"c1"), Some(logical), 1, &[c0])
            .unwrap();

        put(&lib, &f0).await;
        assert_eq!(lib.superseded_by(&f0.primitive.frame_ghid), None);
        put(&lib, &f1).await;

        assert_eq!(lib.superseded_by(&f0.primitive.frame_ghid), Some(logical));
        assert_eq!(lib.superseded_by(&f1.primitive.frame_ghid), None);
        assert!(matches!(
            lib.summarize(&f0.primitive.frame_ghid).await,
            Err(StoreError::DoesNotExist(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_frames_advance_atomically() {
        let alice = FirstParty::generate().unwrap();
        let (c0, c1, c2) = (
            Ghid::from_bytes(b"c0"),
            Ghid::from_bytes(b"c1"),
            Ghid::from_bytes(b"c2"),
        );
        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice.make_binding_dyn(c1, Some(logical), 1, &[c0]).unwrap();
        let f2 = alice.make_binding_dyn(c2, Some(logical), 2, &[c1, c0]).unwrap();

        for _ in 0..25 {
            let tmp = tempfile::tempdir().unwrap();
            let lib = Arc::new(
                DiskLibrarian::open(tmp.path(), &LibrarianConfig::default())
                    .await
                    .unwrap(),
            );
            put(lib.as_ref(), &f0).await;

            let mut tasks = tokio::task::JoinSet::new();
            for frame in [f1.clone(), f2.clone()] {
                let lib = Arc::clone(&lib);
                tasks.spawn(async move { put(lib.as_ref(), &frame).await });
            }
            while let Some(joined) = tasks.join_next().await {
                joined.unwrap();
            }

            assert_eq!(lib.resolve_frame(&logical), Some(f2.primitive.frame_ghid));
            assert_eq!(lib.walk_cache().await.unwrap(), vec![f2.primitive.frame_ghid]);
            assert!(lib.bind_status(&c0).is_empty());
            assert!(lib.bind_status(&c1).is_empty());
            assert!(lib.bind_status(&c2).contains(&logical));
        }
    }

    // ---------------------------------------------------------------
    // Debinding re-validation
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn early_debinding_from_wrong_author_is_evicted() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let mallory = FirstParty::generate().unwrap();
        with_identity(&lib, &alice).await;
        with_identity(&lib, &mallory).await;

        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        let debinding = mallory.make_debinding(binding.primitive.ghid).unwrap();

        // Debinding first: its target is unknown, so nothing can be checked yet.
        put(&lib, &debinding).await;
        put(&lib, &binding).await;
        assert_eq!(lib.debind_status(&binding.primitive.ghid).len(), 1);

        assert!(!lib.is_debound(&binding.to_primitive()).await.unwrap());
        assert!(lib.debind_status(&binding.primitive.ghid).is_empty());
        assert!(!lib.contains(&debinding.primitive.ghid).await.unwrap());
    }

    #[tokio::test]
    async fn legitimate_debinding_is_kept() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        with_identity(&lib, &alice).await;

        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        let debinding = alice.make_debinding(binding.primitive.ghid).unwrap();
        put(&lib, &binding).await;
        put(&lib, &debinding).await;

        assert!(lib.is_debound(&binding.to_primitive()).await.unwrap());
        assert!(lib.is_debound(&binding.to_primitive()).await.unwrap());
        assert_eq!(lib.debind_status(&binding.primitive.ghid).len(), 1);
    }

    // ---------------------------------------------------------------
    // Disk persistence
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn disk_restore_rebuilds_indices() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LibrarianConfig::default();
        let alice = FirstParty::generate().unwrap();
        let c0 = Ghid::from_bytes(b"c0");
        let c1 = Ghid::from_bytes(b"c1");
        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice.make_binding_dyn(c1, Some(logical), 1, &[c0]).unwrap();
        let hold = alice.make_binding_stat(logical).unwrap();

        {
            let lib = DiskLibrarian::open(tmp.path(), &config).await.unwrap();
            with_identity(&lib, &alice).await;
            put(&lib, &f0).await;
            put(&lib, &f1).await;
            put(&lib, &hold).await;
        }

        let lib = DiskLibrarian::open(tmp.path(), &config).await.unwrap();
        assert_eq!(lib.restore().await.unwrap(), 3);
        assert_eq!(lib.resolve_frame(&logical), Some(f1.primitive.frame_ghid));
        assert!(lib.bind_status(&c1).contains(&logical));
        assert!(lib.bind_status(&logical).contains(&hold.primitive.ghid));
        assert_eq!(lib.summarize(&alice.whoami()).await.unwrap(), alice.declaration().to_primitive());
    }

    #[tokio::test]
    async fn restore_discards_leftover_stale_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let config = LibrarianConfig::default();
        let alice = FirstParty::generate().unwrap();
        let c0 = Ghid::from_bytes(b"c0");
        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice
            .make_binding_dyn(Ghid::from_bytes(b"c1"), Some(logical), 1, &[c0])
            .unwrap();

        // Simulate a crash between writing f1 and evicting f0.
        let shelf = DiskShelf::open(tmp.path()).await.unwrap();
        shelf.put(&f0.primitive.frame_ghid, &f0.bytes).await.unwrap();
        shelf.put(&f1.primitive.frame_ghid, &f1.bytes).await.unwrap();

        let lib = DiskLibrarian::open(tmp.path(), &config).await.unwrap();
        lib.restore().await.unwrap();

        assert_eq!(lib.resolve_frame(&logical), Some(f1.primitive.frame_ghid));
        assert_eq!(lib.walk_cache().await.unwrap(), vec![f1.primitive.frame_ghid]);
    }

    #[tokio::test]
    async fn open_librarian_picks_backend() {
        let memory = open_librarian_for(None).await;
        assert!(memory.walk_cache().await.unwrap().is_empty());

        let tmp = tempfile::tempdir().unwrap();
        let disk = open_librarian_for(Some(tmp.path())).await;
        let alice = FirstParty::generate().unwrap();
        with_identity(disk.as_ref(), &alice).await;
        assert!(tmp
            .path()
            .join(format!("{}.ghid", alice.whoami().to_hex()))
            .exists());
    }

    async fn open_librarian_for(dir: Option<&Path>) -> Arc<dyn Librarian> {
        let config = LibrarianConfig {
            cache_dir: dir.map(Path::to_path_buf),
            ..LibrarianConfig::default()
        };
        crate::librarian::open_librarian(&config).await.unwrap()
    }
}
