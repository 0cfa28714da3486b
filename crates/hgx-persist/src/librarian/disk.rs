use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use hgx_types::Ghid;

use crate::error::{StoreError, StoreResult};
use crate::keyed_lock::KeyedLock;
use crate::librarian::shelf::Shelf;

const EXTENSION: &str = "ghid";

/// Shelf persisting each entry as `<ghid-hex>.ghid` in a cache directory.
///
/// Files hold exactly the raw primitive bytes; nothing else is written.
/// Access to any single file is serialized by a per-ghid lock, and writes go
/// through a temporary file and an atomic rename so a file is either absent
/// or complete.
pub struct DiskShelf {
    dir: PathBuf,
    locks: KeyedLock<Ghid>,
}

impl DiskShelf {
    /// Open a shelf over an existing directory.
    pub async fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Self {
                dir,
                locks: KeyedLock::new(),
            }),
            _ => Err(StoreError::CacheDir(dir)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, ghid: &Ghid) -> PathBuf {
        self.dir.join(format!("{}.{EXTENSION}", ghid.to_hex()))
    }
}

impl std::fmt::Debug for DiskShelf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskShelf").field("dir", &self.dir).finish()
    }
}

#[async_trait]
impl Shelf for DiskShelf {
    async fn put(&self, ghid: &Ghid, data: &[u8]) -> StoreResult<()> {
        let _guard = self.locks.lock(*ghid).await;
        let dir = self.dir.clone();
        let path = self.path_for(ghid);
        let data = data.to_vec();

        tokio::task::spawn_blocking(move || -> StoreResult<()> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(&data)?;
            tmp.as_file().sync_all()?;
            tmp.persist(&path).map_err(|e| StoreError::Io(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;

        debug!(ghid = %ghid.short_hex(), "wrote cache file");
        Ok(())
    }

    async fn get(&self, ghid: &Ghid) -> StoreResult<Option<Vec<u8>>> {
        let _guard = self.locks.lock(*ghid).await;
        match tokio::fs::read(self.path_for(ghid)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, ghid: &Ghid) -> StoreResult<bool> {
        let _guard = self.locks.lock(*ghid).await;
        match tokio::fs::remove_file(self.path_for(ghid)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, ghid: &Ghid) -> StoreResult<bool> {
        let _guard = self.locks.lock(*ghid).await;
        Ok(tokio::fs::try_exists(self.path_for(ghid)).await?)
    }

    async fn list(&self) -> StoreResult<Vec<Ghid>> {
        let mut ghids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match Ghid::from_hex(stem) {
                Ok(ghid) => ghids.push(ghid),
                Err(e) => warn!(file = %path.display(), error = %e, "ignoring unparseable cache file"),
            }
        }
        ghids.sort();
        Ok(ghids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_requires_existing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("nope");
        assert!(matches!(
            DiskShelf::open(&missing).await,
            Err(StoreError::CacheDir(_))
        ));

        let file = tmp.path().join("file");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            DiskShelf::open(&file).await,
            Err(StoreError::CacheDir(_))
        ));
    }

    #[tokio::test]
    async fn files_are_named_by_ghid() {
        let tmp = tempfile::tempdir().unwrap();
        let shelf = DiskShelf::open(tmp.path()).await.unwrap();
        let ghid = Ghid::from_bytes(b"entry");

        shelf.put(&ghid, b"raw bytes").await.unwrap();

        let expected = tmp.path().join(format!("{}.ghid", ghid.to_hex()));
        assert_eq!(std::fs::read(expected).unwrap(), b"raw bytes");
        assert_eq!(shelf.get(&ghid).await.unwrap().unwrap(), b"raw bytes");
        assert!(shelf.exists(&ghid).await.unwrap());
    }

    #[tokio::test]
    async fn missing_entry_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let shelf = DiskShelf::open(tmp.path()).await.unwrap();
        let ghid = Ghid::from_bytes(b"absent");
        assert_eq!(shelf.get(&ghid).await.unwrap(), None);
        assert!(!shelf.remove(&ghid).await.unwrap());
    }

    #[tokio::test]
    async fn list_skips_foreign_files() {
        let tmp = tempfile::tempdir().unwrap();
        let shelf = DiskShelf::open(tmp.path()).await.unwrap();
        let ghid = Ghid::from_bytes(b"kept");
        shelf.put(&ghid, b"1").await.unwrap();
        std::fs::write(tmp.path().join("notes.txt"), b"x").unwrap();
        std::fs::write(tmp.path().join("zz.ghid"), b"x").unwrap();

        assert_eq!(shelf.list().await.unwrap(), vec![ghid]);
    }

    #[tokio::test]
    async fn concurrent_writes_to_one_ghid_do_not_interleave() {
        let tmp = tempfile::tempdir().unwrap();
        let shelf = std::sync::Arc::new(DiskShelf::open(tmp.path()).await.unwrap());
        let ghid = Ghid::from_bytes(b"hot");
        let payloads: Vec<Vec<u8>> = (0u8..8).map(|i| vec![i; 4096]).collect();

        let mut handles = Vec::new();
        for payload in payloads.clone() {
            let shelf = std::sync::Arc::clone(&shelf);
            handles.push(tokio::spawn(async move { shelf.put(&ghid, &payload).await }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }

        let stored = shelf.get(&ghid).await.unwrap().unwrap();
        assert!(payloads.contains(&stored));
    }
}
