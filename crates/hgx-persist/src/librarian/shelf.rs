use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use hgx_types::Ghid;

use crate::error::StoreResult;

/// Definitive byte store behind a librarian, keyed by reference ghid.
///
/// A shelf is a pure key-value store: it never interprets the bytes.
#[async_trait]
pub trait Shelf: Send + Sync + 'static {
    /// Write (or overwrite) the bytes for `ghid`.
    async fn put(&self, ghid: &Ghid, data: &[u8]) -> StoreResult<()>;

    /// Read the bytes for `ghid`. Returns `Ok(None)` if absent.
    async fn get(&self, ghid: &Ghid) -> StoreResult<Option<Vec<u8>>>;

    /// Delete the bytes for `ghid`. Returns `true` if they existed.
    async fn remove(&self, ghid: &Ghid) -> StoreResult<bool>;

    async fn exists(&self, ghid: &Ghid) -> StoreResult<bool>;

    /// Every ghid currently on the shelf, sorted.
    async fn list(&self) -> StoreResult<Vec<Ghid>>;
}

/// HashMap-based shelf. Data is lost when the shelf is dropped.
#[derive(Debug, Default)]
pub struct MemoryShelf {
    entries: RwLock<HashMap<Ghid, Vec<u8>>>,
}

impl MemoryShelf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().expect("lock poisoned").is_empty()
    }
}

#[async_trait]
impl Shelf for MemoryShelf {
    async fn put(&self, ghid: &Ghid, data: &[u8]) -> StoreResult<()> {
        self.entries
            .write()
            .expect("lock poisoned")
            .insert(*ghid, data.to_vec());
        Ok(())
    }

    async fn get(&self, ghid: &Ghid) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.entries.read().expect("lock poisoned").get(ghid).cloned())
    }

    async fn remove(&self, ghid: &Ghid) -> StoreResult<bool> {
        Ok(self
            .entries
            .write()
            .expect("lock poisoned")
            .remove(ghid)
            .is_some())
    }

    async fn exists(&self, ghid: &Ghid) -> StoreResult<bool> {
        Ok(self.entries.read().expect("lock poisoned").contains_key(ghid))
    }

    async fn list(&self) -> StoreResult<Vec<Ghid>> {
        let mut ghids: Vec<Ghid> = self
            .entries
            .read()
            .expect("lock poisoned")
            .keys()
            .copied()
            .collect();
        ghids.sort();
        Ok(ghids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_remove() {
        let shelf = MemoryShelf::new();
        let ghid = Ghid::from_bytes(b"x");

        assert_eq!(shelf.get(&ghid).await.unwrap(), None);
        shelf.put(&ghid, b"bytes").await.unwrap();
        assert!(shelf.exists(&ghid).await.unwrap());
        assert_eq!(shelf.get(&ghid).await.unwrap().unwrap(), b"bytes");
        assert_eq!(shelf.len(), 1);

        assert!(shelf.remove(&ghid).await.unwrap());
        assert!(!shelf.remove(&ghid).await.unwrap());
        assert!(shelf.is_empty());
    }

    #[tokio::test]
    async fn list_is_sorted() {
        let shelf = MemoryShelf::new();
        for tag in [b"c", b"a", b"b"] {
            shelf.put(&Ghid::from_bytes(tag), tag).await.unwrap();
        }
        let listed = shelf.list().await.unwrap();
        let mut sorted = listed.clone();
        sorted.sort();
        assert_eq!(listed, sorted);
        assert_eq!(listed.len(), 3);
    }
}
