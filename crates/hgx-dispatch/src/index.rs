use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::debug;

use hgx_core::{Gao, GaoContext};
use hgx_types::{ApiId, Ghid};

use crate::dispatchable::DispatchableState;
use crate::error::{DispatchError, DispatchResult};

/// Read-only view of the objects a node knows about.
#[async_trait]
pub trait ObjectIndex: Send + Sync {
    /// API identifier the object was written for.
    async fn api_id(&self, ghid: &Ghid) -> DispatchResult<ApiId>;
}

/// In-memory object index.
#[derive(Debug, Default)]
pub struct ApiRegistry {
    apis: RwLock<HashMap<Ghid, ApiId>>,
}

impl ApiRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the API of `ghid`, replacing any earlier entry.
    pub fn insert(&self, ghid: Ghid, api_id: ApiId) {
        self.apis.write().expect("lock poisoned").insert(ghid, api_id);
    }

    pub fn remove(&self, ghid: &Ghid) -> Option<ApiId> {
        self.apis.write().expect("lock poisoned").remove(ghid)
    }

    pub fn len(&self) -> usize {
        self.apis.read().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectIndex for ApiRegistry {
    async fn api_id(&self, ghid: &Ghid) -> DispatchResult<ApiId> {
        self.apis
            .read()
            .expect("lock poisoned")
            .get(ghid)
            .copied()
            .ok_or(DispatchError::UnknownObject(*ghid))
    }
}

/// Object index that hydrates dispatchable objects from the librarian.
///
/// API identifiers never change, so each one is loaded once.
pub struct GaoIndex {
    ctx: GaoContext,
    resolved: ApiRegistry,
}

impl GaoIndex {
    /// Index reading objects through `ctx`.
    pub fn new(ctx: GaoContext) -> Self {
        Self {
            ctx,
            resolved: ApiRegistry::new(),
        }
    }
}

#[async_trait]
impl ObjectIndex for GaoIndex {
    async fn api_id(&self, ghid: &Ghid) -> DispatchResult<ApiId> {
        if let Ok(api_id) = self.resolved.api_id(ghid).await {
            return Ok(api_id);
        }
        let gao = Gao::<DispatchableState>::from_ghid(&self.ctx, *ghid, None).await?;
        let api_id = gao.with_state(|s| s.api_id);
        debug!(ghid = %ghid.short_hex(), api = %api_id, "resolved api id");
        self.resolved.insert(*ghid, api_id);
        Ok(api_id)
    }
}

impl std::fmt::Debug for GaoIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaoIndex")
            .field("resolved", &self.resolved.len())
            .finish()
    }
}
