use std::sync::Arc;

use async_trait::async_trait;

use hgx_golix::IdentityProvider;
use hgx_persist::{Ingest, Librarian};
use hgx_types::Ghid;

use crate::config::GaoConfig;
use crate::privateer::Privateer;

/// Receives object events once a pull has applied them locally.
#[async_trait]
pub trait GaoObserver: Send + Sync {
    /// A newer state of `ghid` was applied.
    async fn updated(&self, ghid: Ghid);

    /// `ghid` was deleted upstream.
    async fn deleted(&self, ghid: Ghid);
}

/// Collaborators shared by every object of a node.
#[derive(Clone)]
pub struct GaoContext {
    /// Identity that signs and seals everything this node writes.
    pub provider: Arc<dyn IdentityProvider>,
    /// Validation and storage path for new primitives.
    pub ingest: Arc<dyn Ingest>,
    pub privateer: Arc<Privateer>,
    /// Told about applied pulls, usually the dispatcher.
    pub observer: Option<Arc<dyn GaoObserver>>,
    pub config: GaoConfig,
}

impl GaoContext {
    /// Context with a fresh secret store, no observer and default config.
    pub fn new(provider: Arc<dyn IdentityProvider>, ingest: Arc<dyn Ingest>) -> Self {
        Self {
            provider,
            ingest,
            privateer: Arc::new(Privateer::new()),
            observer: None,
            config: GaoConfig::default(),
        }
    }

    /// Replace the object configuration.
    pub fn with_config(mut self, config: GaoConfig) -> Self {
        self.config = config;
        self
    }

    /// Share `privateer` instead of the context's own secret store.
    pub fn with_privateer(mut self, privateer: Arc<Privateer>) -> Self {
        self.privateer = privateer;
        self
    }

    /// Report applied pulls to `observer`.
    pub fn with_observer(mut self, observer: Arc<dyn GaoObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// The librarian behind the ingest pipeline.
    pub fn librarian(&self) -> &Arc<dyn Librarian> {
        self.ingest.librarian()
    }
}

impl std::fmt::Debug for GaoContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GaoContext")
            .field("whoami", &self.provider.whoami())
            .field("privateer", &self.privateer)
            .field("observed", &self.observer.is_some())
            .field("config", &self.config)
            .finish()
    }
}
