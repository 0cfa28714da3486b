use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use hgx_types::{ApiId, Ghid};

use crate::error::DispatchResult;

/// Handle for one live application connection.
///
/// Handles are issued by the transport layer and never reused within a process.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

static NEXT_CONNECTION: AtomicU64 = AtomicU64::new(1);

impl ConnectionId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// A handle distinct from every other handle issued by `next`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw handle value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Event delivered to an application connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notification {
    /// A new object is available. `origin` is the sharing identity, or
    /// `None` when the object was created locally.
    Share {
        ghid: Ghid,
        origin: Option<Ghid>,
        api_id: ApiId,
    },
    Update { ghid: Ghid },
    Delete { ghid: Ghid },
    /// `recipient` received an object the application shared.
    ShareSuccess { ghid: Ghid, recipient: Ghid },
    ShareFailure { ghid: Ghid, recipient: Ghid },
}

impl Notification {
    pub fn ghid(&self) -> Ghid {
        match self {
            Self::Share { ghid, .. }
            | Self::Update { ghid }
            | Self::Delete { ghid }
            | Self::ShareSuccess { ghid, .. }
            | Self::ShareFailure { ghid, .. } => *ghid,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Share { .. } => "share",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
            Self::ShareSuccess { .. } => "share_success",
            Self::ShareFailure { .. } => "share_failure",
        }
    }
}

/// Delivery surface toward application connections.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, conn: ConnectionId, notification: Notification) -> DispatchResult<()>;
}
