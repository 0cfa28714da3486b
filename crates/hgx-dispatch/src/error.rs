use hgx_core::GaoError;
use hgx_types::{AppToken, Ghid};

use crate::notify::ConnectionId;

/// Errors from the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("app token {0} is unknown to the dispatcher")]
    UnknownToken(AppToken),

    /// The connection already has a token, or the token is live on another connection.
    #[error("application already started: {0}")]
    ExistantApp(String),

    /// The connection has not started an application.
    #[error("no app token registered for {0}")]
    UnknownConnection(ConnectionId),

    #[error("could not mint an unused app token after {0} attempts")]
    TokenExhausted(u32),

    /// The object is unknown or already public.
    #[error("object {0} is not private")]
    NotPrivate(Ghid),

    /// Public objects can never become private again.
    #[error("object {0} is already public")]
    AlreadyPublic(Ghid),

    #[error("object {0} is private; make it public before sharing it")]
    StillPrivate(Ghid),

    #[error("startup object already defined for {0}")]
    StartupExists(AppToken),

    #[error("no startup object defined for {0}")]
    NoStartupObject(AppToken),

    #[error("object {0} is not known to the object index")]
    UnknownObject(Ghid),

    /// Bytes are not a dispatchable object.
    #[error("dispatchable format error: {0}")]
    Format(String),

    #[error("delivery to {conn} failed: {reason}")]
    Delivery { conn: ConnectionId, reason: String },

    #[error("object lookup failed: {0}")]
    Lookup(#[from] GaoError),
}

/// Result alias for dispatcher operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
