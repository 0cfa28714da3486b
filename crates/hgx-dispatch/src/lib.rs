//! Dispatcher for Hypergolix.
//!
//! The dispatcher sits between accountable objects and the applications
//! connected to the node. It owns the session table (connection to app
//! token and back), API subscriptions, and the record of which connection
//! holds a copy of which object, and it fans updates out to them.
//!
//! # Key Types
//!
//! - [`Dispatcher`] — session table, privacy records, and parallel fan-out.
//! - [`Notifier`] — delivery surface toward connections; implemented by the transport.
//! - [`ObjectIndex`] — API identifier lookup. [`ApiRegistry`] is in memory,
//!   [`GaoIndex`] hydrates objects from the librarian.
//! - [`DispatchableState`] — the `hgxd` state format carrying an object's API identifier.
//!
//! # Design Rules
//!
//! 1. A failed delivery to one connection never delays or fails the others.
//! 2. Private objects are never distributed, and public objects never become private.
//! 3. Sessions are removed explicitly with [`Dispatcher::end_application`].

pub mod config;
pub mod dispatchable;
pub mod dispatcher;
pub mod error;
pub mod index;
pub mod notify;

pub use config::DispatchConfig;
pub use dispatchable::DispatchableState;
pub use dispatcher::Dispatcher;
pub use error::{DispatchError, DispatchResult};
pub use index::{ApiRegistry, GaoIndex, ObjectIndex};
pub use notify::{ConnectionId, Notification, Notifier};
