//! Foundation types for Hypergolix.
//!
//! Every other `hgx-*` crate depends on `hgx-types`. The types here are plain
//! values: content addresses, API identifiers, and application tokens.
//!
//! # Key Types
//!
//! - [`Ghid`] — Content address (algorithm tag + BLAKE3 digest) keying every primitive
//! - [`ApiId`] — Identifier an application uses to declare interest in a class of objects
//! - [`AppToken`] — Per-application session token issued by the dispatcher

pub mod error;
pub mod ghid;
pub mod token;

pub use error::TypeError;
pub use ghid::Ghid;
pub use token::{ApiId, AppToken};
