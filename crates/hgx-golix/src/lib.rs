//! Golix wire primitives for Hypergolix.
//!
//! Everything that travels between peers or lands in the cache is one of six
//! immutable primitive kinds. This crate holds their parsed, lightweight
//! descriptions ([`Primitive`]), the packed binary codec ([`Codec`]), and the
//! [`IdentityProvider`] seam through which the object core asks for secrets,
//! signatures, and sealed containers.
//!
//! # Primitive Kinds
//!
//! - [`IdentityDeclaration`] — public key bundle, self-certifying, never mutates
//! - [`Container`] — encrypted payload plus author
//! - [`StaticBinding`] — author vouches `ghid` designates `target` forever
//! - [`DynamicBinding`] — mutable pointer; each update is a new frame
//! - [`Debinding`] — retraction of a binding, frame, or request
//! - [`Request`] — addressed to one recipient identity
//!
//! # Design Rules
//!
//! 1. A primitive's address is the hash of its packed bytes; the same bytes
//!    always produce the same [`Ghid`](hgx_types::Ghid).
//! 2. Parsing never consults the cache. Cross-primitive rules live with the
//!    validators in `hgx-persist`.
//! 3. All signing and sealing goes through [`IdentityProvider`].

pub mod codec;
pub mod error;
pub mod first_party;
pub mod primitive;
pub mod provider;

pub use codec::Codec;
pub use error::{GolixError, GolixResult};
pub use first_party::FirstParty;
pub use primitive::{
    Container, Debinding, DynamicBinding, IdentityDeclaration, Primitive, PrimitiveKind, Request,
    StaticBinding,
};
pub use provider::{IdentityProvider, Packed};
