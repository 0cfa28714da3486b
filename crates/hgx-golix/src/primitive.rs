use std::fmt;

use serde::{Deserialize, Serialize};

use hgx_types::Ghid;

/// The kind of a wire primitive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveKind {
    Identity,
    Container,
    StaticBinding,
    DynamicBinding,
    Debinding,
    Request,
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Container => write!(f, "container"),
            Self::StaticBinding => write!(f, "static-binding"),
            Self::DynamicBinding => write!(f, "dynamic-binding"),
            Self::Debinding => write!(f, "debinding"),
            Self::Request => write!(f, "request"),
        }
    }
}

/// Public key bundle of an identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityDeclaration {
    pub ghid: Ghid,
    pub verifying_key: [u8; 32],
}

/// Encrypted payload. The summary omits the payload itself; use
/// [`Codec::container_payload`](crate::Codec::container_payload) on the raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Container {
    pub ghid: Ghid,
    pub author: Ghid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StaticBinding {
    pub ghid: Ghid,
    pub author: Ghid,
    pub target: Ghid,
}

/// One frame of a mutable pointer.
///
/// `ghid` is the logical address shared by every frame of the object;
/// `frame_ghid` addresses this particular update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DynamicBinding {
    pub ghid: Ghid,
    pub author: Ghid,
    pub counter: u64,
    /// Recent targets, newest first. Never empty.
    pub target_vector: Vec<Ghid>,
    pub frame_ghid: Ghid,
}

impl DynamicBinding {
    /// The current target (newest entry of the target vector).
    pub fn target(&self) -> Ghid {
        self.target_vector[0]
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Debinding {
    pub ghid: Ghid,
    pub author: Ghid,
    pub target: Ghid,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Request {
    pub ghid: Ghid,
    pub author: Ghid,
    pub recipient: Ghid,
}

/// Parsed, lightweight description of any wire primitive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Primitive {
    Identity(IdentityDeclaration),
    Container(Container),
    StaticBinding(StaticBinding),
    DynamicBinding(DynamicBinding),
    Debinding(Debinding),
    Request(Request),
}

impl Primitive {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Identity(_) => PrimitiveKind::Identity,
            Self::Container(_) => PrimitiveKind::Container,
            Self::StaticBinding(_) => PrimitiveKind::StaticBinding,
            Self::DynamicBinding(_) => PrimitiveKind::DynamicBinding,
            Self::Debinding(_) => PrimitiveKind::Debinding,
            Self::Request(_) => PrimitiveKind::Request,
        }
    }

    /// Logical address. For dynamic bindings this is shared by all frames.
    pub fn ghid(&self) -> Ghid {
        match self {
            Self::Identity(p) => p.ghid,
            Self::Container(p) => p.ghid,
            Self::StaticBinding(p) => p.ghid,
            Self::DynamicBinding(p) => p.ghid,
            Self::Debinding(p) => p.ghid,
            Self::Request(p) => p.ghid,
        }
    }

    /// Address of these exact bytes: the frame ghid for dynamic bindings,
    /// the primitive's own ghid otherwise.
    pub fn reference_ghid(&self) -> Ghid {
        match self {
            Self::DynamicBinding(p) => p.frame_ghid,
            other => other.ghid(),
        }
    }

    /// Author of record. Identity declarations have none.
    pub fn author(&self) -> Option<Ghid> {
        match self {
            Self::Identity(_) => None,
            Self::Container(p) => Some(p.author),
            Self::StaticBinding(p) => Some(p.author),
            Self::DynamicBinding(p) => Some(p.author),
            Self::Debinding(p) => Some(p.author),
            Self::Request(p) => Some(p.author),
        }
    }

    /// What this primitive points at, for bindings and debindings.
    pub fn target(&self) -> Option<Ghid> {
        match self {
            Self::StaticBinding(p) => Some(p.target),
            Self::DynamicBinding(p) => Some(p.target()),
            Self::Debinding(p) => Some(p.target),
            _ => None,
        }
    }
}

impl From<IdentityDeclaration> for Primitive {
    fn from(p: IdentityDeclaration) -> Self {
        Self::Identity(p)
    }
}

impl From<Container> for Primitive {
    fn from(p: Container) -> Self {
        Self::Container(p)
    }
}

impl From<StaticBinding> for Primitive {
    fn from(p: StaticBinding) -> Self {
        Self::StaticBinding(p)
    }
}

impl From<DynamicBinding> for Primitive {
    fn from(p: DynamicBinding) -> Self {
        Self::DynamicBinding(p)
    }
}

impl From<Debinding> for Primitive {
    fn from(p: Debinding) -> Self {
        Self::Debinding(p)
    }
}

impl From<Request> for Primitive {
    fn from(p: Request) -> Self {
        Self::Request(p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(tag: &[u8]) -> Ghid {
        Ghid::from_bytes(tag)
    }

    #[test]
    fn dynamic_reference_is_frame() {
        let binding = DynamicBinding {
            ghid: g(b"logical"),
            author: g(b"author"),
            counter: 3,
            target_vector: vec![g(b"c3"), g(b"c2")],
            frame_ghid: g(b"frame"),
        };
        let prim = Primitive::from(binding);
        assert_eq!(prim.ghid(), g(b"logical"));
        assert_eq!(prim.reference_ghid(), g(b"frame"));
        assert_eq!(prim.target(), Some(g(b"c3")));
        assert_eq!(prim.kind(), PrimitiveKind::DynamicBinding);
    }

    #[test]
    fn static_reference_is_own_ghid() {
        let prim = Primitive::from(StaticBinding {
            ghid: g(b"s"),
            author: g(b"a"),
            target: g(b"t"),
        });
        assert_eq!(prim.reference_ghid(), prim.ghid());
        assert_eq!(prim.author(), Some(g(b"a")));
    }

    #[test]
    fn identity_has_no_author() {
        let prim = Primitive::from(IdentityDeclaration {
            ghid: g(b"id"),
            verifying_key: [0; 32],
        });
        assert_eq!(prim.author(), None);
        assert_eq!(prim.target(), None);
    }

    #[test]
    fn kind_display() {
        assert_eq!(PrimitiveKind::DynamicBinding.to_string(), "dynamic-binding");
        assert_eq!(PrimitiveKind::Request.to_string(), "request");
    }
}
