use serde::{Deserialize, Serialize};

use hgx_crypto::{ContentHasher, Signature, SigningKey, VerifyingKey};
use hgx_types::Ghid;

use crate::error::{GolixError, GolixResult};
use crate::primitive::{
    Container, Debinding, DynamicBinding, IdentityDeclaration, Primitive, PrimitiveKind, Request,
    StaticBinding,
};

/// Leading magic of every packed primitive.
pub const MAGIC: &[u8; 4] = b"HGXP";
/// Current packed format version.
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1;

/// Signed content of a packed primitive.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) enum WireBody {
    Identity {
        verifying_key: [u8; 32],
    },
    Container {
        author: Ghid,
        payload: Vec<u8>,
    },
    StaticBinding {
        author: Ghid,
        target: Ghid,
    },
    DynamicBinding {
        author: Ghid,
        address: Ghid,
        counter: u64,
        target_vector: Vec<Ghid>,
    },
    Debinding {
        author: Ghid,
        target: Ghid,
    },
    Request {
        author: Ghid,
        recipient: Ghid,
        payload: Vec<u8>,
    },
}

#[derive(Serialize, Deserialize)]
struct WireFrame {
    body: WireBody,
    signature: Option<Signature>,
}

/// Packed wire format: `[4-byte magic][1-byte version][bincode frame]`.
///
/// The signature covers the header plus the bincode-encoded body. Identity
/// declarations are self-certifying and carry no signature.
pub struct Codec;

impl Codec {
    /// Pack a body, signing it when a key is supplied.
    pub(crate) fn pack(body: WireBody, signer: Option<&SigningKey>) -> GolixResult<Vec<u8>> {
        let signature = match signer {
            Some(key) => Some(key.sign(&Self::signed_message(&body)?)),
            None => None,
        };
        let frame = WireFrame { body, signature };
        let encoded =
            bincode::serialize(&frame).map_err(|e| GolixError::Serialization(e.to_string()))?;
        let mut buf = Vec::with_capacity(HEADER_LEN + encoded.len());
        buf.extend_from_slice(MAGIC);
        buf.push(VERSION);
        buf.extend_from_slice(&encoded);
        Ok(buf)
    }

    /// Address of a packed primitive (the frame ghid for dynamic bindings).
    pub fn address(data: &[u8]) -> Ghid {
        ContentHasher::PRIMITIVE.hash(data)
    }

    /// Parse packed bytes into a lightweight primitive description.
    ///
    /// Structural checks only: signatures are checked by [`Self::verify`]
    /// once the author's identity is known.
    pub fn load(data: &[u8]) -> GolixResult<Primitive> {
        let frame = Self::decode(data)?;
        let ghid = Self::address(data);

        if !matches!(frame.body, WireBody::Identity { .. }) && frame.signature.is_none() {
            return Err(GolixError::Malformed("unsigned primitive".into()));
        }

        let primitive = match frame.body {
            WireBody::Identity { verifying_key } => {
                VerifyingKey::from_bytes(verifying_key)?;
                Primitive::Identity(IdentityDeclaration {
                    ghid,
                    verifying_key,
                })
            }
            WireBody::Container { author, .. } => Primitive::Container(Container { ghid, author }),
            WireBody::StaticBinding { author, target } => {
                Primitive::StaticBinding(StaticBinding {
                    ghid,
                    author,
                    target,
                })
            }
            WireBody::DynamicBinding {
                author,
                address,
                counter,
                target_vector,
            } => {
                if target_vector.is_empty() {
                    return Err(GolixError::Malformed(
                        "dynamic binding with empty target vector".into(),
                    ));
                }
                Primitive::DynamicBinding(DynamicBinding {
                    ghid: address,
                    author,
                    counter,
                    target_vector,
                    frame_ghid: ghid,
                })
            }
            WireBody::Debinding { author, target } => Primitive::Debinding(Debinding {
                ghid,
                author,
                target,
            }),
            WireBody::Request {
                author, recipient, ..
            } => Primitive::Request(Request {
                ghid,
                author,
                recipient,
            }),
        };
        Ok(primitive)
    }

    /// Check the author signature on packed bytes.
    pub fn verify(data: &[u8], key: &VerifyingKey) -> GolixResult<()> {
        let frame = Self::decode(data)?;
        let Some(signature) = frame.signature else {
            return Err(GolixError::Malformed("unsigned primitive".into()));
        };
        key.verify(&Self::signed_message(&frame.body)?, &signature)?;
        Ok(())
    }

    /// The encrypted payload and author of a packed container.
    pub fn container_payload(data: &[u8]) -> GolixResult<(Ghid, Vec<u8>)> {
        match Self::decode(data)?.body {
            WireBody::Container { author, payload } => Ok((author, payload)),
            other => Err(GolixError::WrongKind {
                expected: PrimitiveKind::Container,
                actual: other.kind(),
            }),
        }
    }

    /// The plaintext payload carried by a packed request.
    pub fn request_payload(data: &[u8]) -> GolixResult<Vec<u8>> {
        match Self::decode(data)?.body {
            WireBody::Request { payload, .. } => Ok(payload),
            other => Err(GolixError::WrongKind {
                expected: PrimitiveKind::Request,
                actual: other.kind(),
            }),
        }
    }

    fn decode(data: &[u8]) -> GolixResult<WireFrame> {
        if data.len() < HEADER_LEN {
            return Err(GolixError::Malformed("too short".into()));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(GolixError::Malformed("bad magic".into()));
        }
        let version = data[MAGIC.len()];
        if version != VERSION {
            return Err(GolixError::UnsupportedVersion(version));
        }
        bincode::deserialize(&data[HEADER_LEN..]).map_err(|e| GolixError::Malformed(e.to_string()))
    }

    fn signed_message(body: &WireBody) -> GolixResult<Vec<u8>> {
        let encoded =
            bincode::serialize(body).map_err(|e| GolixError::Serialization(e.to_string()))?;
        let mut msg = Vec::with_capacity(HEADER_LEN + encoded.len());
        msg.extend_from_slice(MAGIC);
        msg.push(VERSION);
        msg.extend_from_slice(&encoded);
        Ok(msg)
    }
}

impl WireBody {
    fn kind(&self) -> PrimitiveKind {
        match self {
            Self::Identity { .. } => PrimitiveKind::Identity,
            Self::Container { .. } => PrimitiveKind::Container,
            Self::StaticBinding { .. } => PrimitiveKind::StaticBinding,
            Self::DynamicBinding { .. } => PrimitiveKind::DynamicBinding,
            Self::Debinding { .. } => PrimitiveKind::Debinding,
            Self::Request { .. } => PrimitiveKind::Request,
        }
    }
}
