use rand::RngCore;
use tracing::debug;

use hgx_crypto::{cipher, ContentHasher, Secret, SigningKey};
use hgx_types::Ghid;

use crate::codec::{Codec, WireBody};
use crate::error::{GolixError, GolixResult};
use crate::primitive::{
    Container, Debinding, DynamicBinding, IdentityDeclaration, Primitive, PrimitiveKind, Request,
    StaticBinding,
};
use crate::provider::{IdentityProvider, Packed};

/// The local identity: an Ed25519 key pair and its published declaration.
pub struct FirstParty {
    signing_key: SigningKey,
    declaration: Packed<IdentityDeclaration>,
}

impl FirstParty {
    /// Generate a new identity.
    pub fn generate() -> GolixResult<Self> {
        Self::from_signing_key(SigningKey::generate())
    }

    /// Rebuild an identity from its raw signing key.
    pub fn from_seed(seed: [u8; 32]) -> GolixResult<Self> {
        Self::from_signing_key(SigningKey::from_seed(seed))
    }

    fn from_signing_key(signing_key: SigningKey) -> GolixResult<Self> {
        let verifying_key = signing_key.verifying_key().as_bytes();
        let bytes = Codec::pack(WireBody::Identity { verifying_key }, None)?;
        let declaration = Packed {
            primitive: IdentityDeclaration {
                ghid: Codec::address(&bytes),
                verifying_key,
            },
            bytes,
        };
        debug!(identity = %declaration.primitive.ghid.short_hex(), "identity loaded");
        Ok(Self {
            signing_key,
            declaration,
        })
    }

    /// The identity declaration to publish so others can validate our work.
    pub fn declaration(&self) -> &Packed<IdentityDeclaration> {
        &self.declaration
    }

    fn sign_and_load(&self, body: WireBody) -> GolixResult<(Primitive, Vec<u8>)> {
        let bytes = Codec::pack(body, Some(&self.signing_key))?;
        let primitive = Codec::load(&bytes)?;
        Ok((primitive, bytes))
    }
}

impl std::fmt::Debug for FirstParty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirstParty")
            .field("ghid", &self.declaration.primitive.ghid)
            .finish()
    }
}

fn wrong_kind(expected: PrimitiveKind, actual: &Primitive) -> GolixError {
    GolixError::WrongKind {
        expected,
        actual: actual.kind(),
    }
}

impl IdentityProvider for FirstParty {
    fn whoami(&self) -> Ghid {
        self.declaration.primitive.ghid
    }

    fn new_secret(&self) -> Secret {
        Secret::generate()
    }

    fn make_container(&self, plaintext: &[u8], secret: &Secret) -> GolixResult<Packed<Container>> {
        let payload = cipher::seal(plaintext, secret)?;
        let body = WireBody::Container {
            author: self.whoami(),
            payload,
        };
        match self.sign_and_load(body)? {
            (Primitive::Container(primitive), bytes) => Ok(Packed { primitive, bytes }),
            (other, _) => Err(wrong_kind(PrimitiveKind::Container, &other)),
        }
    }

    fn make_binding_stat(&self, target: Ghid) -> GolixResult<Packed<StaticBinding>> {
        let body = WireBody::StaticBinding {
            author: self.whoami(),
            target,
        };
        match self.sign_and_load(body)? {
            (Primitive::StaticBinding(primitive), bytes) => Ok(Packed { primitive, bytes }),
            (other, _) => Err(wrong_kind(PrimitiveKind::StaticBinding, &other)),
        }
    }

    fn make_binding_dyn(
        &self,
        target: Ghid,
        ghid: Option<Ghid>,
        counter: u64,
        history: &[Ghid],
    ) -> GolixResult<Packed<DynamicBinding>> {
        let address = match ghid {
            Some(existing) => existing,
            None => {
                let mut seed = Vec::with_capacity(Ghid::LEN + 16);
                seed.extend_from_slice(&self.whoami().to_bytes());
                let mut nonce = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut nonce);
                seed.extend_from_slice(&nonce);
                ContentHasher::DYNAMIC.hash(&seed)
            }
        };
        let mut target_vector = Vec::with_capacity(history.len() + 1);
        target_vector.push(target);
        target_vector.extend_from_slice(history);

        let body = WireBody::DynamicBinding {
            author: self.whoami(),
            address,
            counter,
            target_vector,
        };
        match self.sign_and_load(body)? {
            (Primitive::DynamicBinding(primitive), bytes) => Ok(Packed { primitive, bytes }),
            (other, _) => Err(wrong_kind(PrimitiveKind::DynamicBinding, &other)),
        }
    }

    fn make_debinding(&self, target: Ghid) -> GolixResult<Packed<Debinding>> {
        let body = WireBody::Debinding {
            author: self.whoami(),
            target,
        };
        match self.sign_and_load(body)? {
            (Primitive::Debinding(primitive), bytes) => Ok(Packed { primitive, bytes }),
            (other, _) => Err(wrong_kind(PrimitiveKind::Debinding, &other)),
        }
    }

    fn make_request(&self, recipient: Ghid, payload: &[u8]) -> GolixResult<Packed<Request>> {
        let body = WireBody::Request {
            author: self.whoami(),
            recipient,
            payload: payload.to_vec(),
        };
        match self.sign_and_load(body)? {
            (Primitive::Request(primitive), bytes) => Ok(Packed { primitive, bytes }),
            (other, _) => Err(wrong_kind(PrimitiveKind::Request, &other)),
        }
    }

    fn open_container(&self, packed: &[u8], secret: &Secret) -> GolixResult<Vec<u8>> {
        let (_, payload) = Codec::container_payload(packed)?;
        Ok(cipher::open(&payload, secret)?)
    }
}
