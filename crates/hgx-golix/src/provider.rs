use hgx_crypto::Secret;
use hgx_types::Ghid;

use crate::error::GolixResult;
use crate::primitive::{Container, Debinding, DynamicBinding, Primitive, Request, StaticBinding};

/// A freshly built primitive together with its packed bytes.
#[derive(Clone, Debug)]
pub struct Packed<T> {
    pub primitive: T,
    pub bytes: Vec<u8>,
}

impl<T: Clone + Into<Primitive>> Packed<T> {
    /// The lightweight description as a [`Primitive`].
    pub fn to_primitive(&self) -> Primitive {
        self.primitive.clone().into()
    }
}

/// Identity and secret provider consumed by the object core.
///
/// Implementations own the private key material of the local identity. The
/// core never touches keys directly: it asks the provider for secrets,
/// sealed containers, and signed bindings. Implementations must be safe to
/// call concurrently.
pub trait IdentityProvider: Send + Sync {
    /// Address of the local identity declaration.
    fn whoami(&self) -> Ghid;

    /// An unrelated fresh secret, for the first write of a new object.
    fn new_secret(&self) -> Secret;

    /// Next secret in a chain: `proxy` is the object's logical address,
    /// `target` the container protected by `secret`.
    fn ratchet(&self, secret: &Secret, proxy: &Ghid, target: &Ghid) -> Secret {
        secret.ratchet(proxy, target)
    }

    /// Seal `plaintext` under `secret` into a signed container.
    fn make_container(&self, plaintext: &[u8], secret: &Secret) -> GolixResult<Packed<Container>>;

    fn make_binding_stat(&self, target: Ghid) -> GolixResult<Packed<StaticBinding>>;

    /// Build a dynamic frame pointing at `target`.
    ///
    /// `ghid` is the logical address of an existing object, or `None` to
    /// mint a new one. `history` holds earlier targets, newest first; the
    /// frame's target vector is `target` followed by `history`.
    fn make_binding_dyn(
        &self,
        target: Ghid,
        ghid: Option<Ghid>,
        counter: u64,
        history: &[Ghid],
    ) -> GolixResult<Packed<DynamicBinding>>;

    fn make_debinding(&self, target: Ghid) -> GolixResult<Packed<Debinding>>;

    fn make_request(&self, recipient: Ghid, payload: &[u8]) -> GolixResult<Packed<Request>>;

    /// Decrypt a packed container. Fails with
    /// [`GolixError::Security`](crate::GolixError::Security) on a wrong
    /// secret or tampered payload.
    fn open_container(&self, packed: &[u8], secret: &Secret) -> GolixResult<Vec<u8>>;
}
