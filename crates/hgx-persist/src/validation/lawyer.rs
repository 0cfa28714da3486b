use async_trait::async_trait;
use tracing::info;

use hgx_golix::{Container, Debinding, DynamicBinding, Primitive, Request, StaticBinding};
use hgx_types::Ghid;

use crate::error::{StoreError, ValidationError, ValidationResult};
use crate::librarian::Librarian;
use crate::validation::ValidationStage;

/// Authorship validator.
///
/// Every author (or request recipient) must resolve to a cached identity
/// declaration, and frames and debindings must agree with the author of
/// record of what they update or revoke. Read-only.
#[derive(Clone, Copy, Debug, Default)]
pub struct Lawyer;

impl Lawyer {
    async fn require_identity(&self, librarian: &dyn Librarian, ghid: &Ghid) -> ValidationResult<()> {
        match librarian.summarize(ghid).await {
            Ok(Primitive::Identity(_)) => Ok(()),
            Ok(_) | Err(StoreError::DoesNotExist(_)) => Err(ValidationError::InvalidIdentity(*ghid)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn validate_container(
        &self,
        librarian: &dyn Librarian,
        container: &Container,
    ) -> ValidationResult<()> {
        self.require_identity(librarian, &container.author).await
    }

    pub async fn validate_static(
        &self,
        librarian: &dyn Librarian,
        binding: &StaticBinding,
    ) -> ValidationResult<()> {
        self.require_identity(librarian, &binding.author).await
    }

    /// Frames after the first must come from the author of record. If the
    /// prior frame is not cached yet the frame is accepted optimistically.
    pub async fn validate_dynamic(
        &self,
        librarian: &dyn Librarian,
        binding: &DynamicBinding,
    ) -> ValidationResult<()> {
        self.require_identity(librarian, &binding.author).await?;
        if binding.counter == 0 {
            return Ok(());
        }

        match librarian.summarize(&binding.ghid).await {
            Ok(existing) => match existing.author() {
                Some(author) if author == binding.author => Ok(()),
                Some(author) => Err(ValidationError::InconsistentAuthor {
                    ghid: binding.ghid,
                    expected: author,
                    actual: binding.author,
                }),
                None => Err(ValidationError::InvalidTarget {
                    ghid: binding.frame_ghid,
                    target: binding.ghid,
                    kind: existing.kind(),
                }),
            },
            Err(StoreError::DoesNotExist(_)) => {
                info!(
                    ghid = %binding.ghid.short_hex(),
                    counter = binding.counter,
                    "no prior frame cached; accepting dynamic frame on trust"
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// A debinding must come from the author of its target (the recipient,
    /// for requests). `target` may be supplied already resolved; otherwise it
    /// is looked up, and an unknown target is accepted for now (see
    /// [`Librarian::is_debound`]).
    pub async fn validate_debinding(
        &self,
        librarian: &dyn Librarian,
        debinding: &Debinding,
        target: Option<&Primitive>,
    ) -> ValidationResult<()> {
        self.require_identity(librarian, &debinding.author).await?;

        let looked_up;
        let target = match target {
            Some(t) => t,
            None => match librarian.summarize(&debinding.target).await {
                Ok(t) => {
                    looked_up = t;
                    &looked_up
                }
                Err(StoreError::DoesNotExist(_)) => return Ok(()),
                Err(e) => return Err(e.into()),
            },
        };

        let authority = match target {
            Primitive::Request(r) => Some(r.recipient),
            other => other.author(),
        };
        match authority {
            Some(expected) if expected == debinding.author => Ok(()),
            Some(expected) => Err(ValidationError::InconsistentAuthor {
                ghid: debinding.target,
                expected,
                actual: debinding.author,
            }),
            None => Err(ValidationError::InvalidTarget {
                ghid: debinding.ghid,
                target: debinding.target,
                kind: target.kind(),
            }),
        }
    }

    pub async fn validate_request(
        &self,
        librarian: &dyn Librarian,
        request: &Request,
    ) -> ValidationResult<()> {
        self.require_identity(librarian, &request.recipient).await
    }
}

#[async_trait]
impl ValidationStage for Lawyer {
    fn name(&self) -> &str {
        "lawyer"
    }

    async fn validate(
        &self,
        librarian: &dyn Librarian,
        primitive: &Primitive,
    ) -> ValidationResult<()> {
        match primitive {
            Primitive::Identity(_) => Ok(()),
            Primitive::Container(c) => self.validate_container(librarian, c).await,
            Primitive::StaticBinding(b) => self.validate_static(librarian, b).await,
            Primitive::DynamicBinding(b) => self.validate_dynamic(librarian, b).await,
            Primitive::Debinding(d) => self.validate_debinding(librarian, d, None).await,
            Primitive::Request(r) => self.validate_request(librarian, r).await,
        }
    }
}
