use async_trait::async_trait;

use hgx_golix::{Debinding, DynamicBinding, Primitive, PrimitiveKind, StaticBinding};
use hgx_types::Ghid;

use crate::error::{StoreError, ValidationError, ValidationResult};
use crate::librarian::Librarian;
use crate::validation::ValidationStage;

/// Structural validator: legal target kinds and dynamic counter monotonicity.
#[derive(Clone, Copy, Debug, Default)]
pub struct Enforcer;

/// Bindings point at containers or at other dynamic objects only.
fn bindable(kind: PrimitiveKind) -> bool {
    matches!(kind, PrimitiveKind::Container | PrimitiveKind::DynamicBinding)
}

/// Debindings retract bindings, frames, debindings, or requests.
fn debindable(kind: PrimitiveKind) -> bool {
    !matches!(kind, PrimitiveKind::Identity | PrimitiveKind::Container)
}

impl Enforcer {
    /// Kind of `target` if it is cached; `None` otherwise.
    async fn target_kind(
        &self,
        librarian: &dyn Librarian,
        target: &Ghid,
    ) -> ValidationResult<Option<PrimitiveKind>> {
        match librarian.summarize(target).await {
            Ok(p) => Ok(Some(p.kind())),
            Err(StoreError::DoesNotExist(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn validate_static(
        &self,
        librarian: &dyn Librarian,
        binding: &StaticBinding,
    ) -> ValidationResult<()> {
        match self.target_kind(librarian, &binding.target).await? {
            Some(kind) if !bindable(kind) => Err(ValidationError::InvalidTarget {
                ghid: binding.ghid,
                target: binding.target,
                kind,
            }),
            _ => Ok(()),
        }
    }

    /// Target kind check plus history: a frame must carry a higher counter
    /// than the frame currently cached for its address. An address seen for
    /// the first time is trusted.
    pub async fn validate_dynamic(
        &self,
        librarian: &dyn Librarian,
        binding: &DynamicBinding,
    ) -> ValidationResult<()> {
        let target = binding.target();
        if let Some(kind) = self.target_kind(librarian, &target).await? {
            if !bindable(kind) {
                return Err(ValidationError::InvalidTarget {
                    ghid: binding.frame_ghid,
                    target,
                    kind,
                });
            }
        }

        match librarian.summarize(&binding.ghid).await {
            Ok(Primitive::DynamicBinding(existing))
                if existing.frame_ghid != binding.frame_ghid
                    && existing.counter >= binding.counter =>
            {
                Err(ValidationError::IllegalDynamicFrame {
                    ghid: binding.ghid,
                    existing: existing.counter,
                    proposed: binding.counter,
                })
            }
            Ok(_) | Err(StoreError::DoesNotExist(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn validate_debinding(
        &self,
        librarian: &dyn Librarian,
        debinding: &Debinding,
        target: Option<&Primitive>,
    ) -> ValidationResult<()> {
        let kind = match target {
            Some(t) => Some(t.kind()),
            None => self.target_kind(librarian, &debinding.target).await?,
        };
        match kind {
            Some(kind) if !debindable(kind) => Err(ValidationError::InvalidTarget {
                ghid: debinding.ghid,
                target: debinding.target,
                kind,
            }),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ValidationStage for Enforcer {
    fn name(&self) -> &str {
        "enforcer"
    }

    async fn validate(
        &self,
        librarian: &dyn Librarian,
        primitive: &Primitive,
    ) -> ValidationResult<()> {
        match primitive {
            Primitive::StaticBinding(b) => self.validate_static(librarian, b).await,
            Primitive::DynamicBinding(b) => self.validate_dynamic(librarian, b).await,
            Primitive::Debinding(d) => self.validate_debinding(librarian, d, None).await,
            Primitive::Identity(_) | Primitive::Container(_) | Primitive::Request(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::librarian::MemoryLibrarian;
    use hgx_golix::{FirstParty, IdentityProvider, Packed};

    async fn put<T: Clone + Into<Primitive>>(lib: &MemoryLibrarian, packed: &Packed<T>) {
        lib.store(&packed.to_primitive(), &packed.bytes).await.unwrap();
    }

    #[tokio::test]
    async fn binding_may_not_target_identity_or_binding() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        put(&lib, alice.declaration()).await;
        let first = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        put(&lib, &first).await;

        for target in [alice.whoami(), first.primitive.ghid] {
            let binding = alice.make_binding_stat(target).unwrap();
            assert!(matches!(
                Enforcer.validate(&lib, &binding.to_primitive()).await,
                Err(ValidationError::InvalidTarget { .. })
            ));
        }
    }

    #[tokio::test]
    async fn binding_to_unknown_or_container_is_fine() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let container = alice.make_container(b"x", &alice.new_secret()).unwrap();
        put(&lib, &container).await;

        for target in [container.primitive.ghid, Ghid::from_bytes(b"unknown")] {
            let binding = alice.make_binding_stat(target).unwrap();
            assert!(Enforcer.validate(&lib, &binding.to_primitive()).await.is_ok());
        }
    }

    #[tokio::test]
    async fn debinding_may_not_target_container() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let container = alice.make_container(b"x", &alice.new_secret()).unwrap();
        put(&lib, &container).await;
        let debinding = alice.make_debinding(container.primitive.ghid).unwrap();
        assert!(matches!(
            Enforcer.validate(&lib, &debinding.to_primitive()).await,
            Err(ValidationError::InvalidTarget {
                kind: PrimitiveKind::Container,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn counter_must_increase() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let c0 = Ghid::from_bytes(b"c0");
        let f0 = alice.make_binding_dyn(c0, None, 0, &[]).unwrap();
        let logical = f0.primitive.ghid;
        let f1 = alice
            .make_binding_dyn(Ghid::from_bytes(b"c1"), Some(logical), 1, &[c0])
            .unwrap();
        put(&lib, &f1).await;

        // Re-validating the accepted frame passes; an older or equal one fails.
        assert!(Enforcer.validate(&lib, &f1.to_primitive()).await.is_ok());
        assert!(matches!(
            Enforcer.validate(&lib, &f0.to_primitive()).await,
            Err(ValidationError::IllegalDynamicFrame {
                existing: 1,
                proposed: 0,
                ..
            })
        ));
        let replay = alice
            .make_binding_dyn(Ghid::from_bytes(b"c1b"), Some(logical), 1, &[c0])
            .unwrap();
        assert!(Enforcer.validate(&lib, &replay.to_primitive()).await.is_err());
    }
}
