use async_trait::async_trait;

use hgx_golix::Primitive;

use crate::error::{ValidationError, ValidationResult};
use crate::librarian::Librarian;
use crate::validation::ValidationStage;

/// Lifetime validator: containers must be bound, debound things stay dead.
///
/// Uses [`Librarian::is_debound`], so a pass through the bookie may evict
/// stale debindings as a side effect.
#[derive(Clone, Copy, Debug, Default)]
pub struct Bookie;

#[async_trait]
impl ValidationStage for Bookie {
    fn name(&self) -> &str {
        "bookie"
    }

    async fn validate(
        &self,
        librarian: &dyn Librarian,
        primitive: &Primitive,
    ) -> ValidationResult<()> {
        match primitive {
            Primitive::Identity(_) => Ok(()),
            Primitive::Container(c) => {
                if librarian.is_bound(primitive) {
                    Ok(())
                } else {
                    Err(ValidationError::UnboundContainer(c.ghid))
                }
            }
            Primitive::DynamicBinding(b) => {
                if librarian.is_debound(primitive).await? && !librarian.is_bound(primitive) {
                    Err(ValidationError::AlreadyDebound(b.ghid))
                } else {
                    Ok(())
                }
            }
            Primitive::StaticBinding(_) | Primitive::Debinding(_) | Primitive::Request(_) => {
                if librarian.is_debound(primitive).await? {
                    Err(ValidationError::AlreadyDebound(primitive.ghid()))
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::librarian::MemoryLibrarian;
    use hgx_golix::{FirstParty, IdentityProvider, Packed};
    use hgx_types::Ghid;

    async fn put<T: Clone + Into<Primitive>>(lib: &MemoryLibrarian, packed: &Packed<T>) {
        lib.store(&packed.to_primitive(), &packed.bytes).await.unwrap();
    }

    #[tokio::test]
    async fn container_needs_a_binding() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        let container = alice.make_container(b"x", &alice.new_secret()).unwrap();

        assert!(matches!(
            Bookie.validate(&lib, &container.to_primitive()).await,
            Err(ValidationError::UnboundContainer(_))
        ));

        put(&lib, &alice.make_binding_stat(container.primitive.ghid).unwrap()).await;
        assert!(Bookie.validate(&lib, &container.to_primitive()).await.is_ok());
    }

    #[tokio::test]
    async fn debound_binding_is_refused() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        put(&lib, alice.declaration()).await;
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        put(&lib, &alice.make_debinding(binding.primitive.ghid).unwrap()).await;

        assert!(matches!(
            Bookie.validate(&lib, &binding.to_primitive()).await,
            Err(ValidationError::AlreadyDebound(_))
        ));
    }

    #[tokio::test]
    async fn debound_dynamic_object_that_is_still_held_passes() {
        let lib = MemoryLibrarian::default();
        let alice = FirstParty::generate().unwrap();
        put(&lib, alice.declaration()).await;
        let frame = alice.make_binding_dyn(Ghid::from_bytes(b"c0"), None, 0, &[]).unwrap();
        let logical = frame.primitive.ghid;
        put(&lib, &alice.make_debinding(logical).unwrap()).await;

        assert!(matches!(
            Bookie.validate(&lib, &frame.to_primitive()).await,
            Err(ValidationError::AlreadyDebound(_))
        ));

        put(&lib, &alice.make_binding_stat(logical).unwrap()).await;
        assert!(Bookie.validate(&lib, &frame.to_primitive()).await.is_ok());
    }
}
