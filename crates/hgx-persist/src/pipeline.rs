use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use hgx_crypto::VerifyingKey;
use hgx_golix::{Codec, Primitive};
use hgx_types::Ghid;

use crate::error::{IngestError, IngestResult, StoreError, ValidationError};
use crate::keyed_lock::KeyedLock;
use crate::librarian::Librarian;
use crate::validation::{Bookie, Enforcer, Lawyer, ValidationStage};

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// Entry point for primitives produced or received by this node.
#[async_trait]
pub trait Ingest: Send + Sync {
    /// Validate and cache an already-parsed primitive, replicating it
    /// upstream when `remotable`.
    ///
    /// Returns `Ok(false)` when the primitive was already cached.
    async fn direct_ingest(
        &self,
        primitive: &Primitive,
        data: &[u8],
        remotable: bool,
    ) -> IngestResult<bool>;

    /// The librarian accepted primitives end up in.
    fn librarian(&self) -> &Arc<dyn Librarian>;
}

/// Replication target for locally accepted primitives.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn push(&self, primitive: &Primitive, data: &[u8]) -> IngestResult<()>;
}

/// Upstream that drops everything. Used when the node runs standalone.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullUpstream;

#[async_trait]
impl Upstream for NullUpstream {
    async fn push(&self, _primitive: &Primitive, _data: &[u8]) -> IngestResult<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// IngestPipeline
// ---------------------------------------------------------------------------

/// Validation stages in front of a librarian, with optional replication.
///
/// Ingestion of a single reference ghid is serialized; different primitives
/// are ingested concurrently.
pub struct IngestPipeline {
    librarian: Arc<dyn Librarian>,
    stages: Vec<Box<dyn ValidationStage>>,
    upstream: Arc<dyn Upstream>,
    locks: KeyedLock<Ghid>,
}

impl IngestPipeline {
    /// Pipeline with the default stages: Enforcer -> Lawyer -> Bookie.
    pub fn new(librarian: Arc<dyn Librarian>) -> Self {
        let mut pipeline = Self::empty(librarian);
        pipeline.add_stage(Box::new(Enforcer));
        pipeline.add_stage(Box::new(Lawyer));
        pipeline.add_stage(Box::new(Bookie));
        pipeline
    }

    /// Pipeline without any validation stage.
    pub fn empty(librarian: Arc<dyn Librarian>) -> Self {
        Self {
            librarian,
            stages: Vec::new(),
            upstream: Arc::new(NullUpstream),
            locks: KeyedLock::new(),
        }
    }

    /// Replicate remotable primitives to `upstream` after storing them.
    pub fn with_upstream(mut self, upstream: Arc<dyn Upstream>) -> Self {
        self.upstream = upstream;
        self
    }

    /// Append a stage to the end of the pipeline.
    pub fn add_stage(&mut self, stage: Box<dyn ValidationStage>) {
        self.stages.push(stage);
    }

    /// Number of validation stages.
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }

    /// Run every stage in order. Fail-fast: the first rejection wins.
    pub async fn validate(&self, primitive: &Primitive) -> Result<(), ValidationError> {
        for stage in &self.stages {
            if let Err(e) = stage.validate(self.librarian.as_ref(), primitive).await {
                warn!(
                    stage = stage.name(),
                    ghid = %primitive.ghid().short_hex(),
                    kind = %primitive.kind(),
                    error = %e,
                    "primitive rejected"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Parse packed bytes, check the author's signature, then
    /// [`direct_ingest`](Ingest::direct_ingest) the result.
    ///
    /// The author's identity declaration must already be cached. Identity
    /// declarations are self-certifying and skip the signature check.
    pub async fn ingest(&self, data: &[u8], remotable: bool) -> IngestResult<Primitive> {
        let primitive = Codec::load(data)?;
        self.verify_signature(&primitive, data).await?;
        self.direct_ingest(&primitive, data, remotable).await?;
        Ok(primitive)
    }

    /// Check `data` against the declared key of `primitive`'s author.
    pub async fn verify_signature(&self, primitive: &Primitive, data: &[u8]) -> IngestResult<()> {
        let Some(author) = primitive.author() else {
            return Ok(());
        };
        let key = self.verifying_key(&author).await?;
        Codec::verify(data, &key).map_err(|e| IngestError::Verification {
            ghid: primitive.reference_ghid(),
            reason: e.to_string(),
        })
    }

    async fn verifying_key(&self, author: &Ghid) -> IngestResult<VerifyingKey> {
        match self.librarian.summarize(author).await {
            Ok(Primitive::Identity(decl)) => {
                VerifyingKey::from_bytes(decl.verifying_key).map_err(|e| {
                    IngestError::Verification {
                        ghid: *author,
                        reason: e.to_string(),
                    }
                })
            }
            Ok(_) | Err(StoreError::DoesNotExist(_)) => {
                Err(ValidationError::InvalidIdentity(*author).into())
            }
            Err(e) => Err(e.into()),
        }
    }
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        f.debug_struct("IngestPipeline")
            .field("stages", &names)
            .finish()
    }
}

#[async_trait]
impl Ingest for IngestPipeline {
    async fn direct_ingest(
        &self,
        primitive: &Primitive,
        data: &[u8],
        remotable: bool,
    ) -> IngestResult<bool> {
        let reference = primitive.reference_ghid();
        let _guard = self.locks.lock(reference).await;

        if self.librarian.contains(&reference).await? {
            debug!(reference = %reference.short_hex(), "already cached");
            return Ok(false);
        }

        self.validate(primitive).await?;
        self.librarian.store(primitive, data).await?;

        if remotable {
            if let Err(e) = self.upstream.push(primitive, data).await {
                warn!(reference = %reference.short_hex(), error = %e, "upstream push failed");
                return Err(e);
            }
        }
        debug!(
            ghid = %primitive.ghid().short_hex(),
            kind = %primitive.kind(),
            remotable,
            "ingested primitive"
        );
        Ok(true)
    }

    fn librarian(&self) -> &Arc<dyn Librarian> {
        &self.librarian
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::librarian::MemoryLibrarian;
    use crate::ValidationResult;
    use hgx_golix::{FirstParty, IdentityProvider, Packed};

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    #[derive(Default)]
    struct RecordingUpstream {
        pushed: Mutex<Vec<Ghid>>,
        fail: bool,
    }

    #[async_trait]
    impl Upstream for RecordingUpstream {
        async fn push(&self, primitive: &Primitive, _data: &[u8]) -> IngestResult<()> {
            if self.fail {
                return Err(IngestError::Upstream {
                    ghid: primitive.ghid(),
                    reason: "offline".into(),
                });
            }
            self.pushed.lock().unwrap().push(primitive.reference_ghid());
            Ok(())
        }
    }

    struct RejectAll;

    #[async_trait]
    impl ValidationStage for RejectAll {
        fn name(&self) -> &str {
            "reject-all"
        }

        async fn validate(&self, _librarian: &dyn Librarian, p: &Primitive) -> ValidationResult<()> {
            Err(ValidationError::AlreadyDebound(p.ghid()))
        }
    }

    fn pipeline() -> IngestPipeline {
        IngestPipeline::new(Arc::new(MemoryLibrarian::default()))
    }

    async fn ingest<T: Clone + Into<Primitive>>(
        pipeline: &IngestPipeline,
        packed: &Packed<T>,
    ) -> IngestResult<bool> {
        pipeline
            .direct_ingest(&packed.to_primitive(), &packed.bytes, false)
            .await
    }

    async fn registered(pipeline: &IngestPipeline) -> FirstParty {
        let party = FirstParty::generate().unwrap();
        ingest(pipeline, party.declaration()).await.unwrap();
        party
    }

    // ---------------------------------------------------------------
    // Construction
    // ---------------------------------------------------------------

    #[test]
    fn default_pipeline_has_three_stages() {
        let p = pipeline();
        assert_eq!(p.stage_count(), 3);
        assert!(format!("{p:?}").contains("enforcer"));
    }

    // ---------------------------------------------------------------
    // direct_ingest
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn accepted_then_idempotent() {
        let p = pipeline();
        let alice = registered(&p).await;
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();

        assert!(ingest(&p, &binding).await.unwrap());
        assert!(!ingest(&p, &binding).await.unwrap());
        assert!(p.librarian().contains(&binding.primitive.ghid).await.unwrap());
    }

    #[tokio::test]
    async fn rejected_primitive_is_not_stored() {
        let p = pipeline();
        let stranger = FirstParty::generate().unwrap();
        let binding = stranger.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();

        let err = ingest(&p, &binding).await.unwrap_err();
        assert!(matches!(
            err,
            IngestError::Validation(ValidationError::InvalidIdentity(_))
        ));
        assert!(!p.librarian().contains(&binding.primitive.ghid).await.unwrap());
    }

    #[tokio::test]
    async fn binding_then_container() {
        let p = pipeline();
        let alice = registered(&p).await;
        let container = alice.make_container(b"state", &alice.new_secret()).unwrap();
        let frame = alice
            .make_binding_dyn(container.primitive.ghid, None, 0, &[])
            .unwrap();

        assert!(matches!(
            ingest(&p, &container).await,
            Err(IngestError::Validation(ValidationError::UnboundContainer(_)))
        ));
        assert!(ingest(&p, &frame).await.unwrap());
        assert!(ingest(&p, &container).await.unwrap());
    }

    #[tokio::test]
    async fn custom_stage_runs_last() {
        let mut p = pipeline();
        let alice = registered(&p).await;
        p.add_stage(Box::new(RejectAll));
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        assert!(ingest(&p, &binding).await.is_err());
    }

    #[tokio::test]
    async fn concurrent_ingest_of_same_primitive_stores_once() {
        let p = Arc::new(pipeline());
        let alice = registered(&p).await;
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();
        let prim = binding.to_primitive();

        let (a, b) = tokio::join!(
            p.direct_ingest(&prim, &binding.bytes, false),
            p.direct_ingest(&prim, &binding.bytes, false),
        );
        assert_ne!(a.unwrap(), b.unwrap());
    }

    // ---------------------------------------------------------------
    // Upstream
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn only_remotable_primitives_go_upstream() {
        let upstream = Arc::new(RecordingUpstream::default());
        let p = pipeline().with_upstream(upstream.clone());
        let alice = registered(&p).await;
        let local = alice.make_binding_stat(Ghid::from_bytes(b"local")).unwrap();
        let remote = alice.make_binding_stat(Ghid::from_bytes(b"remote")).unwrap();

        ingest(&p, &local).await.unwrap();
        p.direct_ingest(&remote.to_primitive(), &remote.bytes, true)
            .await
            .unwrap();

        assert_eq!(*upstream.pushed.lock().unwrap(), vec![remote.primitive.ghid]);
    }

    #[tokio::test]
    async fn upstream_failure_is_surfaced() {
        let upstream = Arc::new(RecordingUpstream {
            fail: true,
            ..Default::default()
        });
        let p = pipeline().with_upstream(upstream);
        let alice = registered(&p).await;
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();

        assert!(matches!(
            p.direct_ingest(&binding.to_primitive(), &binding.bytes, true).await,
            Err(IngestError::Upstream { .. })
        ));
    }

    // ---------------------------------------------------------------
    // ingest from bytes
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn ingest_bytes_checks_signature_against_cached_identity() {
        let p = pipeline();
        let alice = FirstParty::generate().unwrap();
        let binding = alice.make_binding_stat(Ghid::from_bytes(b"t")).unwrap();

        // Identity unknown: nothing to verify against.
        assert!(matches!(
            p.ingest(&binding.bytes, false).await,
            Err(IngestError::Validation(ValidationError::InvalidIdentity(_)))
        ));

        let decl = p.ingest(&alice.declaration().bytes, false).await.unwrap();
        assert_eq!(decl.ghid(), alice.whoami());
        let prim = p.ingest(&binding.bytes, false).await.unwrap();
        assert_eq!(prim, binding.to_primitive());
    }

    #[tokio::test]
    async fn ingest_rejects_garbage() {
        let p = pipeline();
        assert!(matches!(
            p.ingest(b"not a primitive", false).await,
            Err(IngestError::Malformed(_))
        ));
    }
}
