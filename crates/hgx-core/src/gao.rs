use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};

use hgx_crypto::Secret;
use hgx_golix::{Container, Debinding, DynamicBinding, GolixError, Packed, Primitive};
use hgx_persist::{Librarian, StoreError};
use hgx_types::Ghid;

use crate::context::GaoContext;
use crate::error::{GaoError, GaoResult};
use crate::state::GaoState;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle of an object. Transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GaoStatus {
    /// No address yet.
    Uninitialized,
    Live,
    /// Terminal for this instance.
    Deleted,
}

/// What a pull did to the local object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    Updated,
    /// The upstream frame was not newer than the local one.
    UpToDate,
    Deleted,
}

#[derive(Clone, Copy, Debug)]
enum Lifecycle {
    Uninitialized,
    Live { ghid: Ghid, author: Ghid },
    Deleted { ghid: Ghid, author: Ghid },
}

impl Lifecycle {
    fn ghid(&self) -> Option<Ghid> {
        match self {
            Self::Uninitialized => None,
            Self::Live { ghid, .. } | Self::Deleted { ghid, .. } => Some(*ghid),
        }
    }

    fn author(&self) -> Option<Ghid> {
        match self {
            Self::Uninitialized => None,
            Self::Live { author, .. } | Self::Deleted { author, .. } => Some(*author),
        }
    }
}

struct Local<S> {
    lifecycle: Lifecycle,
    dynamic: bool,
    counter: Option<u64>,
    /// Recent targets, newest first.
    target_history: VecDeque<Ghid>,
    state: S,
}

struct GaoInner<S> {
    ctx: GaoContext,
    master_secret: Option<Secret>,
    update_lock: Arc<AsyncMutex<()>>,
    local: RwLock<Local<S>>,
}

struct PreparedPush {
    secret: Secret,
    container: Packed<Container>,
    binding: Packed<DynamicBinding>,
}

// ---------------------------------------------------------------------------
// Gao
// ---------------------------------------------------------------------------

/// Accountable object: application state kept in sync with a Golix address.
///
/// Dynamic objects are a chain of frames, each pointing at a container that
/// holds the sealed state; static objects are a single bound container.
/// `push` and `pull` on one object are mutually exclusive, and their commit
/// phases run on detached tasks so that cancelling the caller never leaves
/// the object half-updated.
///
/// Cloning yields another handle to the same object.
pub struct Gao<S: GaoState> {
    inner: Arc<GaoInner<S>>,
}

impl<S: GaoState> Clone for Gao<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: GaoState> Gao<S> {
    fn build(ctx: &GaoContext, state: S, dynamic: bool, master_secret: Option<Secret>) -> Self {
        Self {
            inner: Arc::new(GaoInner {
                ctx: ctx.clone(),
                master_secret,
                update_lock: Arc::new(AsyncMutex::new(())),
                local: RwLock::new(Local {
                    lifecycle: Lifecycle::Uninitialized,
                    dynamic,
                    counter: None,
                    target_history: VecDeque::new(),
                    state,
                }),
            }),
        }
    }

    /// A brand-new dynamic object. The first [`push`](Self::push) mints its address.
    pub fn new_dynamic(ctx: &GaoContext, state: S) -> Self {
        Self::build(ctx, state, true, None)
    }

    /// A brand-new dynamic object whose secret chain is derived from
    /// `master_secret`, so it can be recovered without its history.
    pub fn new_bootstrap(ctx: &GaoContext, state: S, master_secret: Secret) -> Self {
        Self::build(ctx, state, true, Some(master_secret))
    }

    /// A brand-new static object. [`create`](Self::create) seals it.
    pub fn new_static(ctx: &GaoContext, state: S) -> Self {
        Self::build(ctx, state, false, None)
    }

    /// Hydrate an existing object from the librarian.
    pub async fn from_ghid(
        ctx: &GaoContext,
        ghid: Ghid,
        master_secret: Option<Secret>,
    ) -> GaoResult<Self>
    where
        S: Default,
    {
        let (dynamic, author) = match ctx.librarian().summarize(&ghid).await? {
            Primitive::DynamicBinding(b) => (true, b.author),
            Primitive::Container(c) => (false, c.author),
            _ => {
                return Err(GaoError::Unsupported(
                    "address is neither a dynamic binding nor a container",
                ))
            }
        };

        let gao = Self::build(ctx, S::default(), dynamic, master_secret);
        gao.write().lifecycle = Lifecycle::Live { ghid, author };
        let guard = Arc::clone(&gao.inner.update_lock).lock_owned().await;
        gao.pull_locked(guard, true).await?;
        debug!(ghid = %ghid.short_hex(), dynamic, "object hydrated");
        Ok(gao)
    }

    // -- accessors ----------------------------------------------------------

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Local<S>> {
        self.inner.local.read().expect("lock poisoned")
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Local<S>> {
        self.inner.local.write().expect("lock poisoned")
    }

    fn librarian(&self) -> &Arc<dyn Librarian> {
        self.inner.ctx.librarian()
    }

    /// Logical address, once the object exists.
    pub fn ghid(&self) -> Option<Ghid> {
        self.read().lifecycle.ghid()
    }

    /// Identity that created the object.
    pub fn author(&self) -> Option<Ghid> {
        self.read().lifecycle.author()
    }

    /// Whether the object is a frame chain rather than a single container.
    pub fn is_dynamic(&self) -> bool {
        self.read().dynamic
    }

    /// Current lifecycle state.
    pub fn status(&self) -> GaoStatus {
        match self.read().lifecycle {
            Lifecycle::Uninitialized => GaoStatus::Uninitialized,
            Lifecycle::Live { .. } => GaoStatus::Live,
            Lifecycle::Deleted { .. } => GaoStatus::Deleted,
        }
    }

    /// False once the object has been deleted, here or upstream.
    pub fn is_alive(&self) -> bool {
        !matches!(self.read().lifecycle, Lifecycle::Deleted { .. })
    }

    /// Counter of the last frame pushed or pulled.
    pub fn counter(&self) -> Option<u64> {
        self.read().counter
    }

    /// Recent container ghids, newest first.
    pub fn target_history(&self) -> Vec<Ghid> {
        self.read().target_history.iter().copied().collect()
    }

    /// A copy of the local state.
    pub fn state(&self) -> S
    where
        S: Clone,
    {
        self.read().state.clone()
    }

    /// Borrow the local state for the duration of `f`.
    pub fn with_state<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.read().state)
    }

    /// Replace the local state. Nothing is synchronized until [`push`](Self::push).
    pub fn set_state(&self, state: S) {
        self.write().state = state;
    }

    // -- guards -------------------------------------------------------------

    fn ensure_live(&self) -> GaoResult<Ghid> {
        match self.read().lifecycle {
            Lifecycle::Uninitialized => Err(GaoError::Uninitialized),
            Lifecycle::Live { ghid, .. } => Ok(ghid),
            Lifecycle::Deleted { ghid, .. } => Err(GaoError::DeadObject(ghid)),
        }
    }

    fn ensure_updatable(&self) -> GaoResult<()> {
        let local = self.read();
        if let Lifecycle::Deleted { ghid, .. } = local.lifecycle {
            return Err(GaoError::DeadObject(ghid));
        }
        if !local.dynamic {
            return Err(GaoError::Unsupported("static objects cannot be updated"));
        }
        Ok(())
    }

    // -- push ---------------------------------------------------------------

    /// Seal the current state into a new frame and submit it.
    ///
    /// The first push of a new dynamic object mints its address. If anything
    /// fails, a corrective pull restores the last state available upstream
    /// before the error is returned.
    pub async fn push(&self) -> GaoResult<()> {
        self.ensure_updatable()?;
        let guard = Arc::clone(&self.inner.update_lock).lock_owned().await;
        self.ensure_updatable()?;

        let (result, guard) = match self.prepare_push() {
            Ok(prepared) => self.commit_push(prepared, guard).await?,
            Err(e) => (Err(e), guard),
        };

        if let Err(e) = result {
            error!(
                ghid = ?self.ghid().map(|g| g.short_hex()),
                error = %e,
                "push failed; restoring last known-good state"
            );
            if self.ghid().is_some() {
                if let Err(restore) = self.pull_locked(guard, true).await {
                    warn!(error = %restore, "corrective pull failed");
                }
            }
            return Err(e);
        }
        Ok(())
    }

    /// Derive the secret and build the container and frame. Nothing is
    /// submitted here.
    fn prepare_push(&self) -> GaoResult<PreparedPush> {
        let ctx = &self.inner.ctx;
        let history_len = ctx.config.effective_legroom() - 1;
        let (ghid, counter, history, plaintext) = {
            let local = self.read();
            let history: Vec<Ghid> = local
                .target_history
                .iter()
                .take(history_len)
                .copied()
                .collect();
            (
                local.lifecycle.ghid(),
                local.counter,
                history,
                local.state.pack()?,
            )
        };

        let secret = match ghid {
            Some(ghid) => {
                let current = history.first().ok_or_else(|| GaoError::Ratchet {
                    proxy: ghid,
                    reason: "empty target history".into(),
                })?;
                ctx.privateer.ratchet_chain(
                    ctx.provider.as_ref(),
                    &ghid,
                    current,
                    self.inner.master_secret.as_ref(),
                )?
            }
            None => ctx.provider.new_secret(),
        };

        let container = ctx.provider.make_container(&plaintext, &secret)?;
        let next = counter.map_or(0, |c| c + 1);
        let binding =
            ctx.provider
                .make_binding_dyn(container.primitive.ghid, ghid, next, &history)?;

        Ok(PreparedPush {
            secret,
            container,
            binding,
        })
    }

    /// Run the commit phase detached, holding the update lock, and hand the
    /// lock back once it is done. Dropping the caller only drops the wait.
    async fn commit_push(
        &self,
        prepared: PreparedPush,
        guard: OwnedMutexGuard<()>,
    ) -> GaoResult<(GaoResult<()>, OwnedMutexGuard<()>)> {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.commit_push(prepared).await;
            (result, guard)
        })
        .await
        .map_err(|e| GaoError::Aborted(e.to_string()))
    }

    // -- pull ---------------------------------------------------------------

    /// Apply the update announced by `notification`.
    ///
    /// A debinding of this object deletes it; a frame of this object makes
    /// the object load the newest frame the librarian knows of.
    pub async fn pull(&self, notification: &Ghid) -> GaoResult<PullOutcome> {
        let ghid = self.ensure_live()?;
        if !self.is_dynamic() {
            return Err(GaoError::Unsupported("static objects cannot be pulled"));
        }

        let outcome = match self.announced(ghid, notification).await? {
            Primitive::Debinding(debinding) => {
                let _guard = self.inner.update_lock.lock().await;
                self.ensure_live()?;
                self.apply_delete(ghid, &debinding)?;
                info!(ghid = %ghid.short_hex(), "pull completed; object deleted");
                PullOutcome::Deleted
            }
            other if other.ghid() == ghid => {
                let guard = Arc::clone(&self.inner.update_lock).lock_owned().await;
                self.ensure_live()?;
                self.pull_locked(guard, false).await?
            }
            other => {
                return Err(GaoError::MismatchedNotification {
                    expected: ghid,
                    actual: other.ghid(),
                })
            }
        };

        if let Some(observer) = &self.inner.ctx.observer {
            match outcome {
                PullOutcome::Updated => observer.updated(ghid).await,
                PullOutcome::Deleted => observer.deleted(ghid).await,
                PullOutcome::UpToDate => {}
            }
        }
        Ok(outcome)
    }

    /// The primitive a notification names. A frame of this object that has
    /// since been retired stands for the object's current frame.
    async fn announced(&self, ghid: Ghid, notification: &Ghid) -> GaoResult<Primitive> {
        match self.librarian().summarize(notification).await {
            Ok(primitive) => Ok(primitive),
            Err(StoreError::DoesNotExist(missing)) => {
                match self.librarian().superseded_by(notification) {
                    Some(logical) if logical == ghid => {
                        debug!(
                            ghid = %ghid.short_hex(),
                            frame = %notification.short_hex(),
                            "notification names a retired frame; pulling the current one"
                        );
                        Ok(self.librarian().summarize(&ghid).await?)
                    }
                    Some(logical) => Err(GaoError::MismatchedNotification {
                        expected: ghid,
                        actual: logical,
                    }),
                    None => Err(StoreError::DoesNotExist(missing).into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_delete(&self, ghid: Ghid, debinding: &Debinding) -> GaoResult<()> {
        if debinding.target != ghid {
            return Err(GaoError::MismatchedNotification {
                expected: ghid,
                actual: debinding.target,
            });
        }
        self.mark_deleted();
        Ok(())
    }

    fn mark_deleted(&self) {
        let mut local = self.write();
        if let Lifecycle::Live { ghid, author } = local.lifecycle {
            local.lifecycle = Lifecycle::Deleted { ghid, author };
        }
    }

    /// Load the newest state of the object. Without `force`, a frame that is
    /// not newer than the local one is ignored.
    async fn pull_locked(
        &self,
        guard: OwnedMutexGuard<()>,
        force: bool,
    ) -> GaoResult<PullOutcome> {
        let ghid = self.ghid().ok_or(GaoError::Uninitialized)?;

        let (target_vector, counter) = match self.librarian().summarize(&ghid).await? {
            Primitive::DynamicBinding(binding) => {
                if !force {
                    if let Some(current) = self.counter() {
                        if binding.counter <= current {
                            debug!(
                                ghid = %ghid.short_hex(),
                                current,
                                upstream = binding.counter,
                                "pull skipped; local frame is current"
                            );
                            return Ok(PullOutcome::UpToDate);
                        }
                    }
                }
                (self.recover_target_secret(&ghid, &binding)?, Some(binding.counter))
            }
            Primitive::Container(container) => (vec![container.ghid], None),
            _ => return Err(GaoError::Unsupported("mismatched primitive kind for pull")),
        };

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let _guard = guard;
            inner.update_state(ghid, target_vector, counter).await
        })
        .await
        .map_err(|e| GaoError::Aborted(e.to_string()))?
    }

    /// Heal the secret chain over the longest known history. Fails only if
    /// the newest target's secret is still unknown afterwards.
    fn recover_target_secret(&self, ghid: &Ghid, binding: &DynamicBinding) -> GaoResult<Vec<Ghid>> {
        let ctx = &self.inner.ctx;
        let vector = self.maximize_target_vector(binding);
        debug!(ghid = %ghid.short_hex(), counter = binding.counter, "healing ratchet");

        if let Err(e) = ctx.privateer.heal_chain(
            ctx.provider.as_ref(),
            ghid,
            &vector,
            self.inner.master_secret.as_ref(),
        ) {
            if !ctx.privateer.contains(&binding.target()) {
                warn!(ghid = %ghid.short_hex(), error = %e, "cannot recover newest secret");
                return Err(GaoError::UnknownSecret(binding.target()));
            }
        }
        Ok(vector)
    }

    /// The frame's target vector extended with older local history, when
    /// the two overlap.
    fn maximize_target_vector(&self, binding: &DynamicBinding) -> Vec<Ghid> {
        let local = self.read();
        let offset = binding.counter.saturating_sub(local.counter.unwrap_or(0));
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);

        let mut maximized = binding.target_vector.clone();
        let overlap_end = binding.target_vector.len().saturating_sub(offset);
        if overlap_end > 0 {
            maximized.extend(local.target_history.iter().skip(overlap_end).copied());
        }
        maximized
    }

    // -- static objects and snapshots ---------------------------------------

    /// Seal a new static object. Its address is the container ghid.
    pub async fn create(&self) -> GaoResult<Ghid> {
        {
            let local = self.read();
            if local.dynamic {
                return Err(GaoError::Unsupported("dynamic objects are created by push"));
            }
            if local.lifecycle.ghid().is_some() {
                return Err(GaoError::Unsupported("object already exists"));
            }
        }
        let _guard = self.inner.update_lock.lock().await;
        let ctx = &self.inner.ctx;

        let secret = ctx.provider.new_secret();
        let plaintext = self.read().state.pack()?;
        let container = ctx.provider.make_container(&plaintext, &secret)?;
        let ghid = container.primitive.ghid;
        let binding = ctx.provider.make_binding_stat(ghid)?;

        ctx.ingest
            .direct_ingest(&binding.to_primitive(), &binding.bytes, true)
            .await?;
        ctx.ingest
            .direct_ingest(&container.to_primitive(), &container.bytes, true)
            .await?;
        ctx.privateer.stage(ghid, secret)?;
        ctx.privateer.commit(&ghid, false)?;

        self.write().lifecycle = Lifecycle::Live {
            ghid,
            author: ctx.provider.whoami(),
        };
        info!(ghid = %ghid.short_hex(), "static object created");
        Ok(ghid)
    }

    /// Bind the currently resolved container statically. Returns its ghid.
    pub async fn freeze(&self) -> GaoResult<Ghid> {
        let ghid = self.ensure_live()?;
        if !self.is_dynamic() {
            return Err(GaoError::Unsupported("cannot freeze a static object"));
        }
        let container = match self.librarian().summarize(&ghid).await? {
            Primitive::DynamicBinding(b) => b.target(),
            _ => return Err(GaoError::Unsupported("address does not resolve to a frame")),
        };
        let ctx = &self.inner.ctx;
        let binding = ctx.provider.make_binding_stat(container)?;
        ctx.ingest
            .direct_ingest(&binding.to_primitive(), &binding.bytes, true)
            .await?;
        Ok(container)
    }

    /// Bind this object statically so it outlives a debinding of its author.
    pub async fn hold(&self) -> GaoResult<()> {
        let ghid = self.ensure_live()?;
        let ctx = &self.inner.ctx;
        let binding = ctx.provider.make_binding_stat(ghid)?;
        ctx.ingest
            .direct_ingest(&binding.to_primitive(), &binding.bytes, true)
            .await?;
        Ok(())
    }

    /// Retract this node's bindings of the object and mark it deleted.
    pub async fn delete(&self) -> GaoResult<()> {
        let ghid = self.ensure_live()?;
        let ctx = &self.inner.ctx;

        let targets = if self.is_dynamic() {
            vec![ghid]
        } else {
            let whoami = ctx.provider.whoami();
            let mut own = Vec::new();
            for binding in self.librarian().bind_status(&ghid) {
                if let Primitive::StaticBinding(b) = self.librarian().summarize(&binding).await? {
                    if b.author == whoami {
                        own.push(b.ghid);
                    }
                }
            }
            own
        };

        for target in targets {
            let debinding = ctx.provider.make_debinding(target)?;
            ctx.ingest
                .direct_ingest(&debinding.to_primitive(), &debinding.bytes, true)
                .await?;
        }
        self.mark_deleted();
        info!(ghid = %ghid.short_hex(), "object deleted");
        Ok(())
    }
}

impl<S: GaoState> std::fmt::Debug for Gao<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let local = self.read();
        f.debug_struct("Gao")
            .field("ghid", &local.lifecycle.ghid())
            .field("dynamic", &local.dynamic)
            .field("counter", &local.counter)
            .field("history", &local.target_history.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Commit phases
// ---------------------------------------------------------------------------

impl<S: GaoState> GaoInner<S> {
    fn localize(&self) -> bool {
        self.master_secret.is_some()
    }

    /// Submit the frame, then its container, and record the frame locally.
    /// Once the frame is accepted the local record is updated even if the
    /// container could not be ingested: the frame is already upstream.
    async fn commit_push(&self, prepared: PreparedPush) -> GaoResult<()> {
        let PreparedPush {
            secret,
            container,
            binding,
        } = prepared;
        self.ctx
            .ingest
            .direct_ingest(&binding.to_primitive(), &binding.bytes, true)
            .await?;
        debug!(
            ghid = %binding.primitive.ghid.short_hex(),
            counter = binding.primitive.counter,
            "frame accepted"
        );

        let container_ghid = container.primitive.ghid;
        let ingested = self.ingest_container(&container).await;

        self.ctx.privateer.stage(container_ghid, secret)?;
        self.ctx.privateer.commit(&container_ghid, self.localize())?;
        {
            let legroom = self.ctx.config.effective_legroom();
            let mut local = self.local.write().expect("lock poisoned");
            local.target_history.push_front(container_ghid);
            local.target_history.truncate(legroom);
            local.counter = Some(binding.primitive.counter);
            if let Lifecycle::Uninitialized = local.lifecycle {
                local.lifecycle = Lifecycle::Live {
                    ghid: binding.primitive.ghid,
                    author: binding.primitive.author,
                };
            }
        }
        info!(
            ghid = %binding.primitive.ghid.short_hex(),
            counter = binding.primitive.counter,
            "push committed"
        );
        ingested
    }

    async fn ingest_container(&self, container: &Packed<Container>) -> GaoResult<()> {
        let attempts = self.ctx.config.container_retries.max(1);
        let primitive = container.to_primitive();
        let mut attempt = 1;
        loop {
            match self
                .ctx
                .ingest
                .direct_ingest(&primitive, &container.bytes, true)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e) if attempt < attempts => {
                    warn!(
                        container = %container.primitive.ghid.short_hex(),
                        attempt,
                        error = %e,
                        "container ingest failed; retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Walk the target vector newest to oldest and apply the first
    /// container that opens.
    async fn update_state(
        &self,
        ghid: Ghid,
        target_vector: Vec<Ghid>,
        counter: Option<u64>,
    ) -> GaoResult<PullOutcome> {
        for target in &target_vector {
            let plaintext = match self.recover_container(target).await {
                Ok(p) => p,
                Err(e) => {
                    error!(
                        ghid = %ghid.short_hex(),
                        target = %target.short_hex(),
                        error = %e,
                        "cannot open container; failing back to an older target"
                    );
                    continue;
                }
            };
            let state = match S::unpack(&plaintext) {
                Ok(s) => s,
                Err(e) => {
                    error!(target = %target.short_hex(), error = %e, "cannot unpack state");
                    continue;
                }
            };

            let legroom = self.ctx.config.effective_legroom();
            let mut local = self.local.write().expect("lock poisoned");
            local.state = state;
            if let Some(counter) = counter {
                local.counter = Some(counter);
                local.target_history = target_vector.iter().take(legroom).copied().collect();
            }
            debug!(ghid = %ghid.short_hex(), target = %target.short_hex(), "state applied");
            return Ok(PullOutcome::Updated);
        }
        Err(GaoError::UnrecoverableState(ghid))
    }

    /// Open a container, committing its secret on success and abandoning it
    /// on tamper evidence.
    async fn recover_container(&self, target: &Ghid) -> GaoResult<Vec<u8>> {
        let secret = self.ctx.privateer.get(target)?;
        let packed = self.ctx.librarian().retrieve(target).await?;
        match self.ctx.provider.open_container(&packed, &secret) {
            Ok(plaintext) => {
                self.ctx.privateer.commit(target, self.localize())?;
                Ok(plaintext)
            }
            Err(GolixError::Security(e)) => {
                warn!(target = %target.short_hex(), "abandoning secret that failed to open its container");
                self.ctx.privateer.abandon(target);
                Err(GaoError::Security {
                    ghid: *target,
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}
