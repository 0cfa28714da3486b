use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use hgx_core::GaoObserver;
use hgx_types::{ApiId, AppToken, Ghid};

use crate::config::DispatchConfig;
use crate::error::{DispatchError, DispatchResult};
use crate::index::ObjectIndex;
use crate::notify::{ConnectionId, Notification, Notifier};

type Callsheet = BTreeSet<ConnectionId>;

/// A share that reached no application, kept for later delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct OrphanShare {
    ghid: Ghid,
    origin: Ghid,
}

/// Share outcome for an application that was offline when it came back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct ShareReceipt {
    ghid: Ghid,
    recipient: Ghid,
    success: bool,
}

impl ShareReceipt {
    fn notification(&self) -> Notification {
        let (ghid, recipient) = (self.ghid, self.recipient);
        if self.success {
            Notification::ShareSuccess { ghid, recipient }
        } else {
            Notification::ShareFailure { ghid, recipient }
        }
    }
}

#[derive(Debug)]
struct Sessions {
    known_tokens: HashSet<AppToken>,
    token_by_conn: HashMap<ConnectionId, AppToken>,
    conn_by_token: HashMap<AppToken, ConnectionId>,
    conns_by_api: HashMap<ApiId, HashSet<ConnectionId>>,
    /// Connections currently holding a copy of each object.
    listeners: HashMap<Ghid, HashSet<ConnectionId>>,
    private_by_ghid: HashMap<Ghid, AppToken>,
    public: HashSet<Ghid>,
    startup_by_token: HashMap<AppToken, Ghid>,
    orphan_shares: BTreeSet<OrphanShare>,
    orphan_receipts: HashMap<AppToken, Vec<ShareReceipt>>,
}

impl Default for Sessions {
    fn default() -> Self {
        Self {
            known_tokens: HashSet::from([AppToken::null()]),
            token_by_conn: HashMap::new(),
            conn_by_token: HashMap::new(),
            conns_by_api: HashMap::new(),
            listeners: HashMap::new(),
            private_by_ghid: HashMap::new(),
            public: HashSet::new(),
            startup_by_token: HashMap::new(),
            orphan_shares: BTreeSet::new(),
            orphan_receipts: HashMap::new(),
        }
    }
}

impl Sessions {
    fn token_of(&self, conn: ConnectionId) -> DispatchResult<AppToken> {
        self.token_by_conn
            .get(&conn)
            .copied()
            .ok_or(DispatchError::UnknownConnection(conn))
    }

    fn mint_token(&mut self, attempts: u32) -> DispatchResult<AppToken> {
        for _ in 0..attempts {
            let token = AppToken::random();
            if !token.is_null() && self.known_tokens.insert(token) {
                return Ok(token);
            }
        }
        Err(DispatchError::TokenExhausted(attempts))
    }

    /// Connections subscribed to `api_id` or holding a copy of `ghid`.
    fn callsheet(&self, ghid: &Ghid, api_id: Option<&ApiId>) -> Callsheet {
        let mut callsheet = Callsheet::new();
        if let Some(conns) = api_id.and_then(|api| self.conns_by_api.get(api)) {
            callsheet.extend(conns);
        }
        if let Some(conns) = self.listeners.get(ghid) {
            callsheet.extend(conns);
        }
        callsheet
    }
}

struct DispatchInner {
    index: Arc<dyn ObjectIndex>,
    notifier: Arc<dyn Notifier>,
    config: DispatchConfig,
    sessions: Mutex<Sessions>,
    background: Mutex<JoinSet<()>>,
}

/// Decides which application connections receive which objects.
///
/// Objects are routed by API identifier and by who already holds a copy.
/// Private objects belong to one app token and are never distributed; a
/// private object can be made public, never the reverse.
///
/// Cloning yields another handle to the same dispatcher.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatchInner>,
}

impl Dispatcher {
    /// Dispatcher with the default configuration.
    pub fn new(index: Arc<dyn ObjectIndex>, notifier: Arc<dyn Notifier>) -> Self {
        Self::with_config(index, notifier, DispatchConfig::default())
    }

    /// Dispatcher routing by `index` and delivering through `notifier`.
    pub fn with_config(
        index: Arc<dyn ObjectIndex>,
        notifier: Arc<dyn Notifier>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatchInner {
                index,
                notifier,
                config,
                sessions: Mutex::new(Sessions::default()),
                background: Mutex::new(JoinSet::new()),
            }),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, Sessions> {
        self.inner.sessions.lock().expect("lock poisoned")
    }

    // -----------------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------------

    /// Bind `conn` to an application token.
    ///
    /// With `Some(token)` the token must already be known; with `None` a
    /// fresh token is minted. Share outcomes that arrived while the
    /// application was offline are delivered before this returns.
    pub async fn start_application(
        &self,
        conn: ConnectionId,
        token: Option<AppToken>,
    ) -> DispatchResult<AppToken> {
        let (token, pending) = {
            let mut sessions = self.sessions();
            if sessions.token_by_conn.contains_key(&conn) {
                return Err(DispatchError::ExistantApp(format!(
                    "{conn} already has a token"
                )));
            }
            let token = match token {
                Some(t) if sessions.conn_by_token.contains_key(&t) => {
                    return Err(DispatchError::ExistantApp(format!(
                        "token {t} is live on another connection"
                    )))
                }
                Some(t) if !sessions.known_tokens.contains(&t) => {
                    return Err(DispatchError::UnknownToken(t))
                }
                Some(t) => t,
                None => sessions.mint_token(self.inner.config.token_attempts)?,
            };
            sessions.conn_by_token.insert(token, conn);
            sessions.token_by_conn.insert(conn, token);
            let pending = sessions.orphan_receipts.remove(&token).unwrap_or_default();
            (token, pending)
        };
        info!(%conn, %token, "application started");

        for receipt in pending {
            self.distribute(Callsheet::from([conn]), receipt.notification())
                .await;
        }
        Ok(token)
    }

    /// Drop every session record of `conn`. The token stays known.
    pub fn end_application(&self, conn: ConnectionId) -> Option<AppToken> {
        let mut sessions = self.sessions();
        for conns in sessions.conns_by_api.values_mut() {
            conns.remove(&conn);
        }
        sessions.conns_by_api.retain(|_, conns| !conns.is_empty());
        for conns in sessions.listeners.values_mut() {
            conns.remove(&conn);
        }
        sessions.listeners.retain(|_, conns| !conns.is_empty());

        let token = sessions.token_by_conn.remove(&conn)?;
        sessions.conn_by_token.remove(&token);
        debug!(%conn, %token, "application ended");
        Some(token)
    }

    /// Token bound to `conn`, if the application has started.
    pub fn token_lookup(&self, conn: ConnectionId) -> Option<AppToken> {
        self.sessions().token_by_conn.get(&conn).copied()
    }

    /// Live connection of `token`.
    pub fn connection_lookup(&self, token: AppToken) -> Option<ConnectionId> {
        self.sessions().conn_by_token.get(&token).copied()
    }

    /// Owning token of `ghid`, if and only if it is private.
    pub fn private_parent_lookup(&self, ghid: &Ghid) -> Option<AppToken> {
        self.sessions().private_by_ghid.get(ghid).copied()
    }

    // -----------------------------------------------------------------------
    // Subscriptions
    // -----------------------------------------------------------------------

    /// Subscribe `conn` to objects of `api_id`, delivering any orphan
    /// shares it now qualifies for.
    pub async fn add_api(&self, conn: ConnectionId, api_id: ApiId) -> DispatchResult<()> {
        let orphans: Vec<OrphanShare> = {
            let mut sessions = self.sessions();
            sessions.token_of(conn)?;
            sessions.conns_by_api.entry(api_id).or_default().insert(conn);
            sessions.orphan_shares.iter().copied().collect()
        };

        for orphan in orphans {
            match self.inner.index.api_id(&orphan.ghid).await {
                Ok(api) if api == api_id => {}
                Ok(_) => continue,
                Err(e) => {
                    warn!(ghid = %orphan.ghid.short_hex(), error = %e, "cannot resolve orphan share");
                    continue;
                }
            }
            if !self.sessions().orphan_shares.remove(&orphan) {
                continue;
            }
            info!(ghid = %orphan.ghid.short_hex(), %conn, "redelivering orphan share");
            let notification = Notification::Share {
                ghid: orphan.ghid,
                origin: Some(orphan.origin),
                api_id,
            };
            self.distribute(Callsheet::from([conn]), notification).await;
        }
        Ok(())
    }

    /// Stop routing objects of `api_id` to `conn`.
    pub fn remove_api(&self, conn: ConnectionId, api_id: &ApiId) {
        let mut sessions = self.sessions();
        if let Some(conns) = sessions.conns_by_api.get_mut(api_id) {
            conns.remove(&conn);
            if conns.is_empty() {
                sessions.conns_by_api.remove(api_id);
            }
        }
    }

    /// Record that `conn` holds a copy of `ghid` and wants its updates.
    pub fn track_object(&self, conn: ConnectionId, ghid: Ghid) {
        debug!(%conn, ghid = %ghid.short_hex(), "tracking object");
        self.sessions().listeners.entry(ghid).or_default().insert(conn);
    }

    /// Forget that `conn` holds `ghid`; it no longer receives updates.
    pub fn untrack_object(&self, conn: ConnectionId, ghid: &Ghid) {
        debug!(%conn, ghid = %ghid.short_hex(), "untracking object");
        let mut sessions = self.sessions();
        if let Some(conns) = sessions.listeners.get_mut(ghid) {
            conns.remove(&conn);
            if conns.is_empty() {
                sessions.listeners.remove(ghid);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Object registration
    // -----------------------------------------------------------------------

    /// Register an object created by `conn`.
    ///
    /// A private object is recorded against the connection's token and
    /// never distributed. A public one is shared in the background with
    /// every other interested connection.
    pub fn register_object(
        &self,
        conn: ConnectionId,
        ghid: Ghid,
        private: bool,
    ) -> DispatchResult<()> {
        {
            let mut sessions = self.sessions();
            if private {
                let token = sessions.token_of(conn)?;
                if sessions.public.contains(&ghid) {
                    return Err(DispatchError::AlreadyPublic(ghid));
                }
                sessions.private_by_ghid.insert(ghid, token);
                debug!(%conn, ghid = %ghid.short_hex(), "private object; bypassing distribution");
                return Ok(());
            }
            if sessions.private_by_ghid.contains_key(&ghid) {
                return Err(DispatchError::StillPrivate(ghid));
            }
            sessions.public.insert(ghid);
        }

        let dispatcher = self.clone();
        let mut background = self.inner.background.lock().expect("lock poisoned");
        while background.try_join_next().is_some() {}
        background.spawn(async move {
            if let Err(e) = dispatcher.distribute_share(ghid, None, Some(conn)).await {
                warn!(ghid = %ghid.short_hex(), error = %e, "share distribution failed");
            }
        });
        Ok(())
    }

    /// Make a private object public. There is no way back.
    pub fn make_public(&self, ghid: &Ghid) -> DispatchResult<()> {
        let mut sessions = self.sessions();
        if sessions.private_by_ghid.remove(ghid).is_none() {
            return Err(DispatchError::NotPrivate(*ghid));
        }
        sessions.public.insert(*ghid);
        info!(ghid = %ghid.short_hex(), "object made public");
        Ok(())
    }

    /// Wait for every background distribution started so far.
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *self.inner.background.lock().expect("lock poisoned"));
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "background distribution aborted");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Startup objects
    // -----------------------------------------------------------------------

    /// Set the object an application loads first when it starts. One per
    /// token.
    pub fn register_startup(&self, conn: ConnectionId, ghid: Ghid) -> DispatchResult<()> {
        let mut sessions = self.sessions();
        let token = sessions.token_of(conn)?;
        if sessions.startup_by_token.contains_key(&token) {
            return Err(DispatchError::StartupExists(token));
        }
        sessions.startup_by_token.insert(token, ghid);
        Ok(())
    }

    /// Clear and return the startup object of `conn`'s token.
    pub fn deregister_startup(&self, conn: ConnectionId) -> DispatchResult<Ghid> {
        let mut sessions = self.sessions();
        let token = sessions.token_of(conn)?;
        sessions
            .startup_by_token
            .remove(&token)
            .ok_or(DispatchError::NoStartupObject(token))
    }

    /// Startup object of `token`. Fails for tokens never issued.
    pub fn get_startup_obj(&self, token: AppToken) -> DispatchResult<Option<Ghid>> {
        let sessions = self.sessions();
        if !sessions.known_tokens.contains(&token) {
            return Err(DispatchError::UnknownToken(token));
        }
        Ok(sessions.startup_by_token.get(&token).copied())
    }

    // -----------------------------------------------------------------------
    // Distribution
    // -----------------------------------------------------------------------

    /// Share `ghid` with every connection subscribed to its API or holding
    /// a copy, except `skip`. `origin` is the sharing identity, or `None`
    /// for objects created locally.
    ///
    /// An inbound share that nobody is interested in is kept as an orphan
    /// and delivered by [`add_api`](Self::add_api). Returns the number of
    /// connections that accepted the notification.
    pub async fn distribute_share(
        &self,
        ghid: Ghid,
        origin: Option<Ghid>,
        skip: Option<ConnectionId>,
    ) -> DispatchResult<usize> {
        let api_id = self.inner.index.api_id(&ghid).await?;
        let mut callsheet = {
            let mut sessions = self.sessions();
            let callsheet = sessions.callsheet(&ghid, Some(&api_id));
            if callsheet.is_empty() {
                if let Some(origin) = origin {
                    info!(ghid = %ghid.short_hex(), "no interested application; keeping orphan share");
                    sessions.orphan_shares.insert(OrphanShare { ghid, origin });
                }
                return Ok(0);
            }
            callsheet
        };

        if let Some(skip) = skip {
            callsheet.remove(&skip);
        }
        debug!(
            ghid = %ghid.short_hex(),
            origin = ?origin.map(|o| o.short_hex()),
            calls = callsheet.len(),
            "distributing share"
        );
        Ok(self
            .distribute(callsheet, Notification::Share { ghid, origin, api_id })
            .await)
    }

    /// Tell every connection subscribed to the API of `ghid` or holding a
    /// copy of it, except `skip`, that it changed or was deleted.
    ///
    /// Private objects only reach the connections already holding them, as
    /// do objects whose API cannot be resolved. Returns the number of
    /// connections that accepted the notification.
    pub async fn distribute_update(
        &self,
        ghid: Ghid,
        deleted: bool,
        skip: Option<ConnectionId>,
    ) -> usize {
        let api_id = if self.private_parent_lookup(&ghid).is_some() {
            None
        } else {
            match self.inner.index.api_id(&ghid).await {
                Ok(api_id) => Some(api_id),
                Err(e) => {
                    debug!(ghid = %ghid.short_hex(), error = %e, "no api for update; holders only");
                    None
                }
            }
        };
        let mut callsheet = self.sessions().callsheet(&ghid, api_id.as_ref());
        if let Some(skip) = skip {
            callsheet.remove(&skip);
        }

        let notification = if deleted {
            Notification::Delete { ghid }
        } else {
            Notification::Update { ghid }
        };
        self.distribute(callsheet, notification).await
    }

    /// Tell the applications behind `tokens` that `recipient` received `ghid`.
    pub async fn distribute_share_success(
        &self,
        ghid: Ghid,
        recipient: Ghid,
        tokens: &[AppToken],
    ) -> usize {
        self.distribute_receipt(ShareReceipt { ghid, recipient, success: true }, tokens)
            .await
    }

    /// Tell the applications behind `tokens` that sharing `ghid` with
    /// `recipient` failed.
    pub async fn distribute_share_failure(
        &self,
        ghid: Ghid,
        recipient: Ghid,
        tokens: &[AppToken],
    ) -> usize {
        self.distribute_receipt(ShareReceipt { ghid, recipient, success: false }, tokens)
            .await
    }

    async fn distribute_receipt(&self, receipt: ShareReceipt, tokens: &[AppToken]) -> usize {
        let callsheet = {
            let mut sessions = self.sessions();
            let mut callsheet = Callsheet::new();
            for token in tokens {
                let conn = sessions.conn_by_token.get(token).copied();
                match conn {
                    Some(conn) => {
                        callsheet.insert(conn);
                    }
                    None => {
                        info!(%token, "no connection for token; holding share receipt");
                        sessions.orphan_receipts.entry(*token).or_default().push(receipt);
                    }
                }
            }
            callsheet
        };
        self.distribute(callsheet, receipt.notification()).await
    }

    /// Notify every connection of the callsheet in parallel. Individual
    /// failures are logged and never affect the other deliveries. Returns
    /// the number of successful deliveries.
    async fn distribute(&self, callsheet: Callsheet, notification: Notification) -> usize {
        if callsheet.is_empty() {
            return 0;
        }
        info!(
            calls = callsheet.len(),
            kind = notification.kind(),
            ghid = %notification.ghid().short_hex(),
            "dispatching"
        );

        let mut deliveries = JoinSet::new();
        for conn in callsheet {
            let notifier = Arc::clone(&self.inner.notifier);
            let notification = notification.clone();
            deliveries.spawn(async move { (conn, notifier.notify(conn, notification).await) });
        }

        let mut delivered = 0;
        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, Ok(()))) => delivered += 1,
                Ok((conn, Err(e))) => warn!(%conn, error = %e, "notification failed"),
                Err(e) => warn!(error = %e, "notification task aborted"),
            }
        }
        delivered
    }

    /// Number of inbound shares waiting for an interested application.
    pub fn orphan_count(&self) -> usize {
        self.sessions().orphan_shares.len()
    }
}

#[async_trait]
impl GaoObserver for Dispatcher {
    async fn updated(&self, ghid: Ghid) {
        self.distribute_update(ghid, false, None).await;
    }

    async fn deleted(&self, ghid: Ghid) {
        self.distribute_update(ghid, true, None).await;
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sessions = self.sessions();
        f.debug_struct("Dispatcher")
            .field("connections", &sessions.token_by_conn.len())
            .field("known_tokens", &sessions.known_tokens.len())
            .field("private", &sessions.private_by_ghid.len())
            .field("orphans", &sessions.orphan_shares.len())
            .finish()
    }
}
