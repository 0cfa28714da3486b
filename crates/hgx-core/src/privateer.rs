use std::collections::HashMap;
use std::sync::RwLock;

use tracing::{debug, warn};

use hgx_crypto::Secret;
use hgx_golix::IdentityProvider;
use hgx_types::Ghid;

use crate::error::{GaoError, GaoResult};

#[derive(Default)]
struct Tiers {
    /// Derived or received but not yet proven by opening a container.
    staged: HashMap<Ghid, Secret>,
    /// Proven secrets kept for the account.
    committed: HashMap<Ghid, Secret>,
    /// Proven secrets that are never shared beyond this node (master-secret objects).
    local: HashMap<Ghid, Secret>,
}

impl Tiers {
    fn find(&self, ghid: &Ghid) -> Option<&Secret> {
        self.staged
            .get(ghid)
            .or_else(|| self.committed.get(ghid))
            .or_else(|| self.local.get(ghid))
    }
}

/// Store of container secrets, keyed by container ghid.
///
/// A secret enters as *staged* and moves to *committed* (or *local*) once
/// a container has actually been opened or sealed with it.
#[derive(Default)]
pub struct Privateer {
    tiers: RwLock<Tiers>,
}

impl Privateer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether any tier holds a secret for `ghid`.
    pub fn contains(&self, ghid: &Ghid) -> bool {
        self.tiers.read().expect("lock poisoned").find(ghid).is_some()
    }

    /// Secret for `ghid` from whichever tier holds it.
    pub fn get(&self, ghid: &Ghid) -> GaoResult<Secret> {
        self.tiers
            .read()
            .expect("lock poisoned")
            .find(ghid)
            .cloned()
            .ok_or(GaoError::UnknownSecret(*ghid))
    }

    /// Stage a secret for `ghid`. Staging the secret already known is a no-op.
    pub fn stage(&self, ghid: Ghid, secret: Secret) -> GaoResult<()> {
        let mut tiers = self.tiers.write().expect("lock poisoned");
        match tiers.find(&ghid) {
            Some(existing) if *existing == secret => Ok(()),
            Some(_) => {
                warn!(ghid = %ghid.short_hex(), "refusing to replace a known secret");
                Err(GaoError::ConflictingSecrets(ghid))
            }
            None => {
                tiers.staged.insert(ghid, secret);
                Ok(())
            }
        }
    }

    /// Promote a staged secret. With `localize` it is kept in the local-only tier.
    pub fn commit(&self, ghid: &Ghid, localize: bool) -> GaoResult<()> {
        let mut tiers = self.tiers.write().expect("lock poisoned");
        match tiers.staged.remove(ghid) {
            Some(secret) => {
                if localize {
                    tiers.local.insert(*ghid, secret);
                } else {
                    tiers.committed.insert(*ghid, secret);
                }
                Ok(())
            }
            None if tiers.committed.contains_key(ghid) || tiers.local.contains_key(ghid) => Ok(()),
            None => Err(GaoError::UnknownSecret(*ghid)),
        }
    }

    /// Forget a secret in every tier. Returns whether anything was removed.
    pub fn abandon(&self, ghid: &Ghid) -> bool {
        let mut tiers = self.tiers.write().expect("lock poisoned");
        let staged = tiers.staged.remove(ghid).is_some();
        let committed = tiers.committed.remove(ghid).is_some();
        let local = tiers.local.remove(ghid).is_some();
        staged || committed || local
    }

    /// Number of secrets known in any tier.
    pub fn len(&self) -> usize {
        let tiers = self.tiers.read().expect("lock poisoned");
        tiers.staged.len() + tiers.committed.len() + tiers.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Next secret of the chain for `proxy`, following `current_target`.
    ///
    /// With a master secret, every link is derived from the master instead
    /// of the previous link, so the chain never breaks.
    pub fn ratchet_chain(
        &self,
        provider: &dyn IdentityProvider,
        proxy: &Ghid,
        current_target: &Ghid,
        master: Option<&Secret>,
    ) -> GaoResult<Secret> {
        let seed = match master {
            Some(master) => master.clone(),
            None => self.get(current_target).map_err(|_| GaoError::Ratchet {
                proxy: *proxy,
                reason: format!("no secret for {}", current_target.short_hex()),
            })?,
        };
        Ok(provider.ratchet(&seed, proxy, current_target))
    }

    /// Stage every missing secret of `target_vector` (newest first) by
    /// ratcheting forward from the newest target whose secret is known.
    ///
    /// With a master secret the walk starts at the oldest target. Secrets
    /// are staged only; they are committed once a container opens.
    pub fn heal_chain(
        &self,
        provider: &dyn IdentityProvider,
        proxy: &Ghid,
        target_vector: &[Ghid],
        master: Option<&Secret>,
    ) -> GaoResult<()> {
        if target_vector.is_empty() {
            return Err(GaoError::Ratchet {
                proxy: *proxy,
                reason: "target vector is empty".into(),
            });
        }

        let start = match master {
            Some(_) => target_vector.len() - 1,
            None => target_vector
                .iter()
                .position(|t| self.contains(t))
                .ok_or_else(|| GaoError::Ratchet {
                    proxy: *proxy,
                    reason: "broken ratchet: no known secret in target history".into(),
                })?,
        };

        for ii in (0..start).rev() {
            let target = target_vector[ii];
            if self.contains(&target) {
                continue;
            }
            let secret = self.ratchet_chain(provider, proxy, &target_vector[ii + 1], master)?;
            debug!(proxy = %proxy.short_hex(), target = %target.short_hex(), "healed secret");
            self.stage(target, secret)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Privateer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Privateer").field("secrets", &self.len()).finish()
    }
}
