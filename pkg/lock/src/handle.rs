use pkg_constants::lock::MAX_LEASE_SECS;
use pkg_state::LockStore;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Proof of one successful acquisition.
///
/// Only [`crate::LockProvider`] creates handles. A handle is not `Clone`: it
/// is the capability to release one specific acquisition, identified by its
/// owner token.
///
/// Releasing is idempotent. Dropping an unreleased handle inside a Tokio
/// runtime spawns a best-effort release; outside one, the lease runs out in
/// the store.
pub struct LockHandle {
    name: String,
    owner: String,
    store: Arc<dyn LockStore>,
    acquired_at: Instant,
    min_hold_until: Instant,
    released: bool,
}

impl LockHandle {
    pub(crate) fn new(
        name: String,
        owner: String,
        store: Arc<dyn LockStore>,
        acquired_at: Instant,
        min_lease: Duration,
    ) -> Self {
        Self {
            name,
            owner,
            store,
            acquired_at,
            min_hold_until: acquired_at
                .checked_add(min_lease.min(Duration::from_secs(MAX_LEASE_SECS)))
                .unwrap_or(acquired_at),
            released: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fencing token of this acquisition.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    /// The lock must not be released before this instant.
    pub fn min_hold_until(&self) -> Instant {
        self.min_hold_until
    }

    /// Time left until `min_hold_until`, zero once it has passed.
    pub fn remaining_min_hold(&self) -> Duration {
        self.min_hold_until
            .saturating_duration_since(Instant::now())
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    /// Whether the store still names this handle's token as the owner.
    pub async fn is_held(&self) -> anyhow::Result<bool> {
        if self.released {
            return Ok(false);
        }
        let owner = self.store.owner(&self.name).await?;
        Ok(owner.as_deref() == Some(self.owner.as_str()))
    }

    /// Refresh the lease to now + `max_lease`. `Ok(false)` if it already ran
    /// out or the handle was released.
    pub async fn extend(&self, max_lease: Duration) -> anyhow::Result<bool> {
        if self.released {
            return Ok(false);
        }
        let extended = self.store.extend(&self.name, &self.owner, max_lease).await?;
        if !extended {
            warn!(
                "Lock {} could not be extended: {} no longer holds it",
                self.name, self.owner
            );
        }
        Ok(extended)
    }

    /// Give the lock back. Returns true only when this call deleted a record
    /// this handle still owned. Never retried, never fails.
    pub async fn release(&mut self) -> bool {
        if self.released {
            debug!("Lock {} already released by {}", self.name, self.owner);
            return false;
        }
        self.released = true;

        match self.store.release(&self.name, &self.owner).await {
            Ok(true) => {
                debug!("Lock {} released by {}", self.name, self.owner);
                true
            }
            Ok(false) => {
                warn!(
                    "Lock {} was no longer held by {} at release; its lease had already run out",
                    self.name, self.owner
                );
                false
            }
            Err(e) => {
                warn!(
                    "Failed to release lock {} for {}: {:#}; it will expire in the store",
                    self.name, self.owner, e
                );
                false
            }
        }
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                "Lock {} dropped outside a runtime; it will expire in the store",
                self.name
            );
            return;
        };
        let store = self.store.clone();
        let name = std::mem::take(&mut self.name);
        let owner = std::mem::take(&mut self.owner);
        runtime.spawn(async move {
            match store.release(&name, &owner).await {
                Ok(true) => debug!("Lock {} released on drop by {}", name, owner),
                Ok(false) => debug!("Lock {} already gone when {} dropped it", name, owner),
                Err(e) => warn!("Failed to release dropped lock {}: {:#}", name, e),
            }
        });
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("min_hold_until", &self.min_hold_until)
            .field("released", &self.released)
            .finish()
    }
}
