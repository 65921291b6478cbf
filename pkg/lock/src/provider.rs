use pkg_constants::lock::OWNER_TOKEN_SEPARATOR;
use pkg_state::LockStore;
use pkg_types::lock::LeaseConfig;
use pkg_types::validate::validate_replica_id;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::handle::LockHandle;

/// Result of one acquisition attempt.
#[derive(Debug)]
pub enum Acquire {
    Acquired(LockHandle),
    /// Someone else holds an unexpired lease. Expected on all but one replica.
    Contended,
    /// The store could not answer. Treated as not acquired.
    StoreUnavailable(anyhow::Error),
}

/// Try-once lease lock over a shared [`LockStore`].
///
/// Every attempt gets a fresh owner token `<replica-id>:<uuid-v4>`, so a
/// token never outlives the acquisition it was minted for and a stale holder
/// can never release somebody else's lock. There is no blocking variant: a
/// periodic task that loses simply waits for its next trigger.
pub struct LockProvider {
    store: Arc<dyn LockStore>,
    replica_id: String,
}

impl LockProvider {
    pub fn new(store: Arc<dyn LockStore>, replica_id: impl Into<String>) -> anyhow::Result<Self> {
        let replica_id = replica_id.into();
        validate_replica_id(&replica_id)?;
        Ok(Self { store, replica_id })
    }

    pub fn replica_id(&self) -> &str {
        &self.replica_id
    }

    fn next_token(&self) -> String {
        format!(
            "{}{}{}",
            self.replica_id,
            OWNER_TOKEN_SEPARATOR,
            Uuid::new_v4().simple()
        )
    }

    /// Try to take `name` for `lease.max_lease()`. `None` means skip this
    /// run, whether because of contention or because the store failed.
    pub async fn try_lock(&self, name: &str, lease: &LeaseConfig) -> Option<LockHandle> {
        match self.try_lock_outcome(name, lease).await {
            Acquire::Acquired(handle) => Some(handle),
            Acquire::Contended | Acquire::StoreUnavailable(_) => None,
        }
    }

    /// Same protocol as [`LockProvider::try_lock`], keeping the reason a lock
    /// was not acquired.
    pub async fn try_lock_outcome(&self, name: &str, lease: &LeaseConfig) -> Acquire {
        let owner = self.next_token();

        match self.store.acquire(name, &owner, lease.max_lease()).await {
            Ok(true) => {
                debug!(
                    "Lock {} acquired by {} (max_lease={:?}, min_lease={:?})",
                    name,
                    owner,
                    lease.max_lease(),
                    lease.min_lease()
                );
                Acquire::Acquired(LockHandle::new(
                    name.to_string(),
                    owner,
                    self.store.clone(),
                    Instant::now(),
                    lease.min_lease(),
                ))
            }
            Ok(false) => {
                debug!("Lock {} is held elsewhere; {} backs off", name, self.replica_id);
                Acquire::Contended
            }
            Err(e) => {
                warn!(
                    "Lock store unavailable while {} tried {}: {:#}",
                    self.replica_id, name, e
                );
                Acquire::StoreUnavailable(e)
            }
        }
    }
}
