use async_trait::async_trait;
use chrono::Utc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::StateStore;
use crate::store::LockStore;
use pkg_constants::lock::LOCK_KEY_PREFIX;
use pkg_types::lock::{LockRecord, lease_end};

/// Lock store persisted in SlateDB.
///
/// Records live at `/registry/locks/<name>` as JSON [`LockRecord`]s. The store
/// owns the database handle, and every primitive runs as one section under
/// `ops`, so a conditional write is a single store-side operation: no caller
/// ever sees, or acts on, the state between the check and the write.
/// Expiry is judged against this store's wall clock.
///
/// `ops` only serializes callers sharing this value. SlateDB fences writers:
/// a second process opening the same data dir takes over the database and the
/// first one's writes start failing. Replicas in separate processes must share
/// one `lockrun` process, or reach the store through a service.
pub struct SlateLockStore {
    state: StateStore,
    ops: Mutex<()>,
}

fn lock_key(name: &str) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, name)
}

impl SlateLockStore {
    pub fn new(state: StateStore) -> Self {
        Self {
            state,
            ops: Mutex::new(()),
        }
    }

    /// Open a SlateDB database at `path` and wrap it.
    pub async fn open(path: &str) -> anyhow::Result<Self> {
        let state = StateStore::new(path).await?;
        info!("Lock records stored under {}", LOCK_KEY_PREFIX);
        Ok(Self::new(state))
    }

    pub async fn close(self) -> anyhow::Result<()> {
        self.state.close().await
    }
}

#[async_trait]
impl LockStore for SlateLockStore {
    async fn acquire(&self, name: &str, owner: &str, max_lease: Duration) -> anyhow::Result<bool> {
        let _op = self.ops.lock().await;
        let key = lock_key(name);
        let now = Utc::now();

        if let Some(existing) = self.state.get_json::<LockRecord>(&key).await? {
            if !existing.is_expired_at(now) {
                return Ok(false);
            }
            debug!("Lock {} expired (held by {}), reclaiming", name, existing.owner);
        }

        let record = LockRecord::new(name, owner, now, max_lease);
        self.state.put_json(&key, &record).await?;
        Ok(true)
    }

    async fn release(&self, name: &str, owner: &str) -> anyhow::Result<bool> {
        let _op = self.ops.lock().await;
        let key = lock_key(name);
        let now = Utc::now();

        let live = match self.state.get_json::<LockRecord>(&key).await? {
            Some(record) if record.owner == owner => !record.is_expired_at(now),
            _ => return Ok(false),
        };
        self.state.delete(&key).await?;
        Ok(live)
    }

    async fn extend(&self, name: &str, owner: &str, max_lease: Duration) -> anyhow::Result<bool> {
        let _op = self.ops.lock().await;
        let key = lock_key(name);
        let now = Utc::now();

        match self.state.get_json::<LockRecord>(&key).await? {
            Some(mut record) if record.is_held_by(owner, now) => {
                record.expires_at = lease_end(now, max_lease);
                self.state.put_json(&key, &record).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn owner(&self, name: &str) -> anyhow::Result<Option<String>> {
        let now = Utc::now();
        Ok(self
            .state
            .get_json::<LockRecord>(&lock_key(name))
            .await?
            .filter(|record| !record.is_expired_at(now))
            .map(|record| record.owner))
    }
}
