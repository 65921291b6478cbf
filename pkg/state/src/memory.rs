use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use crate::store::LockStore;

/// Fallback lease end when `now + max_lease` overflows `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(60 * 60 * 24 * 365 * 30);

struct Entry {
    owner: String,
    expires_at: Instant,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// In-process lock store.
///
/// Shared between replicas that live in one process (simulated fleets,
/// tests). Each primitive runs inside a single critical section on `entries`,
/// which is what makes it atomic. Expiry uses `tokio::time::Instant`, so tests
/// can drive it with a paused clock.
#[derive(Default)]
pub struct MemoryLockStore {
    entries: Mutex<HashMap<String, Entry>>,
    unavailable: AtomicBool,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every primitive fail, as if the medium were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> anyhow::Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            anyhow::bail!("memory lock store is unavailable");
        }
        Ok(())
    }

    fn entries(&self) -> anyhow::Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory lock store mutex poisoned"))
    }
}

fn lease_end(now: Instant, max_lease: Duration) -> Instant {
    now.checked_add(max_lease).unwrap_or(now + FAR_FUTURE)
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn acquire(&self, name: &str, owner: &str, max_lease: Duration) -> anyhow::Result<bool> {
        self.check_available()?;
        let mut entries = self.entries()?;
        let now = Instant::now();

        if let Some(existing) = entries.get(name) {
            if existing.is_live(now) {
                return Ok(false);
            }
            debug!("Lock {} expired (held by {}), reclaiming", name, existing.owner);
        }

        entries.insert(
            name.to_string(),
            Entry {
                owner: owner.to_string(),
                expires_at: lease_end(now, max_lease),
            },
        );
        Ok(true)
    }

    async fn release(&self, name: &str, owner: &str) -> anyhow::Result<bool> {
        self.check_available()?;
        let mut entries = self.entries()?;
        let now = Instant::now();

        let live = match entries.get(name) {
            Some(entry) if entry.owner == owner => entry.is_live(now),
            _ => return Ok(false),
        };
        // An expired record still carrying our token is dead weight; drop it,
        // but report that nothing was held.
        entries.remove(name);
        Ok(live)
    }

    async fn extend(&self, name: &str, owner: &str, max_lease: Duration) -> anyhow::Result<bool> {
        self.check_available()?;
        let mut entries = self.entries()?;
        let now = Instant::now();

        match entries.get_mut(name) {
            Some(entry) if entry.owner == owner && entry.is_live(now) => {
                entry.expires_at = lease_end(now, max_lease);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn owner(&self, name: &str) -> anyhow::Result<Option<String>> {
        self.check_available()?;
        let entries = self.entries()?;
        let now = Instant::now();
        Ok(entries
            .get(name)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.owner.clone()))
    }
}
