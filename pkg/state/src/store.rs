use async_trait::async_trait;
use std::time::Duration;

/// Capability over a shared key/value medium with atomic conditional writes
/// and store-enforced expiry.
///
/// Every write method must run as one atomic operation at the store. An
/// implementation that reads the record and then writes it from the client
/// side lets two replicas interleave and both "win".
///
/// Expiry is judged by the store's own clock, never by the caller's.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Create the record for `name` owned by `owner`, expiring after
    /// `max_lease`, if no unexpired record exists.
    /// Returns `Ok(false)` when someone else holds it.
    async fn acquire(&self, name: &str, owner: &str, max_lease: Duration) -> anyhow::Result<bool>;

    /// Delete the record for `name` only if `owner` holds it.
    /// Returns `Ok(false)` on owner mismatch, expiry or absence.
    async fn release(&self, name: &str, owner: &str) -> anyhow::Result<bool>;

    /// Push the expiry of `name` to now + `max_lease` only if `owner` still
    /// holds an unexpired record.
    async fn extend(&self, name: &str, owner: &str, max_lease: Duration) -> anyhow::Result<bool>;

    /// Current unexpired owner of `name`. Read-only; never feed the answer
    /// into a write decision.
    async fn owner(&self, name: &str) -> anyhow::Result<Option<String>>;
}
