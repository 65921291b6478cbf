use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use pkg_types::lock::LeaseConfig;
use pkg_types::validate::validate_lock_name;
use std::collections::BTreeMap;
use std::future::Future;
use tracing::info;

use crate::guard::{ExecutionGuard, Outcome};

type Work = Box<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct RegisteredTask {
    lease: LeaseConfig,
    work: Work,
}

/// Binds lock names to protected work at startup.
///
/// A name belongs to exactly one task; binding it twice is rejected here,
/// at setup, instead of letting two unrelated tasks exclude each other at
/// run time.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, RegisteredTask>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: &str, lease: LeaseConfig, work: F) -> anyhow::Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        validate_lock_name(name)?;
        if self.tasks.contains_key(name) {
            anyhow::bail!("lock name '{}' is already bound to another task", name);
        }

        info!(
            "Registered task {} (max_lease={:?}, min_lease={:?})",
            name,
            lease.max_lease(),
            lease.min_lease()
        );
        self.tasks.insert(
            name.to_string(),
            RegisteredTask {
                lease,
                work: Box::new(move || work().boxed()),
            },
        );
        Ok(())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tasks.keys().map(String::as_str)
    }

    pub fn lease(&self, name: &str) -> Option<LeaseConfig> {
        self.tasks.get(name).map(|task| task.lease)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Fire `name` once through `guard`.
    pub async fn fire(&self, guard: &ExecutionGuard, name: &str) -> anyhow::Result<Outcome> {
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("no task registered under '{}'", name))?;
        Ok(guard.run(name, &task.lease, || (task.work)()).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::LockProvider;
    use pkg_state::MemoryLockStore;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn lease() -> LeaseConfig {
        LeaseConfig::new(Duration::from_secs(60), Duration::ZERO).unwrap()
    }

    async fn noop() -> anyhow::Result<()> {
        Ok(())
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = TaskRegistry::new();
        registry.register("stock-sweep", lease(), noop).unwrap();
        assert!(registry.register("stock-sweep", lease(), noop).is_err());
        assert!(registry.register("bad name", lease(), noop).is_err());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["stock-sweep"]);
        assert_eq!(registry.lease("stock-sweep"), Some(lease()));
        assert!(registry.lease("missing").is_none());
    }

    #[tokio::test]
    async fn fire_runs_through_guard() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut registry = TaskRegistry::new();
        registry
            .register("invoice-reconcile", lease(), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, anyhow::Error>(())
                }
            })
            .unwrap();

        let store = Arc::new(MemoryLockStore::new());
        let guard = ExecutionGuard::new(Arc::new(LockProvider::new(store, "replica-0").unwrap()));

        assert!(registry.fire(&guard, "invoice-reconcile").await.unwrap().ran());
        assert!(registry.fire(&guard, "invoice-reconcile").await.unwrap().ran());
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert!(registry.fire(&guard, "unknown").await.is_err());
    }
}
