use pkg_lock::{ExecutionGuard, TaskRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Fires one registered task on a fixed interval for one replica.
///
/// Each firing is awaited before the next tick, so a replica never overlaps
/// itself on the same name. Ticks missed while a run was in progress are
/// skipped, not replayed.
pub struct IntervalTrigger {
    registry: Arc<TaskRegistry>,
    guard: Arc<ExecutionGuard>,
    name: String,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl IntervalTrigger {
    pub fn new(
        registry: Arc<TaskRegistry>,
        guard: Arc<ExecutionGuard>,
        name: String,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            registry,
            guard,
            name,
            interval,
            shutdown,
        }
    }

    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let replica = self.guard.provider().replica_id().to_string();
            info!(
                "Trigger for {} started on {} (interval={:?})",
                self.name, replica, self.interval
            );

            let mut shutdown = self.shutdown.clone();
            let mut interval = tokio::time::interval(self.interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                if *shutdown.borrow_and_update() {
                    break;
                }
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }

                if let Err(e) = self.registry.fire(&self.guard, &self.name).await {
                    warn!("Trigger for {} on {} failed: {}", self.name, replica, e);
                }
            }

            info!("Trigger for {} stopped on {}", self.name, replica);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pkg_lock::LockProvider;
    use pkg_state::MemoryLockStore;
    use pkg_types::lock::LeaseConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fleet_runs_once_per_tick() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let mut registry = TaskRegistry::new();
        registry
            .register(
                "stock-sweep",
                LeaseConfig::new(Duration::from_secs(8), Duration::from_secs(5)).unwrap(),
                move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, anyhow::Error>(())
                    }
                },
            )
            .unwrap();
        let registry = Arc::new(registry);

        let store = Arc::new(MemoryLockStore::new());
        let (tx, rx) = watch::channel(false);
        let mut handles = Vec::new();
        for i in 0..3 {
            let provider = LockProvider::new(store.clone(), format!("replica-{}", i)).unwrap();
            let guard = Arc::new(ExecutionGuard::new(Arc::new(provider)).with_shutdown(rx.clone()));
            handles.push(
                IntervalTrigger::new(
                    registry.clone(),
                    guard,
                    "stock-sweep".to_string(),
                    Duration::from_secs(10),
                    rx.clone(),
                )
                .start(),
            );
        }

        // Ticks at 0s, 10s, 20s and 30s.
        tokio::time::sleep(Duration::from_secs(35)).await;
        tx.send(true).unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_when_shutdown_is_already_set() {
        let registry = Arc::new(TaskRegistry::new());
        let store = Arc::new(MemoryLockStore::new());
        let provider = LockProvider::new(store, "replica-0").unwrap();
        let guard = Arc::new(ExecutionGuard::new(Arc::new(provider)));
        let (_tx, rx) = watch::channel(true);

        IntervalTrigger::new(registry, guard, "none".to_string(), Duration::from_secs(1), rx)
            .start()
            .await
            .unwrap();
    }
}
