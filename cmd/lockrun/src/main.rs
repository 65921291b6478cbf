mod trigger;
mod work;

use clap::Parser;
use pkg_constants::paths::{
    DEFAULT_CONFIG, DEFAULT_DATA_DIR, DEFAULT_REPLICA_PREFIX, DEFAULT_REPLICAS,
};
use pkg_lock::{ExecutionGuard, LockProvider, TaskRegistry};
use pkg_state::{LockStore, MemoryLockStore, SlateLockStore};
use pkg_types::config::{LockrunConfigFile, load_config_file};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::trigger::IntervalTrigger;
use crate::work::run_command;

#[derive(Parser, Debug)]
#[command(
    name = "lockrun",
    about = "Run periodic tasks at most once across a fleet of replicas"
)]
struct Cli {
    /// Path to YAML task file
    #[arg(long, short, default_value = DEFAULT_CONFIG)]
    config: String,

    /// Directory for SlateDB lock storage
    #[arg(long)]
    data_dir: Option<String>,

    /// Number of replicas to run in this process, all sharing one lock store
    #[arg(long)]
    replicas: Option<usize>,

    /// Prefix for replica ids (`<prefix>-<index>`)
    #[arg(long)]
    replica_prefix: Option<String>,

    /// Keep locks in memory instead of SlateDB
    #[arg(long)]
    memory: bool,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    // Load config file (returns defaults if file not found)
    let file_cfg: LockrunConfigFile = load_config_file(&cli.config)?;
    info!("Config file: {}", cli.config);

    // Merge: CLI args > config file > defaults
    let data_dir = cli
        .data_dir
        .or(file_cfg.data_dir)
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    let replicas = cli.replicas.or(file_cfg.replicas).unwrap_or(DEFAULT_REPLICAS);
    let replica_prefix = cli
        .replica_prefix
        .or(file_cfg.replica_prefix)
        .unwrap_or_else(|| DEFAULT_REPLICA_PREFIX.to_string());

    if replicas == 0 {
        anyhow::bail!("replicas must be at least 1");
    }
    if file_cfg.tasks.is_empty() {
        anyhow::bail!("no tasks configured in {}", cli.config);
    }

    // Every lease and name is checked here; a bad task never reaches a trigger.
    let mut registry = TaskRegistry::new();
    let mut schedule = Vec::with_capacity(file_cfg.tasks.len());
    for task in &file_cfg.tasks {
        let lease = task.lease()?;
        let interval = task.interval()?;
        let name = task.name.clone();
        let command = task.command.clone();
        registry.register(&task.name, lease, move || {
            run_command(name.clone(), command.clone())
        })?;
        schedule.push((task.name.clone(), interval));
    }
    let registry = Arc::new(registry);

    info!("Starting lockrun");
    info!("  Tasks:     {}", registry.names().collect::<Vec<_>>().join(", "));
    info!("  Replicas:  {} ({}-*)", replicas, replica_prefix);

    let (store, slate): (Arc<dyn LockStore>, Option<Arc<SlateLockStore>>) = if cli.memory {
        info!("  Store:     memory");
        let memory: Arc<dyn LockStore> = Arc::new(MemoryLockStore::new());
        (memory, None)
    } else {
        info!("  Store:     SlateDB at {}", data_dir);
        let slate = Arc::new(SlateLockStore::open(&data_dir).await?);
        let shared: Arc<dyn LockStore> = slate.clone();
        (shared, Some(slate))
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut triggers = Vec::new();
    for i in 0..replicas {
        let replica_id = format!("{}-{}", replica_prefix, i);
        let provider = Arc::new(LockProvider::new(store.clone(), replica_id)?);
        let guard = Arc::new(ExecutionGuard::new(provider).with_shutdown(shutdown_rx.clone()));
        for (name, interval) in &schedule {
            let trigger = IntervalTrigger::new(
                registry.clone(),
                guard.clone(),
                name.clone(),
                *interval,
                shutdown_rx.clone(),
            );
            triggers.push(trigger.start());
        }
    }
    drop(store);

    // Block until Ctrl-C
    info!("lockrun is running. Press Ctrl-C to stop.");
    tokio::signal::ctrl_c().await?;
    info!("Shutting down lockrun");
    let _ = shutdown_tx.send(true);

    for trigger in triggers {
        if let Err(e) = trigger.await {
            warn!("Trigger ended abnormally: {}", e);
        }
    }

    if let Some(slate) = slate {
        match Arc::try_unwrap(slate) {
            Ok(slate) => slate.close().await?,
            Err(_) => warn!("Lock store still in use at exit; leaving it to SlateDB recovery"),
        }
    }

    Ok(())
}
