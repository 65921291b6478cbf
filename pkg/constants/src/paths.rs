//! Filesystem path and process defaults.

/// Default task file path for `lockrun`.
pub const DEFAULT_CONFIG: &str = "/etc/lockrun/config.yaml";

/// Default data directory for the SlateDB lock store.
pub const DEFAULT_DATA_DIR: &str = "/tmp/lockrun-data";

/// Default number of simulated replicas started by `lockrun`.
pub const DEFAULT_REPLICAS: usize = 1;

/// Default prefix for replica ids. Full id = `prefix + "-" + index`.
pub const DEFAULT_REPLICA_PREFIX: &str = "replica";
