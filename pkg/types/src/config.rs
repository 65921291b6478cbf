use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::lock::LeaseConfig;
use crate::validate::validate_lock_name;
use pkg_constants::lock::{
    DEFAULT_MAX_LEASE_SECS, DEFAULT_MIN_LEASE_SECS, DEFAULT_TASK_INTERVAL_SECS,
};

/// `lockrun` configuration file (YAML).
///
/// Example `config.yaml`:
/// ```yaml
/// data-dir: /var/lib/lockrun
/// replicas: 3
/// tasks:
///   - name: invoice-reconcile
///     interval: 1m
///     max-lease: 50s
///     min-lease: 10s
///     command: ./bin/reconcile
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockrunConfigFile {
    #[serde(default, alias = "data-dir")]
    pub data_dir: Option<String>,
    #[serde(default)]
    pub replicas: Option<usize>,
    #[serde(default, alias = "replica-prefix")]
    pub replica_prefix: Option<String>,
    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

/// One protected task as written in the config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskConfig {
    pub name: String,
    #[serde(default, with = "humantime_serde")]
    pub interval: Option<Duration>,
    #[serde(default, alias = "max-lease", with = "humantime_serde")]
    pub max_lease: Option<Duration>,
    #[serde(default, alias = "min-lease", with = "humantime_serde")]
    pub min_lease: Option<Duration>,
    #[serde(default)]
    pub command: Option<String>,
}

impl TaskConfig {
    /// Validate the name and lease pair. Fails on anything that must not
    /// reach a running trigger.
    pub fn lease(&self) -> anyhow::Result<LeaseConfig> {
        validate_lock_name(&self.name)?;
        let max_lease = self
            .max_lease
            .unwrap_or(Duration::from_secs(DEFAULT_MAX_LEASE_SECS));
        let min_lease = self
            .min_lease
            .unwrap_or(Duration::from_secs(DEFAULT_MIN_LEASE_SECS));
        LeaseConfig::new(max_lease, min_lease)
            .map_err(|e| anyhow::anyhow!("task '{}': {}", self.name, e))
    }

    pub fn interval(&self) -> anyhow::Result<Duration> {
        let interval = self
            .interval
            .unwrap_or(Duration::from_secs(DEFAULT_TASK_INTERVAL_SECS));
        if interval.is_zero() {
            anyhow::bail!("task '{}': interval must be greater than zero", self.name);
        }
        Ok(interval)
    }
}

/// Load a YAML config file, returning the default if the file doesn't exist.
pub fn load_config_file<T: serde::de::DeserializeOwned + Default>(path: &str) -> anyhow::Result<T> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(T::default());
        }
        Err(e) => return Err(e.into()),
    };
    let config: T = serde_yaml::from_str(&content)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_kebab_case_file() {
        let yaml = r#"
data-dir: /var/lib/lockrun
replicas: 3
tasks:
  - name: invoice-reconcile
    interval: 1m
    max-lease: 50s
    min-lease: 10s
    command: echo hi
  - name: stock-sweep
"#;
        let cfg: LockrunConfigFile = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.data_dir.as_deref(), Some("/var/lib/lockrun"));
        assert_eq!(cfg.replicas, Some(3));
        assert_eq!(cfg.tasks.len(), 2);

        let lease = cfg.tasks[0].lease().unwrap();
        assert_eq!(lease.max_lease(), Duration::from_secs(50));
        assert_eq!(lease.min_lease(), Duration::from_secs(10));
        assert_eq!(cfg.tasks[0].interval().unwrap(), Duration::from_secs(60));

        let defaults = cfg.tasks[1].lease().unwrap();
        assert_eq!(defaults.max_lease(), Duration::from_secs(DEFAULT_MAX_LEASE_SECS));
        assert_eq!(defaults.min_lease(), Duration::from_secs(DEFAULT_MIN_LEASE_SECS));
    }

    #[test]
    fn rejects_bad_leases() {
        let inverted = TaskConfig {
            name: "job-x".to_string(),
            max_lease: Some(Duration::from_secs(5)),
            min_lease: Some(Duration::from_secs(10)),
            ..Default::default()
        };
        assert!(inverted.lease().is_err());

        let zero = TaskConfig {
            name: "job-x".to_string(),
            max_lease: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(zero.lease().is_err());

        let unnamed = TaskConfig::default();
        assert!(unnamed.lease().is_err());

        let no_interval = TaskConfig {
            name: "job-x".to_string(),
            interval: Some(Duration::ZERO),
            ..Default::default()
        };
        assert!(no_interval.interval().is_err());
    }

    #[test]
    fn compound_durations() {
        let yaml = r#"
tasks:
  - name: job-x
    interval: 1h 15m
    max-lease: 1m30s
    min-lease: 500ms
"#;
        let cfg: LockrunConfigFile = serde_yaml::from_str(yaml).unwrap();
        let task = &cfg.tasks[0];
        assert_eq!(task.interval().unwrap(), Duration::from_secs(75 * 60));
        let lease = task.lease().unwrap();
        assert_eq!(lease.max_lease(), Duration::from_secs(90));
        assert_eq!(lease.min_lease(), Duration::from_millis(500));
    }

    #[test]
    fn malformed_duration_is_rejected() {
        let yaml = "tasks:\n  - name: job-x\n    max-lease: soon\n";
        assert!(serde_yaml::from_str::<LockrunConfigFile>(yaml).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let cfg: LockrunConfigFile = load_config_file(path.to_str().unwrap()).unwrap();
        assert!(cfg.tasks.is_empty());
        assert!(cfg.data_dir.is_none());
    }

    #[test]
    fn reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "replicas: 5\ntasks:\n  - name: job-x\n").unwrap();
        let cfg: LockrunConfigFile = load_config_file(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.replicas, Some(5));
        assert_eq!(cfg.tasks[0].name, "job-x");
    }
}
