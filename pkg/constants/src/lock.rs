//! Lock store / lease constants.

/// etcd-style key prefix under which lock records are stored.
/// Full key = `LOCK_KEY_PREFIX + name`.
pub const LOCK_KEY_PREFIX: &str = "/registry/locks/";

/// Separator between the replica id and the random part of an owner token.
pub const OWNER_TOKEN_SEPARATOR: char = ':';

/// Default upper bound on how long a holder keeps a lock, in seconds.
pub const DEFAULT_MAX_LEASE_SECS: u64 = 60;

/// Default lower bound on how long a lock stays held after acquisition, in seconds.
pub const DEFAULT_MIN_LEASE_SECS: u64 = 0;

/// Upper bound accepted for a max-lease, in seconds (30 days).
pub const MAX_LEASE_SECS: u64 = 60 * 60 * 24 * 30;

/// Default trigger interval for a task, in seconds.
pub const DEFAULT_TASK_INTERVAL_SECS: u64 = 30;

/// Maximum length of a lock name.
pub const MAX_LOCK_NAME_LEN: usize = 128;
