use anyhow::{Result, bail};
use pkg_constants::lock::{MAX_LOCK_NAME_LEN, OWNER_TOKEN_SEPARATOR};

/// Validate a lock name.
/// Rules: `[A-Za-z0-9._-]`, max `MAX_LOCK_NAME_LEN` chars, no leading/trailing separators.
pub fn validate_lock_name(name: &str) -> Result<()> {
    if name.is_empty() {
        bail!("lock name must not be empty");
    }
    if name.len() > MAX_LOCK_NAME_LEN {
        bail!(
            "lock name '{}' exceeds {} characters (got {})",
            name,
            MAX_LOCK_NAME_LEN,
            name.len()
        );
    }
    if name.starts_with(['-', '.']) || name.ends_with(['-', '.']) {
        bail!("lock name '{}' must not start or end with '-' or '.'", name);
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        bail!(
            "lock name '{}' must contain only letters, digits, '-', '_' and '.'",
            name
        );
    }
    Ok(())
}

/// Validate a replica id. It becomes the prefix of every owner token,
/// so it must not contain the token separator.
pub fn validate_replica_id(id: &str) -> Result<()> {
    if id.is_empty() {
        bail!("replica id must not be empty");
    }
    if id.contains(OWNER_TOKEN_SEPARATOR) || id.chars().any(char::is_whitespace) {
        bail!(
            "replica id '{}' must not contain whitespace or '{}'",
            id,
            OWNER_TOKEN_SEPARATOR
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_names() {
        assert!(validate_lock_name("job-x").is_ok());
        assert!(validate_lock_name("invoice.cleanup").is_ok());
        assert!(validate_lock_name("Orders_Reconcile-2").is_ok());
        assert!(validate_lock_name("a").is_ok());
    }

    #[test]
    fn invalid_names() {
        assert!(validate_lock_name("").is_err());
        assert!(validate_lock_name("has space").is_err());
        assert!(validate_lock_name("slash/name").is_err());
        assert!(validate_lock_name("-leading").is_err());
        assert!(validate_lock_name("trailing.").is_err());
        assert!(validate_lock_name(&"a".repeat(MAX_LOCK_NAME_LEN + 1)).is_err());
    }

    #[test]
    fn replica_ids() {
        assert!(validate_replica_id("replica-0").is_ok());
        assert!(validate_replica_id("").is_err());
        assert!(validate_replica_id("host:1").is_err());
        assert!(validate_replica_id("two words").is_err());
    }
}
