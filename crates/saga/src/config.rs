//! Executor configuration loaded from environment variables.

use std::time::Duration;

/// Executor settings with conservative defaults.
///
/// Reads from environment variables:
/// - `SAGA_LOCK_WAIT_MS`: how long a run waits for another run on the same
///   entity to finish (default: `0`, reject immediately)
/// - `SAGA_DEFAULT_TIMEOUT_MS`: deadline applied by callers that do not
///   pick their own (default: `30000`)
/// - `SAGA_LEASE_GRACE_MS`: how long a lease outlives the run's deadline,
///   covering the compensation sweep (default: `60000`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub lock_wait_timeout: Duration,
    pub default_timeout: Duration,
    pub lease_grace: Duration,
}

impl ExecutorConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            lock_wait_timeout: millis("SAGA_LOCK_WAIT_MS", defaults.lock_wait_timeout),
            default_timeout: millis("SAGA_DEFAULT_TIMEOUT_MS", defaults.default_timeout),
            lease_grace: millis("SAGA_LEASE_GRACE_MS", defaults.lease_grace),
        }
    }

    pub fn with_lock_wait_timeout(mut self, wait: Duration) -> Self {
        self.lock_wait_timeout = wait;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_lease_grace(mut self, grace: Duration) -> Self {
        self.lease_grace = grace;
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            lock_wait_timeout: Duration::ZERO,
            default_timeout: Duration::from_secs(30),
            lease_grace: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_values() {
        let config = ExecutorConfig::default();
        assert_eq!(config.lock_wait_timeout, Duration::ZERO);
        assert_eq!(config.default_timeout, Duration::from_secs(30));
        assert_eq!(config.lease_grace, Duration::from_secs(60));
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SAGA_LOCK_WAIT_MS", "250"),
            ("SAGA_DEFAULT_TIMEOUT_MS", " 5000 "),
        ]);
        let config = ExecutorConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.lock_wait_timeout, Duration::from_millis(250));
        assert_eq!(config.default_timeout, Duration::from_secs(5));
        assert_eq!(config.lease_grace, Duration::from_secs(60));
    }

    #[test]
    fn test_unparseable_values_fall_back_to_defaults() {
        let config = ExecutorConfig::from_lookup(|_| Some("soon".to_string()));
        assert_eq!(config, ExecutorConfig::default());
    }
}
