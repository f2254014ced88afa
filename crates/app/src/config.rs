//! Demo configuration loaded from environment variables.

use saga::ExecutorConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Some(LogFormat::Text),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Demo configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DEMO_ORDERS`: number of regular orders to fulfill (default: `3`)
/// - the `SAGA_*` variables read by [`ExecutorConfig`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub demo_orders: usize,
    pub executor: ExecutorConfig,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            demo_orders: lookup("DEMO_ORDERS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.demo_orders),
            executor: ExecutorConfig::from_lookup(&lookup),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            demo_orders: 3,
            executor: ExecutorConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, LogFormat::Text);
        assert_eq!(config.demo_orders, 3);
    }

    #[test]
    fn test_lookup_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RUST_LOG", "saga=debug"),
            ("LOG_FORMAT", "JSON"),
            ("DEMO_ORDERS", "10"),
            ("SAGA_LOCK_WAIT_MS", "50"),
        ]);
        let config = Config::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.log_level, "saga=debug");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.demo_orders, 10);
        assert_eq!(config.executor.lock_wait_timeout, Duration::from_millis(50));
    }

    #[test]
    fn test_unknown_log_format_falls_back_to_text() {
        let config = Config::from_lookup(|k| (k == "LOG_FORMAT").then(|| "xml".to_string()));
        assert_eq!(config.log_format, LogFormat::Text);
    }
}
