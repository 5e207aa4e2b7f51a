use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use ordersync_core::sync::SyncConfig;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub sync: SyncConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "ORDERSYNC_BIND_ADDR", "127.0.0.1:8080");
        let db_path = PathBuf::from(required_trimmed(&lookup, "ORDERSYNC_DB_PATH")?);

        let item_timeout_ms = bounded_u64(&lookup, "SYNC_ITEM_TIMEOUT_MS", 10_000, 100, 120_000)?;
        let max_concurrency = bounded_u64(&lookup, "SYNC_MAX_CONCURRENCY", 8, 1, 64)?;
        let max_batch_size = bounded_u64(&lookup, "SYNC_MAX_BATCH_SIZE", 500, 1, 5_000)?;
        let max_cas_retries = bounded_u64(&lookup, "SYNC_MAX_CAS_RETRIES", 3, 0, 10)?;

        Ok(Self {
            bind_addr,
            db_path,
            sync: SyncConfig {
                item_timeout: Duration::from_millis(item_timeout_ms),
                max_concurrency: to_usize(max_concurrency),
                max_batch_size: to_usize(max_batch_size),
                max_cas_retries: u32::try_from(max_cas_retries).unwrap_or(u32::MAX),
            },
        })
    }
}

fn bounded_u64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: u64,
    min: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<u64>().map_err(|_| {
        ConfigError::Invalid(format!("{name} must be an integer between {min} and {max}"))
    })?;
    if !(min..=max).contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be between {min} and {max}"
        )));
    }
    Ok(value)
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_database_path() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("ORDERSYNC_DB_PATH"));
    }

    #[test]
    fn config_applies_defaults() {
        let config = load(&[("ORDERSYNC_DB_PATH", "/var/lib/ordersync/orders.db")]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.db_path, PathBuf::from("/var/lib/ordersync/orders.db"));
        assert_eq!(config.sync, SyncConfig::default());
    }

    #[test]
    fn config_reads_sync_tuning() {
        let config = load(&[
            ("ORDERSYNC_DB_PATH", "orders.db"),
            ("ORDERSYNC_BIND_ADDR", "0.0.0.0:9000"),
            ("SYNC_ITEM_TIMEOUT_MS", "2500"),
            ("SYNC_MAX_CONCURRENCY", "16"),
            ("SYNC_MAX_BATCH_SIZE", "50"),
            ("SYNC_MAX_CAS_RETRIES", "0"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.sync.item_timeout, Duration::from_millis(2500));
        assert_eq!(config.sync.max_concurrency, 16);
        assert_eq!(config.sync.max_batch_size, 50);
        assert_eq!(config.sync.max_cas_retries, 0);
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        for (name, value) in [
            ("SYNC_ITEM_TIMEOUT_MS", "50"),
            ("SYNC_MAX_CONCURRENCY", "0"),
            ("SYNC_MAX_BATCH_SIZE", "10000"),
            ("SYNC_MAX_CAS_RETRIES", "many"),
        ] {
            let err = load(&[("ORDERSYNC_DB_PATH", "orders.db"), (name, value)]).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)));
            assert!(err.to_string().contains(name));
        }
    }
}
