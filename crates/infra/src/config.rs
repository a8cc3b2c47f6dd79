//! Store configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DATABASE_URL: &str = "COMANDA_DATABASE_URL";
pub const MAX_CONNECTIONS: &str = "COMANDA_MAX_CONNECTIONS";
pub const BUSY_TIMEOUT_MS: &str = "COMANDA_BUSY_TIMEOUT_MS";
pub const TAX_RATE_BPS: &str = "COMANDA_TAX_RATE_BPS";

/// Highest accepted tax rate: 100%.
pub const MAX_TAX_RATE_BPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Connection and business settings for the SQLite store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// How long a writer waits for the database lock before giving up.
    pub busy_timeout: Duration,
    /// Flat tax rate in basis points, recorded on every placed order.
    pub tax_rate_bps: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://comanda.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_millis(5_000),
            tax_rate_bps: 1_900,
        }
    }
}

impl StoreConfig {
    /// Read `COMANDA_*` variables, falling back to defaults for unset ones.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`StoreConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let database_url = lookup(DATABASE_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.database_url);
        let max_connections: u32 = parse_or(&lookup, MAX_CONNECTIONS, defaults.max_connections)?;
        let busy_ms: u64 = parse_or(
            &lookup,
            BUSY_TIMEOUT_MS,
            defaults.busy_timeout.as_millis() as u64,
        )?;
        let tax_rate_bps: u32 = parse_or(&lookup, TAX_RATE_BPS, defaults.tax_rate_bps)?;

        let config = Self {
            database_url,
            max_connections,
            busy_timeout: Duration::from_millis(busy_ms),
            tax_rate_bps,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no store can run with: an empty pool or a tax rate
    /// above [`MAX_TAX_RATE_BPS`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_CONNECTIONS,
                value: "0".to_string(),
            });
        }
        if self.tax_rate_bps > MAX_TAX_RATE_BPS {
            return Err(ConfigError::Invalid {
                key: TAX_RATE_BPS,
                value: self.tax_rate_bps.to_string(),
            });
        }
        Ok(())
    }

    /// Private in-memory database on a single connection.
    ///
    /// Each `sqlite::memory:` connection is its own database, so the pool must
    /// never open a second one.
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    pub fn with_tax_rate_bps(mut self, bps: u32) -> Self {
        self.tax_rate_bps = bps;
        self
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}
