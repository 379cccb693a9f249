use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub leases: LeaseConfig,
    pub pool: PoolConfig,
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Deadline for a single HTTP request
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub data_dir: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum StorageBackend {
    /// Nothing survives a restart
    Memory,
    #[default]
    Redb,
}

#[derive(Debug, Clone)]
pub struct LeaseConfig {
    /// A lease not renewed for this long may be reclaimed
    pub stale_timeout_seconds: u64,
    /// How often the sweeper looks for stale leases
    pub sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
    /// Identifier patterns, e.g. `vm-[1-100]`
    pub patterns: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Redb,
            data_dir: "./data".to_string(),
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            stale_timeout_seconds: 60,
            sweep_interval_seconds: 60,
        }
    }
}

impl LeaseConfig {
    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_seconds)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from any key lookup (the environment, in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server_defaults = ServerConfig::default();
        let storage_defaults = StorageConfig::default();
        let lease_defaults = LeaseConfig::default();

        let bind_address = lookup("BIND_ADDRESS").unwrap_or(server_defaults.bind_address);
        let data_dir = lookup("DATA_DIR").unwrap_or(storage_defaults.data_dir);

        let backend = match lookup("STORAGE_BACKEND") {
            None => storage_defaults.backend,
            Some(value) => match value.to_lowercase().as_str() {
                "redb" => StorageBackend::Redb,
                "memory" => StorageBackend::Memory,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "STORAGE_BACKEND",
                        value,
                    })
                }
            },
        };

        let patterns: Vec<String> = lookup("IDENTIFIER_PATTERNS")
            .map(|p| {
                p.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let config = Config {
            leases: LeaseConfig {
                stale_timeout_seconds: seconds(
                    &lookup,
                    "STALE_TIMEOUT_SECONDS",
                    lease_defaults.stale_timeout_seconds,
                )?,
                sweep_interval_seconds: seconds(
                    &lookup,
                    "SWEEP_INTERVAL_SECONDS",
                    lease_defaults.sweep_interval_seconds,
                )?,
            },
            pool: PoolConfig { patterns },
            server: ServerConfig {
                bind_address,
                request_timeout_seconds: seconds(
                    &lookup,
                    "REQUEST_TIMEOUT_SECONDS",
                    server_defaults.request_timeout_seconds,
                )?,
            },
            storage: StorageConfig { backend, data_dir },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pool.patterns.is_empty() {
            return Err(ConfigError::ValidationError(
                "IDENTIFIER_PATTERNS must name at least one pattern".to_string(),
            ));
        }

        for (name, value) in [
            ("STALE_TIMEOUT_SECONDS", self.leases.stale_timeout_seconds),
            ("SWEEP_INTERVAL_SECONDS", self.leases.sweep_interval_seconds),
            ("REQUEST_TIMEOUT_SECONDS", self.server.request_timeout_seconds),
        ] {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.leases.sweep_interval_seconds > self.leases.stale_timeout_seconds {
            tracing::warn!(
                "Sweep interval ({}s) is longer than the stale timeout ({}s). \
                 Stale leases may linger for up to one sweep interval.",
                self.leases.sweep_interval_seconds,
                self.leases.stale_timeout_seconds
            );
        }

        Ok(())
    }
}

fn seconds<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
    }
}
