//! Server Configuration
//!
//! All tunables come from environment variables with sensible defaults, so
//! a bare `flarekv` starts a usable server and deployments configure it the
//! twelve-factor way. Unparsable values fall back to the default rather
//! than failing startup.
//!
//! | Variable                          | Default           |
//! |-----------------------------------|-------------------|
//! | `REDIS_HOST`                      | `localhost`       |
//! | `REDIS_PORT`                      | `6379`            |
//! | `REDIS_MAX_CONNECTIONS`           | `1000`            |
//! | `REDIS_EXPIRATION_CHECK_INTERVAL` | `1` (seconds)     |
//! | `REDIS_RDB_ENABLED`               | `true`            |
//! | `REDIS_RDB_FILE`                  | `./data/dump.rdb` |
//! | `REDIS_RDB_SAVE_INTERVAL`         | `300` (seconds)   |
//! | `REDIS_RDB_SAVE_ON_EXIT`          | `true`            |

use std::path::PathBuf;
use std::time::Duration;

/// Full server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind address.
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Soft cap on concurrently connected clients.
    pub max_connections: usize,
    /// How often the expiry sweeper wakes.
    pub expiry_check_interval: Duration,
    /// Snapshot persistence settings.
    pub snapshot: SnapshotConfig,
}

/// Snapshot persistence settings.
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub enabled: bool,
    pub file_path: PathBuf,
    /// Period of the automatic background save.
    pub save_interval: Duration,
    /// Whether shutdown runs a final foreground save.
    pub save_on_exit: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            max_connections: 1000,
            expiry_check_interval: Duration::from_secs(1),
            snapshot: SnapshotConfig {
                enabled: true,
                file_path: PathBuf::from("./data/dump.rdb"),
                save_interval: Duration::from_secs(300),
                save_on_exit: true,
            },
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Config::default();
        Self {
            host: env_string("REDIS_HOST", defaults.host),
            port: env_parse("REDIS_PORT", defaults.port),
            max_connections: env_parse("REDIS_MAX_CONNECTIONS", defaults.max_connections),
            expiry_check_interval: Duration::from_secs(env_parse(
                "REDIS_EXPIRATION_CHECK_INTERVAL",
                defaults.expiry_check_interval.as_secs(),
            )),
            snapshot: SnapshotConfig {
                enabled: env_bool("REDIS_RDB_ENABLED", defaults.snapshot.enabled),
                file_path: PathBuf::from(env_string(
                    "REDIS_RDB_FILE",
                    defaults.snapshot.file_path.display().to_string(),
                )),
                save_interval: Duration::from_secs(env_parse(
                    "REDIS_RDB_SAVE_INTERVAL",
                    defaults.snapshot.save_interval.as_secs(),
                )),
                save_on_exit: env_bool("REDIS_RDB_SAVE_ON_EXIT", defaults.snapshot.save_on_exit),
            },
        }
    }

    /// The address handed to the TCP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_string(key: &str, default: String) -> String {
    match std::env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default,
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}
