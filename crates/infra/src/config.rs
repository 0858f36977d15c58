//! Environment-driven configuration.
//!
//! Every setting is read through a lookup function so tests can supply
//! variables without touching the process environment.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use travel_trips::Trip;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_millis(3000);
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(2000);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: &'static str, message: String },

    #[error("failed to load seed file {path}: {message}")]
    Seed { path: String, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreBackend {
    InMemory,
    Postgres { database_url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    /// Bound on waiting for a trip's booking lock.
    pub lock_timeout: Duration,
    /// JSON list of trips to load at startup.
    pub seed_file: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::InMemory,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            seed_file: None,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let persistent = parse_bool(&lookup, "USE_PERSISTENT_STORES", false)?;
        let backend = if persistent {
            let database_url = lookup("DATABASE_URL")
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing("DATABASE_URL"))?;
            StoreBackend::Postgres { database_url }
        } else {
            StoreBackend::InMemory
        };

        let max_connections = parse_var(&lookup, "TRAVEL_DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                name: "TRAVEL_DB_MAX_CONNECTIONS",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            backend,
            max_connections,
            acquire_timeout: parse_millis(&lookup, "TRAVEL_DB_ACQUIRE_TIMEOUT_MS", DEFAULT_ACQUIRE_TIMEOUT)?,
            lock_timeout: parse_millis(&lookup, "TRAVEL_LOCK_TIMEOUT_MS", DEFAULT_LOCK_TIMEOUT)?,
            seed_file: lookup("TRAVEL_SEED_FILE")
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StoreBackend::Postgres { .. })
    }
}

/// Settings of the registration engine itself.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Upper bound on one whole Register/Cancel, lock wait included.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            operation_timeout: parse_millis(
                &lookup,
                "TRAVEL_OPERATION_TIMEOUT_MS",
                DEFAULT_OPERATION_TIMEOUT,
            )?,
        })
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw = lookup("TRAVEL_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = raw.trim().parse().map_err(|e| ConfigError::Invalid {
            name: "TRAVEL_BIND_ADDR",
            message: format!("{raw:?}: {e}"),
        })?;
        Ok(Self { bind_addr })
    }
}

/// Read a JSON array of trips.
pub fn load_seed_trips(path: &Path) -> Result<Vec<Trip>, ConfigError> {
    let seed_error = |message: String| ConfigError::Seed {
        path: path.display().to_string(),
        message,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| seed_error(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| seed_error(e.to_string()))
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            message: format!("{raw:?}: {e}"),
        }),
    }
}

fn parse_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: Duration,
) -> Result<Duration, ConfigError> {
    let millis = parse_var(lookup, name, default.as_millis() as u64)?;
    if millis == 0 {
        return Err(ConfigError::Invalid {
            name,
            message: "must be greater than zero".to_string(),
        });
    }
    Ok(Duration::from_millis(millis))
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    match lookup(name).map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::Invalid {
                name,
                message: format!("{v:?} is not a boolean"),
            }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_to_in_memory() {
        let config = StoreConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config, StoreConfig::default());
        assert!(!config.is_persistent());
    }

    #[test]
    fn persistent_requires_database_url() {
        let err = StoreConfig::from_lookup(env(&[("USE_PERSISTENT_STORES", "true")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let config = StoreConfig::from_lookup(env(&[
            ("USE_PERSISTENT_STORES", "1"),
            ("DATABASE_URL", "postgres://localhost/travel"),
            ("TRAVEL_LOCK_TIMEOUT_MS", "250"),
        ]))
        .unwrap();
        assert_eq!(
            config.backend,
            StoreBackend::Postgres {
                database_url: "postgres://localhost/travel".to_string()
            }
        );
        assert_eq!(config.lock_timeout, Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = StoreConfig::from_lookup(env(&[("TRAVEL_DB_MAX_CONNECTIONS", "many")])).unwrap_err();
        match err {
            ConfigError::Invalid { name, .. } => assert_eq!(name, "TRAVEL_DB_MAX_CONNECTIONS"),
            other => panic!("Expected Invalid, got {other:?}"),
        }

        let err = EngineConfig::from_lookup(env(&[("TRAVEL_OPERATION_TIMEOUT_MS", "0")])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                name: "TRAVEL_OPERATION_TIMEOUT_MS",
                ..
            }
        ));

        let err = StoreConfig::from_lookup(env(&[("USE_PERSISTENT_STORES", "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "USE_PERSISTENT_STORES", .. }));
    }

    #[test]
    fn server_bind_address() {
        let config = ServerConfig::from_lookup(env(&[])).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);

        let config = ServerConfig::from_lookup(env(&[("TRAVEL_BIND_ADDR", "127.0.0.1:9000")])).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:9000".parse().unwrap());

        assert!(ServerConfig::from_lookup(env(&[("TRAVEL_BIND_ADDR", "nowhere")])).is_err());
    }

    #[test]
    fn seed_file_is_parsed_as_trip_list() {
        let path = std::env::temp_dir().join(format!("travel-seed-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"[{"id":1,"name":"Alps","description":null,"dateFrom":"2026-01-10T00:00:00Z","dateTo":"2026-01-17T00:00:00Z","maxPeople":3,"countries":[{"name":"Austria"}]}]"#,
        )
        .unwrap();

        let trips = load_seed_trips(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].max_people, 3);
        assert_eq!(trips[0].countries[0].name, "Austria");

        assert!(matches!(
            load_seed_trips(Path::new("/nonexistent/trips.json")),
            Err(ConfigError::Seed { .. })
        ));
    }
}
