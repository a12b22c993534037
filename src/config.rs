//! Layered configuration using figment.
//!
//! Sources (highest wins):
//! 1. Environment variables (`SCHOOL_FEES_*`, `__` separates sections)
//! 2. `school-fees.toml` in the working directory, or an explicit file
//! 3. Built-in defaults
//!
//! `SCHOOL_FEES_SERVER__BIND_ADDR=127.0.0.1:8080` maps to `server.bind_addr`.

use crate::error::ConfigError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "school-fees.toml";
pub const ENV_PREFIX: &str = "SCHOOL_FEES_";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchoolFeesConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub bootstrap: BootstrapConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// SQLite file
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("school_fees.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Directory served under /static
    pub static_dir: PathBuf,
    pub session_ttl_hours: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:3000".to_string(),
            static_dir: PathBuf::from("static"),
            session_ttl_hours: 12,
        }
    }
}

/// Account seeded when the users table is empty
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BootstrapConfig {
    pub admin_username: String,
    pub admin_password: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            admin_username: "admin".to_string(),
            admin_password: "admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl SchoolFeesConfig {
    /// Load from defaults, the default TOML file and the environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load `.env` first, then everything `load_from` reads
    pub fn load_with_dotenv(file: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load_from(file)
    }

    /// Load with an explicit TOML file in place of `school-fees.toml`.
    /// An explicit file must exist.
    pub fn load_from(file: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = file {
            if !path.exists() {
                return Err(ConfigError::InvalidValue {
                    field: "config".to_string(),
                    reason: format!("file {} does not exist", path.display()),
                });
            }
        }

        let config: Self = Self::figment(file).extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Provider chain, public so tests can extract from it directly
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        let toml_path = file
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        if toml_path.exists() {
            figment = figment.merge(Toml::file(toml_path));
        }

        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "database.path".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.server.session_ttl_hours == 0 {
            return Err(ConfigError::InvalidValue {
                field: "server.session_ttl_hours".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        self.bind_addr()?;
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .bind_addr
            .parse()
            .map_err(|e| ConfigError::InvalidValue {
                field: "server.bind_addr".to_string(),
                reason: format!("{e}"),
            })
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.server.session_ttl_hours))
    }
}
