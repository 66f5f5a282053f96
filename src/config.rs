//! Server configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file,
//! then `MULTILANDS_*` environment variables.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

/// Default config file, read from the working directory when present
pub const DEFAULT_CONFIG_FILE: &str = "multilands.toml";

/// Default database file, shared with `multilands_seed`
pub const DEFAULT_DB_FILE: &str = "multilands.db";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// SQLite file; None runs on a throwaway in-memory database
    pub db_path: Option<String>,
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Browser origins allowed to call the API; `["*"]` allows any
    pub cors_allowed_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from((Ipv4Addr::LOCALHOST, 8080)),
            db_path: Some(DEFAULT_DB_FILE.to_string()),
            log_filter: "multilands=info,tower_http=debug".to_string(),
            log_format: LogFormat::Pretty,
            cors_allowed_origins: Vec::new(),
        }
    }
}

impl Config {
    /// Build the layered figment. A missing file is skipped.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed("MULTILANDS_"))
    }

    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }
}
