//! Configuration schema definitions.
//!
//! The global config is a JSON object with camelCase keys. Every field has
//! a default so `{}` is a valid config. Keys this crate does not know are
//! kept in `extra` so a read-modify-write cycle never drops settings owned
//! by other components.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::observability::logging::LogFormat;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GlobalConfig {
    /// Directory holding one JSON file per service.
    pub services_dir: PathBuf,

    /// Extension (without the dot) of service files.
    pub service_extension: String,

    /// Path to the whitelist file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist: Option<PathBuf>,

    /// Path to the blacklist file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blacklist: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Demote reload failures from `error` to `debug`.
    pub ignore_errors: bool,

    /// Prometheus exporter bind address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics_address: Option<String>,

    pub admin: AdminConfig,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            services_dir: PathBuf::from("services"),
            service_extension: "json".to_string(),
            whitelist: None,
            blacklist: None,
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            ignore_errors: false,
            metrics_address: None,
            admin: AdminConfig::default(),
            extra: Map::new(),
        }
    }
}

impl GlobalConfig {
    /// Resolve relative paths against `base` (normally the directory the
    /// config file lives in).
    pub fn rebase(mut self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_relative() { base.join(p) } else { p };
        self.services_dir = join(self.services_dir);
        self.whitelist = self.whitelist.map(join);
        self.blacklist = self.blacklist.map(join);
        self
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// Admin API bind address.
    pub bind_address: String,

    /// Bearer token. Empty disables authentication.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:3001".to_string(),
            api_key: String::new(),
        }
    }
}
