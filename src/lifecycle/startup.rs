//! Startup orchestration.
//!
//! # Responsibilities
//! - Load and validate configuration
//! - Open the service map and access lists
//! - Start and stop their watchers together
//!
//! # Design Decisions
//! - Fail fast: a bad config or missing services directory is fatal
//! - Missing list files are not fatal; they read as empty lists

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use crate::config::{load_config, load_or_init, ConfigError, GlobalConfig, LiveMapError, LoadOptions};
use crate::http::headers::Headers;
use crate::routing::{Resolution, ServiceRouter};
use crate::security::{AccessControl, Decision};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("services: {0}")]
    Services(#[from] LiveMapError),

    #[error("cannot create {}: {source}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the proxy needs at request time.
pub struct Runtime {
    pub config_path: PathBuf,
    pub config: GlobalConfig,
    pub router: Arc<ServiceRouter>,
    pub access: AccessControl,
}

impl Runtime {
    /// Load config and data in one step.
    ///
    /// With `init`, a missing config file is created as `{}` and a missing
    /// services directory is created empty.
    pub fn load(config_path: &Path, init: bool) -> Result<Self, StartupError> {
        let config = Self::read_config(config_path, init)?;
        Self::open(config_path, config, init)
    }

    /// Read and validate the config file only. Callers install logging
    /// between this and [`Runtime::open`] so the initial scans are logged.
    pub fn read_config(config_path: &Path, init: bool) -> Result<GlobalConfig, StartupError> {
        Ok(if init { load_or_init(config_path)? } else { load_config(config_path)? })
    }

    /// Open the services directory and access lists named by `config`.
    pub fn open(config_path: &Path, config: GlobalConfig, init: bool) -> Result<Self, StartupError> {
        if init {
            std::fs::create_dir_all(&config.services_dir).map_err(|source| StartupError::CreateDir {
                path: config.services_dir.clone(),
                source,
            })?;
        }

        let options = LoadOptions {
            quiet_errors: config.ignore_errors,
        };
        let router = ServiceRouter::open_with_options(&config.services_dir, &config.service_extension, options)?;
        let access = AccessControl::from_paths(config.whitelist.as_deref(), config.blacklist.as_deref());

        tracing::info!(
            services_dir = %config.services_dir.display(),
            services = router.services().len(),
            whitelist = ?config.whitelist,
            blacklist = ?config.blacklist,
            "Runtime loaded"
        );

        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            router: Arc::new(router),
            access,
        })
    }

    /// Start every watcher. Requires a tokio runtime.
    pub fn start_watch(&self) -> Result<(), LiveMapError> {
        self.router.start_watch()?;
        self.access.start_watch()
    }

    pub fn stop_watch(&self) {
        self.router.stop_watch();
        self.access.stop_watch();
    }

    pub fn resolve(&self, hostname: Option<&str>, uri: &str, headers: Option<&Headers>) -> Option<Resolution> {
        self.router.resolve(hostname, uri, headers)
    }

    pub fn check(&self, address: &str) -> Decision {
        self.access.check(address)
    }
}
