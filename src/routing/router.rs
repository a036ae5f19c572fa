//! Live service lookup.
//!
//! # Responsibilities
//! - Own the live map of service records for one directory
//! - Resolve requests against the map's current snapshot
//!
//! # Design Decisions
//! - Each resolution works on one snapshot, so a reload landing mid-lookup
//!   cannot mix old and new records
//! - Explicit `None` rather than a silent default service

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::live_map::{LiveMap, LiveMapError, LoadOptions};
use crate::http::headers::Headers;
use crate::routing::resolver::{resolve, Resolution, ServiceRecord};

/// Services mirrored from a directory, ready for lookups.
pub struct ServiceRouter {
    services: LiveMap<ServiceRecord>,
}

impl ServiceRouter {
    /// Load every `*.{extension}` file in `dir`. Each record's `name` is set
    /// from its file stem.
    pub fn open(dir: impl Into<PathBuf>, extension: &str) -> Result<Self, LiveMapError> {
        Self::open_with_options(dir, extension, LoadOptions::default())
    }

    pub fn open_with_options(
        dir: impl Into<PathBuf>,
        extension: &str,
        options: LoadOptions,
    ) -> Result<Self, LiveMapError> {
        let services = LiveMap::open_with_options(
            dir,
            extension,
            |mut record: ServiceRecord, key| {
                record.name = key.to_string();
                record
            },
            options,
        )?;
        Ok(Self { services })
    }

    pub fn start_watch(&self) -> Result<(), LiveMapError> {
        self.services.start_watch()
    }

    pub fn stop_watch(&self) {
        self.services.stop_watch();
    }

    pub fn resolve(&self, hostname: Option<&str>, uri: &str, headers: Option<&Headers>) -> Option<Resolution> {
        let snapshot = self.services.snapshot();
        let found = resolve(snapshot.values(), hostname, uri, headers);
        match &found {
            Some(resolution) => tracing::debug!(
                hostname = ?hostname,
                uri,
                service = %resolution.service().name,
                strip_path = ?resolution.strip_path(),
                "Resolved service"
            ),
            None => tracing::debug!(hostname = ?hostname, uri, "No service matched"),
        }
        found
    }

    pub fn get(&self, name: &str) -> Option<Arc<ServiceRecord>> {
        self.services.get(name)
    }

    /// The underlying live map.
    pub fn services(&self) -> &LiveMap<ServiceRecord> {
        &self.services
    }
}
