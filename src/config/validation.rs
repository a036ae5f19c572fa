//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value shapes (extension, bind addresses)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GlobalConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GlobalConfig;

/// A single semantic problem in the config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GlobalConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let ext = &config.service_extension;
    if ext.is_empty() || ext.contains('.') || ext.contains('/') {
        errors.push(ValidationError {
            field: "serviceExtension",
            message: format!("'{}' must be a bare extension like 'json'", ext),
        });
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "admin.bindAddress",
            message: format!("'{}' is not a socket address", config.admin.bind_address),
        });
    }

    if let Some(addr) = &config.metrics_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError {
                field: "metricsAddress",
                message: format!("'{}' is not a socket address", addr),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
