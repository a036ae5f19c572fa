//! Hostname-based service resolution with live-reloaded configuration.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::{GlobalConfig, LiveMap};
pub use http::{Cookies, Headers};
pub use lifecycle::{Runtime, Shutdown};
pub use routing::{resolve, Resolution, ServiceRecord, ServiceRouter};
pub use security::{ip_match, AccessList, Decision};
