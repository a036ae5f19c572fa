//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config.json
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GlobalConfig
//!
//! services/<name>.json
//!     → live_map.rs (initial scan, then directory events)
//!     → snapshot swapped atomically per file event
//!
//! whitelist / blacklist files
//!     → watcher.rs (single-file reload)
//! ```
//!
//! # Design Decisions
//! - All global config fields have defaults to allow `{}`
//! - Validation separates syntactic (serde) from semantic checks
//! - A file that fails to parse never replaces good data

pub mod live_map;
pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use live_map::{FileEvent, LiveMap, LiveMapError, LoadOptions};
pub use loader::{load_config, load_or_init, ConfigError};
pub use schema::{AdminConfig, GlobalConfig};
