//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (hostname, uri, headers)
//!     → router.rs (load current service snapshot)
//!     → resolver.rs (walk records, Referer retry)
//!     → matcher.rs (evaluate each hostname pattern)
//!     → Return: Resolution or None
//! ```
//!
//! # Design Decisions
//! - Records compiled lazily, immutable once shared
//! - No regex in hot path
//! - Deterministic: records are walked in name order
//! - First match wins

pub mod matcher;
pub mod resolver;
pub mod router;

pub use matcher::HostPattern;
pub use resolver::{match_service, resolve, Resolution, ServiceRecord};
pub use router::ServiceRouter;
