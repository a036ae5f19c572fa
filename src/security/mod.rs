//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Client address:
//!     → access_control.rs (syntax check, blacklist, whitelist)
//!     → Decision::Allow / Decision::Deny(reason)
//!
//! List files on disk:
//!     → live_list.rs (watch + atomic swap of the parsed list)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a malformed client address is denied
//! - Blacklist beats whitelist
//! - A list file that disappears or cannot be read keeps the last good list

pub mod access_control;
pub mod live_list;

pub use access_control::{decide, ip_match, parse_list, AccessList, Decision, DenyReason};
pub use live_list::{AccessControl, LiveAccessList};
