//! IP allow/deny lists.
//!
//! # Responsibilities
//! - Test an IPv4 address against literal addresses and CIDR prefixes
//! - Parse list files (one entry per line, `#` and `//` comments)
//! - Turn whitelist/blacklist hits into an allow/deny decision
//!
//! # Design Decisions
//! - Entries are checked in order, first hit wins
//! - Malformed input never panics: it simply does not match
//! - Address syntax is validated before any list is consulted, so a garbage
//!   address is denied instead of slipping past the blacklist

use std::fmt;

/// Returns the first entry in `entries` that contains `address`.
///
/// Entries are either a literal address (compared as a string) or
/// `network/prefix_len`. A CIDR entry whose network, prefix length, or the
/// address itself fails to parse is skipped.
pub fn ip_match<'a, S: AsRef<str>>(address: &str, entries: &'a [S]) -> Option<&'a str> {
    entries
        .iter()
        .map(AsRef::as_ref)
        .find(|entry| entry_matches(address, entry))
}

fn entry_matches(address: &str, entry: &str) -> bool {
    match entry.split_once('/') {
        None => entry == address,
        Some((network, bits)) => {
            let Ok(bits) = bits.trim().parse::<u32>() else {
                return false;
            };
            match (parse_ipv4(network), parse_ipv4(address)) {
                (Some(network), Some(address)) => {
                    let mask = prefix_mask(bits.min(32));
                    network & mask == address & mask
                }
                _ => false,
            }
        }
    }
}

fn prefix_mask(bits: u32) -> u32 {
    if bits == 0 {
        0
    } else {
        u32::MAX << (32 - bits)
    }
}

/// Parse a dotted-quad address into its 32-bit value.
///
/// Unlike `Ipv4Addr::from_str` this accepts zero-padded octets (`010`),
/// which list files written by hand tend to contain.
pub fn parse_ipv4(address: &str) -> Option<u32> {
    let mut value = 0u32;
    let mut octets = 0;
    for part in address.split('.') {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let octet: u8 = part.parse().ok()?;
        value = (value << 8) | u32::from(octet);
        octets += 1;
    }
    (octets == 4).then_some(value)
}

/// Parse the text of a list file into entries.
pub fn parse_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with("//") && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// An ordered list of addresses and CIDR ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessList {
    entries: Vec<String>,
}

impl AccessList {
    pub fn new(entries: Vec<String>) -> Self {
        Self { entries }
    }

    /// Build a list from list-file text.
    pub fn parse(content: &str) -> Self {
        Self::new(parse_list(content))
    }

    /// The entry that matched `address`, if any.
    pub fn matches(&self, address: &str) -> Option<&str> {
        ip_match(address, &self.entries)
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a request was denied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// The client address is not a dotted-quad IPv4 address.
    InvalidAddress,
    /// The address hit this blacklist entry.
    Blacklisted(String),
    /// A whitelist is in force and the address is not on it.
    NotWhitelisted,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenyReason::InvalidAddress => write!(f, "invalid address"),
            DenyReason::Blacklisted(entry) => write!(f, "blacklisted by {}", entry),
            DenyReason::NotWhitelisted => write!(f, "not whitelisted"),
        }
    }
}

/// Outcome of an access check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }

    fn label(&self) -> &'static str {
        match self {
            Decision::Allow => "allow",
            Decision::Deny(DenyReason::InvalidAddress) => "invalid_address",
            Decision::Deny(DenyReason::Blacklisted(_)) => "blacklisted",
            Decision::Deny(DenyReason::NotWhitelisted) => "not_whitelisted",
        }
    }
}

/// Decide whether `address` may pass.
///
/// The blacklist wins over the whitelist. An absent or empty whitelist
/// allows every address that is not blacklisted.
pub fn decide(address: &str, whitelist: Option<&AccessList>, blacklist: Option<&AccessList>) -> Decision {
    let decision = if parse_ipv4(address).is_none() {
        Decision::Deny(DenyReason::InvalidAddress)
    } else if let Some(entry) = blacklist.and_then(|list| list.matches(address)) {
        Decision::Deny(DenyReason::Blacklisted(entry.to_string()))
    } else {
        match whitelist {
            Some(list) if !list.is_empty() && list.matches(address).is_none() => {
                Decision::Deny(DenyReason::NotWhitelisted)
            }
            _ => Decision::Allow,
        }
    };

    crate::observability::metrics::record_access_decision(decision.label());
    decision
}
