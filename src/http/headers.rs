//! Header and cookie helpers.
//!
//! # Responsibilities
//! - Case-insensitive header lookup and mutation that keeps the original
//!   spelling of header names
//! - Parse raw `Name: value` header lines
//! - Parse and serialize `Cookie` header values
//!
//! # Design Decisions
//! - Both collections are small ordered vectors; linear scans beat hashing
//!   for the handful of entries a request carries
//! - Setting an existing name replaces the value in place, so serialization
//!   order is the order names were first seen

use std::fmt;

use axum::http::HeaderMap;

/// Request headers with case-insensitive names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse raw header lines such as `Host: localhost`.
    ///
    /// The space after the colon is optional. Lines without a colon are
    /// dropped; an empty value is kept as an empty header.
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut headers = Self::new();
        for line in lines {
            if let Some((name, value)) = line.as_ref().split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                headers.insert(name, value);
            }
        }
        headers
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(key, _)| key.eq_ignore_ascii_case(name))
    }

    /// Look a header up regardless of case.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.position(name).map(|i| self.entries[i].1.as_str())
    }

    fn insert(&mut self, name: &str, value: &str) {
        match self.position(name) {
            Some(i) => self.entries[i].1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    /// Set a header, reusing the spelling of an existing name.
    ///
    /// An empty value removes the header.
    pub fn set(&mut self, name: &str, value: &str) {
        if value.is_empty() {
            self.remove(name);
            return;
        }
        self.insert(name, value);
    }

    /// Remove a header, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.position(name).map(|i| self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: AsRef<str>, V: AsRef<str>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value.as_ref());
        }
        headers
    }
}

impl From<&HeaderMap> for Headers {
    /// Non-UTF-8 values are skipped.
    fn from(map: &HeaderMap) -> Self {
        map.iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect()
    }
}

/// Cookies in the order they were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    entries: Vec<(String, String)>,
}

impl Cookies {
    /// Parse a `Cookie` header value.
    ///
    /// Pairs are separated by `"; "` and split on the first `=` only.
    /// Pairs with an empty name are dropped; a repeated name keeps its first
    /// position and takes the last value.
    pub fn parse(header: &str) -> Self {
        let mut cookies = Self::default();
        for pair in header.split("; ") {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            if !name.is_empty() {
                cookies.set(name, value);
            }
        }
        cookies
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn set(&mut self, name: &str, value: &str) {
        match self.entries.iter_mut().find(|(key, _)| key == name) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((name.to_string(), value.to_string())),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let i = self.entries.iter().position(|(key, _)| key == name)?;
        Some(self.entries.remove(i).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Cookies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        Ok(())
    }
}

pub fn parse_cookies(header: &str) -> Cookies {
    Cookies::parse(header)
}

pub fn stringify_cookies(cookies: &Cookies) -> String {
    cookies.to_string()
}
