//! Hostname pattern matching.
//!
//! # Pattern forms
//! - `example.com`: exact, case-insensitive
//! - `.example.com`: suffix wildcard, any hostname ending with it
//! - `example.`: prefix wildcard, any hostname starting with it
//! - `*.example.com`, `**.example.com`: glob; `*` is one or more non-dot
//!   characters, `**` is any run of characters (possibly empty)
//! - `@/path`: IP mapping; request host is a literal IPv4 address and the
//!   URI starts with `/path`
//!
//! # Design Decisions
//! - Patterns are parsed once into a `HostPattern`, never turned into regexes,
//!   so config content cannot inject regex syntax
//! - Glob matching is a dynamic-programming walk: O(pattern × host), no
//!   backtracking blowup on adversarial patterns

/// One token of a glob pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobToken {
    Literal(char),
    /// `*`: one or more non-dot characters.
    Label,
    /// `**`: zero or more of any character.
    Any,
}

/// A compiled `proxyHostnames` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostPattern {
    Exact(String),
    Suffix(String),
    Prefix(String),
    Glob(Vec<GlobToken>),
    /// Holds the URI path prefix.
    IpMapping(String),
}

impl HostPattern {
    pub fn parse(raw: &str) -> Self {
        if let Some(prefix) = raw.strip_prefix('@') {
            return HostPattern::IpMapping(prefix.to_string());
        }

        let lower = raw.to_ascii_lowercase();
        if lower.contains('*') {
            HostPattern::Glob(tokenize(&lower))
        } else if lower.starts_with('.') {
            HostPattern::Suffix(lower)
        } else if lower.ends_with('.') {
            HostPattern::Prefix(lower)
        } else {
            HostPattern::Exact(lower)
        }
    }

    /// Match a hostname. IP-mapping patterns never match here; they need the
    /// URI too, see [`HostPattern::ip_mapping_match`].
    pub fn matches_host(&self, hostname: &str) -> bool {
        let host = hostname.to_ascii_lowercase();
        match self {
            HostPattern::Exact(expected) => host == *expected,
            HostPattern::Suffix(suffix) => host.len() > suffix.len() && host.ends_with(suffix.as_str()),
            HostPattern::Prefix(prefix) => host.len() > prefix.len() && host.starts_with(prefix.as_str()),
            HostPattern::Glob(tokens) => glob_match(tokens, &host),
            HostPattern::IpMapping(_) => false,
        }
    }

    /// For an IP-mapping pattern, the path prefix to strip when `hostname`
    /// is a literal IPv4 address and `uri` starts with the prefix.
    pub fn ip_mapping_match(&self, hostname: &str, uri: &str) -> Option<&str> {
        match self {
            HostPattern::IpMapping(prefix) if is_dotted_quad(hostname) && uri.starts_with(prefix.as_str()) => {
                Some(prefix.as_str())
            }
            _ => None,
        }
    }
}

fn tokenize(pattern: &str) -> Vec<GlobToken> {
    let mut tokens = Vec::new();
    let mut chars = pattern.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '*' {
            if chars.peek() == Some(&'*') {
                chars.next();
                tokens.push(GlobToken::Any);
            } else {
                tokens.push(GlobToken::Label);
            }
        } else {
            tokens.push(GlobToken::Literal(c));
        }
    }
    tokens
}

fn glob_match(tokens: &[GlobToken], host: &str) -> bool {
    let text: Vec<char> = host.chars().collect();
    let m = text.len();

    // next[j]: the tokens after the current one match text[j..].
    let mut next = vec![false; m + 1];
    next[m] = true;
    for token in tokens.iter().rev() {
        let mut cur = vec![false; m + 1];
        for j in (0..=m).rev() {
            cur[j] = match token {
                GlobToken::Literal(c) => j < m && text[j] == *c && next[j + 1],
                GlobToken::Any => next[j] || (j < m && cur[j + 1]),
                GlobToken::Label => j < m && text[j] != '.' && (next[j + 1] || cur[j + 1]),
            };
        }
        next = cur;
    }
    next[0]
}

/// `true` for four dot-separated runs of one to three ASCII digits.
///
/// Purely syntactic: `999.1.1.1` passes.
pub fn is_dotted_quad(hostname: &str) -> bool {
    let mut parts = 0;
    for part in hostname.split('.') {
        if part.is_empty() || part.len() > 3 || !part.bytes().all(|b| b.is_ascii_digit()) {
            return false;
        }
        parts += 1;
    }
    parts == 4
}
