//! HTTP helpers shared with the request path.

pub mod headers;

pub use headers::{parse_cookies, stringify_cookies, Cookies, Headers};
