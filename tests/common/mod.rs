//! Shared utilities for integration tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Write `<dir>/<name>.json` with the given hostname patterns.
pub fn write_service(dir: &Path, name: &str, hostnames: &[&str]) -> PathBuf {
    let path = dir.join(format!("{}.json", name));
    let body = serde_json::json!({
        "proxyHostnames": hostnames,
        "proxyTarget": format!("http://127.0.0.1:9000/{}", name),
    });
    fs::write(&path, serde_json::to_string_pretty(&body).unwrap()).unwrap();
    path
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_until<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[allow(dead_code)]
pub const RELOAD_TIMEOUT: Duration = Duration::from_secs(5);
