use std::path::{Path, PathBuf};

use axum::{
    body::Bytes,
    extract::{Path as UrlPath, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::fs;

use crate::admin::{AdminError, AdminState};
use crate::config::load_config;

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<usize>,
}

#[derive(Serialize)]
pub struct ServiceEntry {
    pub name: String,
    pub config: Value,
}

#[derive(Serialize)]
pub struct ListContent {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Copy)]
enum ListKind {
    Whitelist,
    Blacklist,
}

impl ListKind {
    fn name(self) -> &'static str {
        match self {
            ListKind::Whitelist => "whitelist",
            ListKind::Blacklist => "blacklist",
        }
    }
}

/// Parse a request body as JSON. An empty body reads as `{}`.
fn parse_body(body: &[u8]) -> Result<Value, AdminError> {
    if body.is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_slice(body).map_err(|_| AdminError::BadRequest("Invalid JSON".into()))
}

fn pretty(value: &Value) -> Result<String, AdminError> {
    serde_json::to_string_pretty(value).map_err(|e| AdminError::Internal(e.to_string()))
}

/// Service names become file names, so anything that could escape the
/// services directory is rejected.
fn validate_name(name: &str) -> Result<(), AdminError> {
    let bad = name.is_empty()
        || name.starts_with('.')
        || name.contains(['/', '\\'])
        || name.contains("..");
    if bad {
        Err(AdminError::BadRequest(format!("Invalid service name '{}'", name)))
    } else {
        Ok(())
    }
}

fn service_path(state: &AdminState, name: &str) -> Result<PathBuf, AdminError> {
    validate_name(name)?;
    Ok(state.services_dir.join(format!("{}.{}", name, state.extension)))
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        services: state.router.as_ref().map(|r| r.services().len()),
    })
}

pub async fn list_services(State(state): State<AdminState>) -> Result<Json<Vec<ServiceEntry>>, AdminError> {
    let mut dir = fs::read_dir(&state.services_dir)
        .await
        .map_err(|_| AdminError::Internal("Could not list services".into()))?;
    let suffix = format!(".{}", state.extension);

    let mut out = Vec::new();
    while let Ok(Some(entry)) = dir.next_entry().await {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str().and_then(|n| n.strip_suffix(suffix.as_str())) else {
            continue;
        };
        let parsed = fs::read(entry.path())
            .await
            .ok()
            .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok());
        match parsed {
            Some(config) => out.push(ServiceEntry { name: name.to_string(), config }),
            None => tracing::warn!(path = %entry.path().display(), "Skipping unreadable service file"),
        }
    }
    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(Json(out))
}

pub async fn create_service(
    State(state): State<AdminState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ServiceEntry>), AdminError> {
    let body = parse_body(&body)?;
    let (Some(name), Some(config)) = (body.get("name").and_then(Value::as_str), body.get("config")) else {
        return Err(AdminError::BadRequest("Missing name or invalid config".into()));
    };
    if !config.is_object() {
        return Err(AdminError::BadRequest("Missing name or invalid config".into()));
    }

    let path = service_path(&state, name)?;
    if fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AdminError::BadRequest("Already exists".into()));
    }
    fs::write(&path, pretty(config)?)
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?;

    tracing::info!(service = name, "Service created");
    Ok((
        StatusCode::CREATED,
        Json(ServiceEntry { name: name.to_string(), config: config.clone() }),
    ))
}

pub async fn get_service(
    State(state): State<AdminState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Json<ServiceEntry>, AdminError> {
    let path = service_path(&state, &name)?;
    let config = fs::read(&path)
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .ok_or_else(|| AdminError::NotFound("Not found or invalid JSON".into()))?;
    Ok(Json(ServiceEntry { name, config }))
}

pub async fn put_service(
    State(state): State<AdminState>,
    UrlPath(name): UrlPath<String>,
    body: Bytes,
) -> Result<Json<ServiceEntry>, AdminError> {
    let path = service_path(&state, &name)?;
    if !fs::try_exists(&path).await.unwrap_or(false) {
        return Err(AdminError::NotFound("Not found".into()));
    }
    let config = parse_body(&body)?;
    fs::write(&path, pretty(&config)?)
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?;

    tracing::info!(service = %name, "Service updated");
    Ok(Json(ServiceEntry { name, config }))
}

pub async fn delete_service(
    State(state): State<AdminState>,
    UrlPath(name): UrlPath<String>,
) -> Result<StatusCode, AdminError> {
    let path = service_path(&state, &name)?;
    fs::remove_file(&path)
        .await
        .map_err(|_| AdminError::NotFound("Not found".into()))?;

    tracing::info!(service = %name, "Service deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_config(State(state): State<AdminState>) -> Result<Json<Value>, AdminError> {
    fs::read(&state.config_path)
        .await
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Value>(&bytes).ok())
        .map(Json)
        .ok_or_else(|| AdminError::Internal("Could not read or invalid JSON".into()))
}

pub async fn put_config(State(state): State<AdminState>, body: Bytes) -> Result<Json<Value>, AdminError> {
    let config = parse_body(&body)?;
    fs::write(&state.config_path, pretty(&config)?)
        .await
        .map_err(|_| AdminError::Internal("Could not write config".into()))?;

    tracing::info!(path = %state.config_path.display(), "Global config replaced");
    Ok(Json(config))
}

/// Path of a list file as currently configured.
async fn list_path(config_path: &Path, kind: ListKind) -> Result<PathBuf, AdminError> {
    let config_path = config_path.to_path_buf();
    let config = tokio::task::spawn_blocking(move || load_config(&config_path))
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?
        .map_err(|e| AdminError::Internal(e.to_string()))?;
    let path = match kind {
        ListKind::Whitelist => config.whitelist,
        ListKind::Blacklist => config.blacklist,
    };
    path.ok_or_else(|| AdminError::Internal(format!("No {} path configured", kind.name())))
}

async fn read_list(state: &AdminState, kind: ListKind) -> Result<Json<ListContent>, AdminError> {
    let path = list_path(&state.config_path, kind).await?;
    let content = fs::read_to_string(&path)
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?;
    Ok(Json(ListContent { path: path.display().to_string(), content }))
}

async fn write_list(state: &AdminState, kind: ListKind, body: &[u8]) -> Result<Json<ListContent>, AdminError> {
    let body = parse_body(body)?;
    let content = body
        .get("content")
        .and_then(Value::as_str)
        .ok_or_else(|| AdminError::BadRequest("Missing content".into()))?
        .to_string();

    let path = list_path(&state.config_path, kind).await?;
    fs::write(&path, &content)
        .await
        .map_err(|e| AdminError::Internal(e.to_string()))?;

    tracing::info!(list = kind.name(), path = %path.display(), "Access list replaced");
    Ok(Json(ListContent { path: path.display().to_string(), content }))
}

pub async fn get_whitelist(State(state): State<AdminState>) -> Result<Json<ListContent>, AdminError> {
    read_list(&state, ListKind::Whitelist).await
}

pub async fn put_whitelist(State(state): State<AdminState>, body: Bytes) -> Result<Json<ListContent>, AdminError> {
    write_list(&state, ListKind::Whitelist, &body).await
}

pub async fn get_blacklist(State(state): State<AdminState>) -> Result<Json<ListContent>, AdminError> {
    read_list(&state, ListKind::Blacklist).await
}

pub async fn put_blacklist(State(state): State<AdminState>, body: Bytes) -> Result<Json<ListContent>, AdminError> {
    write_list(&state, ListKind::Blacklist, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("blog").is_ok());
        assert!(validate_name("my-site_2").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("../etc/passwd").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name(".hidden").is_err());
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(b"").unwrap(), json!({}));
        assert_eq!(parse_body(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(matches!(parse_body(b"{"), Err(AdminError::BadRequest(_))));
    }
}
