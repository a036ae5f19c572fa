//! Administration API.
//!
//! # Responsibilities
//! - CRUD on individual service files
//! - Read/replace the global config file
//! - Read/replace the whitelist and blacklist files
//!
//! # Design Decisions
//! - The API only touches the filesystem; running live maps pick changes up
//!   through their watchers, exactly as for a hand edit
//! - Errors are JSON `{ "error": "..." }` bodies

pub mod auth;
pub mod handlers;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::config::GlobalConfig;
use crate::routing::ServiceRouter;
use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub config_path: PathBuf,
    pub services_dir: PathBuf,
    pub extension: String,
    /// Bearer token; `None` disables authentication.
    pub api_key: Option<String>,
    pub router: Option<Arc<ServiceRouter>>,
}

impl AdminState {
    pub fn new(config_path: PathBuf, config: &GlobalConfig) -> Self {
        Self {
            config_path,
            services_dir: config.services_dir.clone(),
            extension: config.service_extension.clone(),
            api_key: Some(config.admin.api_key.clone()).filter(|k| !k.is_empty()),
            router: None,
        }
    }

    pub fn with_router(mut self, router: Arc<ServiceRouter>) -> Self {
        self.router = Some(router);
        self
    }
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl IntoResponse for AdminError {
    fn into_response(self) -> Response {
        let status = match self {
            AdminError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AdminError::NotFound(_) => StatusCode::NOT_FOUND,
            AdminError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/api/status", get(get_status))
        .route("/api/services", get(list_services).post(create_service))
        .route(
            "/api/services/{name}",
            get(get_service).put(put_service).delete(delete_service),
        )
        .route("/api/config", get(get_config).put(put_config))
        .route("/api/whitelist", get(get_whitelist).put(put_whitelist))
        .route("/api/blacklist", get(get_blacklist).put(put_blacklist))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` completes.
pub async fn serve<F>(listener: TcpListener, state: AdminState, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
