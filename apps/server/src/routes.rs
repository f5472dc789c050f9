//! Router, shared state, and request handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use repoviz_core::VisualizeService;
use repoviz_github::{GithubClient, parse_repo_url};
use repoviz_shared::{RepoVizError, RepositoryDigest, VisualizationRequest, VisualizationResponse};

use crate::error::AppError;

/// Identity used when the caller's address is unknown.
const UNKNOWN_IDENTITY: &str = "unknown";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VisualizeService>,
    pub github: Arc<GithubClient>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/github", post(fetch_repository))
        .route("/api/ai", post(visualize))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Caller identity for quota purposes: first `x-forwarded-for` hop, then
/// `x-real-ip`, then the peer address of the connection.
pub fn client_identity(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };

    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Deserialize)]
struct FetchRequest {
    #[serde(default)]
    url: Option<String>,
}

/// POST /api/github
async fn fetch_repository(
    State(state): State<AppState>,
    payload: Result<Json<FetchRequest>, JsonRejection>,
) -> Result<Json<RepositoryDigest>, AppError> {
    let url = payload
        .ok()
        .and_then(|Json(body)| body.url)
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| RepoVizError::invalid_input("Repository URL is required"))?;

    let repo = parse_repo_url(&url)?;
    let digest = state.github.fetch_repository(&repo).await?;
    Ok(Json(digest))
}

/// POST /api/ai
async fn visualize(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<VisualizationRequest>, JsonRejection>,
) -> Result<Json<VisualizationResponse>, AppError> {
    let identity = client_identity(&headers, peer.map(|ConnectInfo(addr)| addr));

    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            // Unparseable bodies still count against the caller.
            state.service.gate().require(&identity)?;
            return Err(RepoVizError::invalid_input(format!(
                "invalid request body: {}",
                rejection.body_text()
            ))
            .into());
        }
    };

    let response = state.service.visualize(&identity, request).await?;
    Ok(Json(response))
}
