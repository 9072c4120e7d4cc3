// HTTP server module
// Service façade: a single POST /query endpoint in front of the retriever

use std::sync::Arc;

use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::response::Json as ResponseJson;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::retriever::{ErrorEnvelope, Mode, QueryResult, Retriever};
use crate::{Result, TidepoolError};

#[cfg(test)]
mod tests;

/// Shared handler state. The retriever is immutable after startup, so a
/// plain `Arc` is all the sharing this service needs.
#[derive(Clone)]
pub struct AppState {
    pub retriever: Arc<Retriever>,
}

/// Body of `POST /query`. Mode and k are optional with documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_mode() -> String {
    "auto".to_string()
}

fn default_k() -> usize {
    5
}

type HandlerError = (StatusCode, ResponseJson<ErrorEnvelope>);

/// Build the application router.
#[inline]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Bind and serve until the process is stopped.
#[inline]
pub async fn serve(addr: std::net::SocketAddr, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");
    axum::serve(listener, router(state))
        .await
        .map_err(TidepoolError::Io)?;
    Ok(())
}

async fn health() -> ResponseJson<serde_json::Value> {
    ResponseJson(serde_json::json!({ "status": "ok" }))
}

/// POST /query - dispatch a natural-language query through the retriever.
async fn query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> std::result::Result<ResponseJson<QueryResult>, HandlerError> {
    let mode: Mode = request.mode.parse().map_err(reject)?;
    let result = state
        .retriever
        .retrieve(&request.text, mode, request.k)
        .await
        .map_err(reject)?;
    Ok(ResponseJson(result))
}

/// Map a crate error onto its HTTP status and the uniform error envelope.
fn reject(err: TidepoolError) -> HandlerError {
    let status = match err.kind() {
        "invalid_request" => StatusCode::BAD_REQUEST,
        "index_not_built" => StatusCode::CONFLICT,
        "embedding_provider_error" | "language_model_error" => StatusCode::BAD_GATEWAY,
        "query_timeout" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Query failed: {err}");
    }
    (status, ResponseJson(ErrorEnvelope::from(&err)))
}
