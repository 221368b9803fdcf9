use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::shared::{MemoryService, Message, Stats, StoreError, TaggingMode, ValidationError};

type AppState = Arc<MemoryService>;

pub struct ApiError(anyhow::Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.downcast_ref::<ValidationError>().is_some() {
            StatusCode::BAD_REQUEST
        } else if self.0.downcast_ref::<StoreError>().is_some() {
            StatusCode::BAD_GATEWAY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl<E: Into<anyhow::Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {:#}", self.0);
        }
        (status, Json(json!({ "error": format!("{:#}", self.0) }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct NewMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagBody {
    pub tag: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeBody {
    pub mode: String,
}

#[derive(Debug, Serialize)]
pub struct ModeChanged {
    pub mode: TaggingMode,
    pub flushed: usize,
}

pub fn router(service: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/messages", post(add_message))
        .route("/api/tag", get(get_tag).put(set_tag))
        .route("/api/mode", get(get_mode).put(set_mode))
        .route("/api/stats", get(stats))
        .with_state(service)
}

async fn add_message(
    State(service): State<AppState>,
    Json(body): Json<NewMessage>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    let message = service
        .conversations
        .add_message(&body.role, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn get_tag(State(service): State<AppState>) -> Json<TagBody> {
    Json(TagBody {
        tag: service.buffer().tag(),
    })
}

async fn set_tag(State(service): State<AppState>, Json(body): Json<TagBody>) -> Json<TagBody> {
    service.buffer().set_tag(body.tag);
    get_tag(State(service)).await
}

async fn get_mode(State(service): State<AppState>) -> Json<ModeBody> {
    Json(ModeBody {
        mode: service.buffer().mode().to_string(),
    })
}

async fn set_mode(
    State(service): State<AppState>,
    Json(body): Json<ModeBody>,
) -> Result<Json<ModeChanged>, ApiError> {
    let mode: TaggingMode = body.mode.parse()?;
    let flushed = service.buffer().set_mode(mode);
    Ok(Json(ModeChanged { mode, flushed }))
}

async fn stats(State(service): State<AppState>) -> Result<Json<Stats>, ApiError> {
    Ok(Json(service.stats().await?))
}

/// Serve the HTTP API until `shutdown` is cancelled.
pub async fn serve(service: AppState, bind: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP API stopped");
    Ok(())
}
