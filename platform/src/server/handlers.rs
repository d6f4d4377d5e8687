//! HTTP request handlers

use std::convert::Infallible;
use std::sync::Arc;

use api_models::{
    DeployRequest, DeployResponse, DeploymentView, ErrorResponse, HealthResponse,
    MessageResponse, VersionResponse,
};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        FromRequestParts, Path, State,
    },
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::{SinkExt, StreamExt};
use tracing::{debug, error};

use crate::errors::PlatformError;
use crate::hub::LogHub;
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Header carrying the caller's identity
pub const OWNER_HEADER: &str = "x-owner-id";

/// Owner used when the caller does not identify itself
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Error returned by API handlers, rendered as `{"error": ...}`
#[derive(Debug)]
pub struct ApiError(PlatformError);

impl From<PlatformError> for ApiError {
    fn from(err: PlatformError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PlatformError::ValidationError(_) => StatusCode::BAD_REQUEST,
            PlatformError::NotFound(_) => StatusCode::NOT_FOUND,
            other => {
                error!("Request failed: {}", other);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let error = match &self.0 {
            PlatformError::ValidationError(msg) | PlatformError::NotFound(msg) => msg.clone(),
            other => other.to_string(),
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

/// Caller identity taken from the `X-Owner-ID` header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Owner(pub String);

impl<S: Send + Sync> FromRequestParts<S> for Owner {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let owner = parts
            .headers
            .get(OWNER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(ANONYMOUS_OWNER);
        Ok(Owner(owner.to_string()))
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "hangar".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Submit a repository
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Json(request): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let deployment = state.deployments.create(&owner, &request.repo_url).await?;
    Ok((
        StatusCode::CREATED,
        Json(DeployResponse {
            id: deployment.deploy_id,
            status: deployment.status.to_string(),
            deployed_url: deployment.published_url,
        }),
    ))
}

/// Caller's deployments, newest first
pub async fn list_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
) -> Result<Json<Vec<DeploymentView>>, ApiError> {
    let deployments = state.deployments.list(&owner).await?;
    Ok(Json(deployments.into_iter().map(DeploymentView::from).collect()))
}

/// Status of one deployment
pub async fn status_handler(
    State(state): State<Arc<ServerState>>,
    Path(deploy_id): Path<String>,
) -> Result<Json<DeploymentView>, ApiError> {
    let deployment = state.deployments.status(&deploy_id).await?;
    Ok(Json(deployment.into()))
}

pub async fn delete_handler(
    State(state): State<Arc<ServerState>>,
    Owner(owner): Owner,
    Path(deploy_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.deployments.delete(&deploy_id, &owner).await?;
    Ok(Json(MessageResponse {
        message: "Deployment deleted successfully".to_string(),
    }))
}

/// Live build output over a WebSocket
pub async fn logs_handler(
    State(state): State<Arc<ServerState>>,
    Path(deploy_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| stream_logs(socket, hub, deploy_id))
}

/// Forward hub chunks to the socket until either side goes away
async fn stream_logs(socket: WebSocket, hub: LogHub, deploy_id: String) {
    let (subscriber, mut chunks) = hub.subscribe_channel(&deploy_id);
    let (mut sender, mut receiver) = socket.split();
    debug!(deploy_id = %deploy_id, subscriber = %subscriber, "Log stream opened");

    let mut pending = Vec::new();
    loop {
        tokio::select! {
            chunk = chunks.recv() => {
                let Some(bytes) = chunk else {
                    if !pending.is_empty() {
                        let _ = sender.send(Message::Binary(std::mem::take(&mut pending).into())).await;
                    }
                    break;
                };
                let Some(message) = next_frame(&mut pending, &bytes) else { continue };
                if sender.send(message).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    hub.unsubscribe(&deploy_id, subscriber);
    debug!(deploy_id = %deploy_id, subscriber = %subscriber, "Log stream closed");
}

/// Frame the bytes received so far. A multi-byte character cut at the end of
/// `chunk` stays in `pending` until the rest arrives.
fn next_frame(pending: &mut Vec<u8>, chunk: &[u8]) -> Option<Message> {
    pending.extend_from_slice(chunk);
    let held = match std::str::from_utf8(pending) {
        Err(e) if e.error_len().is_none() => pending.len() - e.valid_up_to(),
        _ => 0,
    };
    let tail = pending.split_off(pending.len() - held);
    let ready = std::mem::replace(pending, tail);
    if ready.is_empty() {
        return None;
    }

    Some(match String::from_utf8(ready) {
        Ok(text) => Message::Text(text.into()),
        Err(e) => Message::Binary(e.into_bytes().into()),
    })
}
