//! Artifact router HTTP server

use std::future::Future;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::app::options::ServerOptions;
use crate::errors::PlatformError;
use crate::router::{decode_path, ArtifactRouter, RouterError};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

impl IntoResponse for RouterError {
    fn into_response(self) -> Response {
        let status = match &self {
            RouterError::BadHost(_) | RouterError::BadPath(_) => StatusCode::BAD_REQUEST,
            RouterError::NotFound(_) => StatusCode::NOT_FOUND,
            RouterError::Blob(_) | RouterError::Cache(_) => {
                error!("Artifact lookup failed: {}", self);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = match status {
            StatusCode::INTERNAL_SERVER_ERROR => "internal server error".to_string(),
            _ => self.to_string(),
        };
        (status, message).into_response()
    }
}

/// Router application, every GET path resolved against the Host header
pub fn app(router: ArtifactRouter) -> Router {
    Router::new()
        .route("/", get(artifact_handler))
        .route("/{*path}", get(artifact_handler))
        .with_state(router)
        .layer(TraceLayer::new_for_http())
}

async fn artifact_handler(
    State(router): State<ArtifactRouter>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, RouterError> {
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .or_else(|| uri.host())
        .unwrap_or_default();

    // Blob keys hold the decoded file names
    let path = decode_path(uri.path())?;

    // The cache fill keeps running after the handle is dropped
    let resolved = router.resolve(host, &path).await?;
    let artifact = resolved.artifact;

    let mut response = Response::new(Body::from(artifact.body));
    let headers = response.headers_mut();
    if let Some(value) = artifact
        .content_type
        .as_deref()
        .and_then(|ct| HeaderValue::from_str(ct).ok())
    {
        headers.insert(header::CONTENT_TYPE, value);
    }
    headers.insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(artifact.cache.as_str()),
    );
    Ok(response)
}

/// Start the artifact router server
pub async fn serve(
    options: &ServerOptions,
    router: ArtifactRouter,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), PlatformError>>, PlatformError> {
    let app = app(router);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting artifact router on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| PlatformError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| PlatformError::ServerError(e.to_string()))
    });

    Ok(handle)
}
