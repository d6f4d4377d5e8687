//! Submission API tests

use std::sync::Arc;

use api_models::{DeployResponse, DeploymentView, ErrorResponse, HealthResponse};
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite::Message;
use tower::ServiceExt;

use hangar::hub::LogHub;
use hangar::queue::MemoryQueue;
use hangar::server::handlers::OWNER_HEADER;
use hangar::server::serve::app;
use hangar::server::state::ServerState;
use hangar::services::deployments::DeploymentService;
use hangar::store::MemoryStore;
use hangar::utils::DEPLOY_ID_LEN;

use crate::support::eventually;

struct Api {
    app: Router,
    queue: Arc<MemoryQueue>,
    hub: LogHub,
}

fn api() -> Api {
    let queue = Arc::new(MemoryQueue::new());
    let service = DeploymentService::new(
        Arc::new(MemoryStore::new()),
        queue.clone(),
        "deployments",
        "localhost",
    );
    let (hub, _) = LogHub::spawn();
    let state = ServerState::new(Arc::new(service), hub.clone());

    Api {
        app: app(Arc::new(state)),
        queue,
        hub,
    }
}

async fn send(app: &Router, method: Method, uri: &str, owner: &str, body: Option<&str>) -> (StatusCode, Vec<u8>) {
    let mut builder = Request::builder().method(method).uri(uri).header(OWNER_HEADER, owner);
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, bytes.to_vec())
}

fn json<T: DeserializeOwned>(bytes: &[u8]) -> T {
    serde_json::from_slice(bytes).unwrap()
}

async fn submit(api: &Api, owner: &str) -> DeployResponse {
    let (status, body) = send(
        &api.app,
        Method::POST,
        "/deploy",
        owner,
        Some(r#"{"repo_url": "https://github.com/alice/site"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json(&body)
}

#[tokio::test]
async fn test_health() {
    let api = api();
    let (status, body) = send(&api.app, Method::GET, "/health", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let health: HealthResponse = json(&body);
    assert_eq!(health.status, "healthy");
    assert_eq!(health.service, "hangar");
}

#[tokio::test]
async fn test_deploy_queues_pending_record() {
    let api = api();
    let created = submit(&api, "alice").await;

    assert_eq!(created.id.len(), DEPLOY_ID_LEN);
    assert_eq!(created.status, "pending");
    assert_eq!(created.deployed_url, format!("http://{}.localhost", created.id));
    assert_eq!(api.queue.stats("deployments").published, 1);

    let (status, body) = send(
        &api.app,
        Method::GET,
        &format!("/deployments/{}", created.id),
        "bob",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let view: DeploymentView = json(&body);
    assert_eq!(view.deploy_id, created.id);
    assert_eq!(view.owner_id, "alice");
    assert_eq!(view.status, "pending");
}

#[tokio::test]
async fn test_deploy_rejects_bad_url() {
    let api = api();
    let (status, body) = send(
        &api.app,
        Method::POST,
        "/deploy",
        "alice",
        Some(r#"{"repo_url": "ftp://example.com/site"}"#),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    let error: ErrorResponse = json(&body);
    assert!(!error.error.is_empty());
    assert_eq!(api.queue.stats("deployments").published, 0);
}

#[tokio::test]
async fn test_unknown_deployment() {
    let api = api();
    let (status, body) = send(&api.app, Method::GET, "/deployments/nope0000", "alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let error: ErrorResponse = json(&body);
    assert_eq!(error.error, "deployment nope0000 not found");
}

#[tokio::test]
async fn test_list_is_owner_scoped() {
    let api = api();
    let first = submit(&api, "alice").await;
    let second = submit(&api, "alice").await;
    submit(&api, "bob").await;

    let (status, body) = send(&api.app, Method::GET, "/deployments", "alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let views: Vec<DeploymentView> = json(&body);
    let mut ids: Vec<String> = views.into_iter().map(|v| v.deploy_id).collect();
    ids.sort();
    let mut expected = vec![first.id, second.id];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn test_delete_requires_owner() {
    let api = api();
    let created = submit(&api, "alice").await;
    let uri = format!("/deployments/{}", created.id);

    let (status, _) = send(&api.app, Method::DELETE, &uri, "mallory", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&api.app, Method::DELETE, &uri, "alice", None).await;
    assert_eq!(status, StatusCode::OK);

    // Soft-deleted records disappear from every read path
    let (status, _) = send(&api.app, Method::GET, &uri, "alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = send(&api.app, Method::DELETE, &uri, "alice", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_log_stream() {
    let api = api();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = api.app.clone();
    tokio::spawn(async move { axum::serve(listener, server).await });

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("ws://{}/deployments/abc12345/logs", addr))
        .await
        .unwrap();

    let hub = api.hub.clone();
    assert!(eventually(|| {
        let hub = hub.clone();
        async move { hub.subscriber_count("abc12345").await.unwrap() == 1 }
    })
    .await);

    api.hub.broadcast("abc12345", "hello");
    api.hub.broadcast("other000", "not for us");
    api.hub.broadcast("abc12345", "world");

    let message = socket.next().await.unwrap().unwrap();
    assert_eq!(message.to_text().unwrap(), "hello");
    let message = socket.next().await.unwrap().unwrap();
    assert_eq!(message.to_text().unwrap(), "world");

    socket.send(Message::Close(None)).await.unwrap();

    assert!(eventually(|| {
        let hub = hub.clone();
        async move { hub.subscriber_count("abc12345").await.unwrap() == 0 }
    })
    .await);
}
