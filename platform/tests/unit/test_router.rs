//! Artifact router tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tower::ServiceExt;

use hangar::blob::BlobStore;
use hangar::cache::{Cache, MemoryCache};
use hangar::router::serve::{app, CACHE_STATUS_HEADER};
use hangar::router::{ArtifactRouter, CacheStatus, RouterError};

use crate::support::CountingBlobs;

const TTL: Duration = Duration::from_secs(60);

async fn published_site() -> Arc<CountingBlobs> {
    let blobs = Arc::new(CountingBlobs::new());
    blobs
        .inner
        .put("dist/abc/index.html", "<h1>home</h1>".into(), "text/html")
        .await
        .unwrap();
    blobs
        .inner
        .put("dist/abc/assets/app.js", "console.log(1)".into(), "text/javascript")
        .await
        .unwrap();
    blobs
}

fn request(host: &str, path: &str) -> Request<Body> {
    Request::builder()
        .uri(path)
        .header(header::HOST, host)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_miss_then_hit() {
    let blobs = published_site().await;
    let cache = Arc::new(MemoryCache::new());
    let router = ArtifactRouter::new(blobs.clone(), cache.clone(), TTL);

    let first = router.resolve("abc.localhost:3001", "/").await.unwrap();
    assert_eq!(first.artifact.cache, CacheStatus::Miss);
    assert_eq!(&first.artifact.body[..], b"<h1>home</h1>");
    assert_eq!(first.artifact.content_type.as_deref(), Some("text/html"));
    first.cache_fill.unwrap().await.unwrap();

    let cached = cache.get("deploy:abc:/index.html").await.unwrap();
    assert_eq!(cached.as_deref(), Some(&b"<h1>home</h1>"[..]));
    let gets = blobs.gets();

    let second = router.resolve("abc.localhost:3001", "/index.html").await.unwrap();
    assert_eq!(second.artifact.cache, CacheStatus::Hit);
    assert_eq!(second.artifact.content_type.as_deref(), Some("text/html"));
    assert!(second.cache_fill.is_none());
    assert_eq!(blobs.gets(), gets);
}

#[tokio::test]
async fn test_spa_fallback_cached_under_requested_path() {
    let blobs = published_site().await;
    let cache = Arc::new(MemoryCache::new());
    let router = ArtifactRouter::new(blobs, cache.clone(), TTL);

    let resolved = router.resolve("abc.example.com", "/foo/bar").await.unwrap();
    assert_eq!(&resolved.artifact.body[..], b"<h1>home</h1>");
    resolved.cache_fill.unwrap().await.unwrap();

    assert!(cache.get("deploy:abc:/foo/bar").await.unwrap().is_some());
    assert!(cache.get("deploy:abc:/index.html").await.unwrap().is_none());
}

#[tokio::test]
async fn test_not_found() {
    let blobs = published_site().await;
    let router = ArtifactRouter::new(blobs, Arc::new(MemoryCache::new()), TTL);

    // Unknown deployment, nothing to fall back to
    let err = router.resolve("zzz.localhost", "/").await.unwrap_err();
    assert!(matches!(err, RouterError::NotFound(_)));

    let err = router.resolve("zzz.localhost", "/app.js").await.unwrap_err();
    assert!(matches!(err, RouterError::NotFound(_)));
}

#[tokio::test]
async fn test_bad_host_skips_storage() {
    let blobs = published_site().await;
    let router = ArtifactRouter::new(blobs.clone(), Arc::new(MemoryCache::new()), TTL);

    let err = router.resolve("localhost", "/").await.unwrap_err();
    assert!(matches!(err, RouterError::BadHost(_)));
    assert_eq!(blobs.gets(), 0);

    let response = app(router).oneshot(request("localhost", "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_http_headers() {
    let blobs = published_site().await;
    let router = ArtifactRouter::new(blobs, Arc::new(MemoryCache::new()), TTL);
    let service = app(router);

    let response = service
        .clone()
        .oneshot(request("abc.localhost", "/assets/app.js"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/javascript");
    assert_eq!(response.headers()[CACHE_STATUS_HEADER], "MISS");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"console.log(1)");

    let response = service
        .oneshot(request("abc.localhost", "/missing.css"))
        .await
        .unwrap();
    // Falls back to the app shell
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");
}

#[tokio::test]
async fn test_cached_body_without_content_type() {
    let cache = Arc::new(MemoryCache::new());
    cache
        .set("deploy:abc:/raw", b"bytes".to_vec(), TTL)
        .await
        .unwrap();
    let router = ArtifactRouter::new(Arc::new(CountingBlobs::new()), cache, TTL);

    let response = app(router).oneshot(request("abc.localhost", "/raw")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CACHE_STATUS_HEADER], "HIT");
    assert!(response.headers().get(header::CONTENT_TYPE).is_none());
}

#[tokio::test]
async fn test_storage_error_is_internal() {
    let router = ArtifactRouter::new(
        Arc::new(CountingBlobs::failing()),
        Arc::new(MemoryCache::new()),
        TTL,
    );

    let response = app(router).oneshot(request("abc.localhost", "/")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"internal server error");
}

#[tokio::test]
async fn test_escaped_file_names_are_served() {
    let blobs = published_site().await;
    blobs
        .inner
        .put("dist/abc/my file.txt", "spaced".into(), "text/plain")
        .await
        .unwrap();
    blobs
        .inner
        .put("dist/abc/café.txt", "accented".into(), "text/plain")
        .await
        .unwrap();
    let service = app(ArtifactRouter::new(blobs, Arc::new(MemoryCache::new()), TTL));

    for (path, expected) in [("/my%20file.txt", &b"spaced"[..]), ("/caf%C3%A9.txt", &b"accented"[..])] {
        let response = service.clone().oneshot(request("abc.localhost", path)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], expected, "{path}");
    }
}

#[tokio::test]
async fn test_undecodable_path_is_rejected() {
    let blobs = published_site().await;
    let service = app(ArtifactRouter::new(blobs.clone(), Arc::new(MemoryCache::new()), TTL));

    let response = service.oneshot(request("abc.localhost", "/%FF")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(blobs.gets(), 0);
}
