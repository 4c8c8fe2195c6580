//! HTTP 接口集成测试

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use tower::ServiceExt; // for oneshot

use verity_core::{
    api::{app, AppState, ErrorResponse, HealthResponse, VerifyResponse},
    ingest::{self, CorpusItem, MemoryCorpus},
    Registry, RegistryHandle, RegistryStats, VerdictReason,
};

fn invoice(seed: u8) -> RgbImage {
    RgbImage::from_fn(20, 20, |x, y| Rgb([seed, (x * 10) as u8, (y * 10) as u8]))
}

fn png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img.clone()).write_to(&mut buf, ImageOutputFormat::Png).unwrap();
    buf
}

fn corpus() -> MemoryCorpus {
    MemoryCorpus::new("corpus-v1").with_partition("train", vec![CorpusItem::new(invoice(1)), CorpusItem::new(invoice(2))])
}

fn router(registry: Registry, artifact: &Path) -> Router {
    app(Arc::new(AppState {
        registry: Arc::new(RegistryHandle::new(registry, artifact)),
        max_upload_bytes: 1024 * 1024,
    }))
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn verify_known_invoice() {
    let (registry, _) = ingest::build_registry(&corpus()).unwrap();
    let app = router(registry, Path::new("unused.bin"));

    let request = Request::builder()
        .method("POST")
        .uri("/verify?filename=invoice.png")
        .body(Body::from(png(&invoice(2))))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body: VerifyResponse = body_json(response).await;
    assert!(body.success);
    assert!(body.result.is_authentic);
    assert_eq!(body.result.reason, VerdictReason::ExactMatch);
    assert_eq!(body.filename.as_deref(), Some("invoice.png"));
}

#[tokio::test]
async fn verify_unknown_and_garbage() {
    let (registry, _) = ingest::build_registry(&corpus()).unwrap();
    let app = router(registry, Path::new("unused.bin"));

    let unknown = Request::builder()
        .method("POST")
        .uri("/verify")
        .body(Body::from(png(&invoice(3))))
        .unwrap();
    let body: VerifyResponse = body_json(app.clone().oneshot(unknown).await.unwrap()).await;
    assert!(!body.result.is_authentic);
    assert_eq!(body.result.confidence, 0.9);

    let garbage = Request::builder()
        .method("POST")
        .uri("/verify")
        .body(Body::from("not an image"))
        .unwrap();
    let body: VerifyResponse = body_json(app.oneshot(garbage).await.unwrap()).await;
    assert_eq!(body.result.reason, VerdictReason::Unfingerprintable);
    assert!(body.result.fingerprint.is_none());
}

#[tokio::test]
async fn empty_upload_is_rejected() {
    let app = router(Registry::new(), Path::new("unused.bin"));
    let request = Request::builder().method("POST").uri("/verify").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = body_json(response).await;
    assert_eq!(body.error, "No file uploaded");
}

#[tokio::test]
async fn health_and_stats() {
    let app = router(Registry::new(), Path::new("does-not-exist.bin"));

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let health: HealthResponse = body_json(response).await;
    assert_eq!(health.status, "healthy");
    assert!(!health.registry_loaded);

    let response = app
        .oneshot(Request::builder().uri("/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let stats: RegistryStats = body_json(response).await;
    assert_eq!(stats.total_fingerprints, 0);
    assert!(!stats.artifact_present);
}

#[tokio::test]
async fn reload_publishes_artifact() {
    let dir = tempdir().unwrap();
    let artifact = dir.path().join("hashes.bin");
    let app = router(Registry::new(), &artifact);

    let missing = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/reload").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    ingest::ingest(&corpus(), &artifact).unwrap();
    let response = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/reload").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let stats: RegistryStats = body_json(response).await;
    assert_eq!(stats.total_fingerprints, 2);

    let verify = Request::builder()
        .method("POST")
        .uri("/verify")
        .body(Body::from(png(&invoice(1))))
        .unwrap();
    let body: VerifyResponse = body_json(app.oneshot(verify).await.unwrap()).await;
    assert!(body.result.is_authentic);
}
