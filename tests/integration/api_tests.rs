//! API integration tests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

/// Test health endpoint.
#[tokio::test]
async fn test_health_endpoint() {
    dotenvy::dotenv().ok();

    let app = create_test_router().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Test metrics endpoint (when enabled).
#[tokio::test]
async fn test_metrics_endpoint() {
    dotenvy::dotenv().ok();

    let app = create_test_router().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/metrics")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // Metrics should return OK if enabled
    assert!(
        response.status() == StatusCode::OK || response.status() == StatusCode::NOT_FOUND
    );
}

/// Test rate limiting on the generation routes.
#[tokio::test]
#[ignore = "requires Redis"]
async fn test_rate_limiting() {
    dotenvy::dotenv().ok();

    let app = create_test_router().await;

    // Make many requests quickly from one IP
    for i in 0..20 {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/songs/generate")
                    .header("X-Forwarded-For", "192.168.1.100")
                    .header("Content-Type", "application/json")
                    .body(Body::from(r#"{"prompt":"upbeat synthwave"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            println!("Rate limited after {} requests", i + 1);
            return;
        }
    }

    // If we get here, rate limiting might not be working as expected
    // (or the limit is higher than 20 req/s)
}

/// Test CORS headers.
#[tokio::test]
async fn test_cors_headers() {
    dotenvy::dotenv().ok();

    let app = create_test_router().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/jobs")
                .header("Origin", "http://localhost:3000")
                .header("Access-Control-Request-Method", "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    // CORS preflight should return OK or NO_CONTENT
    assert!(
        response.status() == StatusCode::OK || response.status() == StatusCode::NO_CONTENT
    );
}

/// Test security headers.
#[tokio::test]
async fn test_security_headers() {
    dotenvy::dotenv().ok();

    let app = create_test_router().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    let headers = response.headers();

    // Check security headers are present
    assert!(headers.contains_key("X-Content-Type-Options"));
    assert!(headers.contains_key("X-Frame-Options"));
    assert!(headers.contains_key("X-Request-ID"));
}

/// Helper to create a test router.
/// In a real setup, this would use test fixtures or mocks.
async fn create_test_router() -> axum::Router {
    use adgen_api::{create_router, metrics, ApiConfig, AppState};

    // Try to create real state, fall back to minimal router
    let config = ApiConfig::from_env();

    match AppState::new(config).await {
        Ok(state) => {
            let metrics_handle = Some(metrics::init_metrics());
            create_router(state, metrics_handle)
        }
        Err(_) => {
            // Create a minimal router for basic tests
            use axum::routing::get;
            use axum::Json;
            use serde_json::json;

            axum::Router::new()
                .route("/health", get(|| async {
                    Json(json!({
                        "status": "healthy",
                        "version": env!("CARGO_PKG_VERSION")
                    }))
                }))
                .route("/metrics", get(|| async { "# No metrics" }))
        }
    }
}

/// Test the song submission endpoint end to end (server required).
#[tokio::test]
#[ignore = "requires a running server"]
async fn test_generate_song_endpoint() {
    dotenvy::dotenv().ok();

    let base_url = std::env::var("ADGEN_TEST_API_BASE_URL")
        .unwrap_or_else(|_| "http://localhost:8000".to_string());

    let client = reqwest::Client::new();
    let request = client
        .post(format!("{}/api/songs/generate", base_url))
        .json(&serde_json::json!({
            "prompt": "uplifting acoustic track for a product commercial",
            "make_instrumental": true
        }));

    match request.send().await {
        Ok(resp) => {
            println!("Song endpoint responded with status {}", resp.status());
            assert_ne!(resp.status(), StatusCode::NOT_FOUND);
        }
        Err(e) => {
            println!("Request failed (expected if server not running): {}", e);
        }
    }
}
