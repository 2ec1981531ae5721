use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use vudata::{
    api::{self, AppState},
    config::{ApiKeyEntry, AuthConfig, Role},
    storage::{InMemoryStorage, SqliteStorage, StorageBackend},
    Primitives,
};

fn setup_with(storage: Arc<dyn StorageBackend>, auth: AuthConfig) -> Router {
    let state = AppState {
        primitives: Arc::new(Primitives::new(storage)),
        metrics: None,
    };
    api::router(state, Arc::new(auth))
}

fn setup_with_auth(auth: AuthConfig) -> Router {
    setup_with(Arc::new(InMemoryStorage::new()), auth)
}

fn setup() -> Router {
    setup_with_auth(AuthConfig::default())
}

async fn send(app: &Router, method: Method, uri: &str, body: &str) -> (StatusCode, Value) {
    send_with_key(app, method, uri, body, None).await
}

async fn send_with_key(
    app: &Router,
    method: Method,
    uri: &str,
    body: &str,
    key: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    let request = builder.body(Body::from(body.to_string())).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, value)
}

#[tokio::test]
async fn test_counter_routes() {
    let app = setup();

    let (status, _) = send(&app, Method::POST, "/counters/orderId", "1027465").await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::GET, "/counters/orderId", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(1027466));
    let (_, body) = send(&app, Method::GET, "/counters/orderId", "").await;
    assert_eq!(body, json!(1027467));

    let (_, body) = send(&app, Method::GET, "/counters/fresh", "").await;
    assert_eq!(body, json!(1));

    let (_, body) = send(&app, Method::GET, "/counters", "").await;
    assert_eq!(body, json!(["fresh", "orderId"]));

    let (status, _) = send(&app, Method::DELETE, "/counters/orderId", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::DELETE, "/counters/orderId", "").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_counter_validation() {
    let app = setup();

    for body in ["0", "-5", "1.5", "\"ten\"", ""] {
        let (status, resp) = send(&app, Method::POST, "/counters/c", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
        assert_eq!(resp["success"], json!(false));
    }

    let (status, _) = send(&app, Method::GET, "/counters/bad-name", "").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/counters", "").await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_map_routes() {
    let app = setup();

    let (status, _) = send(&app, Method::GET, "/maps/user1", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/maps/user1", r#"{"name":"Ada"}"#).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(&app, Method::GET, "/maps/user1", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "Ada"}));

    for empty in ["", "  ", "null"] {
        let (status, _) = send(&app, Method::POST, "/maps/user2", empty).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    let (status, _) = send(&app, Method::POST, "/maps/user2", "{not json").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, body) = send(&app, Method::GET, "/maps", "").await;
    assert_eq!(body, json!(["user1"]));

    let (status, _) = send(&app, Method::DELETE, "/maps/user1", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/maps/user1", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_queue_routes() {
    let app = setup();

    let (status, _) = send(&app, Method::POST, "/queues/vin", r#"["VIN1","VIN2","VIN3"]"#).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::GET, "/queues/vin/peek", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["VIN1"]));

    let (status, body) = send(&app, Method::GET, "/queues/vin?limit=2", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(["VIN1", "VIN2"]));

    let (_, body) = send(&app, Method::GET, "/queues/vin/depth", "").await;
    assert_eq!(body, json!(1));

    let (_, body) = send(&app, Method::GET, "/queues/vin", "").await;
    assert_eq!(body, json!(["VIN3"]));
    let (status, body) = send(&app, Method::GET, "/queues/vin?limit=5", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
    let (_, body) = send(&app, Method::GET, "/queues/vin/peek", "").await;
    assert_eq!(body, json!([]));

    let (_, body) = send(&app, Method::GET, "/queues", "").await;
    assert_eq!(body, json!(["vin"]));

    let (status, _) = send(&app, Method::DELETE, "/queues/vin", "").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/queues/vin/depth", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_queue_absent_and_invalid() {
    let app = setup();

    for uri in ["/queues/never", "/queues/never/peek", "/queues/never/depth"] {
        let (status, body) = send(&app, Method::GET, uri, "").await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{}", uri);
        assert_eq!(body["success"], json!(false));
    }
    let (status, _) = send(&app, Method::DELETE, "/queues/never", "").await;
    assert_eq!(status, StatusCode::OK);

    for body in ["[]", "{}", "\"x\"", ""] {
        let (status, _) = send(&app, Method::POST, "/queues/q", body).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "body {:?}", body);
    }

    send(&app, Method::POST, "/queues/q", "[1]").await;
    for uri in ["/queues/q?limit=0", "/queues/q?limit=-1", "/queues/q?limit=abc"] {
        let (status, _) = send(&app, Method::GET, uri, "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
    }
    let (_, body) = send(&app, Method::GET, "/queues/q/depth", "").await;
    assert_eq!(body, json!(1));
}

#[tokio::test]
async fn test_health_and_metrics_without_recorder() {
    let app = setup();

    let (status, body) = send(&app, Method::GET, "/health", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));

    let (status, _) = send(&app, Method::GET, "/metrics", "").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_api_key_roles() {
    let app = setup_with_auth(AuthConfig {
        enabled: true,
        api_keys: vec![
            ApiKeyEntry {
                name: "loadgen".to_string(),
                key: "w-key".to_string(),
                role: Role::Writer,
            },
            ApiKeyEntry {
                name: "dashboard".to_string(),
                key: "r-key".to_string(),
                role: Role::Reader,
            },
        ],
    });

    let (status, _) = send(&app, Method::GET, "/queues", "").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send_with_key(&app, Method::GET, "/queues", "", Some("nope")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Health stays open.
    let (status, _) = send(&app, Method::GET, "/health", "").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) =
        send_with_key(&app, Method::POST, "/queues/jobs", "[1,2]", Some("w-key")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) =
        send_with_key(&app, Method::GET, "/queues/jobs/depth", "", Some("r-key")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(2));

    // Dequeue and increment mutate, so readers are refused.
    let (status, _) = send_with_key(&app, Method::GET, "/queues/jobs", "", Some("r-key")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send_with_key(&app, Method::GET, "/counters/c", "", Some("r-key")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let request = Request::builder()
        .uri("/queues/jobs")
        .header("Authorization", "Bearer w-key")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_write_lock_contention_is_service_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("busy.db");
    let path = path.to_str().unwrap();

    let storage = SqliteStorage::with_busy_timeout(path, Duration::ZERO).unwrap();
    let app = setup_with(Arc::new(storage), AuthConfig::default());

    let (status, _) = send(&app, Method::POST, "/queues/q", "[1]").await;
    assert_eq!(status, StatusCode::CREATED);

    // Another process holds the database write lock.
    let holder = rusqlite::Connection::open(path).unwrap();
    holder.execute_batch("BEGIN IMMEDIATE").unwrap();

    for (method, uri, body) in [
        (Method::POST, "/queues/q", "[2]"),
        (Method::GET, "/queues/q", ""),
        (Method::GET, "/counters/c", ""),
    ] {
        let (status, resp) = send(&app, method, uri, body).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        assert_eq!(resp["success"], json!(false));
    }

    // Reads do not need the write lock.
    let (status, body) = send(&app, Method::GET, "/queues/q/depth", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!(1));

    holder.execute_batch("ROLLBACK").unwrap();
    let (status, body) = send(&app, Method::GET, "/queues/q", "").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([1]));
}
