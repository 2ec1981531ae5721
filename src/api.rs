//! HTTP surface over the primitive engines.
//!
//! Names and bodies are validated here, before any storage access. Engine
//! calls run on the blocking pool: a request that is cancelled mid-call does
//! not abort the transaction, which still commits or rolls back in full.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use vudata_core::{CollectionName, Family, StorageError};

use crate::{
    auth::{auth_middleware, CallerIdentity},
    config::AuthConfig,
    error::PrimitiveError,
    primitives::Primitives,
    queue::DEFAULT_DEQUEUE_LIMIT,
};

#[derive(Clone)]
pub struct AppState {
    pub primitives: Arc<Primitives>,
    pub metrics: Option<PrometheusHandle>,
}

#[derive(Debug)]
pub enum ApiError {
    Primitive(PrimitiveError),
    Forbidden(String),
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
}

impl From<PrimitiveError> for ApiError {
    fn from(e: PrimitiveError) -> Self {
        ApiError::Primitive(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Primitive(PrimitiveError::Validation(_)) => StatusCode::BAD_REQUEST,
            ApiError::Primitive(PrimitiveError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Primitive(PrimitiveError::Storage(StorageError::Busy)) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            ApiError::Primitive(PrimitiveError::Storage(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let error = match self {
            ApiError::Primitive(e) => e.to_string(),
            ApiError::Forbidden(m) | ApiError::Internal(m) => m,
        };
        (status, Json(ErrorBody { success: false, error })).into_response()
    }
}

pub fn router(state: AppState, auth: Arc<AuthConfig>) -> Router {
    let protected = Router::new()
        .route("/counters", get(list_counters))
        .route(
            "/counters/:name",
            post(init_counter).get(increment_counter).delete(remove_counter),
        )
        .route("/maps", get(list_maps))
        .route("/maps/:name", post(put_entry).get(get_entry).delete(remove_entry))
        .route("/queues", get(list_queues))
        .route(
            "/queues/:name",
            post(enqueue).get(dequeue).delete(clear_queue),
        )
        .route("/queues/:name/peek", get(peek))
        .route("/queues/:name/depth", get(depth))
        .route_layer(middleware::from_fn(auth_middleware))
        .layer(Extension(auth));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .merge(protected)
        .with_state(state)
}

async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, PrimitiveError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("operation aborted: {}", e)))?
        .map_err(ApiError::from)
}

fn parse_name(raw: &str) -> Result<CollectionName, ApiError> {
    CollectionName::parse(raw).map_err(|e| PrimitiveError::from(e).into())
}

fn require_writer(caller: &CallerIdentity) -> Result<(), ApiError> {
    if caller.can_write() {
        return Ok(());
    }
    tracing::warn!(caller = %caller.name, role = %caller.role, "write rejected for read-only caller");
    Err(ApiError::Forbidden(format!(
        "caller {} with role {} may not modify collections",
        caller.name, caller.role
    )))
}

fn invalid(message: impl Into<String>) -> ApiError {
    PrimitiveError::Validation(message.into()).into()
}

/// Parses a request body as JSON, treating an empty body or `null` as missing.
fn parse_body(body: &Bytes) -> Result<Value, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(invalid("request body is empty"));
    }
    match serde_json::from_slice(body) {
        Ok(Value::Null) => Err(invalid("request body is empty")),
        Ok(value) => Ok(value),
        Err(e) => Err(invalid(format!("request body is not valid JSON: {}", e))),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn render_metrics(State(state): State<AppState>) -> Response {
    match state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}

async fn list(state: AppState, family: Family) -> Result<Json<Vec<String>>, ApiError> {
    let primitives = state.primitives.clone();
    let names = blocking(move || primitives.registry.list(family)).await?;
    Ok(Json(names))
}

async fn list_counters(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    list(state, Family::Counter).await
}

async fn list_maps(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    list(state, Family::Map).await
}

async fn list_queues(State(state): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    list(state, Family::Queue).await
}

async fn init_counter(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let start_value = match parse_body(&body)? {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| invalid("counter start value must be an integer"))?,
        _ => return Err(invalid("counter start value must be an integer")),
    };

    let primitives = state.primitives.clone();
    blocking(move || primitives.counters.initialize(&name, start_value)).await?;
    Ok(StatusCode::CREATED)
}

async fn increment_counter(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
) -> Result<Json<i64>, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    let value = blocking(move || primitives.counters.increment_and_get(&name)).await?;
    Ok(Json(value))
}

async fn remove_counter(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    blocking(move || primitives.counters.remove(&name)).await?;
    Ok(StatusCode::OK)
}

async fn put_entry(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let value = parse_body(&body)?;
    let primitives = state.primitives.clone();
    blocking(move || primitives.maps.put(&name, &value)).await?;
    Ok(StatusCode::CREATED)
}

async fn get_entry(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    let value = blocking(move || primitives.maps.get(&name)).await?;
    Ok(Json(value))
}

async fn remove_entry(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    blocking(move || primitives.maps.remove(&name)).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct DequeueParams {
    limit: Option<usize>,
}

async fn enqueue(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let items = match parse_body(&body)? {
        Value::Array(items) if !items.is_empty() => items,
        Value::Array(_) => return Err(invalid("enqueue requires at least one item")),
        _ => return Err(invalid("enqueue body must be a JSON array")),
    };

    let primitives = state.primitives.clone();
    blocking(move || primitives.queues.enqueue(&name, &items)).await?;
    Ok(StatusCode::CREATED)
}

async fn dequeue(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
    params: Result<Query<DequeueParams>, QueryRejection>,
) -> Result<Json<Vec<Value>>, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let Query(params) = params.map_err(|e| invalid(format!("invalid limit: {}", e)))?;
    let limit = params.limit.unwrap_or(DEFAULT_DEQUEUE_LIMIT);

    let primitives = state.primitives.clone();
    let items = blocking(move || primitives.queues.dequeue(&name, limit)).await?;
    Ok(Json(items))
}

async fn peek(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    let head = blocking(move || primitives.queues.peek(&name)).await?;
    Ok(Json(head.into_iter().collect()))
}

async fn depth(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<u64>, ApiError> {
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    let depth = blocking(move || primitives.queues.depth(&name)).await?;
    Ok(Json(depth))
}

async fn clear_queue(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_writer(&caller)?;
    let name = parse_name(&name)?;
    let primitives = state.primitives.clone();
    blocking(move || primitives.queues.clear(&name)).await?;
    Ok(StatusCode::OK)
}
