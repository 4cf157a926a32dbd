//! HTTP binding of the gateway

use crate::auth::require_auth;
use crate::gateway::Gateway;
use crate::ws::handle_live;
use axum::{
    extract::{rejection::JsonRejection, Path as AxumPath, State, WebSocketUpgrade},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use bicameral_core::{
    ConnectBody, DirectBody, Error, ErrorBody, SpeakBody, TaskBody, TaskDoneBody, ThinkBody,
};
use bicameral_pipeline::PipelineOutcome;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Typed error rendered as `{error: {cause, message, retryable}}` with the
/// error's transport status.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::InvalidRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody::from(&self.0))).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// All routes. `/health` and `/pulse` stay open; everything else is behind
/// the auth middleware.
pub fn router(gateway: Arc<Gateway>) -> Router {
    let protected = Router::new()
        .route("/think", post(think_handler))
        .route("/phi3", post(direct_handler))
        .route("/speak/text", post(speak_handler))
        .route("/status", get(status_handler))
        .route("/connect", post(connect_handler))
        .route("/connect/:platform", delete(disconnect_handler))
        .route("/adapters", get(adapters_handler))
        .route("/task/queue", post(task_queue_handler))
        .route("/task/next", get(task_next_handler))
        .route("/task/done", post(task_done_handler))
        .route("/ws/live", get(ws_handler))
        .route_layer(middleware::from_fn_with_state(gateway.clone(), require_auth));

    Router::new()
        .route("/health", get(health_handler))
        .route("/pulse", get(pulse_handler))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(gateway)
}

pub fn bind_addr(gateway: &Gateway) -> anyhow::Result<SocketAddr> {
    let config = gateway.config();
    let addr = format!("{}:{}", config.bind.to_addr(), config.port).parse::<SocketAddr>()?;
    Ok(addr)
}

pub async fn start_gateway(gateway: Arc<Gateway>) -> anyhow::Result<()> {
    let addr = bind_addr(&gateway)?;
    gateway.log_startup();
    info!("  Listening on: {}", addr);
    info!("  Live status: ws://{}/ws/live", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, router(gateway)).await?;
    Ok(())
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.health())
}

async fn pulse_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.pulse())
}

async fn status_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(gateway.status())
}

async fn think_handler(
    State(gateway): State<Arc<Gateway>>,
    body: std::result::Result<Json<ThinkBody>, JsonRejection>,
) -> ApiResult<PipelineOutcome> {
    let Json(body) = body?;
    Ok(Json(gateway.think(body).await?))
}

async fn direct_handler(
    State(gateway): State<Arc<Gateway>>,
    body: std::result::Result<Json<DirectBody>, JsonRejection>,
) -> ApiResult<PipelineOutcome> {
    let Json(body) = body?;
    Ok(Json(gateway.direct(body).await?))
}

async fn speak_handler(
    State(gateway): State<Arc<Gateway>>,
    body: std::result::Result<Json<SpeakBody>, JsonRejection>,
) -> ApiResult<PipelineOutcome> {
    let Json(body) = body?;
    Ok(Json(gateway.speak(body).await?))
}

async fn connect_handler(
    State(gateway): State<Arc<Gateway>>,
    body: std::result::Result<Json<ConnectBody>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(body) = body?;
    let binding = gateway.connect(&body)?;
    Ok(Json(json!({
        "platform": binding.platform_name,
        "binding": binding,
    })))
}

async fn disconnect_handler(
    AxumPath(platform): AxumPath<String>,
    State(gateway): State<Arc<Gateway>>,
) -> ApiResult<serde_json::Value> {
    let binding = gateway.disconnect(&platform)?;
    Ok(Json(json!({ "ok": true, "binding": binding })))
}

async fn adapters_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    Json(json!({ "adapters": gateway.adapters() }))
}

async fn task_queue_handler(
    State(gateway): State<Arc<Gateway>>,
    body: std::result::Result<Json<TaskBody>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(body) = body?;
    let task = gateway.queue_task(body).await?;
    Ok(Json(json!({ "task_id": task.task_id, "status": "queued", "task": task })))
}

async fn task_next_handler(State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    match gateway.next_task().await {
        Some(task) => Json(json!({ "task_id": task.task_id, "status": "executing", "task": task })),
        None => Json(json!({ "task_id": "", "status": "no_tasks", "task": null })),
    }
}

async fn task_done_handler(
    State(gateway): State<Arc<Gateway>>,
    body: std::result::Result<Json<TaskDoneBody>, JsonRejection>,
) -> ApiResult<serde_json::Value> {
    let Json(body) = body?;
    let task = gateway.complete_task(&body.task_id).await?;
    Ok(Json(json!({ "task_id": task.task_id, "status": "completed", "task": task })))
}

async fn ws_handler(ws: WebSocketUpgrade, State(gateway): State<Arc<Gateway>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_live(socket, gateway))
}
