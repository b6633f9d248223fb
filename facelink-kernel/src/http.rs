/**
 * API REST FACELINK - Service de synchronisation opérateur ↔ device
 *
 * RÔLE :
 * Expose les files de commandes et les registres status/résultat à deux rôles :
 * l'UI opérateur (enqueue, lecture) et le device (poll, reports). Le device est
 * derrière NAT : il n'y a que des appels entrants depuis lui, jamais vers lui.
 *
 * FONCTIONNEMENT :
 * - `/pi/{command,status,results}` : device par défaut (déploiement mono-device)
 * - `/devices/{device_id}/…` : mêmes opérations, par device
 * - Une lecture sur un état vide n'est jamais une erreur (`null` / `{}`)
 * - Erreurs d'entrée → 400 `{accepted: false, error}`
 *
 * SÉCURITÉ :
 * - Header x-api-key exigé si FACELINK_API_KEY est défini (sauf /health)
 * - Pas de distinction de rôle : même clé pour l'UI et le device
 */

use crate::config::KernelConfig;
use crate::devices::{DeviceChannel, DeviceRegistry};
use crate::error::{ApiError, ApiResult};
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{EnqueueRequest, PollResponse, StatusRecord, StatusReport};
use crate::state::{new_state, Shared};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use serde_json::{json, Map, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tracing::{debug, info};

#[derive(Clone)]
pub struct AppState {
    pub devices: DeviceRegistry,
    pub cfg: Shared<KernelConfig>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(cfg: KernelConfig) -> Self {
        Self {
            devices: DeviceRegistry::new(cfg.default_device.clone()),
            cfg: new_state(cfg),
            health_tracker: HealthTracker::new(),
        }
    }

    fn stale_after(&self) -> Duration {
        Duration::seconds(self.cfg.lock().stale_after_secs as i64)
    }
}

#[derive(Serialize)]
struct StatusView {
    status: String,
    last_updated: Option<String>,
    details: Map<String, Value>,
    last_result: Value,
    last_seen: Option<String>,
    stale: bool,
}

#[derive(Serialize)]
struct DeviceView {
    device_id: String,
    status: String,
    last_updated: Option<String>,
    last_seen: Option<String>,
    stale: bool,
    stale_for_seconds: Option<i64>,
    pending_commands: usize,
}

fn rfc3339(ts: Option<OffsetDateTime>) -> Option<String> {
    ts.and_then(|t| t.format(&Rfc3339).ok())
}

/// (stale, âge en secondes) ; un device jamais vu est stale.
fn staleness(last_seen: Option<OffsetDateTime>, stale_after: Duration) -> (bool, Option<i64>) {
    match last_seen {
        Some(seen) => {
            let age = OffsetDateTime::now_utc() - seen;
            (age > stale_after, Some(age.whole_seconds().max(0)))
        }
        None => (true, None),
    }
}

fn to_status_view(channel: Option<&DeviceChannel>, stale_after: Duration) -> StatusView {
    let Some(channel) = channel else {
        let record = StatusRecord::default();
        return StatusView {
            status: record.status,
            last_updated: None,
            details: record.details,
            last_result: Value::Null,
            last_seen: None,
            stale: true,
        };
    };

    let record = channel.status.get_status();
    let last_seen = channel.last_seen();
    let (stale, _) = staleness(last_seen, stale_after);
    StatusView {
        status: record.status,
        last_updated: rfc3339(record.last_updated),
        details: record.details,
        last_result: channel.results.get_result().unwrap_or(Value::Null),
        last_seen: rfc3339(last_seen),
        stale,
    }
}

fn to_result_view(channel: Option<&DeviceChannel>) -> Value {
    channel
        .and_then(|c| c.results.get_result())
        .unwrap_or_else(|| json!({}))
}

fn to_device_view(channel: &DeviceChannel, stale_after: Duration) -> DeviceView {
    let record = channel.status.get_status();
    let last_seen = channel.last_seen();
    let (stale, stale_for_seconds) = staleness(last_seen, stale_after);
    DeviceView {
        device_id: channel.device_id().to_string(),
        status: record.status,
        last_updated: rfc3339(record.last_updated),
        last_seen: rfc3339(last_seen),
        stale,
        stale_for_seconds,
        pending_commands: channel.commands.len(),
    }
}

async fn require_api_key(
    State(app): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Health check toujours accessible
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let api_key = app.cfg.lock().api_key.clone();
    let Some(expected) = api_key else {
        return Ok(next.run(req).await);
    };

    let ok = req
        .headers()
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);

    if !ok {
        return Err(ApiError::Unauthorized);
    }
    Ok(next.run(req).await)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/system/health", get(get_system_health))
        .route("/pi/command", get(poll_default_command).post(enqueue_default_command))
        .route("/pi/status", get(get_default_status).post(report_default_status))
        .route("/pi/results", get(get_default_result).post(report_default_result))
        .route("/devices", get(list_devices))
        .route(
            "/devices/{device_id}/command",
            get(poll_command).post(enqueue_command),
        )
        .route(
            "/devices/{device_id}/status",
            get(get_status).post(report_status),
        )
        .route(
            "/devices/{device_id}/results",
            get(get_result).post(report_result),
        )
        .layer(middleware::from_fn_with_state(app_state.clone(), require_api_key))
        .with_state(app_state)
}

type Payload = Result<Json<Value>, JsonRejection>;

fn read_payload(payload: Payload) -> ApiResult<Value> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::InvalidPayload(e.body_text()))
}

// --- opérations communes (un canal donné) ---

fn do_enqueue(app: &AppState, channel: &DeviceChannel, payload: Payload) -> ApiResult<Json<Value>> {
    let request = EnqueueRequest::from_payload(read_payload(payload)?)?;
    let queued = channel.commands.enqueue(request.command);
    app.health_tracker.record_enqueued();

    info!(
        device_id = %channel.device_id(),
        command = %queued.command,
        command_id = %queued.id,
        "command queued"
    );

    Ok(Json(json!({
        "accepted": true,
        "command_id": queued.id,
        "enqueued_at": queued.enqueued_at_rfc3339(),
        "message": format!("Command '{}' queued", queued.command),
    })))
}

fn do_poll(app: &AppState, channel: &DeviceChannel) -> Json<PollResponse> {
    channel.touch();
    let next = channel.commands.dequeue_next();

    if let Some(queued) = &next {
        app.health_tracker.record_delivered();
        info!(
            device_id = %channel.device_id(),
            command = %queued.command,
            command_id = %queued.id,
            "command delivered"
        );
    }

    Json(PollResponse::from(next))
}

fn do_report_status(app: &AppState, channel: &DeviceChannel, payload: Payload) -> ApiResult<Json<Value>> {
    let report = StatusReport::from_payload(read_payload(payload)?)?;
    channel.touch();
    let record = channel.status.set_status(report);
    app.health_tracker.record_status_report();

    debug!(device_id = %channel.device_id(), status = %record.status, "status updated");
    Ok(Json(json!({ "accepted": true })))
}

fn do_report_result(app: &AppState, channel: &DeviceChannel, payload: Payload) -> ApiResult<Json<Value>> {
    let result = read_payload(payload)?;
    if !result.is_object() {
        return Err(ApiError::InvalidPayload("expected a JSON object".into()));
    }

    let faces = result
        .get("faces")
        .and_then(Value::as_array)
        .map(|f| f.len())
        .unwrap_or(0);
    if faces > 0 {
        info!(device_id = %channel.device_id(), faces, "device reported detections");
    }

    channel.touch();
    channel.results.set_result(result);
    app.health_tracker.record_result_report();
    Ok(Json(json!({ "accepted": true })))
}

// --- routes /pi/* (device par défaut) ---

async fn enqueue_default_command(State(app): State<AppState>, payload: Payload) -> ApiResult<Json<Value>> {
    let channel = app.devices.default_channel()?;
    do_enqueue(&app, &channel, payload)
}

async fn poll_default_command(State(app): State<AppState>) -> ApiResult<Json<PollResponse>> {
    let channel = app.devices.default_channel()?;
    Ok(do_poll(&app, &channel))
}

async fn report_default_status(State(app): State<AppState>, payload: Payload) -> ApiResult<Json<Value>> {
    let channel = app.devices.default_channel()?;
    do_report_status(&app, &channel, payload)
}

async fn get_default_status(State(app): State<AppState>) -> ApiResult<Json<StatusView>> {
    let channel = app.devices.get(app.devices.default_device())?;
    Ok(Json(to_status_view(channel.as_deref(), app.stale_after())))
}

async fn report_default_result(State(app): State<AppState>, payload: Payload) -> ApiResult<Json<Value>> {
    let channel = app.devices.default_channel()?;
    do_report_result(&app, &channel, payload)
}

async fn get_default_result(State(app): State<AppState>) -> ApiResult<Json<Value>> {
    let channel = app.devices.get(app.devices.default_device())?;
    Ok(Json(to_result_view(channel.as_deref())))
}

// --- routes /devices/{device_id}/* ---

async fn enqueue_command(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
    payload: Payload,
) -> ApiResult<Json<Value>> {
    let channel = app.devices.channel(&device_id)?;
    do_enqueue(&app, &channel, payload)
}

async fn poll_command(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<PollResponse>> {
    let channel = app.devices.channel(&device_id)?;
    Ok(do_poll(&app, &channel))
}

async fn report_status(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
    payload: Payload,
) -> ApiResult<Json<Value>> {
    let channel = app.devices.channel(&device_id)?;
    do_report_status(&app, &channel, payload)
}

async fn get_status(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<StatusView>> {
    let channel = app.devices.get(&device_id)?;
    Ok(Json(to_status_view(channel.as_deref(), app.stale_after())))
}

async fn report_result(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
    payload: Payload,
) -> ApiResult<Json<Value>> {
    let channel = app.devices.channel(&device_id)?;
    do_report_result(&app, &channel, payload)
}

async fn get_result(
    State(app): State<AppState>,
    Path(device_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let channel = app.devices.get(&device_id)?;
    Ok(Json(to_result_view(channel.as_deref())))
}

// GET /devices (liste)
async fn list_devices(State(app): State<AppState>) -> Json<Vec<DeviceView>> {
    let stale_after = app.stale_after();
    let list = app
        .devices
        .list()
        .iter()
        .map(|c| to_device_view(c, stale_after))
        .collect();
    Json(list)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health(&app.devices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request as HttpRequest, StatusCode};
    use facelink_devkit::PayloadBuilder;
    use tower::ServiceExt;

    fn test_app(api_key: Option<&str>) -> Router {
        let mut cfg = KernelConfig::default();
        cfg.api_key = api_key.map(String::from);
        build_router(AppState::new(cfg))
    }

    async fn send(
        app: &Router,
        method: Method,
        uri: &str,
        body: Option<Value>,
        api_key: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = HttpRequest::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let body = body.map(|b| Body::from(b.to_string())).unwrap_or_else(Body::empty);
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        send(app, method, uri, body, None).await
    }

    #[tokio::test]
    async fn test_enqueue_then_poll_fifo() {
        let app = test_app(None);
        for token in ["start_continuous", "single_capture", "stop"] {
            let (status, body) =
                call(&app, Method::POST, "/pi/command", Some(PayloadBuilder::command(token))).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["accepted"], true);
            assert!(body["command_id"].is_string());
            assert!(body["enqueued_at"].is_string());
        }

        let mut seen = Vec::new();
        for _ in 0..3 {
            let (_, body) = call(&app, Method::GET, "/pi/command", None).await;
            assert!(body["enqueued_at"].is_string());
            seen.push(body["command"].as_str().unwrap().to_string());
        }
        assert_eq!(seen, vec!["start_continuous", "single_capture", "stop"]);

        let (status, body) = call(&app, Method::GET, "/pi/command", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"command": null}));
    }

    #[tokio::test]
    async fn test_unknown_command_rejected_and_queue_unchanged() {
        let app = test_app(None);
        call(&app, Method::POST, "/pi/command", Some(PayloadBuilder::command("stop"))).await;

        let (status, body) =
            call(&app, Method::POST, "/pi/command", Some(PayloadBuilder::command("explode"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["accepted"], false);
        assert!(body["error"].as_str().unwrap().contains("explode"));

        let (status, _) = call(&app, Method::POST, "/pi/command", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&app, Method::GET, "/pi/command", None).await;
        assert_eq!(body["command"], "stop");
        let (_, body) = call(&app, Method::GET, "/pi/command", None).await;
        assert_eq!(body["command"], Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_json_is_rejected() {
        let app = test_app(None);
        let request = HttpRequest::builder()
            .method(Method::POST)
            .uri("/pi/status")
            .header("content-type", "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_status_report_and_fetch() {
        let app = test_app(None);

        let (_, body) = call(&app, Method::GET, "/pi/status", None).await;
        assert_eq!(body["status"], "unknown");
        assert_eq!(body["last_updated"], Value::Null);
        assert_eq!(body["last_result"], Value::Null);

        let (status, body) =
            call(&app, Method::POST, "/pi/status", Some(PayloadBuilder::status_report("capturing"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["accepted"], true);

        let (_, body) = call(&app, Method::GET, "/pi/status", None).await;
        assert_eq!(body["status"], "capturing");
        assert!(body["last_updated"].is_string());
        assert_eq!(body["stale"], false);
        assert_eq!(body["details"]["device_id"], "test-device");
    }

    #[tokio::test]
    async fn test_status_without_field_leaves_store_unchanged() {
        let app = test_app(None);
        call(&app, Method::POST, "/pi/status", Some(PayloadBuilder::status_report("idle"))).await;

        let (status, body) = call(&app, Method::POST, "/pi/status", Some(json!({"device_id": "pi"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No status provided");

        let (_, body) = call(&app, Method::GET, "/pi/status", None).await;
        assert_eq!(body["status"], "idle");
    }

    #[tokio::test]
    async fn test_status_and_result_are_independent() {
        let app = test_app(None);
        let result = PayloadBuilder::recognition_success(
            vec![PayloadBuilder::face("Alice", 91.0, [10, 60, 60, 10])],
            640,
            480,
        );

        call(&app, Method::POST, "/pi/results", Some(result.clone())).await;
        call(&app, Method::POST, "/pi/status", Some(PayloadBuilder::status_report("capturing"))).await;
        call(&app, Method::POST, "/pi/status", Some(PayloadBuilder::status_report("idle"))).await;

        let (_, body) = call(&app, Method::GET, "/pi/status", None).await;
        assert_eq!(body["status"], "idle");
        assert_eq!(body["last_result"], result);

        let (_, body) = call(&app, Method::GET, "/pi/results", None).await;
        assert_eq!(body, result);
    }

    #[tokio::test]
    async fn test_empty_result_is_empty_object() {
        let app = test_app(None);
        let (status, body) = call(&app, Method::GET, "/pi/results", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({}));

        let (status, _) = call(&app, Method::POST, "/pi/results", Some(json!([1, 2]))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_device_scoped_routes_are_isolated() {
        let app = test_app(None);
        call(
            &app,
            Method::POST,
            "/devices/front-door/command",
            Some(PayloadBuilder::command("single_capture")),
        )
        .await;

        let (_, body) = call(&app, Method::GET, "/pi/command", None).await;
        assert_eq!(body["command"], Value::Null);

        let (_, body) = call(&app, Method::GET, "/devices/front-door/command", None).await;
        assert_eq!(body["command"], "single_capture");

        let (status, _) = call(&app, Method::GET, "/devices/bad%20id/status", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, body) = call(&app, Method::GET, "/devices", None).await;
        let ids: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["device_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids, vec!["front-door", "pi"]);
    }

    #[tokio::test]
    async fn test_operator_reads_do_not_register_devices() {
        let app = test_app(None);
        for id in ["typo1", "typo2", "typo3"] {
            let (status, body) = call(&app, Method::GET, &format!("/devices/{id}/status"), None).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body["status"], "unknown");
            assert_eq!(body["last_result"], Value::Null);
            assert_eq!(body["stale"], true);

            let (_, body) = call(&app, Method::GET, &format!("/devices/{id}/results"), None).await;
            assert_eq!(body, json!({}));
        }
        call(&app, Method::GET, "/pi/status", None).await;
        call(&app, Method::GET, "/pi/results", None).await;

        let (_, body) = call(&app, Method::GET, "/devices", None).await;
        assert_eq!(body, json!([]));
        let (_, body) = call(&app, Method::GET, "/system/health", None).await;
        assert_eq!(body["devices_tracked"], 0);

        call(&app, Method::POST, "/devices/hall/command", Some(PayloadBuilder::command("stop"))).await;
        let (_, body) = call(&app, Method::GET, "/devices", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["device_id"], "hall");
    }

    #[tokio::test]
    async fn test_system_health_counts() {
        let app = test_app(None);
        call(&app, Method::POST, "/pi/command", Some(PayloadBuilder::command("stop"))).await;
        call(&app, Method::POST, "/pi/command", Some(PayloadBuilder::command("stop"))).await;
        call(&app, Method::GET, "/pi/command", None).await;

        let (_, body) = call(&app, Method::GET, "/system/health", None).await;
        assert_eq!(body["commands_enqueued"], 2);
        assert_eq!(body["commands_delivered"], 1);
        assert_eq!(body["commands_pending"], 1);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let app = test_app(Some("s3cret"));

        let (status, _) = send(&app, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, Method::GET, "/pi/command", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["accepted"], false);

        let (status, _) = send(&app, Method::GET, "/pi/command", None, Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(&app, Method::GET, "/pi/command", None, Some("s3cret")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["command"], Value::Null);
    }
}
