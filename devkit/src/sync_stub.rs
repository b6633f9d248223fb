/*!
Stub HTTP du kernel FaceLink (côté device)

Sert les routes device du kernel (`/pi/...` et `/devices/{id}/...`) : file de
commandes scriptée, enregistrement des status et résultats reçus, du header
x-api-key et des chemins appelés. Pas de validation : c'est le rôle du kernel.
*/

use crate::contract_helpers::PayloadBuilder;
use anyhow::Result;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Default)]
struct SyncState {
    commands: Mutex<VecDeque<String>>,
    status_reports: Mutex<Vec<Value>>,
    result_reports: Mutex<Vec<Value>>,
    paths: Mutex<Vec<String>>,
    api_keys: Mutex<Vec<Option<String>>>,
    failures: Mutex<VecDeque<u16>>,
    polls: AtomicUsize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SyncState {
    /// Enregistre l'appel ; renvoie un statut d'échec scripté s'il y en a un
    fn record(&self, headers: &HeaderMap, uri: &Uri) -> Option<StatusCode> {
        lock(&self.paths).push(uri.path().to_string());
        let key = headers
            .get("x-api-key")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        lock(&self.api_keys).push(key);

        lock(&self.failures)
            .pop_front()
            .map(|code| StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR))
    }
}

/// Kernel factice pour les tests de l'agent (arrêté au drop)
pub struct SyncStub {
    addr: SocketAddr,
    state: Arc<SyncState>,
    handle: JoinHandle<()>,
}

impl SyncStub {
    pub async fn start() -> Result<Self> {
        let state = Arc::new(SyncState::default());

        let app = Router::new()
            .route("/pi/command", get(poll_command))
            .route("/pi/status", axum::routing::post(report_status))
            .route("/pi/results", axum::routing::post(report_result))
            .route("/devices/{device_id}/command", get(poll_command))
            .route("/devices/{device_id}/status", axum::routing::post(report_status))
            .route("/devices/{device_id}/results", axum::routing::post(report_result))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("sync stub stopped: {}", e);
            }
        });

        log::info!("🧪 Sync stub listening on {}", addr);
        Ok(Self { addr, state, handle })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Ajoute une commande en queue de file
    pub fn queue_command(&self, token: &str) {
        lock(&self.state.commands).push_back(token.to_string());
    }

    /// Les prochains appels (quels qu'ils soient) échouent avec ce statut
    pub fn fail_next(&self, status: u16) {
        lock(&self.state.failures).push_back(status);
    }

    pub fn pending_commands(&self) -> usize {
        lock(&self.state.commands).len()
    }

    pub fn polls(&self) -> usize {
        self.state.polls.load(Ordering::SeqCst)
    }

    pub fn status_reports(&self) -> Vec<Value> {
        lock(&self.state.status_reports).clone()
    }

    /// Valeurs du champ `status` reçues, dans l'ordre
    pub fn statuses(&self) -> Vec<String> {
        self.status_reports()
            .iter()
            .filter_map(|r| r.get("status").and_then(Value::as_str).map(String::from))
            .collect()
    }

    pub fn result_reports(&self) -> Vec<Value> {
        lock(&self.state.result_reports).clone()
    }

    pub fn paths(&self) -> Vec<String> {
        lock(&self.state.paths).clone()
    }

    pub fn last_api_key(&self) -> Option<String> {
        lock(&self.state.api_keys).last().cloned().flatten()
    }
}

impl Drop for SyncStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn poll_command(State(state): State<Arc<SyncState>>, headers: HeaderMap, uri: Uri) -> Response {
    if let Some(status) = state.record(&headers, &uri) {
        return (status, "scripted failure").into_response();
    }
    state.polls.fetch_add(1, Ordering::SeqCst);

    let next = lock(&state.commands).pop_front();
    Json(PayloadBuilder::poll(next.as_deref())).into_response()
}

async fn report_status(
    State(state): State<Arc<SyncState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(body): Json<Value>,
) -> Response {
    if let Some(status) = state.record(&headers, &uri) {
        return (status, "scripted failure").into_response();
    }
    lock(&state.status_reports).push(body);
    Json(json!({ "accepted": true })).into_response()
}

async fn report_result(
    State(state): State<Arc<SyncState>>,
    headers: HeaderMap,
    uri: Uri,
    Json(body): Json<Value>,
) -> Response {
    if let Some(status) = state.record(&headers, &uri) {
        return (status, "scripted failure").into_response();
    }
    lock(&state.result_reports).push(body);
    Json(json!({ "accepted": true })).into_response()
}
