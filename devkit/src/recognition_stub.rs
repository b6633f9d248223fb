/*!
Stub HTTP de la capability de reconnaissance

Sert `POST /recognize` et `GET /health` sur un port éphémère, avec des réponses
scriptées (statut, corps, délai) et l'enregistrement des uploads reçus.
Permet de tester le client de reconnaissance sans le service réel.
*/

use crate::contract_helpers::PayloadBuilder;
use anyhow::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub enum StubBody {
    Json(Value),
    Text(String),
}

/// Réponse scriptée : statut HTTP, corps, délai avant réponse
#[derive(Debug, Clone)]
pub struct StubReply {
    pub status: u16,
    pub body: StubBody,
    pub delay: Duration,
}

impl StubReply {
    pub fn json(body: Value) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: Value) -> Self {
        Self {
            status,
            body: StubBody::Json(body),
            delay: Duration::ZERO,
        }
    }

    /// Corps non-JSON (réponse indécodable)
    pub fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            body: StubBody::Text(body.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn render(self) -> Response {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        match self.body {
            StubBody::Json(body) => (status, Json(body)).into_response(),
            StubBody::Text(body) => (status, body).into_response(),
        }
    }
}

/// Upload reçu sur `/recognize`
#[derive(Debug, Clone)]
pub struct RecordedUpload {
    pub content_type: String,
    pub body: Vec<u8>,
}

impl RecordedUpload {
    /// Vrai si le multipart contient le champ `name`
    pub fn has_field(&self, name: &str) -> bool {
        let needle = format!("name=\"{name}\"");
        String::from_utf8_lossy(&self.body).contains(&needle)
    }
}

#[derive(Debug)]
struct StubState {
    recognize_plan: Mutex<VecDeque<StubReply>>,
    recognize_default: Mutex<StubReply>,
    health_plan: Mutex<VecDeque<StubReply>>,
    health_default: Mutex<StubReply>,
    recognize_calls: AtomicUsize,
    health_calls: AtomicUsize,
    uploads: Mutex<Vec<RecordedUpload>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_reply(plan: &Mutex<VecDeque<StubReply>>, default: &Mutex<StubReply>) -> StubReply {
    lock(plan).pop_front().unwrap_or_else(|| lock(default).clone())
}

/// Serveur de reconnaissance factice (arrêté au drop)
pub struct RecognitionStub {
    addr: SocketAddr,
    state: Arc<StubState>,
    handle: JoinHandle<()>,
}

impl RecognitionStub {
    /// Démarre le stub : santé OK, aucune détection par défaut
    pub async fn start() -> Result<Self> {
        let state = Arc::new(StubState {
            recognize_plan: Mutex::new(VecDeque::new()),
            recognize_default: Mutex::new(StubReply::json(PayloadBuilder::recognition_success(
                vec![],
                640,
                480,
            ))),
            health_plan: Mutex::new(VecDeque::new()),
            health_default: Mutex::new(StubReply::json(PayloadBuilder::health(&["Alice"]))),
            recognize_calls: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            uploads: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/recognize", post(recognize))
            .route("/health", get(health))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                log::error!("recognition stub stopped: {}", e);
            }
        });

        log::info!("🧪 Recognition stub listening on {}", addr);
        Ok(Self { addr, state, handle })
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Réponse par défaut de `/recognize`
    pub fn respond_with(&self, reply: StubReply) {
        *lock(&self.state.recognize_default) = reply;
    }

    /// Réponse ponctuelle de `/recognize`, servie avant la réponse par défaut
    pub fn push_reply(&self, reply: StubReply) {
        lock(&self.state.recognize_plan).push_back(reply);
    }

    pub fn set_health(&self, reply: StubReply) {
        *lock(&self.state.health_default) = reply;
    }

    pub fn push_health(&self, reply: StubReply) {
        lock(&self.state.health_plan).push_back(reply);
    }

    pub fn recognize_calls(&self) -> usize {
        self.state.recognize_calls.load(Ordering::SeqCst)
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        lock(&self.state.uploads).clone()
    }
}

impl Drop for RecognitionStub {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn recognize(State(state): State<Arc<StubState>>, headers: HeaderMap, body: Bytes) -> Response {
    state.recognize_calls.fetch_add(1, Ordering::SeqCst);

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    lock(&state.uploads).push(RecordedUpload {
        content_type,
        body: body.to_vec(),
    });

    next_reply(&state.recognize_plan, &state.recognize_default).render().await
}

async fn health(State(state): State<Arc<StubState>>) -> Response {
    state.health_calls.fetch_add(1, Ordering::SeqCst);
    next_reply(&state.health_plan, &state.health_default).render().await
}
