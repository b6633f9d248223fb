//! Client for the external recognition capability
//!
//! - `GET /health` pre-flight probe
//! - `POST /recognize` with the frame as multipart field `image`
//!
//! Network failures, timeouts and 5xx are retried by [`RetryPolicy`];
//! 4xx, `success: false` and undecodable bodies are terminal.

mod retry;

pub use retry::RetryPolicy;

use crate::config::RecognitionConfig;
use crate::protocol::{HealthReport, RecognitionResponse, RecognitionResult};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RecognitionError {
    #[error("recognition service unreachable: {0}")]
    Network(#[source] reqwest::Error),
    #[error("recognition service error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("recognition request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("recognition failed: {0}")]
    Failed(String),
    #[error("undecodable recognition response: {0}")]
    Undecodable(String),
    #[error("recognition service unhealthy: {0}")]
    Unhealthy(String),
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        last: Box<RecognitionError>,
    },
}

impl RecognitionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Server { .. })
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn check_health(&self) -> Result<HealthReport, RecognitionError>;
    async fn recognize(&self, image: Vec<u8>) -> Result<RecognitionResult, RecognitionError>;
}

pub struct RecognitionClient {
    http: Client,
    base_url: String,
    recognize_timeout: Duration,
    health_timeout: Duration,
    policy: RetryPolicy,
}

impl RecognitionClient {
    pub fn new(config: &RecognitionConfig) -> Result<Self, RecognitionError> {
        let http = Client::builder()
            .user_agent(concat!("FaceLink-Agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(RecognitionError::Network)?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            recognize_timeout: Duration::from_secs(config.timeout_secs.max(1)),
            health_timeout: Duration::from_secs(config.health_timeout_secs.max(1)),
            policy: RetryPolicy {
                max_attempts: config.max_attempts,
                delay: Duration::from_secs(config.retry_delay_secs),
            },
        })
    }

    #[cfg(test)]
    pub fn with_timeouts(mut self, recognize: Duration, health: Duration) -> Self {
        self.recognize_timeout = recognize;
        self.health_timeout = health;
        self
    }

    #[cfg(test)]
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn health_once(&self) -> Result<HealthReport, RecognitionError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .timeout(self.health_timeout)
            .send()
            .await
            .map_err(RecognitionError::Network)?;
        let status = response.status();
        let body = response.text().await.map_err(RecognitionError::Network)?;
        let report = serde_json::from_str::<HealthReport>(&body);

        if status.is_server_error() {
            // an explicit unhealthy report is final, a bare 5xx is not
            return Err(match report {
                Ok(report) if !report.is_healthy() => RecognitionError::Unhealthy(unhealthy_reason(&report)),
                _ => RecognitionError::Server {
                    status: status.as_u16(),
                    message: error_message(&body),
                },
            });
        }
        if !status.is_success() {
            return Err(RecognitionError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let report = report.map_err(|e| RecognitionError::Undecodable(e.to_string()))?;
        if !report.is_healthy() {
            return Err(RecognitionError::Unhealthy(unhealthy_reason(&report)));
        }
        Ok(report)
    }

    async fn recognize_once(&self, image: &[u8]) -> Result<RecognitionResult, RecognitionError> {
        let part = Part::bytes(image.to_vec())
            .file_name("capture.jpg")
            .mime_str("image/jpeg")
            .map_err(RecognitionError::Network)?;
        let form = Form::new().part("image", part);

        let response = self
            .http
            .post(format!("{}/recognize", self.base_url))
            .timeout(self.recognize_timeout)
            .multipart(form)
            .send()
            .await
            .map_err(RecognitionError::Network)?;
        let status = response.status();
        let body = response.text().await.map_err(RecognitionError::Network)?;

        if status.is_server_error() {
            return Err(RecognitionError::Server {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }
        if !status.is_success() {
            return Err(RecognitionError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let parsed: RecognitionResponse =
            serde_json::from_str(&body).map_err(|e| RecognitionError::Undecodable(e.to_string()))?;
        if !parsed.success {
            return Err(RecognitionError::Failed(
                parsed.error.unwrap_or_else(|| "service reported failure".to_string()),
            ));
        }

        let result = RecognitionResult::new(parsed.faces, parsed.image_size);
        debug!(faces = result.total_faces, "Recognition completed");
        Ok(result)
    }
}

#[async_trait]
impl Recognizer for RecognitionClient {
    async fn check_health(&self) -> Result<HealthReport, RecognitionError> {
        self.policy.run("health", |_| self.health_once()).await
    }

    async fn recognize(&self, image: Vec<u8>) -> Result<RecognitionResult, RecognitionError> {
        let image = image.as_slice();
        self.policy.run("recognize", |_| self.recognize_once(image)).await
    }
}

fn unhealthy_reason(report: &HealthReport) -> String {
    report.error.clone().unwrap_or_else(|| report.status.clone())
}

/// `error` field of a JSON body, or the body itself
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use facelink_devkit::{PayloadBuilder, RecognitionStub, StubReply};
    use serde_json::json;

    const FRAME: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];

    fn client(url: &str) -> RecognitionClient {
        let config = RecognitionConfig {
            base_url: url.to_string(),
            ..RecognitionConfig::default()
        };
        RecognitionClient::new(&config)
            .unwrap()
            .with_timeouts(Duration::from_millis(300), Duration::from_millis(300))
            .with_policy(RetryPolicy {
                max_attempts: 3,
                delay: Duration::from_millis(10),
            })
    }

    #[tokio::test]
    async fn test_recognize_success() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.respond_with(StubReply::json(PayloadBuilder::recognition_success(
            vec![
                PayloadBuilder::face("Alice", 91.0, [10, 700, 60, 10]),
                PayloadBuilder::face("Bob", 0.0, [0, 20, 20, 0]),
            ],
            640,
            480,
        )));

        let result = client(&stub.url()).recognize(FRAME.to_vec()).await.unwrap();

        assert_eq!(result.total_faces, 2);
        assert_eq!(result.faces[0].name, "Alice");
        assert_eq!(result.faces[0].location.right, 640);
        assert!(result.faces[1].is_unknown());

        let uploads = stub.uploads();
        assert_eq!(uploads.len(), 1);
        assert!(uploads[0].content_type.starts_with("multipart/form-data"));
        assert!(uploads[0].has_field("image"));
    }

    #[tokio::test]
    async fn test_timeout_retried_up_to_cap() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.respond_with(StubReply::json(PayloadBuilder::recognition_success(vec![], 1, 1)).delayed(Duration::from_secs(2)));

        let err = client(&stub.url()).recognize(FRAME.to_vec()).await.unwrap_err();

        assert!(matches!(err, RecognitionError::Exhausted { attempts: 3, .. }));
        assert_eq!(stub.recognize_calls(), 3);
    }

    #[tokio::test]
    async fn test_client_error_tried_once() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.respond_with(StubReply::with_status(400, PayloadBuilder::recognition_failure("No image provided")));

        let err = client(&stub.url()).recognize(FRAME.to_vec()).await.unwrap_err();

        match err {
            RecognitionError::Rejected { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "No image provided");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(stub.recognize_calls(), 1);
    }

    #[tokio::test]
    async fn test_server_error_then_success() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.push_reply(StubReply::with_status(500, json!({"success": false, "error": "oom"})));

        let result = client(&stub.url()).recognize(FRAME.to_vec()).await.unwrap();

        assert_eq!(result.total_faces, 0);
        assert_eq!(stub.recognize_calls(), 2);
    }

    #[tokio::test]
    async fn test_semantic_failure_is_terminal() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.respond_with(StubReply::json(PayloadBuilder::recognition_failure("cannot decode image")));

        let err = client(&stub.url()).recognize(FRAME.to_vec()).await.unwrap_err();

        assert!(matches!(err, RecognitionError::Failed(ref m) if m == "cannot decode image"));
        assert_eq!(stub.recognize_calls(), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_is_terminal() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.respond_with(StubReply::text(200, "<html>proxy</html>"));

        let err = client(&stub.url()).recognize(FRAME.to_vec()).await.unwrap_err();

        assert!(matches!(err, RecognitionError::Undecodable(_)));
        assert_eq!(stub.recognize_calls(), 1);
    }

    #[tokio::test]
    async fn test_health_ok() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.set_health(StubReply::json(PayloadBuilder::health(&["Alice", "Bob"])));

        let report = client(&stub.url()).check_health().await.unwrap();

        assert_eq!(report.known_people.len(), 2);
        assert_eq!(report.faces_loaded, 6);
    }

    #[tokio::test]
    async fn test_unhealthy_report_not_retried() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.set_health(StubReply::with_status(500, PayloadBuilder::unhealthy("Encodings not loaded")));

        let err = client(&stub.url()).check_health().await.unwrap_err();

        assert!(matches!(err, RecognitionError::Unhealthy(ref m) if m == "Encodings not loaded"));
        assert_eq!(stub.health_calls(), 1);
    }

    #[tokio::test]
    async fn test_bare_5xx_health_is_retried() {
        let stub = RecognitionStub::start().await.unwrap();
        stub.push_health(StubReply::text(502, "bad gateway"));

        assert!(client(&stub.url()).check_health().await.is_ok());
        assert_eq!(stub.health_calls(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_is_exhausted() {
        let err = client("http://127.0.0.1:1").check_health().await.unwrap_err();
        match err {
            RecognitionError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, RecognitionError::Network(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
