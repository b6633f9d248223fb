//! Device side of the sync service
//!
//! The device is behind NAT: it only ever calls out. Each call carries the
//! client timeout; a failed call is reported to the caller and never retried here.

use crate::config::SyncConfig;
use crate::protocol::{Command, PollResponse, PolledCommand, ResultReport, StatusReport};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("sync request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("sync service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unknown command '{0}'")]
    UnknownCommand(String),
}

#[async_trait]
pub trait SyncPort: Send + Sync {
    /// Next pending command, `None` when the queue is empty
    async fn poll_command(&self) -> Result<Option<PolledCommand>, SyncError>;
    async fn report_status(&self, report: &StatusReport) -> Result<(), SyncError>;
    async fn report_result(&self, report: &ResultReport) -> Result<(), SyncError>;
}

pub struct SyncClient {
    http: Client,
    /// `{base}/pi` or `{base}/devices/{id}`
    prefix: String,
    api_key: Option<String>,
}

impl SyncClient {
    pub fn new(config: &SyncConfig) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .user_agent(concat!("FaceLink-Agent/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base = config.base_url.trim_end_matches('/');
        let prefix = match &config.device_id {
            Some(id) => format!("{base}/devices/{id}"),
            None => format!("{base}/pi"),
        };

        Ok(Self {
            http,
            prefix,
            api_key: config.api_key.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.http.request(method, format!("{}/{}", self.prefix, path));
        match &self.api_key {
            Some(key) => builder.header("x-api-key", key),
            None => builder,
        }
    }

    async fn check(response: Response) -> Result<Response, SyncError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(SyncError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl SyncPort for SyncClient {
    async fn poll_command(&self) -> Result<Option<PolledCommand>, SyncError> {
        let response = Self::check(self.request(Method::GET, "command").send().await?).await?;
        let poll: PollResponse = response.json().await?;

        let Some(token) = poll.command else {
            return Ok(None);
        };
        let command = Command::parse(&token).ok_or(SyncError::UnknownCommand(token))?;
        Ok(Some(PolledCommand {
            command,
            command_id: poll.command_id,
        }))
    }

    async fn report_status(&self, report: &StatusReport) -> Result<(), SyncError> {
        Self::check(self.request(Method::POST, "status").json(report).send().await?).await?;
        debug!(status = %report.status, "Status reported");
        Ok(())
    }

    async fn report_result(&self, report: &ResultReport) -> Result<(), SyncError> {
        Self::check(self.request(Method::POST, "results").json(report).send().await?).await?;
        debug!(faces = report.total_faces, success = report.success, "Result reported");
        Ok(())
    }
}
