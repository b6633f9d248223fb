use crate::config::CameraConfig;
use crate::execution::{expand_args, run_program, ExecutionError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

const JPEG_MAGIC: [u8; 2] = [0xFF, 0xD8];

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    Unavailable(String),
    #[error("frame capture failed: {0}")]
    Frame(String),
}

#[async_trait]
pub trait CameraSource: Send + Sync {
    /// One JPEG-encoded frame
    async fn grab_frame(&self) -> Result<Vec<u8>, CameraError>;
}

/// Grabs a frame by running a program that writes JPEG bytes to stdout
pub struct CommandCamera {
    command: Vec<String>,
    device: String,
    timeout: Duration,
}

impl CommandCamera {
    pub fn from_config(config: &CameraConfig) -> Self {
        Self {
            command: config.command.clone(),
            device: config.device.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }
}

#[async_trait]
impl CameraSource for CommandCamera {
    async fn grab_frame(&self) -> Result<Vec<u8>, CameraError> {
        if self.device.starts_with('/') && !Path::new(&self.device).exists() {
            return Err(CameraError::Unavailable(format!("{} does not exist", self.device)));
        }

        let argv = expand_args(&self.command, "{device}", &self.device, false);
        let output = run_program(&argv, Some(self.timeout)).await.map_err(|e| match e {
            ExecutionError::EmptyCommand | ExecutionError::Spawn { .. } => CameraError::Unavailable(e.to_string()),
            ExecutionError::TimedOut { .. } | ExecutionError::Failed { .. } => CameraError::Frame(e.to_string()),
        })?;

        if output.stdout.is_empty() {
            return Err(CameraError::Frame("empty frame".to_string()));
        }
        if !output.stdout.starts_with(&JPEG_MAGIC) {
            return Err(CameraError::Frame("output is not a JPEG image".to_string()));
        }

        debug!(bytes = output.stdout.len(), ms = output.execution_time_ms, "Frame captured");
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(command: &[&str], device: &str) -> CommandCamera {
        CommandCamera::from_config(&CameraConfig {
            command: command.iter().map(|s| s.to_string()).collect(),
            device: device.to_string(),
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_missing_device_is_unavailable() {
        let err = camera(&["true"], "/dev/facelink-no-such-video").grab_frame().await.unwrap_err();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_unavailable() {
        let err = camera(&["facelink-no-such-grabber"], "0").grab_frame().await.unwrap_err();
        assert!(matches!(err, CameraError::Unavailable(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_grab_is_frame_error() {
        let err = camera(&["sh", "-c", "exit 1"], "0").grab_frame().await.unwrap_err();
        assert!(matches!(err, CameraError::Frame(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_jpeg_output_rejected() {
        let err = camera(&["echo", "{device}"], "0").grab_frame().await.unwrap_err();
        assert!(matches!(err, CameraError::Frame(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_jpeg_frame_returned() {
        let frame = camera(&["printf", "\\377\\330\\377\\340"], "0").grab_frame().await.unwrap();
        assert_eq!(&frame[..2], &JPEG_MAGIC);
    }
}
