use crate::config::SpeechConfig;
use crate::execution::{expand_args, run_program, ExecutionError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("speech failed: {0}")]
    Execution(#[from] ExecutionError),
}

#[async_trait]
pub trait Speaker: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;
}

/// Speaks through a text-to-speech program
pub struct CommandSpeaker {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandSpeaker {
    pub fn from_config(config: &SpeechConfig) -> Self {
        Self {
            command: config.command.clone(),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
        }
    }
}

#[async_trait]
impl Speaker for CommandSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let argv = expand_args(&self.command, "{text}", text, true);
        run_program(&argv, Some(self.timeout)).await?;
        Ok(())
    }
}

/// Logs announcements instead of speaking them
pub struct SilentSpeaker;

#[async_trait]
impl Speaker for SilentSpeaker {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        info!(announcement = %text, "Speech disabled");
        Ok(())
    }
}
