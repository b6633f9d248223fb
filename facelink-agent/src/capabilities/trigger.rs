use crate::config::TriggerConfig;
use crate::execution::{run_program, ExecutionError};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TriggerError {
    #[error("trigger wait failed: {0}")]
    Execution(#[from] ExecutionError),
}

#[async_trait]
pub trait TriggerInput: Send + Sync {
    /// Block until the trigger fires once
    async fn wait_for_trigger(&self) -> Result<(), TriggerError>;
}

/// Waits by running a program that exits successfully on one edge.
/// No timeout: the wait ends with the edge or when the future is dropped.
pub struct CommandTrigger {
    command: Vec<String>,
}

impl CommandTrigger {
    /// `None` when no trigger program is configured
    pub fn from_config(config: &TriggerConfig) -> Option<Self> {
        if config.command.is_empty() {
            return None;
        }
        Some(Self {
            command: config.command.clone(),
        })
    }
}

#[async_trait]
impl TriggerInput for CommandTrigger {
    async fn wait_for_trigger(&self) -> Result<(), TriggerError> {
        run_program(&self.command, None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_command_disables_trigger() {
        assert!(CommandTrigger::from_config(&TriggerConfig::default()).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_fires_on_success_exit() {
        let trigger = CommandTrigger::from_config(&TriggerConfig {
            command: vec!["true".to_string()],
        })
        .unwrap();
        assert!(trigger.wait_for_trigger().await.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trigger_failure() {
        let trigger = CommandTrigger::from_config(&TriggerConfig {
            command: vec!["false".to_string()],
        })
        .unwrap();
        assert!(trigger.wait_for_trigger().await.is_err());
    }
}
