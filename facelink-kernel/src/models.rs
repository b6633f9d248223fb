/**
 * MODÈLES - Commandes opérateur et payloads reçus des devices
 *
 * RÔLE : Vocabulaire fermé des commandes + validation des payloads entrants
 * (enqueue opérateur, report de status device). Les résultats de reconnaissance
 * ne sont pas modélisés ici : le kernel les relaie tels quels.
 */

use crate::error::ApiError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// Intention opérateur livrée au device au prochain poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    SingleCapture,
    TriggerMode,
    StartContinuous,
    Stop,
}

impl Command {
    pub const ALL: [Command; 4] = [
        Command::SingleCapture,
        Command::TriggerMode,
        Command::StartContinuous,
        Command::Stop,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::SingleCapture => "single_capture",
            Command::TriggerMode => "trigger_mode",
            Command::StartContinuous => "start_continuous",
            Command::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown command '{0}'")]
pub struct UnknownCommand(pub String);

impl FromStr for Command {
    type Err = UnknownCommand;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Command::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| UnknownCommand(s.to_string()))
    }
}

/// Commande en file, avec un id pour corréler les logs opérateur/device.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub id: Uuid,
    pub command: Command,
    pub enqueued_at: OffsetDateTime,
}

impl QueuedCommand {
    pub fn new(command: Command) -> Self {
        Self {
            id: Uuid::new_v4(),
            command,
            enqueued_at: OffsetDateTime::now_utc(),
        }
    }

    /// Horodatage d'enqueue en RFC 3339 (renvoyé à l'enqueue et à la livraison).
    pub fn enqueued_at_rfc3339(&self) -> Option<String> {
        self.enqueued_at.format(&Rfc3339).ok()
    }
}

/// Dernier status connu d'un device (last-writer-wins).
#[derive(Debug, Clone)]
pub struct StatusRecord {
    pub status: String,
    pub last_updated: Option<OffsetDateTime>,
    pub details: Map<String, Value>,
}

impl Default for StatusRecord {
    fn default() -> Self {
        Self {
            status: "unknown".to_string(),
            last_updated: None,
            details: Map::new(),
        }
    }
}

/// Body de `POST …/command` : `{ "command": "<token>" }`.
#[derive(Debug)]
pub struct EnqueueRequest {
    pub command: Command,
}

impl EnqueueRequest {
    pub fn from_payload(payload: Value) -> Result<Self, ApiError> {
        let Value::Object(mut body) = payload else {
            return Err(ApiError::InvalidPayload("expected a JSON object".into()));
        };

        let token = match body.remove("command") {
            Some(Value::String(s)) if !s.trim().is_empty() => s,
            Some(Value::Null) | None => return Err(ApiError::MissingField("command")),
            Some(Value::String(_)) => return Err(ApiError::MissingField("command")),
            Some(other) => return Err(ApiError::UnknownCommand(other.to_string())),
        };

        let command = token.parse::<Command>()?;
        Ok(Self { command })
    }
}

/// Body de `POST …/status` : `{ "status": "<token>", ...extra }`.
/// Les champs en plus de `status` sont gardés tels quels dans `details`.
#[derive(Debug)]
pub struct StatusReport {
    pub status: String,
    pub details: Map<String, Value>,
}

impl StatusReport {
    pub fn from_payload(payload: Value) -> Result<Self, ApiError> {
        let Value::Object(mut body) = payload else {
            return Err(ApiError::InvalidPayload("expected a JSON object".into()));
        };

        match body.remove("status") {
            Some(Value::String(status)) if !status.trim().is_empty() => Ok(Self {
                status: status.trim().to_string(),
                details: body,
            }),
            _ => Err(ApiError::MissingField("status")),
        }
    }
}

/// Réponse de `GET …/command`.
#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub command: Option<Command>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<String>,
}

impl From<Option<QueuedCommand>> for PollResponse {
    fn from(next: Option<QueuedCommand>) -> Self {
        match next {
            Some(queued) => Self {
                command: Some(queued.command),
                command_id: Some(queued.id),
                enqueued_at: queued.enqueued_at_rfc3339(),
            },
            None => Self {
                command: None,
                command_id: None,
                enqueued_at: None,
            },
        }
    }
}
