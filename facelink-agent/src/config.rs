//! Agent configuration
//!
//! Handles:
//! - Sync service and recognition capability endpoints
//! - Control loop timing (tick, continuous interval, threshold)
//! - External programs for camera, speech and trigger
//!
//! Loaded from TOML, then overridden by environment variables.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub sync: SyncConfig,
    pub recognition: RecognitionConfig,
    pub control: ControlConfig,
    pub camera: CameraConfig,
    pub speech: SpeechConfig,
    pub trigger: TriggerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub base_url: String,
    /// `None` uses the kernel's `/pi/*` routes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    pub timeout_secs: u64,
    #[serde(skip)] // Never serialize the shared key
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub health_timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub tick_millis: u64,
    pub continuous_interval_secs: u64,
    pub confidence_threshold: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Program writing one JPEG frame to stdout; `{device}` is substituted
    pub command: Vec<String>,
    pub device: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    /// `{text}` is substituted, or the text is appended as last argument
    pub command: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TriggerConfig {
    /// Program blocking until one edge; empty disables trigger mode
    pub command: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            device_id: None,
            timeout_secs: 10,
            api_key: None,
        }
    }
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: 30,
            health_timeout_secs: 5,
            max_attempts: 3,
            retry_delay_secs: 2,
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            tick_millis: 1000,
            continuous_interval_secs: 15,
            confidence_threshold: 50.0,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            command: ["ffmpeg", "-loglevel", "error", "-f", "v4l2", "-i", "{device}", "-frames:v", "1", "-f", "mjpeg", "-"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            device: "/dev/video0".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec!["espeak".to_string(), "{text}".to_string()],
            timeout_secs: 30,
        }
    }
}

impl AgentConfig {
    /// Load config from `$FACELINK_AGENT_CONFIG` or the OS config dir, then apply env overrides
    pub async fn load() -> Result<Self> {
        let config_path = match std::env::var("FACELINK_AGENT_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => Self::config_file_path()?,
        };

        let mut config = Self::load_from(&config_path).await?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Read a TOML file; a missing file yields the defaults
    pub async fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(config_path)
            .await
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        Self::from_toml(&content).with_context(|| format!("Invalid config {}", config_path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;

        path.push("facelink-agent");
        path.push("config.toml");
        Ok(path)
    }

    /// `API_URL` sets both endpoints; the specific variables win over it.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("API_URL") {
            self.sync.base_url = url.clone();
            self.recognition.base_url = url;
        }
        if let Some(url) = lookup("FACELINK_SYNC_URL") {
            self.sync.base_url = url;
        }
        if let Some(url) = lookup("FACELINK_RECOGNITION_URL") {
            self.recognition.base_url = url;
        }
        if let Some(id) = lookup("FACELINK_DEVICE_ID") {
            self.sync.device_id = Some(id).filter(|id| !id.trim().is_empty());
        }
        if let Some(key) = lookup("FACELINK_API_KEY") {
            self.sync.api_key = Some(key).filter(|k| !k.trim().is_empty());
        }

        self.control.continuous_interval_secs = env_parse(
            &lookup,
            "FACELINK_CONTINUOUS_INTERVAL_SECS",
            self.control.continuous_interval_secs,
        );
        self.control.confidence_threshold = env_parse(
            &lookup,
            "FACELINK_CONFIDENCE_THRESHOLD",
            self.control.confidence_threshold,
        );
        self.control.tick_millis = env_parse(&lookup, "FACELINK_TICK_MILLIS", self.control.tick_millis);
        self.recognition.max_attempts =
            env_parse(&lookup, "FACELINK_MAX_ATTEMPTS", self.recognition.max_attempts);
        self.recognition.retry_delay_secs = env_parse(
            &lookup,
            "FACELINK_RETRY_DELAY_SECS",
            self.recognition.retry_delay_secs,
        );
    }

    /// Label sent with every status report
    pub fn device_label(&self) -> String {
        self.sync.device_id.clone().unwrap_or_else(|| {
            hostname::get()
                .map(|h| h.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "unknown".to_string())
        })
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.control.tick_millis.max(1))
    }

    pub fn continuous_interval(&self) -> Duration {
        Duration::from_secs(self.control.continuous_interval_secs)
    }
}

fn env_parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
