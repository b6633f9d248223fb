//! Wire types shared with the sync service and the recognition capability
//!
//! Detections are normalized on receipt: confidence clamped to [0, 100],
//! zero confidence or a missing name becomes [`UNKNOWN`], box coordinates
//! are rounded to non-negative pixels and clamped inside the image when its
//! size is known.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity label for an unmatched face
pub const UNKNOWN: &str = "Unknown";

/// Device state as reported to the sync service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Idle,
    Capturing,
    ContinuousRunning,
    WaitingForTrigger,
    ErrorCamera,
    ErrorFrame,
    ErrorRecognition,
    Offline,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Capturing => "capturing",
            Self::ContinuousRunning => "continuous_running",
            Self::WaitingForTrigger => "waiting_for_trigger",
            Self::ErrorCamera => "error_camera",
            Self::ErrorFrame => "error_frame",
            Self::ErrorRecognition => "error_recognition",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operator intent delivered by a poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SingleCapture,
    TriggerMode,
    StartContinuous,
    Stop,
}

impl Command {
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "single_capture" => Some(Self::SingleCapture),
            "trigger_mode" => Some(Self::TriggerMode),
            "start_continuous" => Some(Self::StartContinuous),
            "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SingleCapture => "single_capture",
            Self::TriggerMode => "trigger_mode",
            Self::StartContinuous => "start_continuous",
            Self::Stop => "stop",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `GET …/command`
#[derive(Debug, Deserialize)]
pub struct PollResponse {
    pub command: Option<String>,
    #[serde(default)]
    pub command_id: Option<String>,
}

/// A command taken off the device's queue
#[derive(Debug, Clone, PartialEq)]
pub struct PolledCommand {
    pub command: Command,
    pub command_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

/// Face box in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    #[serde(default)]
    pub top: u32,
    #[serde(default)]
    pub right: u32,
    #[serde(default)]
    pub bottom: u32,
    #[serde(default)]
    pub left: u32,
}

impl BoundingBox {
    pub fn clamp_to(&mut self, size: ImageSize) {
        if self.left > self.right {
            std::mem::swap(&mut self.left, &mut self.right);
        }
        if self.top > self.bottom {
            std::mem::swap(&mut self.top, &mut self.bottom);
        }
        self.left = self.left.min(size.width);
        self.right = self.right.min(size.width);
        self.top = self.top.min(size.height);
        self.bottom = self.bottom.min(size.height);
    }
}

/// Box as sent by the recognition service: may be fractional, negative or null
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawBox {
    top: Option<f64>,
    right: Option<f64>,
    bottom: Option<f64>,
    left: Option<f64>,
}

fn pixel(value: Option<f64>) -> u32 {
    match value {
        Some(v) if v.is_finite() => v.round().clamp(0.0, u32::MAX as f64) as u32,
        _ => 0,
    }
}

impl From<RawBox> for BoundingBox {
    fn from(raw: RawBox) -> Self {
        Self {
            top: pixel(raw.top),
            right: pixel(raw.right),
            bottom: pixel(raw.bottom),
            left: pixel(raw.left),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    name: Option<String>,
    confidence: Option<f64>,
    location: Option<RawBox>,
}

/// One detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawDetection")]
pub struct Detection {
    pub name: String,
    pub confidence: f64,
    pub location: BoundingBox,
}

impl From<RawDetection> for Detection {
    fn from(raw: RawDetection) -> Self {
        let location = raw.location.map(BoundingBox::from).unwrap_or_default();
        Detection::new(raw.name.as_deref().unwrap_or(""), raw.confidence.unwrap_or(0.0), location)
    }
}

impl Detection {
    pub fn new(name: &str, confidence: f64, location: BoundingBox) -> Self {
        let confidence = if confidence.is_finite() {
            confidence.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let name = name.trim();
        let name = if confidence == 0.0 || name.is_empty() {
            UNKNOWN.to_string()
        } else {
            name.to_string()
        };
        Self {
            name,
            confidence,
            location,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN
    }
}

/// Body of `POST /recognize`
#[derive(Debug, Deserialize)]
pub struct RecognitionResponse {
    pub success: bool,
    #[serde(default)]
    pub faces: Vec<Detection>,
    #[serde(default)]
    pub image_size: Option<ImageSize>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Detections for one capture
#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionResult {
    pub faces: Vec<Detection>,
    pub total_faces: usize,
    pub image_size: Option<ImageSize>,
}

impl RecognitionResult {
    pub fn new(mut faces: Vec<Detection>, image_size: Option<ImageSize>) -> Self {
        if let Some(size) = image_size {
            for face in &mut faces {
                face.location.clamp_to(size);
            }
        }
        Self {
            total_faces: faces.len(),
            faces,
            image_size,
        }
    }
}

/// Body of `GET /health` on the recognition capability
#[derive(Debug, Clone, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub faces_loaded: usize,
    #[serde(default)]
    pub known_people: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Body of `POST …/status`
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: DeviceStatus,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: DeviceStatus, device_id: &str) -> Self {
        Self {
            status,
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Body of `POST …/results`
#[derive(Debug, Clone, Serialize)]
pub struct ResultReport {
    pub success: bool,
    pub faces: Vec<Detection>,
    pub total_faces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_size: Option<ImageSize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub announcement: Option<String>,
    pub recognized: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub device_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResultReport {
    pub fn success(
        device_id: &str,
        result: RecognitionResult,
        recognized: Vec<String>,
        announcement: Option<String>,
    ) -> Self {
        Self {
            success: true,
            faces: result.faces,
            total_faces: result.total_faces,
            image_size: result.image_size,
            announcement,
            recognized,
            error: None,
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    pub fn failure(device_id: &str, error: impl Into<String>) -> Self {
        Self {
            success: false,
            faces: Vec::new(),
            total_faces: 0,
            image_size: None,
            announcement: None,
            recognized: Vec::new(),
            error: Some(error.into()),
            device_id: device_id.to_string(),
            timestamp: Utc::now(),
        }
    }
}
