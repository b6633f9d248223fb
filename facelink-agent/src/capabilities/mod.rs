//! Device capabilities reached through external programs
//!
//! - Camera: grab one JPEG frame
//! - Speech: speak an announcement
//! - Trigger: block until one physical edge
//!
//! Each seam is a trait so the control loop can run against mocks.

pub mod camera;
pub mod speech;
pub mod trigger;

pub use camera::{CameraError, CameraSource, CommandCamera};
pub use speech::{CommandSpeaker, SilentSpeaker, Speaker};
pub use trigger::{CommandTrigger, TriggerInput};

use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityType {
    Camera,
    Speech,
    Trigger,
}

/// Capability detection result
#[derive(Debug)]
pub struct CapabilityInfo {
    pub capability_type: CapabilityType,
    pub available: bool,
    pub reason: Option<String>,
}

impl CapabilityInfo {
    /// Check that the first argument of `argv` can be executed
    pub fn detect(capability_type: CapabilityType, argv: &[String]) -> Self {
        let (available, reason) = match argv.first() {
            None => (false, Some("not configured".to_string())),
            Some(program) if program_exists(program) => (true, None),
            Some(program) => (false, Some(format!("{program} not found"))),
        };
        Self {
            capability_type,
            available,
            reason,
        }
    }

    pub fn log(&self) {
        if self.available {
            info!(capability = ?self.capability_type, "Capability available");
        } else {
            let reason = self.reason.as_deref().unwrap_or("unknown");
            warn!(capability = ?self.capability_type, reason = %reason, "Capability unavailable");
        }
    }
}

/// Path lookup without spawning `which`
pub fn program_exists(program: &str) -> bool {
    if program.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(program).is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(program).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unconfigured_capability() {
        let info = CapabilityInfo::detect(CapabilityType::Trigger, &[]);
        assert!(!info.available);
        assert_eq!(info.reason.as_deref(), Some("not configured"));
    }

    #[test]
    fn test_missing_program() {
        let info = CapabilityInfo::detect(CapabilityType::Speech, &["facelink-no-such-tts".to_string()]);
        assert!(!info.available);
    }

    #[cfg(unix)]
    #[test]
    fn test_program_on_path() {
        assert!(program_exists("sh"));
        assert!(program_exists("/bin/sh"));
    }
}
