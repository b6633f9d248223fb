//! Device control loop
//!
//! One cooperative task. Every tick it polls the sync service for a command,
//! runs it, then runs a continuous capture when one is due. A capture cycle is
//! health probe → frame → recognize → announce → report, and always ends with
//! a result report and a status report, even on failure.
//!
//! Trigger mode is the only indefinite wait: polling stops until the trigger
//! fires once or the process is interrupted.

use crate::announce::{recognized_identities, render_announcement};
use crate::capabilities::{CameraError, CameraSource, Speaker, TriggerInput};
use crate::protocol::{Command, DeviceStatus, PolledCommand, ResultReport, StatusReport};
use crate::recognition::{RecognitionError, Recognizer};
use crate::sync_client::SyncPort;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

impl CycleError {
    /// Status reported after the failed cycle
    pub fn status(&self) -> DeviceStatus {
        match self {
            Self::Camera(CameraError::Unavailable(_)) => DeviceStatus::ErrorCamera,
            Self::Camera(CameraError::Frame(_)) => DeviceStatus::ErrorFrame,
            Self::Recognition(_) => DeviceStatus::ErrorRecognition,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopMode {
    Standby,
    /// `last_capture` is when the last continuous cycle started
    Continuous { last_capture: Option<Instant> },
    /// Waiting for the trigger; polling is suspended
    Armed,
}

#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub device_id: String,
    pub continuous_interval: Duration,
    pub confidence_threshold: f64,
}

/// External collaborators of the loop
pub struct Collaborators {
    pub sync: Box<dyn SyncPort>,
    pub recognizer: Box<dyn Recognizer>,
    pub camera: Box<dyn CameraSource>,
    pub speaker: Box<dyn Speaker>,
    pub trigger: Option<Box<dyn TriggerInput>>,
}

pub struct DeviceAgent {
    sync: Box<dyn SyncPort>,
    recognizer: Box<dyn Recognizer>,
    camera: Box<dyn CameraSource>,
    speaker: Box<dyn Speaker>,
    trigger: Option<Box<dyn TriggerInput>>,
    settings: LoopSettings,
    mode: LoopMode,
    status: Option<DeviceStatus>,
}

impl DeviceAgent {
    pub fn new(parts: Collaborators, settings: LoopSettings) -> Self {
        Self {
            sync: parts.sync,
            recognizer: parts.recognizer,
            camera: parts.camera,
            speaker: parts.speaker,
            trigger: parts.trigger,
            settings,
            mode: LoopMode::Standby,
            status: None,
        }
    }

    pub fn mode(&self) -> LoopMode {
        self.mode
    }

    /// Last status this agent reported
    pub fn status(&self) -> Option<DeviceStatus> {
        self.status
    }

    /// Probe the recognition service once (non-fatal), then report `idle`
    pub async fn startup(&mut self) {
        match self.recognizer.check_health().await {
            Ok(health) => info!(
                faces_loaded = health.faces_loaded,
                known_people = ?health.known_people,
                "Recognition service healthy"
            ),
            Err(e) => warn!(error = %e, "Recognition service not ready"),
        }
        self.report_status(DeviceStatus::Idle, None).await;
    }

    /// Tick until `shutdown` resolves. Shutdown also cancels a trigger wait.
    pub async fn run(&mut self, tick: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(device_id = %self.settings.device_id, tick_ms = tick.as_millis() as u64, "Control loop started");
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = async {
                    interval.tick().await;
                    self.tick_at(Instant::now()).await;
                } => {}
            }
        }
    }

    /// Best-effort `offline` report
    pub async fn shutdown(&mut self) {
        self.mode = LoopMode::Standby;
        self.report_status(DeviceStatus::Offline, None).await;
    }

    /// One loop iteration at time `now`
    pub async fn tick_at(&mut self, now: Instant) {
        match self.sync.poll_command().await {
            Ok(Some(polled)) => self.handle_command(polled, now).await,
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Command poll failed"),
        }

        if let LoopMode::Continuous { last_capture } = self.mode {
            let due = last_capture.map_or(true, |started| now.duration_since(started) >= self.settings.continuous_interval);
            if due {
                self.mode = LoopMode::Continuous {
                    last_capture: Some(now),
                };
                self.run_cycle().await;
            }
        }
    }

    async fn handle_command(&mut self, polled: PolledCommand, now: Instant) {
        info!(
            command = %polled.command,
            command_id = polled.command_id.as_deref().unwrap_or("-"),
            "Command received"
        );

        match polled.command {
            Command::SingleCapture => self.run_cycle().await,
            Command::StartContinuous => {
                if !matches!(self.mode, LoopMode::Continuous { .. }) {
                    self.mode = LoopMode::Continuous { last_capture: None };
                }
                self.report_status(DeviceStatus::ContinuousRunning, None).await;
            }
            Command::Stop => {
                self.mode = LoopMode::Standby;
                self.report_status(DeviceStatus::Idle, None).await;
            }
            Command::TriggerMode => self.arm_trigger(now).await,
        }
    }

    async fn arm_trigger(&mut self, now: Instant) {
        if self.trigger.is_none() {
            warn!("No trigger input configured, ignoring trigger_mode");
            return;
        }

        self.mode = LoopMode::Armed;
        self.report_status(DeviceStatus::WaitingForTrigger, None).await;
        info!("Waiting for trigger");

        let fired = match &self.trigger {
            Some(trigger) => trigger.wait_for_trigger().await,
            None => return,
        };

        self.mode = LoopMode::Standby;
        match fired {
            Ok(()) => {
                info!(waited_ms = now.elapsed().as_millis() as u64, "Trigger fired");
                self.run_cycle().await;
            }
            Err(e) => {
                warn!(error = %e, "Trigger wait failed");
                self.report_status(DeviceStatus::Idle, None).await;
            }
        }
    }

    fn resting_status(&self) -> DeviceStatus {
        match self.mode {
            LoopMode::Continuous { .. } => DeviceStatus::ContinuousRunning,
            LoopMode::Armed => DeviceStatus::WaitingForTrigger,
            LoopMode::Standby => DeviceStatus::Idle,
        }
    }

    async fn run_cycle(&mut self) {
        self.report_status(DeviceStatus::Capturing, None).await;

        match self.capture_and_recognize().await {
            Ok(report) => {
                if let Err(e) = self.sync.report_result(&report).await {
                    warn!(error = %e, "Result report failed");
                }
                let resting = self.resting_status();
                self.report_status(resting, None).await;
            }
            Err(e) => {
                error!(error = %e, "Capture cycle failed");
                let report = ResultReport::failure(&self.settings.device_id, e.to_string());
                if let Err(report_err) = self.sync.report_result(&report).await {
                    warn!(error = %report_err, "Failure report failed");
                }
                self.report_status(e.status(), Some(e.to_string())).await;
            }
        }
    }

    async fn capture_and_recognize(&self) -> Result<ResultReport, CycleError> {
        let health = self.recognizer.check_health().await?;
        debug!(faces_loaded = health.faces_loaded, "Recognition service ready");

        let frame = self.camera.grab_frame().await?;
        let result = self.recognizer.recognize(frame).await?;

        let recognized = recognized_identities(&result.faces, self.settings.confidence_threshold);
        let announcement = render_announcement(&recognized);
        info!(faces = result.total_faces, recognized = ?recognized, "Recognition result");

        if let Some(text) = &announcement {
            if let Err(e) = self.speaker.speak(text).await {
                warn!(error = %e, "Announcement not spoken");
            }
        }

        Ok(ResultReport::success(&self.settings.device_id, result, recognized, announcement))
    }

    async fn report_status(&mut self, status: DeviceStatus, error: Option<String>) {
        let mut report = StatusReport::new(status, &self.settings.device_id);
        if let Some(error) = error {
            report = report.with_error(error);
        }
        if let Err(e) = self.sync.report_status(&report).await {
            warn!(status = %status, error = %e, "Status report failed");
        }
        self.status = Some(status);
    }
}
