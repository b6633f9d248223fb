//! FaceLink Agent - capture device side of the FaceLink sync service
//!
//! The device sits behind NAT and only calls out:
//! - Polls the sync service for operator commands
//! - Runs capture → recognize → announce cycles on demand, on a timer, or on a trigger
//! - Reports status and recognition results back

mod announce;
mod capabilities;
mod config;
mod control;
mod execution;
mod protocol;
mod recognition;
mod sync_client;

use anyhow::{Context, Result};
use capabilities::{
    CapabilityInfo, CapabilityType, CommandCamera, CommandSpeaker, CommandTrigger, SilentSpeaker, Speaker,
    TriggerInput,
};
use config::AgentConfig;
use control::{Collaborators, DeviceAgent, LoopSettings};
use recognition::RecognitionClient;
use sync_client::SyncClient;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn build_agent(config: &AgentConfig) -> Result<DeviceAgent> {
    let sync = SyncClient::new(&config.sync).context("Failed to build sync client")?;
    let recognizer = RecognitionClient::new(&config.recognition).context("Failed to build recognition client")?;

    let speaker: Box<dyn Speaker> = if config.speech.enabled {
        Box::new(CommandSpeaker::from_config(&config.speech))
    } else {
        Box::new(SilentSpeaker)
    };
    let trigger = CommandTrigger::from_config(&config.trigger).map(|t| Box::new(t) as Box<dyn TriggerInput>);

    for info in [
        CapabilityInfo::detect(CapabilityType::Camera, &config.camera.command),
        CapabilityInfo::detect(CapabilityType::Speech, &config.speech.command),
        CapabilityInfo::detect(CapabilityType::Trigger, &config.trigger.command),
    ] {
        info.log();
    }

    let parts = Collaborators {
        sync: Box::new(sync),
        recognizer: Box::new(recognizer),
        camera: Box::new(CommandCamera::from_config(&config.camera)),
        speaker,
        trigger,
    };
    let settings = LoopSettings {
        device_id: config.device_label(),
        continuous_interval: config.continuous_interval(),
        confidence_threshold: config.control.confidence_threshold,
    };
    Ok(DeviceAgent::new(parts, settings))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("facelink_agent=info")),
        )
        .init();

    info!("FaceLink Agent v{} starting", env!("CARGO_PKG_VERSION"));

    let config = AgentConfig::load().await.context("Failed to load configuration")?;
    info!(
        sync = %config.sync.base_url,
        recognition = %config.recognition.base_url,
        device = config.sync.device_id.as_deref().unwrap_or("pi"),
        "Configuration loaded"
    );

    let mut agent = build_agent(&config).context("Failed to create agent")?;

    agent.startup().await;
    agent.run(config.tick(), shutdown_signal()).await;
    agent.shutdown().await;

    info!(mode = ?agent.mode(), last_status = ?agent.status(), "FaceLink Agent stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_build_agent_from_defaults() {
        let mut config = AgentConfig::default();
        config.sync.device_id = Some("front-door".into());
        config.trigger.command = vec!["true".into()];

        let agent = build_agent(&config).unwrap();
        assert_eq!(agent.mode(), control::LoopMode::Standby);
        assert!(agent.status().is_none());
    }
}
