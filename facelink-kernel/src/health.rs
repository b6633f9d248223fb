use crate::devices::DeviceRegistry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task;

#[derive(Debug, Serialize, Deserialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: u32,
    pub commands_pending: u32,
    pub commands_enqueued: u64,
    pub commands_delivered: u64,
    pub status_reports: u64,
    pub result_reports: u64,
}

#[derive(Debug, Default)]
struct Counters {
    commands_enqueued: AtomicU64,
    commands_delivered: AtomicU64,
    status_reports: AtomicU64,
    result_reports: AtomicU64,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    counters: Arc<Counters>,
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn record_enqueued(&self) {
        self.counters.commands_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivered(&self) {
        self.counters.commands_delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_status_report(&self) {
        self.counters.status_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result_report(&self) {
        self.counters.result_reports.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_health(&self, devices: &DeviceRegistry) -> KernelHealth {
        KernelHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            devices_tracked: devices.len() as u32,
            commands_pending: devices.pending_commands() as u32,
            commands_enqueued: self.counters.commands_enqueued.load(Ordering::Relaxed),
            commands_delivered: self.counters.commands_delivered.load(Ordering::Relaxed),
            status_reports: self.counters.status_reports.load(Ordering::Relaxed),
            result_reports: self.counters.result_reports.load(Ordering::Relaxed),
        }
    }

    /// Log périodique du health kernel (0 = désactivé)
    pub fn spawn_health_logger(&self, devices: DeviceRegistry, every_secs: u64) {
        if every_secs == 0 {
            return;
        }
        let health_tracker = self.clone();

        task::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(every_secs));
            // le premier tick est immédiat, on le saute
            interval.tick().await;

            loop {
                interval.tick().await;
                let health = health_tracker.get_health(&devices);
                tracing::info!(
                    uptime = health.uptime_seconds,
                    devices = health.devices_tracked,
                    pending = health.commands_pending,
                    delivered = health.commands_delivered,
                    "kernel health"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Command;

    #[test]
    fn test_counters_and_pending() {
        let tracker = HealthTracker::new();
        let devices = DeviceRegistry::new("pi");
        let channel = devices.default_channel().unwrap();

        channel.commands.enqueue(Command::SingleCapture);
        tracker.record_enqueued();
        channel.commands.enqueue(Command::Stop);
        tracker.record_enqueued();
        channel.commands.dequeue_next();
        tracker.record_delivered();
        tracker.record_status_report();

        let health = tracker.get_health(&devices);
        assert_eq!(health.devices_tracked, 1);
        assert_eq!(health.commands_pending, 1);
        assert_eq!(health.commands_enqueued, 2);
        assert_eq!(health.commands_delivered, 1);
        assert_eq!(health.status_reports, 1);
        assert_eq!(health.result_reports, 0);
    }
}
