/*!
Test Harness pour l'agent FaceLink

Démarre le kernel factice et la capability de reconnaissance factice,
initialise les logs, et fournit des attentes sur les reports reçus.
*/

use crate::recognition_stub::RecognitionStub;
use crate::sync_stub::SyncStub;
use anyhow::Result;
use serde_json::Value;
use std::time::{Duration, Instant};

/// Environnement complet côté device : kernel + reconnaissance
pub struct TestHarness {
    pub sync: SyncStub,
    pub recognition: RecognitionStub,
}

impl TestHarness {
    pub async fn start() -> Result<Self> {
        env_logger::builder().is_test(true).try_init().ok();

        let harness = Self {
            sync: SyncStub::start().await?,
            recognition: RecognitionStub::start().await?,
        };
        log::info!(
            "🧰 Harness ready (sync={}, recognition={})",
            harness.sync.url(),
            harness.recognition.url()
        );
        Ok(harness)
    }

    /// Attend qu'un status donné ait été reporté
    pub async fn wait_for_status(&self, status: &str, timeout_ms: u64) -> Result<()> {
        let start = Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if self.sync.statuses().iter().any(|s| s == status) {
                log::info!("✅ Status '{}' reported", status);
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        anyhow::bail!(
            "status '{}' not reported within {}ms (got {:?})",
            status,
            timeout_ms,
            self.sync.statuses()
        );
    }

    /// Attend au moins `count` résultats reportés et renvoie le dernier
    pub async fn wait_for_results(&self, count: usize, timeout_ms: u64) -> Result<Value> {
        let start = Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            let results = self.sync.result_reports();
            if results.len() >= count {
                if let Some(last) = results.last() {
                    return Ok(last.clone());
                }
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        anyhow::bail!("expected {} results within {}ms", count, timeout_ms);
    }

    /// Vérifie que `expected` apparaît dans l'ordre parmi les status reportés
    pub fn assert_status_sequence(&self, expected: &[&str]) -> Result<()> {
        let statuses = self.sync.statuses();
        let mut remaining = expected.iter().peekable();

        for status in &statuses {
            if remaining.peek().is_some_and(|want| **want == status.as_str()) {
                remaining.next();
            }
        }

        if let Some(missing) = remaining.next() {
            anyhow::bail!("status '{}' missing from sequence {:?}", missing, statuses);
        }
        Ok(())
    }
}
