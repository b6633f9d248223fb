/**
 * REGISTRES STATUS / RÉSULTAT - État relayé device → opérateur
 *
 * Deux registres last-writer-wins indépendants, chacun sous son propre mutex.
 * Un status sans résultat (ou l'inverse) est une mise à jour normale : le status
 * bouge à chaque transition, le résultat seulement en fin de cycle de capture.
 */

use crate::models::{StatusRecord, StatusReport};
use parking_lot::Mutex;
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Default)]
pub struct StatusStore {
    record: Mutex<StatusRecord>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Écrase le status courant et horodate la mise à jour.
    pub fn set_status(&self, report: StatusReport) -> StatusRecord {
        let record = StatusRecord {
            status: report.status,
            last_updated: Some(OffsetDateTime::now_utc()),
            details: report.details,
        };
        *self.record.lock() = record.clone();
        record
    }

    pub fn get_status(&self) -> StatusRecord {
        self.record.lock().clone()
    }
}

#[derive(Debug, Default)]
pub struct ResultStore {
    last: Mutex<Option<Value>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stocke le résultat tel quel (pas de validation de schéma).
    pub fn set_result(&self, result: Value) {
        *self.last.lock() = Some(result);
    }

    pub fn get_result(&self) -> Option<Value> {
        self.last.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn report(status: &str) -> StatusReport {
        StatusReport {
            status: status.to_string(),
            details: Map::new(),
        }
    }

    #[test]
    fn test_initial_state() {
        let status = StatusStore::new().get_status();
        assert_eq!(status.status, "unknown");
        assert!(status.last_updated.is_none());
        assert!(ResultStore::new().get_result().is_none());
    }

    #[test]
    fn test_status_overwrites_previous() {
        let store = StatusStore::new();
        let first = store.set_status(report("capturing"));
        let second = store.set_status(report("idle"));

        let current = store.get_status();
        assert_eq!(current.status, "idle");
        assert!(current.last_updated >= first.last_updated);
        assert_eq!(current.last_updated, second.last_updated);
    }

    #[test]
    fn test_registers_are_independent() {
        let status = StatusStore::new();
        let results = ResultStore::new();

        results.set_result(json!({"success": true, "faces": []}));
        status.set_status(report("continuous_running"));
        results.set_result(json!({"success": false, "error": "camera"}));

        assert_eq!(status.get_status().status, "continuous_running");
        assert_eq!(results.get_result().unwrap()["success"], false);

        status.set_status(report("error_camera"));
        assert_eq!(results.get_result().unwrap()["error"], "camera");
    }
}
