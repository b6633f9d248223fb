/**
 * REGISTRE DES DEVICES - Un canal (file + registres) par device
 *
 * RÔLE : Associer un device_id à son état propre. Le verrou de la map ne sert
 * qu'au lookup/insert ; chaque canal protège sa file et ses registres séparément,
 * donc deux devices ne se bloquent jamais entre eux.
 *
 * Les routes `/pi/...` adressent le device par défaut (déploiement mono-device).
 */

use crate::error::ApiError;
use crate::queue::CommandQueue;
use crate::state::{new_state, Shared};
use crate::store::{ResultStore, StatusStore};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;

const MAX_DEVICE_ID_LEN: usize = 64;

#[derive(Debug)]
pub struct DeviceChannel {
    device_id: String,
    pub commands: CommandQueue,
    pub status: StatusStore,
    pub results: ResultStore,
    last_seen: Mutex<Option<OffsetDateTime>>,
}

impl DeviceChannel {
    fn new(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            commands: CommandQueue::new(),
            status: StatusStore::new(),
            results: ResultStore::new(),
            last_seen: Mutex::new(None),
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Marque un contact du device (poll ou report).
    pub fn touch(&self) {
        *self.last_seen.lock() = Some(OffsetDateTime::now_utc());
    }

    pub fn last_seen(&self) -> Option<OffsetDateTime> {
        *self.last_seen.lock()
    }
}

#[derive(Clone)]
pub struct DeviceRegistry {
    channels: Shared<HashMap<String, Arc<DeviceChannel>>>,
    default_device: String,
}

impl DeviceRegistry {
    pub fn new(default_device: impl Into<String>) -> Self {
        Self {
            channels: new_state(HashMap::new()),
            default_device: default_device.into(),
        }
    }

    pub fn default_device(&self) -> &str {
        &self.default_device
    }

    /// Canal d'un device, créé au premier accès.
    pub fn channel(&self, device_id: &str) -> Result<Arc<DeviceChannel>, ApiError> {
        validate_device_id(device_id)?;

        let mut channels = self.channels.lock();
        let channel = channels
            .entry(device_id.to_string())
            .or_insert_with(|| {
                tracing::info!(device_id = %device_id, "tracking new device");
                Arc::new(DeviceChannel::new(device_id))
            })
            .clone();
        Ok(channel)
    }

    pub fn default_channel(&self) -> Result<Arc<DeviceChannel>, ApiError> {
        self.channel(&self.default_device)
    }

    /// Lookup seul, pour les lectures opérateur : n'enregistre jamais de device.
    pub fn get(&self, device_id: &str) -> Result<Option<Arc<DeviceChannel>>, ApiError> {
        validate_device_id(device_id)?;
        Ok(self.channels.lock().get(device_id).cloned())
    }

    /// Snapshot trié par device_id.
    pub fn list(&self) -> Vec<Arc<DeviceChannel>> {
        let mut list: Vec<_> = self.channels.lock().values().cloned().collect();
        list.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        list
    }

    pub fn len(&self) -> usize {
        self.channels.lock().len()
    }

    pub fn pending_commands(&self) -> usize {
        self.list().iter().map(|c| c.commands.len()).sum()
    }
}

pub fn validate_device_id(device_id: &str) -> Result<(), ApiError> {
    let valid = !device_id.is_empty()
        && device_id.len() <= MAX_DEVICE_ID_LEN
        && device_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(ApiError::InvalidDeviceId(device_id.to_string()))
    }
}
