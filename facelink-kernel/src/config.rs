use crate::devices::validate_device_id;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KernelConfig {
    pub listen: String,
    pub port: u16,
    /// device adressé par les routes `/pi/*`
    pub default_device: String,
    /// au-delà, un device sans contact est affiché `stale`
    pub stale_after_secs: u64,
    pub health_log_secs: u64,
    /// clé partagée `x-api-key` ; jamais lue depuis le YAML
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0".into(),
            port: 8080,
            default_device: "pi".into(),
            stale_after_secs: 90,
            health_log_secs: 300,
            api_key: None,
        }
    }
}

impl KernelConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, serde_yaml::Error> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt)
    }

    /// Surcharges d'environnement : `PORT`, `FACELINK_API_KEY`.
    pub fn with_env_overrides(mut self, port: Option<String>, api_key: Option<String>) -> Self {
        if let Some(port) = port {
            match port.trim().parse() {
                Ok(p) => self.port = p,
                Err(_) => tracing::warn!(port = %port, "PORT invalide, ignoré"),
            }
        }
        self.api_key = api_key.filter(|k| !k.trim().is_empty());
        self
    }

    /// `default_device` invalide → repli sur `pi`.
    pub fn validated(mut self) -> Self {
        if let Err(e) = validate_device_id(&self.default_device) {
            tracing::warn!(error = %e, "default_device invalide, repli sur \"pi\"");
            self.default_device = Self::default().default_device;
        }
        self
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("FACELINK_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        KernelConfig::from_yaml(&txt).unwrap_or_else(|e| {
            tracing::warn!(path = %path, error = %e, "config invalide, usage config par défaut");
            KernelConfig::default()
        })
    } else {
        tracing::info!(path = %path, "pas de fichier de config, usage config par défaut");
        KernelConfig::default()
    };

    cfg.validated().with_env_overrides(
        std::env::var("PORT").ok(),
        std::env::var("FACELINK_API_KEY").ok(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg = KernelConfig::from_yaml("port: 9090\ndefault_device: hall\n").unwrap();
        assert_eq!(cfg.port, 9090);
        assert_eq!(cfg.default_device, "hall");
        assert_eq!(cfg.listen, "0.0.0.0");
        assert_eq!(cfg.stale_after_secs, 90);
    }

    #[test]
    fn test_invalid_default_device_falls_back() {
        let cfg = KernelConfig::from_yaml("default_device: \"front door/1\"\n").unwrap().validated();
        assert_eq!(cfg.default_device, "pi");

        let cfg = KernelConfig::from_yaml("default_device: hall-2\n").unwrap().validated();
        assert_eq!(cfg.default_device, "hall-2");
    }

    #[test]
    fn test_empty_yaml_is_default() {
        let cfg = KernelConfig::from_yaml("   \n").unwrap();
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
    }

    #[test]
    fn test_api_key_not_read_from_yaml() {
        let cfg = KernelConfig::from_yaml("api_key: secret\n").unwrap();
        assert!(cfg.api_key.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let cfg = KernelConfig::default()
            .with_env_overrides(Some("8181".into()), Some("k3y".into()));
        assert_eq!(cfg.port, 8181);
        assert_eq!(cfg.api_key.as_deref(), Some("k3y"));

        let cfg = KernelConfig::default().with_env_overrides(Some("nope".into()), Some(" ".into()));
        assert_eq!(cfg.port, 8080);
        assert!(cfg.api_key.is_none());
    }
}
