use std::time::Duration;

use kvshrink_store::OpenOptions;
use serde::{Deserialize, Serialize};

use crate::error::{CompactError, Result};

/// Explicit opt-in for rewriting a store.
///
/// Compaction is experimental; callers have to switch it on before a pass
/// will run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DangerZone {
    #[default]
    Disabled,
    Enabled,
}

/// Configuration for compaction and the read-only passes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompactConfig {
    /// How long to wait for another process to release a store file, in
    /// milliseconds.
    pub open_timeout_ms: u64,
    /// Must be [`DangerZone::Enabled`] for [`crate::compact`] to run.
    pub danger_zone: DangerZone,
}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            open_timeout_ms: 1000,
            danger_zone: DangerZone::Disabled,
        }
    }
}

impl CompactConfig {
    /// Default configuration with the safety gate opened.
    pub fn enabled() -> Self {
        Self {
            danger_zone: DangerZone::Enabled,
            ..Default::default()
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CompactError::Config(e.to_string()))
    }

    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Options for opening an existing store file.
    pub fn open_options(&self) -> OpenOptions {
        OpenOptions::new().timeout(self.open_timeout())
    }

    /// Fail with [`CompactError::SafetyGate`] unless the gate is enabled.
    pub fn check_gate(&self) -> Result<()> {
        match self.danger_zone {
            DangerZone::Enabled => Ok(()),
            DangerZone::Disabled => Err(CompactError::SafetyGate),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_keeps_gate_closed() {
        let config = CompactConfig::default();
        assert_eq!(config.open_timeout_ms, 1000);
        assert_eq!(config.danger_zone, DangerZone::Disabled);
        assert!(matches!(config.check_gate(), Err(CompactError::SafetyGate)));
    }

    #[test]
    fn enabled_opens_gate() {
        assert!(CompactConfig::enabled().check_gate().is_ok());
    }

    #[test]
    fn parse_toml() {
        let config = CompactConfig::from_toml_str(
            r#"
            open_timeout_ms = 250
            danger_zone = "enabled"
            "#,
        )
        .unwrap();
        assert_eq!(config.open_timeout(), Duration::from_millis(250));
        assert_eq!(config.danger_zone, DangerZone::Enabled);
        assert_eq!(config.open_options().timeout, Duration::from_millis(250));
        assert!(!config.open_options().create);
    }

    #[test]
    fn parse_empty_toml_gives_defaults() {
        assert_eq!(CompactConfig::from_toml_str("").unwrap(), CompactConfig::default());
    }

    #[test]
    fn parse_rejects_unknown_keys_and_values() {
        assert!(matches!(
            CompactConfig::from_toml_str("danger = true"),
            Err(CompactError::Config(_))
        ));
        assert!(matches!(
            CompactConfig::from_toml_str("danger_zone = \"maybe\""),
            Err(CompactError::Config(_))
        ));
    }

    #[test]
    fn serde_json_roundtrip() {
        let config = CompactConfig::enabled();
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"enabled\""));
        let parsed: CompactConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
