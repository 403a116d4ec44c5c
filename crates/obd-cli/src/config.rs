//! CLI configuration, loadable from TOML and overridden by flags/environment.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::warn;

use obd_protocol::{EcuSlot, MAX_ECUS, Target};

use crate::output::OutputFormat;

/// Defaults read from a config file. Every field is optional in the file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// CAN network interface (e.g. "can0", "vcan0").
    pub interface: String,
    /// ECU slot 0-7; absent means broadcast.
    pub ecu: Option<u8>,
    /// Receive deadline per request, in seconds.
    pub timeout_secs: u64,
    pub output: OutputFormat,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            interface: "can0".to_string(),
            ecu: None,
            timeout_secs: 1,
            output: OutputFormat::Text,
        }
    }
}

impl CliConfig {
    /// Load config from a TOML file path.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse config file: {}", path.display()))
    }

    /// Apply command-line/environment values over the file values.
    pub fn resolve(self, overrides: Overrides) -> Settings {
        let ecu = overrides.ecu.or(self.ecu);
        Settings {
            interface: overrides.interface.unwrap_or(self.interface),
            target: target_for(ecu),
            timeout: Duration::from_secs(overrides.timeout_secs.unwrap_or(self.timeout_secs)),
            output: if overrides.json {
                OutputFormat::Json
            } else {
                self.output
            },
        }
    }
}

/// Values given on the command line (or via environment variables).
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub interface: Option<String>,
    pub ecu: Option<u8>,
    pub timeout_secs: Option<u64>,
    pub json: bool,
}

/// Effective settings for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub interface: String,
    pub target: Target,
    pub timeout: Duration,
    pub output: OutputFormat,
}

/// Slot numbers past the last ECU fall back to broadcast.
pub fn target_for(ecu: Option<u8>) -> Target {
    match ecu {
        None => Target::Broadcast,
        Some(n) => match EcuSlot::new(n) {
            Some(slot) => Target::Ecu(slot),
            None => {
                warn!(ecu = n, max = MAX_ECUS - 1, "impossible ECU number, using broadcast");
                Target::Broadcast
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_empty_config_uses_defaults() {
        let config: CliConfig = toml::from_str("").unwrap();
        assert_eq!(config, CliConfig::default());
        assert_eq!(config.interface, "can0");
        assert_eq!(config.timeout_secs, 1);
    }

    #[test]
    fn deserialize_full_config() {
        let toml = r#"
interface = "vcan0"
ecu = 2
timeout_secs = 3
output = "json"
"#;
        let config: CliConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.interface, "vcan0");
        assert_eq!(config.ecu, Some(2));
        assert_eq!(config.timeout_secs, 3);
        assert_eq!(config.output, OutputFormat::Json);
    }

    #[test]
    fn flags_override_file() {
        let config = CliConfig {
            interface: "vcan0".into(),
            ecu: Some(2),
            timeout_secs: 3,
            output: OutputFormat::Text,
        };
        let settings = config.resolve(Overrides {
            interface: Some("can1".into()),
            ecu: Some(5),
            timeout_secs: Some(2),
            json: true,
        });

        assert_eq!(settings.interface, "can1");
        assert_eq!(settings.target, Target::Ecu(EcuSlot::new(5).unwrap()));
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.output, OutputFormat::Json);
    }

    #[test]
    fn file_values_fill_gaps() {
        let config = CliConfig {
            ecu: Some(1),
            ..CliConfig::default()
        };
        let settings = config.resolve(Overrides::default());

        assert_eq!(settings.interface, "can0");
        assert_eq!(settings.target, Target::Ecu(EcuSlot::new(1).unwrap()));
        assert_eq!(settings.timeout, Duration::from_secs(1));
        assert_eq!(settings.output, OutputFormat::Text);
    }

    #[test]
    fn impossible_ecu_falls_back_to_broadcast() {
        assert_eq!(target_for(Some(8)), Target::Broadcast);
        assert_eq!(target_for(Some(200)), Target::Broadcast);
        assert_eq!(target_for(None), Target::Broadcast);
        assert_eq!(target_for(Some(7)), Target::Ecu(EcuSlot::new(7).unwrap()));
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = CliConfig::from_file(Path::new("/nonexistent/obd.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
