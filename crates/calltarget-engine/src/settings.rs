//! Instrumentation settings
//!
//! Controls which integrations are allowed to instrument at all.
//! Loaded from a JSON document or from the environment by the hosting
//! layer; consulted once, when integrations register.

use serde::{Deserialize, Serialize};

/// Environment variable globally enabling/disabling instrumentation
pub const ENABLED_ENV: &str = "CALLTARGET_ENABLED";
/// Environment variable listing disabled integrations (comma separated)
pub const DISABLED_INTEGRATIONS_ENV: &str = "CALLTARGET_DISABLED_INTEGRATIONS";

/// Configuration for the instrumentation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationSettings {
    /// Master switch; `false` registers every integration disabled
    pub enabled: bool,
    /// Integration names to disable (case insensitive)
    pub disabled_integrations: Vec<String>,
}

impl Default for InstrumentationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            disabled_integrations: Vec::new(),
        }
    }
}

impl InstrumentationSettings {
    /// Parse settings from a JSON document
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read settings from the environment
    pub fn from_env() -> Self {
        let enabled = std::env::var(ENABLED_ENV)
            .map(|value| !matches!(value.trim(), "0" | "false" | "False" | "FALSE"))
            .unwrap_or(true);
        let disabled_integrations = std::env::var(DISABLED_INTEGRATIONS_ENV)
            .map(|value| {
                value
                    .split(',')
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            enabled,
            disabled_integrations,
        }
    }

    /// Whether an integration may start enabled
    pub fn is_integration_enabled(&self, name: &str) -> bool {
        self.enabled
            && !self
                .disabled_integrations
                .iter()
                .any(|disabled| disabled.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = InstrumentationSettings::default();
        assert!(settings.enabled);
        assert!(settings.is_integration_enabled("kafka"));
    }

    #[test]
    fn test_from_json() {
        let settings = InstrumentationSettings::from_json(
            r#"{ "enabled": true, "disabled_integrations": ["Kafka", "RabbitMQ"] }"#,
        )
        .unwrap();
        assert!(!settings.is_integration_enabled("kafka"));
        assert!(!settings.is_integration_enabled("rabbitmq"));
        assert!(settings.is_integration_enabled("serilog"));
    }

    #[test]
    fn test_master_switch() {
        let settings = InstrumentationSettings {
            enabled: false,
            disabled_integrations: Vec::new(),
        };
        assert!(!settings.is_integration_enabled("anything"));
    }

    #[test]
    fn test_from_env() {
        std::env::set_var(ENABLED_ENV, "1");
        std::env::set_var(DISABLED_INTEGRATIONS_ENV, "kafka, serilog ,");
        let settings = InstrumentationSettings::from_env();
        assert!(settings.enabled);
        assert_eq!(settings.disabled_integrations.len(), 2);
        assert!(!settings.is_integration_enabled("Serilog"));
        std::env::remove_var(ENABLED_ENV);
        std::env::remove_var(DISABLED_INTEGRATIONS_ENV);
    }
}
