//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

use hilolink_hub_connection::ReconnectConfig;

/// Everything needed to stand up both hub connections.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the automation API hosting the negotiate endpoints.
    pub api_base_url: String,
    /// Location whose devices and challenge events we follow.
    pub location_id: i64,
    /// CH-program challenge events to subscribe to.
    #[serde(default)]
    pub ch_event_ids: Vec<i64>,
    /// Flex-program challenge events to subscribe to.
    #[serde(default)]
    pub flex_event_ids: Vec<i64>,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
}

/// Reconnect tuning, mirroring [`ReconnectConfig`] in plain numbers so
/// it can live in a config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconnectSettings {
    pub initial_delay_secs: f64,
    pub max_delay_secs: f64,
    pub backoff_factor: f64,
    pub stability_threshold_secs: f64,
    pub auth_retry_limit: u32,
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        let config = ReconnectConfig::default();
        Self {
            initial_delay_secs: config.initial_delay.as_secs_f64(),
            max_delay_secs: config.max_delay.as_secs_f64(),
            backoff_factor: config.backoff_factor,
            stability_threshold_secs: config.stability_threshold.as_secs_f64(),
            auth_retry_limit: config.auth_retry_limit,
        }
    }
}

impl ReconnectSettings {
    pub fn to_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            initial_delay: Duration::from_secs_f64(self.initial_delay_secs),
            max_delay: Duration::from_secs_f64(self.max_delay_secs),
            backoff_factor: self.backoff_factor,
            stability_threshold: Duration::from_secs_f64(self.stability_threshold_secs),
            auth_retry_limit: self.auth_retry_limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_uses_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"api_base_url": "https://automation.example", "location_id": 4242}"#,
        )
        .unwrap();

        assert_eq!(config.location_id, 4242);
        assert!(config.ch_event_ids.is_empty());
        assert!(config.flex_event_ids.is_empty());
        assert_eq!(config.reconnect.auth_retry_limit, 5);
        assert_eq!(
            config.reconnect.to_config().initial_delay,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn full_config_round_trips_into_reconnect_config() {
        let config: ClientConfig = serde_json::from_str(
            r#"{
                "api_base_url": "https://automation.example",
                "location_id": 1,
                "ch_event_ids": [7],
                "flex_event_ids": [8, 9],
                "reconnect": {
                    "initial_delay_secs": 0.5,
                    "max_delay_secs": 30.0,
                    "auth_retry_limit": 2
                }
            }"#,
        )
        .unwrap();

        assert_eq!(config.ch_event_ids, vec![7]);
        assert_eq!(config.flex_event_ids, vec![8, 9]);

        let reconnect = config.reconnect.to_config();
        assert_eq!(reconnect.initial_delay, Duration::from_millis(500));
        assert_eq!(reconnect.max_delay, Duration::from_secs(30));
        assert_eq!(reconnect.auth_retry_limit, 2);
        // Unspecified fields keep their defaults.
        assert!((reconnect.backoff_factor - 2.0).abs() < f64::EPSILON);
    }
}
