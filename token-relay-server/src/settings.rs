use blockscout_service_launcher::{
    database::{DatabaseConnectSettings, DatabaseSettings},
    launcher::{ConfigSettings, MetricsSettings},
    tracing::{JaegerSettings, TracingSettings},
};
use serde::Deserialize;
use token_relay_logic::{NotifierSettings, QueueSettings, RelaySettings, ScannerSettings};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,
    #[serde(default)]
    pub jaeger: JaegerSettings,

    pub database: DatabaseSettings,

    /// Deployment mode; selects which contract rows this instance works on.
    pub mode: String,

    #[serde(default)]
    pub scanner: ScannerSettings,
    #[serde(default)]
    pub queue: QueueSettings,
    /// Required when queue consumers are enabled.
    #[serde(default)]
    pub relay: Option<RelaySettings>,
    #[serde(default)]
    pub notifier: NotifierSettings,
}

impl ConfigSettings for Settings {
    const SERVICE_NAME: &'static str = "TOKEN_RELAY";

    fn validate(&self) -> anyhow::Result<()> {
        if self.mode.trim().is_empty() {
            anyhow::bail!("mode must not be empty");
        }
        if self.scanner.blocks_per_query == 0 {
            anyhow::bail!("scanner.blocks_per_query must be positive");
        }
        if self.queue.enabled {
            if self.relay.is_none() {
                anyhow::bail!("relay settings are required when the queue is enabled");
            }
            if self.queue.max_batch == 0 || self.queue.workers == 0 {
                anyhow::bail!("queue.max_batch and queue.workers must be positive");
            }
        }
        if self.notifier.enabled && self.notifier.url.is_none() {
            anyhow::bail!("notifier.url is required when notifications are enabled");
        }
        Ok(())
    }
}

impl Settings {
    pub fn default(database_url: String, mode: String) -> Self {
        Self {
            metrics: Default::default(),
            tracing: Default::default(),
            jaeger: Default::default(),
            database: DatabaseSettings {
                connect: DatabaseConnectSettings::Url(database_url),
                connect_options: Default::default(),
                create_database: false,
                run_migrations: false,
            },
            mode,
            scanner: Default::default(),
            queue: QueueSettings {
                enabled: false,
                ..Default::default()
            },
            relay: None,
            notifier: Default::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::time::Duration;

    fn parse(value: serde_json::Value) -> Settings {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let settings = parse(json!({
            "database": {"connect": {"url": "postgres://localhost/relay"}},
            "mode": "testnet",
            "queue": {"enabled": false},
        }));
        let expected = Settings::default(
            "postgres://localhost/relay".to_string(),
            "testnet".to_string(),
        );
        assert_eq!(settings, expected);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn parses_relay_durations() {
        let settings = parse(json!({
            "database": {"connect": {"url": "postgres://localhost/relay"}},
            "mode": "mainnet",
            "scanner": {"query_delay": 250, "blocks_per_query": 100},
            "relay": {
                "url": "https://relayer.test",
                "rpc_url": "https://rpc.test",
                "wallet": "0x7777777777777777777777777777777777777777",
                "signer_private_key": "0x0123",
                "wait_timeout": 60,
            },
        }));
        assert_eq!(settings.scanner.query_delay, Duration::from_millis(250));
        assert_eq!(settings.scanner.blocks_per_query, 100);
        let relay = settings.relay.as_ref().unwrap();
        assert_eq!(relay.wait_timeout, Duration::from_secs(60));
        assert_eq!(relay.wait_poll_interval, Duration::from_millis(2000));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn queue_requires_relay() {
        let mut settings =
            Settings::default("postgres://localhost/relay".to_string(), "x".to_string());
        settings.queue.enabled = true;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = serde_json::from_value::<Settings>(json!({
            "database": {"connect": {"url": "postgres://localhost/relay"}},
            "mode": "testnet",
            "scanner": {"blocks_per_querry": 10},
        }));
        assert!(result.is_err());
    }
}
