//! TOML process configuration, loaded once at startup.

use serde::Deserialize;
use xchange_monitor::notify::{ChannelConfig, ChannelSettings};
use xchange_schema::{AlertLevel, DataType};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AppConfig {
    pub venues: Vec<VenueConfig>,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub notify: Vec<NotifyChannelConfig>,
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: String,
}

fn default_metrics_addr() -> String {
    "127.0.0.1:9469".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VenueConfig {
    pub name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IngestionConfig {
    pub symbols: Vec<String>,
    pub data_types: Vec<DataType>,
    pub start_ms: i64,
    pub end_ms: i64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_concurrency() -> usize {
    3
}

fn default_batch_size() -> u32 {
    1_000
}

fn default_request_delay_ms() -> u64 {
    250
}

fn default_timeframe() -> String {
    "1m".to_string()
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            symbols: Vec::new(),
            data_types: Vec::new(),
            start_ms: 0,
            end_ms: 0,
            concurrency: default_concurrency(),
            batch_size: default_batch_size(),
            request_delay_ms: default_request_delay_ms(),
            timeframe: default_timeframe(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "backend")]
pub enum CheckpointConfig {
    LocalFile { dir: String },
    Columnar,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self::LocalFile {
            dir: "./checkpoints".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MonitorConfig {
    #[serde(default = "default_dedupe_window_ms")]
    pub dedupe_window_ms: i64,
    #[serde(default = "default_max_alert_history")]
    pub max_alert_history: usize,
    #[serde(default = "default_health_interval_ms")]
    pub health_interval_ms: u64,
}

fn default_dedupe_window_ms() -> i64 {
    5 * 60_000
}

fn default_max_alert_history() -> usize {
    10_000
}

fn default_health_interval_ms() -> u64 {
    30_000
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: default_dedupe_window_ms(),
            max_alert_history: default_max_alert_history(),
            health_interval_ms: default_health_interval_ms(),
        }
    }
}

/// One `[[notify]]` table; flattens straight into a [`ChannelConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct NotifyChannelConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_min_level")]
    pub min_level: AlertLevel,
    #[serde(flatten)]
    pub transport: NotifyTransportConfig,
}

fn default_true() -> bool {
    true
}

fn default_min_level() -> AlertLevel {
    AlertLevel::Info
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum NotifyTransportConfig {
    Console,
    Email { to: String },
    Webhook { url: String },
    Telegram { bot_token: String, chat_id: String },
    ImGroupBot { url: String, #[serde(default)] hmac_secret: Option<String> },
}

impl From<NotifyChannelConfig> for ChannelConfig {
    fn from(value: NotifyChannelConfig) -> Self {
        let settings = match value.transport {
            NotifyTransportConfig::Console => ChannelSettings::Console,
            NotifyTransportConfig::Email { to } => ChannelSettings::Email { to },
            NotifyTransportConfig::Webhook { url } => ChannelSettings::Webhook { url },
            NotifyTransportConfig::Telegram { bot_token, chat_id } => {
                ChannelSettings::Telegram { bot_token, chat_id }
            }
            NotifyTransportConfig::ImGroupBot { url, hmac_secret } => {
                ChannelSettings::ImGroupBot { url, hmac_secret }
            }
        };
        ChannelConfig {
            name: value.name.into(),
            min_level: value.min_level,
            enabled: value.enabled,
            settings,
        }
    }
}

impl AppConfig {
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("reading config {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("parsing config {}: {e}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let raw = r#"
            [[venues]]
            name = "binance"

            [ingestion]
            symbols = ["BTC/USDT:USDT"]
            data_types = ["kline"]
            start_ms = 1700000000000
            end_ms = 1700003600000
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.venues.len(), 1);
        assert_eq!(config.ingestion.concurrency, 3);
        assert_eq!(config.metrics_addr, "127.0.0.1:9469");
        assert!(matches!(config.checkpoint, CheckpointConfig::LocalFile { .. }));
        assert!(config.notify.is_empty());
    }

    #[test]
    fn notify_channels_parse_and_convert() {
        let raw = r#"
            [[venues]]
            name = "binance"

            [ingestion]
            symbols = ["BTC/USDT:USDT"]
            data_types = ["kline"]
            start_ms = 1700000000000
            end_ms = 1700003600000

            [[notify]]
            name = "console"
            kind = "console"

            [[notify]]
            name = "ops-webhook"
            kind = "webhook"
            min_level = "critical"
            url = "https://example.com/hook"
        "#;
        let config: AppConfig = toml::from_str(raw).unwrap();
        assert_eq!(config.notify.len(), 2);
        assert_eq!(config.notify[0].min_level, AlertLevel::Info);
        assert_eq!(config.notify[1].min_level, AlertLevel::Critical);

        let channels: Vec<ChannelConfig> = config.notify.into_iter().map(Into::into).collect();
        assert!(matches!(channels[0].settings, ChannelSettings::Console));
        assert!(matches!(channels[1].settings, ChannelSettings::Webhook { .. }));
    }
}
