//! Multi-channel alert delivery. Each channel is independent: one channel's
//! failure never blocks another's, and nothing here retries — a channel that
//! fails this tick simply waits for the next alert or the next sweep.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{SecondsFormat, TimeZone, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use smol_str::SmolStr;
use std::collections::HashMap;
use xchange_schema::{Alert, AlertLevel};

/// Per-channel configuration. Each variant owns the settings it needs to
/// reach its transport; `min_level` and `enabled` are common to all of them.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub name: SmolStr,
    pub min_level: AlertLevel,
    pub enabled: bool,
    pub settings: ChannelSettings,
}

#[derive(Debug, Clone)]
pub enum ChannelSettings {
    Console,
    Email {
        to: String,
    },
    Webhook {
        url: String,
    },
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    /// A chat-bot webhook (DingTalk/Lark/WeCom-style) with an optional
    /// HMAC-SHA256 signature appended as `timestamp`/`sign` query params.
    ImGroupBot {
        url: String,
        hmac_secret: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    alert_type: &'a str,
    level: AlertLevel,
    title: &'a str,
    message: &'a str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a serde_json::Value>,
    #[serde(rename = "createdAt")]
    created_at: i64,
    timestamp: String,
}

impl<'a> WebhookPayload<'a> {
    fn from_alert(alert: &'a Alert) -> Self {
        let timestamp = Utc
            .timestamp_millis_opt(alert.created_at)
            .single()
            .unwrap_or_else(Utc::now)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            id: &alert.id,
            alert_type: &alert.alert_type,
            level: alert.level,
            title: &alert.title,
            message: &alert.message,
            source: &alert.source,
            data: alert.data.as_ref(),
            created_at: alert.created_at,
            timestamp,
        }
    }
}

pub struct Notifier {
    client: reqwest::Client,
    channels: Vec<ChannelConfig>,
}

impl Notifier {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            channels,
        }
    }

    /// Dispatches `alert` to every enabled channel whose `min_level` the
    /// alert's level meets or exceeds. Returns per-channel success, keyed by
    /// channel name; a channel that errors is recorded as `false` and does
    /// not prevent the others from being attempted.
    pub async fn send(&self, alert: &Alert) -> HashMap<SmolStr, bool> {
        let mut results = HashMap::new();
        for channel in &self.channels {
            if !channel.enabled || alert.level < channel.min_level {
                continue;
            }
            let ok = self.dispatch(channel, alert).await;
            if let Err(err) = &ok {
                tracing::warn!(channel = %channel.name, error = %err, "notification channel failed");
            }
            results.insert(channel.name.clone(), ok.is_ok());
        }
        results
    }

    async fn dispatch(&self, channel: &ChannelConfig, alert: &Alert) -> Result<(), crate::error::MonitorError> {
        use crate::error::MonitorError;
        match &channel.settings {
            ChannelSettings::Console => {
                match alert.level {
                    AlertLevel::Info => tracing::info!(alert = %alert.id, title = %alert.title, "{}", alert.message),
                    AlertLevel::Warning => tracing::warn!(alert = %alert.id, title = %alert.title, "{}", alert.message),
                    AlertLevel::Critical | AlertLevel::Emergency => {
                        tracing::error!(alert = %alert.id, title = %alert.title, "{}", alert.message)
                    }
                }
                Ok(())
            }
            ChannelSettings::Email { to } => {
                // No SMTP client exists anywhere in the corpus; logging the
                // composed message is the closest honest stand-in for a mail
                // transport this workspace can implement without inventing
                // a dependency.
                tracing::info!(to, alert = %alert.id, "would send email: {} — {}", alert.title, alert.message);
                Ok(())
            }
            ChannelSettings::Webhook { url } => {
                let payload = WebhookPayload::from_alert(alert);
                let resp = self
                    .client
                    .post(url)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|e| MonitorError::Transport(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(MonitorError::Transport(format!("webhook returned {}", resp.status())));
                }
                Ok(())
            }
            ChannelSettings::Telegram { bot_token, chat_id } => {
                let text = format!("[{:?}] {}\n{}", alert.level, alert.title, alert.message);
                let url = format!("https://api.telegram.org/bot{bot_token}/sendMessage");
                let resp = self
                    .client
                    .post(&url)
                    .json(&serde_json::json!({ "chat_id": chat_id, "text": text }))
                    .send()
                    .await
                    .map_err(|e| MonitorError::Transport(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(MonitorError::Transport(format!("telegram returned {}", resp.status())));
                }
                Ok(())
            }
            ChannelSettings::ImGroupBot { url, hmac_secret } => {
                let payload = WebhookPayload::from_alert(alert);
                let body = serde_json::json!({
                    "msgtype": "text",
                    "text": { "content": format!("{}\n{}", payload.title, payload.message) },
                });
                let target = match hmac_secret {
                    Some(secret) => {
                        let timestamp = alert.created_at;
                        let string_to_sign = format!("{timestamp}\n{secret}");
                        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
                            .expect("HMAC accepts a key of any size");
                        mac.update(string_to_sign.as_bytes());
                        let signature = BASE64.encode(mac.finalize().into_bytes());
                        let sign = urlencoding_encode(&signature);
                        format!("{url}{}timestamp={timestamp}&sign={sign}", if url.contains('?') { "&" } else { "?" })
                    }
                    None => url.clone(),
                };
                let resp = self
                    .client
                    .post(&target)
                    .json(&body)
                    .send()
                    .await
                    .map_err(|e| MonitorError::Transport(e.to_string()))?;
                if !resp.status().is_success() {
                    return Err(MonitorError::Transport(format!("group bot returned {}", resp.status())));
                }
                Ok(())
            }
        }
    }
}

/// Minimal percent-encoding for the base64 signature query param; avoids
/// pulling in a dedicated URL-encoding crate for one call site.
fn urlencoding_encode(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(level: AlertLevel) -> Alert {
        Alert {
            id: "a1".into(),
            alert_type: "margin".into(),
            level,
            title: "Margin low".into(),
            message: "margin ratio below threshold".into(),
            source: "risk".into(),
            created_at: 1_700_000_000_000,
            status: xchange_schema::AlertStatus::Active,
            silenced_until: None,
            acknowledged_at: None,
            resolved_at: None,
            data: None,
        }
    }

    #[tokio::test]
    async fn below_min_level_channels_are_skipped() {
        let notifier = Notifier::new(vec![ChannelConfig {
            name: "console-critical-only".into(),
            min_level: AlertLevel::Critical,
            enabled: true,
            settings: ChannelSettings::Console,
        }]);
        let results = notifier.send(&alert(AlertLevel::Warning)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn console_channel_always_succeeds() {
        let notifier = Notifier::new(vec![ChannelConfig {
            name: "console".into(),
            min_level: AlertLevel::Info,
            enabled: true,
            settings: ChannelSettings::Console,
        }]);
        let results = notifier.send(&alert(AlertLevel::Critical)).await;
        assert_eq!(results.get("console"), Some(&true));
    }

    #[tokio::test]
    async fn disabled_channel_is_never_attempted() {
        let notifier = Notifier::new(vec![ChannelConfig {
            name: "console".into(),
            min_level: AlertLevel::Info,
            enabled: false,
            settings: ChannelSettings::Console,
        }]);
        let results = notifier.send(&alert(AlertLevel::Critical)).await;
        assert!(results.is_empty());
    }

    #[test]
    fn group_bot_signature_is_percent_encoded() {
        let encoded = urlencoding_encode("a+b/c=");
        assert_eq!(encoded, "a%2Bb%2Fc%3D");
    }
}
