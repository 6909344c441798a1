//! Fingerprint-deduplicated alerts with a graded-threshold evaluator and a
//! lifecycle state machine (`active → acknowledged/silenced → resolved`).

use crate::error::MonitorError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use smol_str::SmolStr;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use xchange_schema::{Alert, AlertLevel, AlertStatus};

#[derive(Debug, Clone)]
pub struct AlertEngineConfig {
    pub dedupe_window_ms: i64,
    pub max_alert_history: usize,
}

impl Default for AlertEngineConfig {
    fn default() -> Self {
        Self {
            dedupe_window_ms: 5 * 60_000,
            max_alert_history: 10_000,
        }
    }
}

struct Inner {
    alerts: HashMap<SmolStr, Alert>,
    /// fingerprint → id of the alert it last produced, plus when.
    last_fired: HashMap<String, (SmolStr, i64)>,
    /// graded-threshold key → current severity level (0 = not breached).
    threshold_levels: HashMap<String, u8>,
    insertion_order: Vec<SmolStr>,
}

pub struct AlertEngine {
    config: AlertEngineConfig,
    inner: Mutex<Inner>,
    id_counter: AtomicU64,
}

impl AlertEngine {
    pub fn new(config: AlertEngineConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                alerts: HashMap::new(),
                last_fired: HashMap::new(),
                threshold_levels: HashMap::new(),
                insertion_order: Vec::new(),
            }),
            id_counter: AtomicU64::new(0),
        }
    }

    fn next_id(&self, now_ms: i64) -> SmolStr {
        let seq = self.id_counter.fetch_add(1, Ordering::Relaxed);
        SmolStr::new(format!("{now_ms:x}-{seq:x}"))
    }

    /// Fires (or returns the still-deduplicated existing) alert for
    /// `(alert_type, level, title, source)`.
    #[allow(clippy::too_many_arguments)]
    pub fn alert(
        &self,
        now_ms: i64,
        alert_type: impl Into<SmolStr>,
        level: AlertLevel,
        title: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<SmolStr>,
        data: Option<serde_json::Value>,
    ) -> Alert {
        let alert_type = alert_type.into();
        let title = title.into();
        let source = source.into();
        let fingerprint = format!("{alert_type}|{level}|{title}|{source}");

        let mut inner = self.inner.lock();
        if let Some((existing_id, fired_at)) = inner.last_fired.get(&fingerprint).cloned() {
            if now_ms - fired_at < self.config.dedupe_window_ms {
                if let Some(existing) = inner.alerts.get(&existing_id) {
                    return existing.clone();
                }
            }
        }

        let id = self.next_id(now_ms);
        let alert = Alert {
            id: id.clone(),
            alert_type,
            level,
            title,
            message: message.into(),
            source,
            created_at: now_ms,
            status: AlertStatus::Active,
            silenced_until: None,
            acknowledged_at: None,
            resolved_at: None,
            data,
        };
        inner.alerts.insert(id.clone(), alert.clone());
        inner.insertion_order.push(id.clone());
        inner.last_fired.insert(fingerprint, (id, now_ms));
        evict_oldest_resolved(&mut inner, self.config.max_alert_history);
        alert
    }

    /// `k` = the count of `thresholds` (passed descending) that `value` is
    /// below. Returns `Some(k)` only when `k` is a strictly new maximum
    /// severity for `key`; returns `None` on no-escalation or on recovery to
    /// `k == 0` (the recorded level is cleared, but no alert fires for a
    /// recovery — the caller decides whether to announce that separately).
    pub fn evaluate_graded_threshold(&self, key: &str, thresholds: &[Decimal], value: Decimal) -> Option<u8> {
        let k = thresholds.iter().filter(|t| value < **t).count() as u8;
        let mut inner = self.inner.lock();
        let last = inner.threshold_levels.get(key).copied().unwrap_or(0);
        if k == 0 {
            inner.threshold_levels.remove(key);
            return None;
        }
        if k > last {
            inner.threshold_levels.insert(key.to_string(), k);
            return Some(k);
        }
        None
    }

    pub fn get(&self, id: &str) -> Option<Alert> {
        self.inner.lock().alerts.get(id).cloned()
    }

    pub fn ack(&self, id: &str, now_ms: i64) -> Result<Alert, MonitorError> {
        self.transition(id, |a| {
            if a.status != AlertStatus::Active {
                return Err(MonitorError::InvalidTransition(format!(
                    "cannot acknowledge alert in status {:?}",
                    a.status
                )));
            }
            a.status = AlertStatus::Acknowledged;
            a.acknowledged_at = Some(now_ms);
            Ok(())
        })
    }

    pub fn resolve(&self, id: &str, now_ms: i64) -> Result<Alert, MonitorError> {
        self.transition(id, |a| {
            if !matches!(a.status, AlertStatus::Active | AlertStatus::Acknowledged) {
                return Err(MonitorError::InvalidTransition(format!(
                    "cannot resolve alert in status {:?}",
                    a.status
                )));
            }
            a.status = AlertStatus::Resolved;
            a.resolved_at = Some(now_ms);
            Ok(())
        })
    }

    pub fn silence(&self, id: &str, duration_ms: i64, now_ms: i64) -> Result<Alert, MonitorError> {
        self.transition(id, |a| {
            if a.status != AlertStatus::Active {
                return Err(MonitorError::InvalidTransition(format!(
                    "cannot silence alert in status {:?}",
                    a.status
                )));
            }
            a.status = AlertStatus::Silenced;
            a.silenced_until = Some(now_ms + duration_ms);
            Ok(())
        })
    }

    /// Returns silenced alerts whose `silenced_until` has elapsed, back to
    /// `active`.
    pub fn sweep_silenced(&self, now_ms: i64) -> Vec<Alert> {
        let mut inner = self.inner.lock();
        let mut woken = Vec::new();
        for alert in inner.alerts.values_mut() {
            if alert.status == AlertStatus::Silenced {
                if let Some(until) = alert.silenced_until {
                    if until < now_ms {
                        alert.status = AlertStatus::Active;
                        alert.silenced_until = None;
                        woken.push(alert.clone());
                    }
                }
            }
        }
        woken
    }

    fn transition(&self, id: &str, f: impl FnOnce(&mut Alert) -> Result<(), MonitorError>) -> Result<Alert, MonitorError> {
        let mut inner = self.inner.lock();
        let alert = inner
            .alerts
            .get_mut(id)
            .ok_or_else(|| MonitorError::AlertNotFound(id.to_string()))?;
        f(alert)?;
        Ok(alert.clone())
    }
}

fn evict_oldest_resolved(inner: &mut Inner, max_alert_history: usize) {
    if inner.alerts.len() <= max_alert_history {
        return;
    }
    let mut resolved_ids: Vec<SmolStr> = inner
        .insertion_order
        .iter()
        .filter(|id| {
            inner
                .alerts
                .get(*id)
                .map(|a| a.status == AlertStatus::Resolved)
                .unwrap_or(false)
        })
        .cloned()
        .collect();

    let mut to_evict = inner.alerts.len() - max_alert_history;
    resolved_ids.truncate(to_evict.min(resolved_ids.len()));
    for id in &resolved_ids {
        inner.alerts.remove(id);
        to_evict -= 1;
    }
    inner.insertion_order.retain(|id| inner.alerts.contains_key(id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn identical_fingerprint_within_window_yields_one_notification_dispatch() {
        let engine = AlertEngine::new(AlertEngineConfig::default());
        let a = engine.alert(0, "margin", AlertLevel::Warning, "Margin low", "m1", "risk", None);
        let b = engine.alert(1_000, "margin", AlertLevel::Warning, "Margin low", "m2", "risk", None);
        assert_eq!(a.id, b.id);
        assert_eq!(b.message, "m1");
    }

    #[test]
    fn fingerprint_refires_once_dedupe_window_elapses() {
        let engine = AlertEngine::new(AlertEngineConfig {
            dedupe_window_ms: 1_000,
            ..Default::default()
        });
        let a = engine.alert(0, "margin", AlertLevel::Warning, "Margin low", "m1", "risk", None);
        let b = engine.alert(2_000, "margin", AlertLevel::Warning, "Margin low", "m2", "risk", None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn graded_threshold_fires_only_on_strict_escalation() {
        let engine = AlertEngine::new(AlertEngineConfig::default());
        let thresholds = [dec!(0.5), dec!(0.3), dec!(0.1)];
        assert_eq!(engine.evaluate_graded_threshold("acct", &thresholds, dec!(0.6)), None);
        assert_eq!(engine.evaluate_graded_threshold("acct", &thresholds, dec!(0.4)), Some(1));
        assert_eq!(engine.evaluate_graded_threshold("acct", &thresholds, dec!(0.45)), None);
        assert_eq!(engine.evaluate_graded_threshold("acct", &thresholds, dec!(0.2)), Some(2));
        assert_eq!(engine.evaluate_graded_threshold("acct", &thresholds, dec!(0.6)), None);
    }

    #[test]
    fn lifecycle_transitions_reject_invalid_states() {
        let engine = AlertEngine::new(AlertEngineConfig::default());
        let alert = engine.alert(0, "margin", AlertLevel::Critical, "t", "m", "risk", None);
        engine.resolve(&alert.id, 10).unwrap();
        assert!(engine.ack(&alert.id, 20).is_err());
    }

    #[test]
    fn silenced_alert_returns_to_active_after_duration_elapses() {
        let engine = AlertEngine::new(AlertEngineConfig::default());
        let alert = engine.alert(0, "margin", AlertLevel::Warning, "t", "m", "risk", None);
        engine.silence(&alert.id, 100, 0).unwrap();
        assert!(engine.sweep_silenced(50).is_empty());
        let woken = engine.sweep_silenced(200);
        assert_eq!(woken.len(), 1);
        assert_eq!(woken[0].status, AlertStatus::Active);
    }
}
