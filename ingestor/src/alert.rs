use crate::cooldown::CooldownTracker;
use crate::metrics::{ALERTS_RAISED_TOTAL, ALERTS_SUPPRESSED_TOTAL, COOLDOWN_ENTRIES};
use crate::model::TelemetryRecord;
use crate::notify::{Notifier, NotifyOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const FIRE_RISK: &str = "FIRE_RISK";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertOutcome {
    NoRisk,
    /// Risk detected but the subject is still inside its cooldown window.
    Suppressed,
    Dispatched(NotifyOutcome),
}

/// Smoke, or a temperature strictly above the threshold.
pub fn is_fire_risk(record: &TelemetryRecord, threshold_c: f64) -> bool {
    record.smoke_detected || record.temperature_c.is_some_and(|t| t > threshold_c)
}

pub fn format_message(record: &TelemetryRecord) -> String {
    let temperature = record
        .temperature_c
        .map(|t| format!("{:.2}", t))
        .unwrap_or_else(|| "n/a".to_string());

    format!(
        "FIRE RISK DETECTED\nDevice EUI: {}\nSession Addr: {}\nTemp(C): {}\nSmoke: {}\n",
        record.device_eui.as_deref().unwrap_or("unknown"),
        record.node_id,
        temperature,
        record.smoke_detected
    )
}

/// Owns the cooldown state for the lifetime of the process.
pub struct AlertEvaluator {
    threshold_c: f64,
    cooldown: CooldownTracker,
    notifier: Arc<dyn Notifier>,
}

impl AlertEvaluator {
    pub fn new(threshold_c: f64, cooldown: CooldownTracker, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            threshold_c,
            cooldown,
            notifier,
        }
    }

    pub fn threshold_c(&self) -> f64 {
        self.threshold_c
    }

    /// The cooldown window is consumed before delivery is attempted, so a
    /// failed delivery still silences the subject for one window.
    pub async fn evaluate(&self, record: &TelemetryRecord) -> AlertOutcome {
        if !is_fire_risk(record, self.threshold_c) {
            return AlertOutcome::NoRisk;
        }

        let subject = record.alert_subject();
        if !self.cooldown.allow(subject, FIRE_RISK) {
            ALERTS_SUPPRESSED_TOTAL.inc();
            debug!("Fire risk for {} suppressed by cooldown", subject);
            return AlertOutcome::Suppressed;
        }
        ALERTS_RAISED_TOTAL.inc();
        COOLDOWN_ENTRIES.set(self.cooldown.len() as f64);

        info!(
            "Fire risk for {} (node {}, temp {:?}, smoke {})",
            subject, record.node_id, record.temperature_c, record.smoke_detected
        );
        let outcome = self.notifier.notify(&format_message(record)).await;
        AlertOutcome::Dispatched(outcome)
    }

    pub fn sweep_cooldowns(&self, retain: Duration) -> usize {
        let removed = self.cooldown.sweep(retain);
        COOLDOWN_ENTRIES.set(self.cooldown.len() as f64);
        removed
    }

    pub fn cooldown_window(&self) -> Duration {
        self.cooldown.window()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const THRESHOLD: f64 = 70.0;

    /// Records every message instead of delivering it.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub messages: Mutex<Vec<String>>,
        pub outcome: Option<NotifyOutcome>,
    }

    impl RecordingNotifier {
        pub fn failing() -> Self {
            Self {
                messages: Mutex::new(Vec::new()),
                outcome: Some(NotifyOutcome::Failed("connection refused".to_string())),
            }
        }

        pub fn sent(&self) -> Vec<String> {
            self.messages.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, message: &str) -> NotifyOutcome {
            self.messages.lock().unwrap().push(message.to_string());
            self.outcome.clone().unwrap_or(NotifyOutcome::Sent)
        }
    }

    fn reading(eui: &str, temperature_c: Option<f64>, smoke: bool) -> TelemetryRecord {
        let mut record = TelemetryRecord::new("01ab23cd");
        record.device_eui = Some(eui.to_string());
        record.temperature_c = temperature_c;
        record.smoke_detected = smoke;
        record
    }

    fn evaluator(notifier: Arc<RecordingNotifier>) -> AlertEvaluator {
        AlertEvaluator::new(
            THRESHOLD,
            CooldownTracker::new(Duration::from_secs(300)),
            notifier,
        )
    }

    #[test]
    fn test_threshold_is_strict() {
        assert!(!is_fire_risk(&reading("a", Some(70.0), false), THRESHOLD));
        assert!(is_fire_risk(&reading("a", Some(71.0), false), THRESHOLD));
        assert!(is_fire_risk(&reading("a", Some(70.01), false), THRESHOLD));
    }

    #[test]
    fn test_null_temperature() {
        assert!(!is_fire_risk(&reading("a", None, false), THRESHOLD));
        assert!(is_fire_risk(&reading("a", None, true), THRESHOLD));
    }

    #[test]
    fn test_message_contents() {
        let mut record = reading("70b3d57ed0000001", Some(90.0), true);
        let message = format_message(&record);
        assert!(message.contains("Device EUI: 70b3d57ed0000001"));
        assert!(message.contains("Session Addr: 01ab23cd"));
        assert!(message.contains("Temp(C): 90.00"));
        assert!(message.contains("Smoke: true"));

        record.device_eui = None;
        record.temperature_c = None;
        let message = format_message(&record);
        assert!(message.contains("Device EUI: unknown"));
        assert!(message.contains("Temp(C): n/a"));
    }

    #[tokio::test]
    async fn test_cooldown_suppresses_repeat() {
        let notifier = Arc::new(RecordingNotifier::default());
        let evaluator = evaluator(notifier.clone());
        let hot = reading("eui-1", Some(90.0), false);

        assert_eq!(
            evaluator.evaluate(&hot).await,
            AlertOutcome::Dispatched(NotifyOutcome::Sent)
        );
        assert_eq!(evaluator.evaluate(&hot).await, AlertOutcome::Suppressed);
        assert_eq!(
            evaluator.evaluate(&reading("eui-1", Some(20.0), false)).await,
            AlertOutcome::NoRisk
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_subject_is_device_eui_not_session_addr() {
        let notifier = Arc::new(RecordingNotifier::default());
        let evaluator = evaluator(notifier.clone());

        // Same session address, two different devices.
        evaluator.evaluate(&reading("eui-1", None, true)).await;
        evaluator.evaluate(&reading("eui-2", None, true)).await;
        assert_eq!(notifier.sent().len(), 2);

        // Same device after a re-join under a new session address.
        let mut rejoined = reading("eui-1", None, true);
        rejoined.node_id = "99ff0000".to_string();
        assert_eq!(evaluator.evaluate(&rejoined).await, AlertOutcome::Suppressed);
    }

    #[tokio::test]
    async fn test_failed_delivery_still_consumes_window() {
        let notifier = Arc::new(RecordingNotifier::failing());
        let evaluator = evaluator(notifier.clone());
        let smoky = reading("eui-1", None, true);

        assert!(matches!(
            evaluator.evaluate(&smoky).await,
            AlertOutcome::Dispatched(NotifyOutcome::Failed(_))
        ));
        assert_eq!(evaluator.evaluate(&smoky).await, AlertOutcome::Suppressed);
        assert_eq!(notifier.sent().len(), 1);
    }
}
