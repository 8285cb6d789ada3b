use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Rate limiter for outbound alerts, keyed by (subject, alert kind).
///
/// Only calls that are let through reset the window; rejected calls leave
/// the stored instant alone. State lives in memory only, so a restart
/// makes every key eligible again.
pub struct CooldownTracker {
    window: Duration,
    last_allowed: Mutex<HashMap<(String, String), Instant>>,
}

impl CooldownTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_allowed: Mutex::new(HashMap::new()),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub fn allow(&self, subject: &str, kind: &str) -> bool {
        self.allow_at(subject, kind, Instant::now())
    }

    /// The check and the update happen under one lock, so two concurrent
    /// callers for the same key can never both be allowed.
    pub fn allow_at(&self, subject: &str, kind: &str, now: Instant) -> bool {
        let mut entries = self.last_allowed.lock().unwrap_or_else(|e| e.into_inner());
        let key = (subject.to_string(), kind.to_string());

        let allowed = match entries.get(&key) {
            None => true,
            Some(last) => now.saturating_duration_since(*last) > self.window,
        };
        if allowed {
            entries.insert(key, now);
        }
        allowed
    }

    /// Drops entries older than `retain`. Anything older than one window
    /// already allows, so a `retain` of at least `window` does not change
    /// which calls get through. Returns the number of removed entries.
    pub fn sweep_at(&self, now: Instant, retain: Duration) -> usize {
        let mut entries = self.last_allowed.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, last| now.saturating_duration_since(*last) <= retain);
        before - entries.len()
    }

    pub fn sweep(&self, retain: Duration) -> usize {
        self.sweep_at(Instant::now(), retain)
    }

    pub fn len(&self) -> usize {
        self.last_allowed
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    const WINDOW: Duration = Duration::from_secs(300);

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    #[test]
    fn test_window_resets_only_on_allow() {
        let tracker = CooldownTracker::new(WINDOW);
        let t0 = Instant::now();

        assert!(tracker.allow_at("eui-1", "FIRE_RISK", t0));
        assert!(!tracker.allow_at("eui-1", "FIRE_RISK", t0 + secs(1)));
        assert!(!tracker.allow_at("eui-1", "FIRE_RISK", t0 + secs(200)));
        // Rejected calls did not move the window.
        assert!(tracker.allow_at("eui-1", "FIRE_RISK", t0 + secs(301)));
        assert!(!tracker.allow_at("eui-1", "FIRE_RISK", t0 + secs(302)));
    }

    #[test]
    fn test_exact_window_is_still_suppressed() {
        let tracker = CooldownTracker::new(WINDOW);
        let t0 = Instant::now();

        assert!(tracker.allow_at("eui-1", "FIRE_RISK", t0));
        assert!(!tracker.allow_at("eui-1", "FIRE_RISK", t0 + WINDOW));
        assert!(tracker.allow_at("eui-1", "FIRE_RISK", t0 + WINDOW + Duration::from_millis(1)));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = CooldownTracker::new(WINDOW);
        let t0 = Instant::now();

        assert!(tracker.allow_at("eui-1", "FIRE_RISK", t0));
        assert!(tracker.allow_at("eui-2", "FIRE_RISK", t0));
        assert!(tracker.allow_at("eui-1", "LOW_BATTERY", t0));
        assert_eq!(tracker.len(), 3);
    }

    #[test]
    fn test_sweep_removes_only_stale_entries() {
        let tracker = CooldownTracker::new(WINDOW);
        let t0 = Instant::now();

        tracker.allow_at("old", "FIRE_RISK", t0);
        tracker.allow_at("fresh", "FIRE_RISK", t0 + secs(500));

        let removed = tracker.sweep_at(t0 + secs(700), secs(600));
        assert_eq!(removed, 1);
        assert_eq!(tracker.len(), 1);
        assert!(!tracker.allow_at("fresh", "FIRE_RISK", t0 + secs(700)));
        assert!(tracker.allow_at("old", "FIRE_RISK", t0 + secs(700)));
    }

    #[test]
    fn test_concurrent_callers_allow_once() {
        let tracker = Arc::new(CooldownTracker::new(WINDOW));
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.allow_at("eui-1", "FIRE_RISK", now))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 1);
    }
}
