//! Predator classification over detection snapshots

use super::{DetectedObject, TelemetrySnapshot};
use std::time::{Duration, Instant};

/// Detector classes treated as a threat to the flock
pub const PREDATOR_CLASSES: &[&str] = &[
    "cat", "dog", "bird", "bear", "mouse", "snake", "rat", "cow", "horse",
];

/// Confidence (percent) required before an alert fires
pub const ALERT_MIN_CONFIDENCE: f64 = 80.0;

/// Minimum spacing between alerts
pub const ALERT_COOLDOWN: Duration = Duration::from_secs(10);

pub fn is_predator(class: &str) -> bool {
    PREDATOR_CLASSES
        .iter()
        .any(|p| p.eq_ignore_ascii_case(class.trim()))
}

/// Highest-confidence predator at or above `min_confidence`
pub fn strongest_predator(
    snapshot: &TelemetrySnapshot,
    min_confidence: f64,
) -> Option<&DetectedObject> {
    snapshot
        .objects
        .iter()
        .filter(|obj| is_predator(&obj.class) && obj.confidence >= min_confidence)
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
}

/// Rate-limited predator alert
#[derive(Debug, Clone)]
pub struct PredatorAlert {
    min_confidence: f64,
    cooldown: Duration,
    last_fired: Option<Instant>,
}

impl Default for PredatorAlert {
    fn default() -> Self {
        Self::new(ALERT_MIN_CONFIDENCE, ALERT_COOLDOWN)
    }
}

impl PredatorAlert {
    pub fn new(min_confidence: f64, cooldown: Duration) -> Self {
        Self {
            min_confidence,
            cooldown,
            last_fired: None,
        }
    }

    /// Return the predator to alert on, if any and not cooling down
    pub fn check(&mut self, snapshot: &TelemetrySnapshot, now: Instant) -> Option<DetectedObject> {
        let predator = strongest_predator(snapshot, self.min_confidence)?;
        if let Some(last) = self.last_fired {
            if now.saturating_duration_since(last) < self.cooldown {
                return None;
            }
        }
        self.last_fired = Some(now);
        Some(predator.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(objects: &[(&str, f64)]) -> TelemetrySnapshot {
        TelemetrySnapshot {
            objects: objects
                .iter()
                .map(|(class, confidence)| DetectedObject {
                    class: class.to_string(),
                    confidence: *confidence,
                    bbox: None,
                })
                .collect(),
            fps: 10.0,
            count: objects.len() as u32,
            timestamp: None,
        }
    }

    #[test]
    fn test_is_predator_ignores_case() {
        assert!(is_predator("Cat"));
        assert!(is_predator("SNAKE"));
        assert!(!is_predator("person"));
        assert!(!is_predator("chicken"));
    }

    #[test]
    fn test_strongest_predator_picks_highest() {
        let s = snap(&[("person", 99.0), ("dog", 85.0), ("cat", 92.5), ("rat", 60.0)]);
        assert_eq!(strongest_predator(&s, 70.0).unwrap().class, "cat");
        assert!(strongest_predator(&s, 95.0).is_none());
    }

    #[test]
    fn test_alert_respects_threshold() {
        let mut alert = PredatorAlert::default();
        let now = Instant::now();
        assert!(alert.check(&snap(&[("dog", 79.9)]), now).is_none());
        assert_eq!(alert.check(&snap(&[("dog", 80.0)]), now).unwrap().class, "dog");
    }

    #[test]
    fn test_alert_cooldown() {
        let mut alert = PredatorAlert::default();
        let t0 = Instant::now();
        let s = snap(&[("bear", 97.0)]);

        assert!(alert.check(&s, t0).is_some());
        assert!(alert.check(&s, t0 + Duration::from_secs(5)).is_none());
        assert!(alert.check(&s, t0 + Duration::from_secs(10)).is_some());
        assert!(alert.check(&s, t0 + Duration::from_secs(12)).is_none());
    }

    #[test]
    fn test_quiet_frames_do_not_consume_cooldown() {
        let mut alert = PredatorAlert::default();
        let t0 = Instant::now();
        assert!(alert.check(&snap(&[("person", 99.0)]), t0).is_none());
        assert!(alert
            .check(&snap(&[("snake", 88.0)]), t0 + Duration::from_secs(1))
            .is_some());
    }
}
