use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::thresholds::Bounds;

/// The vitals evaluated for alarms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Vital {
    HeartRate,
    Spo2,
    Systolic,
    Diastolic,
    Mean,
}

impl Vital {
    pub const ALL: [Vital; 5] = [
        Vital::HeartRate,
        Vital::Spo2,
        Vital::Systolic,
        Vital::Diastolic,
        Vital::Mean,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::HeartRate => "HR",
            Self::Spo2 => "SpO2",
            Self::Systolic => "SBP",
            Self::Diastolic => "DBP",
            Self::Mean => "MBP",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VitalState {
    Normal,
    Alarming,
    /// Zero or missing for longer than the grace window
    NotAvailable,
}

impl VitalState {
    pub fn is_alarming(&self) -> bool {
        matches!(self, Self::Alarming)
    }
}

/// Per-vital hysteresis: tracks how long a value has been unavailable
#[derive(Debug, Clone)]
pub struct VitalMonitor {
    state: VitalState,
    /// Last evaluation that carried a usable value
    last_seen: Option<Instant>,
    /// First missing evaluation when no value was ever seen
    missing_since: Option<Instant>,
    grace: Duration,
}

impl VitalMonitor {
    pub fn new(grace: Duration) -> Self {
        Self {
            state: VitalState::NotAvailable,
            last_seen: None,
            missing_since: None,
            grace,
        }
    }

    pub fn state(&self) -> VitalState {
        self.state
    }

    /// Feed the latest value. Zero counts as missing; the grace window runs
    /// from the last usable value.
    pub fn update(&mut self, value: Option<f64>, bounds: &Bounds, now: Instant) -> VitalState {
        match value.filter(|v| *v != 0.0 && v.is_finite()) {
            Some(v) => {
                self.last_seen = Some(now);
                self.missing_since = None;
                self.state = if bounds.contains(v) {
                    VitalState::Normal
                } else {
                    VitalState::Alarming
                };
            }
            None => {
                let since = match self.last_seen {
                    Some(seen) => seen,
                    None => *self.missing_since.get_or_insert(now),
                };
                if now.saturating_duration_since(since) >= self.grace {
                    self.state = VitalState::NotAvailable;
                }
            }
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_not_available() {
        let monitor = VitalMonitor::new(Duration::from_secs(3));
        assert_eq!(monitor.state(), VitalState::NotAvailable);
    }

    #[test]
    fn test_brief_dropout_keeps_state() {
        let bounds = Bounds::new(50.0, 120.0);
        let mut monitor = VitalMonitor::new(Duration::from_secs(3));
        let t0 = Instant::now();

        assert_eq!(monitor.update(Some(30.0), &bounds, t0), VitalState::Alarming);
        assert_eq!(
            monitor.update(Some(0.0), &bounds, t0 + Duration::from_secs(1)),
            VitalState::Alarming
        );
        assert_eq!(
            monitor.update(None, &bounds, t0 + Duration::from_millis(2500)),
            VitalState::Alarming
        );
        assert_eq!(
            monitor.update(None, &bounds, t0 + Duration::from_millis(3100)),
            VitalState::NotAvailable
        );
    }

    #[test]
    fn test_long_gap_between_updates_is_not_available() {
        let bounds = Bounds::new(50.0, 120.0);
        let mut monitor = VitalMonitor::new(Duration::from_secs(3));
        let t0 = Instant::now();

        assert_eq!(monitor.update(Some(70.0), &bounds, t0), VitalState::Normal);
        assert_eq!(
            monitor.update(None, &bounds, t0 + Duration::from_secs(60)),
            VitalState::NotAvailable
        );
    }
}
