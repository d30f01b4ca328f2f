use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use super::thresholds::{AlarmThresholds, Bounds, SharedThresholds};
use super::vital::{Vital, VitalMonitor, VitalState};

/// Latest vitals seen by the consumer; `None` when not yet known
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct VitalSigns {
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub mean: Option<f64>,
}

impl VitalSigns {
    pub fn get(&self, vital: Vital) -> Option<f64> {
        match vital {
            Vital::HeartRate => self.heart_rate,
            Vital::Spo2 => self.spo2,
            Vital::Systolic => self.systolic,
            Vital::Diastolic => self.diastolic,
            Vital::Mean => self.mean,
        }
    }
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmStatus {
    pub states: BTreeMap<Vital, VitalState>,
    pub alarm_required: bool,
}

impl AlarmStatus {
    pub fn state(&self, vital: Vital) -> VitalState {
        self.states
            .get(&vital)
            .copied()
            .unwrap_or(VitalState::NotAvailable)
    }
}

/// Evaluates all vitals against the shared thresholds
pub struct AlarmEngine {
    thresholds: SharedThresholds,
    monitors: BTreeMap<Vital, VitalMonitor>,
}

impl AlarmEngine {
    pub fn new(thresholds: SharedThresholds, grace: Duration) -> Self {
        let monitors = Vital::ALL
            .iter()
            .map(|vital| (*vital, VitalMonitor::new(grace)))
            .collect();
        Self {
            thresholds,
            monitors,
        }
    }

    pub fn thresholds(&self) -> &SharedThresholds {
        &self.thresholds
    }

    /// Alarm required is the OR of `Alarming` across vitals
    pub fn evaluate(&mut self, vitals: &VitalSigns, now: Instant) -> AlarmStatus {
        let limits = self.thresholds.get();
        let mut states = BTreeMap::new();

        for (vital, monitor) in self.monitors.iter_mut() {
            let bounds = bounds_for(&limits, *vital);
            states.insert(*vital, monitor.update(vitals.get(*vital), &bounds, now));
        }

        let alarm_required = states.values().any(VitalState::is_alarming);
        AlarmStatus {
            states,
            alarm_required,
        }
    }
}

fn bounds_for(limits: &AlarmThresholds, vital: Vital) -> Bounds {
    match vital {
        Vital::HeartRate => limits.heart_rate,
        Vital::Spo2 => limits.spo2,
        Vital::Systolic => limits.systolic,
        Vital::Diastolic => limits.diastolic,
        Vital::Mean => limits.mean,
    }
}
