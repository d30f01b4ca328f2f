use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Inclusive acceptable range for one vital; a missing side is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub low: Option<f64>,
    pub high: Option<f64>,
}

impl Bounds {
    pub fn new(low: f64, high: f64) -> Self {
        Self {
            low: Some(low),
            high: Some(high),
        }
    }

    pub fn low_only(low: f64) -> Self {
        Self {
            low: Some(low),
            high: None,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.low.map_or(true, |low| value >= low) && self.high.map_or(true, |high| value <= high)
    }
}

/// Alarm limits per vital. SpO2 only has a lower limit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmThresholds {
    pub heart_rate: Bounds,
    pub spo2: Bounds,
    pub systolic: Bounds,
    pub diastolic: Bounds,
    pub mean: Bounds,
}

impl Default for AlarmThresholds {
    fn default() -> Self {
        Self {
            heart_rate: Bounds::new(50.0, 120.0),
            spo2: Bounds::low_only(90.0),
            systolic: Bounds::new(90.0, 160.0),
            diastolic: Bounds::new(50.0, 100.0),
            mean: Bounds::new(65.0, 110.0),
        }
    }
}

/// Thresholds shared between the operator surface and the consumer stage.
///
/// Last writer wins; readers always see a whole record.
#[derive(Debug, Clone, Default)]
pub struct SharedThresholds {
    inner: Arc<RwLock<AlarmThresholds>>,
}

impl SharedThresholds {
    pub fn new(thresholds: AlarmThresholds) -> Self {
        Self {
            inner: Arc::new(RwLock::new(thresholds)),
        }
    }

    pub fn get(&self) -> AlarmThresholds {
        *self
            .inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set(&self, thresholds: AlarmThresholds) {
        *self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = thresholds;
    }

    /// Edit the current thresholds in place
    pub fn update(&self, f: impl FnOnce(&mut AlarmThresholds)) {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard);
    }
}
