use std::collections::BTreeMap;

use crate::buffers::SampledDataBuffer;
use crate::core::{channels, CondensedReading};

/// Hook run on every non-empty reading after the ring buffers are updated.
/// Returned keys are merged into the reading's extras.
pub trait PostProcessor: Send {
    fn name(&self) -> &str;

    fn process(
        &mut self,
        sampled_data: &BTreeMap<String, SampledDataBuffer>,
        reading: &CondensedReading,
    ) -> BTreeMap<String, f64>;
}

/// PPG signal quality index written as `qos` (1.0 good, 0.0 poor).
///
/// Poor means the recent Pleth history is mostly flat or its swing is too
/// small to carry a pulse.
#[derive(Debug, Clone)]
pub struct PlethQuality {
    /// Seconds of history inspected
    pub window_secs: f64,
    pub min_amplitude: f64,
    /// Largest tolerated share of zero first differences
    pub max_flat_ratio: f64,
}

impl Default for PlethQuality {
    fn default() -> Self {
        Self {
            window_secs: 4.0,
            min_amplitude: 50.0,
            max_flat_ratio: 0.5,
        }
    }
}

impl PlethQuality {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_good_quality(&self, samples: &[f64]) -> bool {
        if samples.len() < 2 {
            return false;
        }

        let (min, max) = samples
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(*v), hi.max(*v))
            });
        if max - min < self.min_amplitude {
            return false;
        }

        let flat = samples.windows(2).filter(|w| w[0] == w[1]).count();
        (flat as f64 / (samples.len() - 1) as f64) <= self.max_flat_ratio
    }
}

impl PostProcessor for PlethQuality {
    fn name(&self) -> &str {
        "qos"
    }

    fn process(
        &mut self,
        sampled_data: &BTreeMap<String, SampledDataBuffer>,
        _reading: &CondensedReading,
    ) -> BTreeMap<String, f64> {
        let mut out = BTreeMap::new();
        let Some(pleth) = sampled_data.get(channels::PLETH) else {
            return out;
        };
        if pleth.is_empty() {
            return out;
        }

        let values = pleth.values();
        let take = ((self.window_secs * pleth.frequency() as f64) as usize).clamp(2, values.len().max(2));
        let recent = &values[values.len().saturating_sub(take)..];

        let score = if self.is_good_quality(recent) { 1.0 } else { 0.0 };
        out.insert("qos".to_string(), score);
        out
    }
}
