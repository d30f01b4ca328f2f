use std::collections::VecDeque;

/// Fixed-length estimation window fed from a sampled-data buffer.
///
/// Starts all-missing (values `None`, times 0.0). Only samples strictly
/// newer than the window's last time are merged, so repeated merges from
/// the same ring never duplicate data.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    times: VecDeque<f64>,
    values: VecDeque<Option<f64>>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            times: std::iter::repeat(0.0).take(capacity).collect(),
            values: std::iter::repeat(None).take(capacity).collect(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last_time(&self) -> f64 {
        self.times.back().copied().unwrap_or(0.0)
    }

    /// Merge (time, value) samples ordered oldest first; returns how many were taken
    pub fn merge_newer<I>(&mut self, samples: I) -> usize
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut merged = 0;
        for (time, value) in samples {
            if time <= self.last_time() {
                continue;
            }
            self.times.pop_front();
            self.values.pop_front();
            self.times.push_back(time);
            self.values.push_back(Some(value));
            merged += 1;
        }
        merged
    }

    /// True once every slot holds a value
    pub fn is_complete(&self) -> bool {
        self.values.iter().all(Option::is_some)
    }

    pub fn times(&self) -> Vec<f64> {
        self.times.iter().copied().collect()
    }

    pub fn values(&self) -> Vec<Option<f64>> {
        self.values.iter().copied().collect()
    }
}
