use std::time::SystemTime;

use crate::core::clock::seconds_since;

/// Fixed-capacity time series of (relative time, value) pairs for one channel.
///
/// Capacity is `frequency * duration_secs`. Each append overwrites the oldest
/// entries in place (array + write cursor), so the length never changes once
/// constructed. Times are seconds relative to the first timestamp ever
/// appended and never decrease.
#[derive(Debug, Clone)]
pub struct SampledDataBuffer {
    frequency: u32,
    values: Vec<f64>,
    times: Vec<f64>,
    /// Oldest slot, which is also the next slot written
    cursor: usize,
    start_time: SystemTime,
    t1: Option<f64>,
    reordered: u64,
}

impl SampledDataBuffer {
    pub fn new(frequency: u32, duration_secs: u32) -> Self {
        Self::with_start_time(frequency, duration_secs, SystemTime::now())
    }

    /// Construct with an explicit clock origin
    pub fn with_start_time(frequency: u32, duration_secs: u32, start_time: SystemTime) -> Self {
        let capacity = (frequency as usize * duration_secs as usize).max(1);
        Self {
            frequency: frequency.max(1),
            values: vec![0.0; capacity],
            times: vec![0.0; capacity],
            cursor: 0,
            start_time,
            t1: None,
            reordered: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    /// Always equal to capacity
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.t1.is_none()
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Samples whose time had to be raised to keep the series non-decreasing
    pub fn reordered_samples(&self) -> u64 {
        self.reordered
    }

    /// Append a run of samples taken at `t0`.
    ///
    /// A single value is stored at `t0`; a run of `n` values is spread evenly
    /// over `[t0, t0 + n / frequency]`. Empty input is ignored.
    pub fn append(&mut self, t0: SystemTime, values: &[f64]) {
        if values.is_empty() {
            return;
        }

        let absolute = seconds_since(self.start_time, t0);
        let t1 = *self.t1.get_or_insert(absolute);
        let t0 = absolute - t1;

        let n = values.len();
        let step = if n > 1 {
            (n as f64 / self.frequency as f64) / (n - 1) as f64
        } else {
            0.0
        };

        // Only the newest `capacity` values can survive this append
        let skip = n.saturating_sub(self.capacity());
        for (i, value) in values.iter().enumerate().skip(skip) {
            self.push(t0 + step * i as f64, *value);
        }
    }

    fn push(&mut self, time: f64, value: f64) {
        let floor = self.latest_time();
        let time = if time < floor {
            self.reordered += 1;
            floor
        } else {
            time
        };

        self.values[self.cursor] = value;
        self.times[self.cursor] = time;
        self.cursor = (self.cursor + 1) % self.capacity();
    }

    fn newest_index(&self) -> usize {
        (self.cursor + self.capacity() - 1) % self.capacity()
    }

    /// Time of the newest slot (0.0 before the first append)
    pub fn latest_time(&self) -> f64 {
        self.times[self.newest_index()]
    }

    pub fn latest(&self) -> Option<(f64, f64)> {
        self.t1.map(|_| {
            let i = self.newest_index();
            (self.times[i], self.values[i])
        })
    }

    /// (time, value) pairs from oldest to newest
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let capacity = self.capacity();
        (0..capacity).map(move |offset| {
            let i = (self.cursor + offset) % capacity;
            (self.times[i], self.values[i])
        })
    }

    pub fn values(&self) -> Vec<f64> {
        self.iter().map(|(_, v)| v).collect()
    }

    pub fn times(&self) -> Vec<f64> {
        self.iter().map(|(t, _)| t).collect()
    }

    /// Samples strictly newer than `time`, oldest first
    pub fn samples_after(&self, time: f64) -> Vec<(f64, f64)> {
        self.iter().filter(|(t, _)| *t > time).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn origin() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
    }

    #[test]
    fn test_capacity_from_frequency_and_duration() {
        let buffer = SampledDataBuffer::new(128, 7);
        assert_eq!(buffer.capacity(), 896);
        assert_eq!(buffer.len(), 896);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_first_append_anchors_at_zero() {
        let start = origin();
        let mut buffer = SampledDataBuffer::with_start_time(4, 2, start);

        buffer.append(start + Duration::from_secs(30), &[1.0, 2.0, 3.0, 4.0]);

        let times = buffer.times();
        assert_eq!(&times[4..], &[0.0, 1.0 / 3.0, 2.0 / 3.0, 1.0]);
        assert_eq!(&buffer.values()[4..], &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_scalar_lands_at_t0() {
        let start = origin();
        let mut buffer = SampledDataBuffer::with_start_time(1, 4, start);

        buffer.append(start, &[70.0]);
        buffer.append(start + Duration::from_secs(2), &[72.0]);

        assert_eq!(buffer.latest(), Some((2.0, 72.0)));
    }

    #[test]
    fn test_oversized_batch_keeps_newest() {
        let start = origin();
        let mut buffer = SampledDataBuffer::with_start_time(2, 2, start);

        buffer.append(start, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        assert_eq!(buffer.values(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_late_sample_is_clamped() {
        let start = origin();
        let mut buffer = SampledDataBuffer::with_start_time(1, 3, start);

        buffer.append(start + Duration::from_secs(5), &[1.0]);
        buffer.append(start + Duration::from_secs(3), &[2.0]);

        assert_eq!(buffer.latest(), Some((0.0, 2.0)));
        assert_eq!(buffer.reordered_samples(), 1);
    }
}
