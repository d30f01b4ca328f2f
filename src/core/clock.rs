use std::time::{Duration, SystemTime};

/// Monitor relative time advances at 8000 ticks per second
pub const TICKS_PER_SECOND: u32 = 8000;

pub fn ticks_to_duration(ticks: u32) -> Duration {
    Duration::from_secs_f64(ticks as f64 / TICKS_PER_SECOND as f64)
}

pub fn duration_to_ticks(duration: Duration) -> u32 {
    let ticks = duration.as_secs_f64() * TICKS_PER_SECOND as f64;
    ticks.min(u32::MAX as f64) as u32
}

/// Absolute/relative time markers captured from the MDS Create Event
///
/// Poll replies only carry relative time; this anchors them to wall time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorClock {
    pub absolute: SystemTime,
    pub relative: u32,
}

impl MonitorClock {
    pub fn new(absolute: SystemTime, relative: u32) -> Self {
        Self { absolute, relative }
    }

    /// Wall time for a reply stamped with `relative` ticks
    pub fn timestamp_for(&self, relative: u32) -> SystemTime {
        if relative >= self.relative {
            self.absolute + ticks_to_duration(relative - self.relative)
        } else {
            self.absolute - ticks_to_duration(self.relative - relative)
        }
    }
}

/// Signed seconds from `origin` to `t`
pub fn seconds_since(origin: SystemTime, t: SystemTime) -> f64 {
    match t.duration_since(origin) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamp_for_relative_offsets() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = MonitorClock::new(base, 80_000);

        assert_eq!(clock.timestamp_for(88_000), base + Duration::from_secs(1));
        assert_eq!(clock.timestamp_for(72_000), base - Duration::from_secs(1));
    }

    #[test]
    fn test_seconds_since_is_signed() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(10);
        assert_eq!(seconds_since(base, base + Duration::from_millis(500)), 0.5);
        assert_eq!(seconds_since(base, base - Duration::from_secs(2)), -2.0);
    }

    #[test]
    fn test_poll_duration_fits_in_ticks() {
        let seventy_two_hours = Duration::from_secs(72 * 60 * 60);
        assert_eq!(duration_to_ticks(seventy_two_hours), 72 * 60 * 60 * 8000);
    }
}
