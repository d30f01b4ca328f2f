use std::time::{Duration, Instant};

/// Visual blink phase, toggled on a fixed interval
#[derive(Debug, Clone)]
pub struct BlinkTimer {
    interval: Duration,
    last_toggle: Instant,
    on: bool,
}

impl BlinkTimer {
    pub fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval,
            last_toggle: now,
            on: false,
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    /// Advance the timer and return the current phase
    pub fn tick(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_toggle) >= self.interval {
            self.on = !self.on;
            self.last_toggle = now;
        }
        self.on
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggles_each_interval() {
        let t0 = Instant::now();
        let mut blink = BlinkTimer::new(Duration::from_millis(500), t0);

        assert!(!blink.tick(t0 + Duration::from_millis(100)));
        assert!(blink.tick(t0 + Duration::from_millis(500)));
        assert!(blink.tick(t0 + Duration::from_millis(900)));
        assert!(!blink.tick(t0 + Duration::from_millis(1000)));
    }
}
