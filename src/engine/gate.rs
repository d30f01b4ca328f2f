use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Estimator-busy flag shared by the producer and the estimator
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Set the flag if it was clear
    pub fn try_set(&self) -> bool {
        self.0
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    pub fn release(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Producer-side submission policy: estimator idle and the minimum
/// interval elapsed since the last accepted submission.
#[derive(Debug)]
pub struct SubmissionGate {
    busy: BusyFlag,
    min_interval: Duration,
    last_submit: Option<Instant>,
    dropped: u64,
}

impl SubmissionGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            busy: BusyFlag::new(),
            min_interval,
            last_submit: None,
            dropped: 0,
        }
    }

    /// Handle for the estimator to release the gate
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn interval_elapsed(&self, now: Instant) -> bool {
        self.last_submit
            .map_or(true, |last| now.saturating_duration_since(last) >= self.min_interval)
    }

    /// Claim the estimator. A busy estimator drops the submission.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        if !self.interval_elapsed(now) {
            return false;
        }
        if !self.busy.try_set() {
            self.dropped += 1;
            return false;
        }
        self.last_submit = Some(now);
        true
    }

    /// Give the claim back when the request could not be queued
    pub fn abandon(&mut self) {
        self.busy.release();
    }

    /// Submissions dropped because the estimator was busy
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
