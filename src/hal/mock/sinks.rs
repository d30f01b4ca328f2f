use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::engine::messages::DisplayFrame;
use crate::hal::{AlarmActuator, RenderSink};

/// Actuator that counts tone edges; clones share the counters
#[derive(Debug, Clone, Default)]
pub struct RecordingActuator {
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl RecordingActuator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

impl AlarmActuator for RecordingActuator {
    fn start_tone(&mut self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_tone(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Actuator that reports tone edges through the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogActuator;

impl AlarmActuator for LogActuator {
    fn start_tone(&mut self) {
        warn!("ALARM tone started");
    }

    fn stop_tone(&mut self) {
        warn!("ALARM tone stopped");
    }
}

/// Render sink keeping the frame count and the latest frame
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    frames: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<DisplayFrame>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn last_frame(&self) -> Option<DisplayFrame> {
        self.last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl RenderSink for RecordingRenderer {
    fn render(&mut self, frame: &DisplayFrame) {
        self.frames.fetch_add(1, Ordering::SeqCst);
        *self
            .last
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(frame.clone());
    }
}

/// Headless render sink: one debug line per frame
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRenderer;

impl RenderSink for LogRenderer {
    fn render(&mut self, frame: &DisplayFrame) {
        debug!(
            hr = ?frame.heart_rate,
            spo2 = ?frame.spo2,
            sbp = ?frame.systolic,
            dbp = ?frame.diastolic,
            map = ?frame.mean_pressure,
            alarm = frame.alarm_required,
            blink = frame.blink_on,
            "frame"
        );
    }
}
