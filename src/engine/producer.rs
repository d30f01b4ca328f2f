use anyhow::Result;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, error, info, warn};

use super::gate::SubmissionGate;
use super::messages::{EstimationRequest, WaveFrame};
use crate::buffers::RollingWindow;
use crate::config::PipelineConfig;
use crate::core::{channels, CondensedReading};
use crate::observability::StageMetrics;
use crate::stream::{StreamError, TelemetryStream};

/// Last reported value of a numeric and when it arrived
#[derive(Debug, Clone, Copy, Default)]
struct Numeric {
    value: f64,
    updated: Option<Instant>,
}

impl Numeric {
    fn set(&mut self, value: f64, now: Instant) {
        self.value = value;
        self.updated = Some(now);
    }

    /// 0.0 once the monitor has stopped reporting it
    fn current(&self, now: Instant, stale_after: Duration) -> f64 {
        match self.updated {
            Some(at) if now.saturating_duration_since(at) <= stale_after => self.value,
            _ => 0.0,
        }
    }
}

/// Producer stage state: owns the telemetry stream and the PPG window
pub struct Producer {
    stream: TelemetryStream,
    window: RollingWindow,
    gate: SubmissionGate,
    heart_rate: Numeric,
    spo2: Numeric,
    stale_after: Duration,
    wave_interval: Duration,
    last_wave: Option<Instant>,
    polling_interval: Duration,
}

impl Producer {
    pub fn new(stream: TelemetryStream, gate: SubmissionGate, config: &PipelineConfig, polling_interval: Duration) -> Self {
        Self {
            stream,
            window: RollingWindow::new(config.estimation_window),
            gate,
            heart_rate: Numeric::default(),
            spo2: Numeric::default(),
            stale_after: config.stale_after(),
            wave_interval: config.submit_interval(),
            last_wave: None,
            polling_interval,
        }
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn stream(&self) -> &TelemetryStream {
        &self.stream
    }

    /// Submissions dropped because the estimator was still busy
    pub fn dropped_submissions(&self) -> u64 {
        self.gate.dropped()
    }

    /// Fold a reading into the last-known vitals and the PPG window
    pub fn absorb(&mut self, reading: &CondensedReading, now: Instant) {
        if let Some(hr) = reading.heart_rate {
            self.heart_rate.set(hr, now);
        }
        if let Some(spo2) = reading.spo2 {
            self.spo2.set(spo2, now);
        }
        if let Some(pleth) = self.stream.channel(channels::PLETH) {
            let fresh = pleth.samples_after(self.window.last_time());
            self.window.merge_newer(fresh);
        }
    }

    fn ecg_trace(&self) -> (Vec<f64>, Vec<f64>) {
        match self.stream.channel(channels::ECG) {
            Some(ecg) => (ecg.times(), ecg.values()),
            None => (Vec::new(), Vec::new()),
        }
    }

    pub fn wave_frame(&self, now: Instant) -> WaveFrame {
        let (ecg_times, ecg) = self.ecg_trace();
        WaveFrame {
            ecg_times,
            ecg,
            ppg_times: self.window.times(),
            ppg: self.window.values(),
            heart_rate: self.heart_rate.current(now, self.stale_after),
            spo2: self.spo2.current(now, self.stale_after),
        }
    }

    pub fn estimation_request(&self, now: Instant) -> EstimationRequest {
        let (ecg_times, ecg) = self.ecg_trace();
        EstimationRequest {
            ecg_times,
            ecg,
            ppg_times: self.window.times(),
            ppg: self.window.values(),
            heart_rate: self.heart_rate.current(now, self.stale_after),
            spo2: self.spo2.current(now, self.stale_after),
            received_at: SystemTime::now(),
        }
    }

    /// Push a wave frame and, if the gate allows, an estimation request
    pub fn publish(
        &mut self,
        now: Instant,
        waves: &Sender<WaveFrame>,
        requests: &Sender<EstimationRequest>,
    ) -> Result<()> {
        let wave_due = self
            .last_wave
            .map_or(true, |last| now.saturating_duration_since(last) >= self.wave_interval);
        if wave_due {
            self.last_wave = Some(now);
            match waves.try_send(self.wave_frame(now)) {
                Ok(()) | Err(TrySendError::Full(_)) => {}
                Err(TrySendError::Disconnected(_)) => anyhow::bail!("Consumer wave queue closed"),
            }
        }

        if self.gate.try_acquire(now) {
            match requests.try_send(self.estimation_request(now)) {
                Ok(()) => debug!("Submitted estimation request"),
                Err(TrySendError::Full(_)) => {
                    warn!("Estimation queue full, dropping request");
                    self.gate.abandon();
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.gate.abandon();
                    anyhow::bail!("Estimator request queue closed");
                }
            }
        }
        Ok(())
    }

    /// Producer stage loop. Closes the transport on exit.
    pub fn run(
        mut self,
        waves: Sender<WaveFrame>,
        requests: Sender<EstimationRequest>,
        stop: Arc<AtomicBool>,
        metrics: Arc<StageMetrics>,
    ) -> Result<()> {
        let result = self.run_loop(&waves, &requests, &stop, &metrics);
        if let Err(e) = self.stream.close() {
            error!("Ignoring error closing telemetry stream: {}", e);
        }
        info!(
            "Producer exiting after {} reconnects, {} submissions dropped",
            self.stream.reconnect_count(),
            self.gate.dropped()
        );
        result
    }

    fn run_loop(
        &mut self,
        waves: &Sender<WaveFrame>,
        requests: &Sender<EstimationRequest>,
        stop: &AtomicBool,
        metrics: &StageMetrics,
    ) -> Result<()> {
        match self.stream.open() {
            Ok(()) => {}
            Err(StreamError::Stopped) => return Ok(()),
            Err(e) => {
                metrics.record_error();
                return Err(e.into());
            }
        }

        while !stop.load(Ordering::SeqCst) {
            let start = metrics.start_processing();
            match self.stream.read_one() {
                Ok(Some(reading)) => {
                    self.absorb(&reading, Instant::now());
                    metrics.record_item();
                }
                Ok(None) => {}
                Err(StreamError::Stopped) => break,
                Err(e) => {
                    metrics.record_error();
                    return Err(e.into());
                }
            }
            let dropped_before = self.gate.dropped();
            self.publish(Instant::now(), waves, requests)?;
            metrics.record_dropped(self.gate.dropped() - dropped_before);
            metrics.finish_processing(start);

            std::thread::sleep(self.polling_interval);
        }
        Ok(())
    }
}
