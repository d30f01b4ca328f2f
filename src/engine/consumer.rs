use anyhow::Result;
use crossbeam_channel::{select, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::dsp::MovingAverage;
use super::messages::{DisplayFrame, EstimationResult, WaveFrame};
use crate::alarm::{AlarmEngine, AlarmStatus, BlinkTimer, VitalSigns};
use crate::hal::RenderSink;
use crate::observability::StageMetrics;

/// Consumer stage state: latest traces, pressure averages and alarm evaluation
pub struct Consumer {
    sink: Box<dyn RenderSink>,
    alarms: AlarmEngine,
    blink: BlinkTimer,
    systolic: MovingAverage,
    diastolic: MovingAverage,
    mean: MovingAverage,
    /// False after an invalid estimate until the next valid one
    pressure_available: bool,
    latest_wave: Option<WaveFrame>,
    wave_at: Option<Instant>,
    latest_abp: Vec<f64>,
    result_at: Option<Instant>,
    stale_after: Duration,
    frame_period: Duration,
}

impl Consumer {
    pub fn new(
        sink: Box<dyn RenderSink>,
        alarms: AlarmEngine,
        moving_average: usize,
        frame_period: Duration,
        blink_interval: Duration,
        stale_after: Duration,
    ) -> Self {
        Self {
            sink,
            alarms,
            blink: BlinkTimer::new(blink_interval, Instant::now()),
            systolic: MovingAverage::new(moving_average),
            diastolic: MovingAverage::new(moving_average),
            mean: MovingAverage::new(moving_average),
            pressure_available: false,
            latest_wave: None,
            wave_at: None,
            latest_abp: Vec::new(),
            result_at: None,
            stale_after,
            frame_period,
        }
    }

    pub fn on_wave(&mut self, frame: WaveFrame, now: Instant) {
        self.latest_wave = Some(frame);
        self.wave_at = Some(now);
    }

    pub fn on_result(&mut self, result: EstimationResult, now: Instant) {
        self.result_at = Some(now);
        if !result.valid {
            debug!("Invalid estimation, pressures unavailable");
            self.pressure_available = false;
            return;
        }
        self.systolic.push(result.systolic);
        self.diastolic.push(result.diastolic);
        self.mean.push(result.mean);
        self.pressure_available = true;
        self.latest_abp = result.waveform;
    }

    fn is_fresh(&self, at: Option<Instant>, now: Instant) -> bool {
        at.is_some_and(|at| now.saturating_duration_since(at) <= self.stale_after)
    }

    /// Current vitals; anything older than the stale window is missing
    pub fn vitals(&self, now: Instant) -> VitalSigns {
        let pressures_fresh = self.pressure_available && self.is_fresh(self.result_at, now);
        let pressure = |avg: &MovingAverage| if pressures_fresh { avg.mean() } else { None };
        let wave = self
            .latest_wave
            .as_ref()
            .filter(|_| self.is_fresh(self.wave_at, now));
        VitalSigns {
            heart_rate: wave.map(|w| w.heart_rate),
            spo2: wave.map(|w| w.spo2),
            systolic: pressure(&self.systolic),
            diastolic: pressure(&self.diastolic),
            mean: pressure(&self.mean),
        }
    }

    /// Evaluate alarms and draw one frame
    pub fn render(&mut self, now: Instant) -> AlarmStatus {
        let vitals = self.vitals(now);
        let status = self.alarms.evaluate(&vitals, now);
        let blink_on = self.blink.tick(now);

        let (ecg, ppg) = match &self.latest_wave {
            Some(wave) => (wave.ecg.clone(), wave.ppg.clone()),
            None => (Vec::new(), Vec::new()),
        };
        let frame = DisplayFrame {
            ecg,
            ppg,
            abp: self.latest_abp.clone(),
            heart_rate: vitals.heart_rate,
            spo2: vitals.spo2,
            systolic: vitals.systolic,
            diastolic: vitals.diastolic,
            mean_pressure: vitals.mean,
            alarm_states: status.states.clone(),
            alarm_required: status.alarm_required,
            blink_on,
        };
        self.sink.render(&frame);
        status
    }

    /// Consumer stage loop: drain queues, render at the frame rate and emit
    /// the alarm level every cycle.
    pub fn run(
        mut self,
        waves: Receiver<WaveFrame>,
        results: Receiver<EstimationResult>,
        alarm_tx: mpsc::Sender<bool>,
        stop: Arc<AtomicBool>,
        metrics: Arc<StageMetrics>,
    ) -> Result<()> {
        let mut last_render = Instant::now();

        while !stop.load(Ordering::SeqCst) {
            select! {
                recv(waves) -> msg => match msg {
                    Ok(frame) => self.on_wave(frame, Instant::now()),
                    Err(_) => break,
                },
                recv(results) -> msg => match msg {
                    Ok(result) => self.on_result(result, Instant::now()),
                    Err(_) => break,
                },
                default(self.frame_period) => {}
            }

            let now = Instant::now();
            if now.saturating_duration_since(last_render) < self.frame_period {
                continue;
            }
            last_render = now;

            let start = metrics.start_processing();
            let status = self.render(now);
            metrics.finish_processing(start);
            metrics.record_item();

            trace!(alarm = status.alarm_required, "rendered frame");
            // Level signal repeats every frame; a full queue loses nothing
            if let Err(mpsc::error::TrySendError::Closed(_)) = alarm_tx.try_send(status.alarm_required) {
                break;
            }
        }
        Ok(())
    }
}
