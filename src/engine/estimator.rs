use anyhow::Result;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::dsp::{denormalize, minmax_normalize, LowPass};
use super::gate::BusyFlag;
use super::messages::{EstimationRequest, EstimationResult};
use crate::hal::BloodPressureModel;
use crate::observability::StageMetrics;

/// Pressure range the model's normalized outputs map onto, in mmHg
pub const PRESSURE_MIN_MMHG: f64 = 20.0;
pub const PRESSURE_MAX_MMHG: f64 = 200.0;

/// Runs the inference model on a PPG window.
///
/// Degenerate input (missing samples, wrong length, zero span, model
/// error) yields an invalid result rather than an error.
pub struct Estimator {
    model: Box<dyn BloodPressureModel>,
    window_len: usize,
    lowpass: Option<LowPass>,
}

impl Estimator {
    pub fn new(model: Box<dyn BloodPressureModel>, window_len: usize, lowpass: Option<LowPass>) -> Self {
        Self {
            model,
            window_len,
            lowpass,
        }
    }

    pub fn estimate(&mut self, request: &EstimationRequest) -> EstimationResult {
        match self.try_estimate(request) {
            Ok(Some(result)) => result,
            Ok(None) => EstimationResult::invalid(request),
            Err(e) => {
                warn!("Model rejected estimation window: {}", e);
                EstimationResult::invalid(request)
            }
        }
    }

    fn try_estimate(&mut self, request: &EstimationRequest) -> Result<Option<EstimationResult>> {
        if request.ppg.len() != self.window_len {
            debug!(
                "PPG window has {} samples, expected {}",
                request.ppg.len(),
                self.window_len
            );
            return Ok(None);
        }
        let Some(ppg) = request.ppg.iter().copied().collect::<Option<Vec<f64>>>() else {
            debug!("PPG window not yet filled");
            return Ok(None);
        };
        let Some((normalized, _, _)) = minmax_normalize(&ppg) else {
            debug!("PPG window has zero span");
            return Ok(None);
        };
        let input: Vec<f32> = normalized.iter().map(|v| *v as f32).collect();

        let (diastolic, systolic, mean) = self.model.predict_values(&input)?;
        let to_mmhg =
            |v: f32| denormalize(v as f64, PRESSURE_MIN_MMHG, PRESSURE_MAX_MMHG, 0.0, 1.0);

        let predicted: Vec<f64> = self
            .model
            .predict_waveform(&input)?
            .into_iter()
            .map(f64::from)
            .collect();
        if predicted.is_empty() {
            return Ok(None);
        }
        let waveform = match &self.lowpass {
            Some(filter) => filter.filtfilt(&predicted),
            None => predicted,
        };

        Ok(Some(EstimationResult {
            ppg_times: request.ppg_times.clone(),
            waveform,
            systolic: to_mmhg(systolic),
            diastolic: to_mmhg(diastolic),
            mean: to_mmhg(mean),
            valid: true,
            received_at: request.received_at,
        }))
    }
}

/// Estimator stage loop. Clears the busy flag only after a result exists.
pub fn run_estimator(
    mut estimator: Estimator,
    requests: Receiver<EstimationRequest>,
    results: Sender<EstimationResult>,
    busy: BusyFlag,
    stop: Arc<AtomicBool>,
    metrics: Arc<StageMetrics>,
) -> Result<()> {
    let poll = Duration::from_millis(100);
    while !stop.load(Ordering::SeqCst) {
        let request = match requests.recv_timeout(poll) {
            Ok(request) => request,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let start = metrics.start_processing();
        let result = estimator.estimate(&request);
        metrics.finish_processing(start);
        metrics.record_item();
        if !result.valid {
            metrics.record_invalid();
        }

        debug!(
            valid = result.valid,
            sbp = result.systolic,
            dbp = result.diastolic,
            map = result.mean,
            "estimation finished"
        );

        busy.release();
        match results.try_send(result) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Result queue full, dropping estimation");
                metrics.record_dropped(1);
            }
            Err(TrySendError::Disconnected(_)) => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::mock::{FaultyModel, StubModel};
    use std::time::SystemTime;

    fn request(ppg: Vec<Option<f64>>) -> EstimationRequest {
        EstimationRequest {
            ecg_times: vec![],
            ecg: vec![],
            ppg_times: (0..ppg.len()).map(|i| i as f64).collect(),
            ppg,
            heart_rate: 72.0,
            spo2: 98.0,
            received_at: SystemTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn test_valid_window_is_denormalized() {
        let mut estimator = Estimator::new(Box::new(StubModel::new()), 8, None);
        let ppg = (0..8).map(|i| Some(i as f64)).collect();

        let result = estimator.estimate(&request(ppg));

        assert!(result.valid);
        assert!((result.diastolic - 74.0).abs() < 1e-4);
        assert!((result.systolic - 119.0).abs() < 1e-4);
        assert!((result.mean - 92.0).abs() < 1e-4);
        assert_eq!(result.waveform.len(), 8);
    }

    #[test]
    fn test_missing_sample_is_invalid() {
        let mut estimator = Estimator::new(Box::new(StubModel::new()), 4, None);
        let result = estimator.estimate(&request(vec![Some(1.0), None, Some(2.0), Some(3.0)]));

        assert!(!result.valid);
        assert_eq!(result.systolic, 0.0);
        assert_eq!(result.waveform, vec![0.0; 4]);
    }

    #[test]
    fn test_wrong_length_is_invalid() {
        let mut estimator = Estimator::new(Box::new(StubModel::new()), 4, None);
        assert!(!estimator.estimate(&request(vec![Some(1.0), Some(2.0)])).valid);
    }

    #[test]
    fn test_model_error_is_invalid() {
        let mut estimator = Estimator::new(Box::new(FaultyModel::failing_on(1)), 3, None);
        let ppg = vec![Some(1.0), Some(2.0), Some(3.0)];

        assert!(!estimator.estimate(&request(ppg.clone())).valid);
        assert!(estimator.estimate(&request(ppg)).valid);
    }
}
