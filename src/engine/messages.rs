use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::SystemTime;

use crate::alarm::{Vital, VitalState};

/// Snapshot handed to the estimator. At most one is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationRequest {
    pub ecg_times: Vec<f64>,
    pub ecg: Vec<f64>,
    pub ppg_times: Vec<f64>,
    /// `None` where the rolling window has not been filled yet
    pub ppg: Vec<Option<f64>>,
    /// Last known values; 0.0 when never seen
    pub heart_rate: f64,
    pub spo2: f64,
    pub received_at: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResult {
    pub ppg_times: Vec<f64>,
    /// Low-passed arterial pressure waveform
    pub waveform: Vec<f64>,
    pub systolic: f64,
    pub diastolic: f64,
    pub mean: f64,
    /// False for degenerate input; predictions are then zero
    pub valid: bool,
    pub received_at: SystemTime,
}

impl EstimationResult {
    pub fn invalid(request: &EstimationRequest) -> Self {
        Self {
            ppg_times: request.ppg_times.clone(),
            waveform: vec![0.0; request.ppg.len()],
            systolic: 0.0,
            diastolic: 0.0,
            mean: 0.0,
            valid: false,
            received_at: request.received_at,
        }
    }
}

/// Traces and numerics pushed from the producer to the consumer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveFrame {
    pub ecg_times: Vec<f64>,
    pub ecg: Vec<f64>,
    pub ppg_times: Vec<f64>,
    pub ppg: Vec<Option<f64>>,
    pub heart_rate: f64,
    pub spo2: f64,
}

/// Everything one render cycle draws
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplayFrame {
    pub ecg: Vec<f64>,
    pub ppg: Vec<Option<f64>>,
    pub abp: Vec<f64>,
    pub heart_rate: Option<f64>,
    pub spo2: Option<f64>,
    /// Moving averages of the estimated pressures
    pub systolic: Option<f64>,
    pub diastolic: Option<f64>,
    pub mean_pressure: Option<f64>,
    pub alarm_states: BTreeMap<Vital, VitalState>,
    pub alarm_required: bool,
    pub blink_on: bool,
}
