use anyhow::{bail, Result};

use crate::hal::BloodPressureModel;

/// Deterministic stand-in for the inference model.
///
/// The waveform is the input rescaled into a 60..120 band; the values are
/// fixed normalized outputs.
#[derive(Debug, Clone)]
pub struct StubModel {
    values: (f32, f32, f32),
}

impl StubModel {
    pub fn new() -> Self {
        // (diastolic, systolic, mean) on the 20..200 mmHg scale: 74 / 119 / 92
        Self {
            values: (0.3, 0.55, 0.4),
        }
    }

    pub fn with_values(diastolic: f32, systolic: f32, mean: f32) -> Self {
        Self {
            values: (diastolic, systolic, mean),
        }
    }
}

impl Default for StubModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BloodPressureModel for StubModel {
    fn predict_waveform(&mut self, window: &[f32]) -> Result<Vec<f32>> {
        Ok(window.iter().map(|x| 60.0 + 60.0 * x).collect())
    }

    fn predict_values(&mut self, _normalized_window: &[f32]) -> Result<(f32, f32, f32)> {
        Ok(self.values)
    }
}

/// Model that fails on chosen calls, for exercising stage isolation
#[derive(Debug, Clone)]
pub struct FaultyModel {
    calls: usize,
    panic_on_call: Option<usize>,
    error_on_call: Option<usize>,
}

impl FaultyModel {
    /// Panic inside `predict_values` on the given (1-based) call
    pub fn panicking_on(call: usize) -> Self {
        Self {
            calls: 0,
            panic_on_call: Some(call),
            error_on_call: None,
        }
    }

    /// Return an error from `predict_values` on the given (1-based) call
    pub fn failing_on(call: usize) -> Self {
        Self {
            calls: 0,
            panic_on_call: None,
            error_on_call: Some(call),
        }
    }
}

impl BloodPressureModel for FaultyModel {
    fn predict_waveform(&mut self, window: &[f32]) -> Result<Vec<f32>> {
        Ok(window.to_vec())
    }

    fn predict_values(&mut self, _normalized_window: &[f32]) -> Result<(f32, f32, f32)> {
        self.calls += 1;
        if self.panic_on_call == Some(self.calls) {
            panic!("model crashed on call {}", self.calls);
        }
        if self.error_on_call == Some(self.calls) {
            bail!("model rejected input on call {}", self.calls);
        }
        Ok((0.3, 0.55, 0.4))
    }
}
