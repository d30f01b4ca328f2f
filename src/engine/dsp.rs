use std::f64::consts::PI;

/// Min-max scale into [0, 1]. `None` when the span is zero or not finite.
pub fn minmax_normalize(signal: &[f64]) -> Option<(Vec<f64>, f64, f64)> {
    if signal.is_empty() {
        return None;
    }
    let (min, max) = signal
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(*v), hi.max(*v))
        });
    let span = max - min;
    if !span.is_finite() || span <= 0.0 {
        return None;
    }
    Some((signal.iter().map(|v| (v - min) / span).collect(), min, max))
}

/// Map a value from `[normalized_min, normalized_max]` back to `[data_min, data_max]`
pub fn denormalize(
    value: f64,
    data_min: f64,
    data_max: f64,
    normalized_min: f64,
    normalized_max: f64,
) -> f64 {
    (value - normalized_min) * (data_max - data_min) / (normalized_max - normalized_min) + data_min
}

/// Second-order IIR section, transposed direct form II
#[derive(Debug, Clone, Copy, PartialEq)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    fn lowpass(cutoff_hz: f64, sample_rate_hz: f64, q: f64) -> Self {
        let w0 = 2.0 * PI * cutoff_hz / sample_rate_hz;
        let cos = w0.cos();
        let alpha = w0.sin() / (2.0 * q);
        let a0 = 1.0 + alpha;
        Self {
            b0: (1.0 - cos) / 2.0 / a0,
            b1: (1.0 - cos) / a0,
            b2: (1.0 - cos) / 2.0 / a0,
            a1: -2.0 * cos / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }

    /// Filter in place, starting from the steady state for `data[0]`
    fn run(&self, data: &mut [f64]) {
        let Some(first) = data.first().copied() else {
            return;
        };
        let settled = first * self.dc_gain();
        let mut z2 = self.b2 * first - self.a2 * settled;
        let mut z1 = self.b1 * first - self.a1 * settled + z2;

        for x in data.iter_mut() {
            let input = *x;
            let y = self.b0 * input + z1;
            z1 = self.b1 * input - self.a1 * y + z2;
            z2 = self.b2 * input - self.a2 * y;
            *x = y;
        }
    }
}

/// Zero-phase 4th-order Butterworth low-pass (two biquads, run forward then backward)
#[derive(Debug, Clone, PartialEq)]
pub struct LowPass {
    sections: [Biquad; 2],
}

impl LowPass {
    /// `None` unless `0 < cutoff < sample_rate / 2`
    pub fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Option<Self> {
        if !(cutoff_hz > 0.0 && cutoff_hz < sample_rate_hz / 2.0) {
            return None;
        }
        // Butterworth pole pairs for order 4
        let q1 = 1.0 / (2.0 * (PI / 8.0).cos());
        let q2 = 1.0 / (2.0 * (3.0 * PI / 8.0).cos());
        Some(Self {
            sections: [
                Biquad::lowpass(cutoff_hz, sample_rate_hz, q1),
                Biquad::lowpass(cutoff_hz, sample_rate_hz, q2),
            ],
        })
    }

    fn cascade(&self, data: &mut [f64]) {
        for section in &self.sections {
            section.run(data);
        }
    }

    /// Forward-backward filtering with odd-reflection padding at both ends
    pub fn filtfilt(&self, data: &[f64]) -> Vec<f64> {
        let n = data.len();
        if n < 2 {
            return data.to_vec();
        }
        let pad = 15.min(n - 1);

        let mut padded = Vec::with_capacity(n + 2 * pad);
        let head = data[0];
        let tail = data[n - 1];
        padded.extend((1..=pad).rev().map(|i| 2.0 * head - data[i]));
        padded.extend_from_slice(data);
        padded.extend((1..=pad).map(|i| 2.0 * tail - data[n - 1 - i]));

        self.cascade(&mut padded);
        padded.reverse();
        self.cascade(&mut padded);
        padded.reverse();

        padded[pad..pad + n].to_vec()
    }
}

/// Running mean over the last `window` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: std::collections::VecDeque<f64>,
    window: usize,
    sum: f64,
}

impl MovingAverage {
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            values: std::collections::VecDeque::with_capacity(window),
            window,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f64) -> f64 {
        if self.values.len() == self.window {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
        self.sum / self.values.len() as f64
    }

    pub fn mean(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.sum / self.values.len() as f64)
        }
    }
}
