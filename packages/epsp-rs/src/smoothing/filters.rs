//! Butterworth Low-pass Filtering
//!
//! IIR low-pass built from second-order sections (biquads) for numerical stability,
//! run forward and backward for zero phase distortion.

use std::f64::consts::PI;

/// Second-order section (biquad) coefficients
/// Transfer function: H(z) = (b0 + b1*z^-1 + b2*z^-2) / (1 + a1*z^-1 + a2*z^-2)
#[derive(Debug, Clone, Copy)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl BiquadCoeffs {
    fn dc_gain(&self) -> f64 {
        (self.b0 + self.b1 + self.b2) / (1.0 + self.a1 + self.a2)
    }
}

/// State for a single biquad section (Direct Form II Transposed)
#[derive(Debug, Clone, Default)]
struct BiquadState {
    z1: f64,
    z2: f64,
}

#[derive(Debug, Clone)]
pub struct BiquadFilter {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadFilter {
    pub fn new(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }

    /// Load the state the section settles into under a constant input.
    /// Returns the steady-state output.
    fn settle(&mut self, input: f64) -> f64 {
        let c = self.coeffs;
        let output = c.dc_gain() * input;
        self.state.z1 = output - c.b0 * input;
        self.state.z2 = c.b2 * input - c.a2 * output;
        output
    }

    pub fn reset(&mut self) {
        self.state = BiquadState::default();
    }
}

/// Cascaded second-order sections filter
#[derive(Debug, Clone)]
pub struct SosFilter {
    sections: Vec<BiquadFilter>,
    gain: f64,
}

impl SosFilter {
    pub fn new(sections: Vec<BiquadCoeffs>, gain: f64) -> Self {
        Self {
            sections: sections.into_iter().map(BiquadFilter::new).collect(),
            gain,
        }
    }

    pub fn num_sections(&self) -> usize {
        self.sections.len()
    }

    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let mut output = input * self.gain;
        for section in &mut self.sections {
            output = section.process(output);
        }
        output
    }

    /// Filter a whole signal into a new vector; the input is not modified
    pub fn filter(&mut self, signal: &[f64]) -> Vec<f64> {
        signal.iter().map(|&s| self.process(s)).collect()
    }

    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Put every section in its DC steady state for a constant input `x0`,
    /// so filtering starts without a step transient.
    pub fn settle(&mut self, x0: f64) {
        let mut value = x0 * self.gain;
        for section in &mut self.sections {
            value = section.settle(value);
        }
    }

    /// Zero-phase filtering: forward pass, backward pass, over an odd-reflected extension
    /// of `padlen` samples at each end.
    pub fn filtfilt(&mut self, signal: &[f64], padlen: usize) -> Vec<f64> {
        let n = signal.len();
        if n == 0 {
            return Vec::new();
        }
        let pad = padlen.min(n - 1);
        let extended = odd_extend(signal, pad);

        self.reset();
        self.settle(extended[0]);
        let mut forward = self.filter(&extended);

        forward.reverse();
        self.reset();
        self.settle(forward[0]);
        let mut backward = self.filter(&forward);
        backward.reverse();

        backward[pad..pad + n].to_vec()
    }
}

fn odd_extend(signal: &[f64], pad: usize) -> Vec<f64> {
    let n = signal.len();
    let first = signal[0];
    let last = signal[n - 1];
    let mut out = Vec::with_capacity(n + 2 * pad);
    for i in (1..=pad).rev() {
        out.push(2.0 * first - signal[i]);
    }
    out.extend_from_slice(signal);
    for i in 1..=pad {
        out.push(2.0 * last - signal[n - 1 - i]);
    }
    out
}

/// Butterworth filter designer
pub struct ButterworthFilter;

impl ButterworthFilter {
    /// Design a Butterworth lowpass filter
    pub fn lowpass(cutoff: f64, sample_rate: f64, order: usize) -> SosFilter {
        let wn = Self::prewarp(cutoff, sample_rate);
        let sos = Self::design_lowpass(wn, order);
        SosFilter::new(sos, 1.0)
    }

    /// Prewarp frequency for bilinear transform
    fn prewarp(freq: f64, sample_rate: f64) -> f64 {
        (PI * freq / sample_rate).tan()
    }

    fn design_lowpass(wn: f64, order: usize) -> Vec<BiquadCoeffs> {
        let num_sections = (order + 1) / 2;
        let mut sections = Vec::with_capacity(num_sections);

        for k in 0..num_sections {
            // For odd order, last section is first-order
            if order % 2 == 1 && k == num_sections - 1 {
                // H(s) = wn / (s + wn)
                let k_coeff = wn / (1.0 + wn);
                sections.push(BiquadCoeffs {
                    b0: k_coeff,
                    b1: k_coeff,
                    b2: 0.0,
                    a1: (wn - 1.0) / (wn + 1.0),
                    a2: 0.0,
                });
            } else {
                // Analog pole pair s^2 + 2 sin(theta) s + 1, mapped by the bilinear transform
                let theta = PI * (2.0 * k as f64 + 1.0) / (2.0 * order as f64);
                let damping = 2.0 * theta.sin();
                let wn2 = wn * wn;
                let denom = 1.0 + damping * wn + wn2;

                sections.push(BiquadCoeffs {
                    b0: wn2 / denom,
                    b1: 2.0 * wn2 / denom,
                    b2: wn2 / denom,
                    a1: 2.0 * (wn2 - 1.0) / denom,
                    a2: (1.0 - damping * wn + wn2) / denom,
                });
            }
        }

        sections
    }
}

/// Zero-phase Butterworth low-pass of `signal`.
pub fn butter_lowpass(signal: &[f64], cutoff: f64, sample_rate: f64, order: usize) -> Vec<f64> {
    let mut filter = ButterworthFilter::lowpass(cutoff, sample_rate, order);
    filter.filtfilt(signal, 3 * (order + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = ButterworthFilter::lowpass(10.0, 100.0, 3);
        let mut out = 0.0;
        for _ in 0..500 {
            out = filter.process(1.0);
        }
        assert!((out - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_sections_are_stable() {
        for order in 1..=8 {
            let filter = ButterworthFilter::lowpass(500.0, 10_000.0, order);
            assert_eq!(filter.num_sections(), (order + 1) / 2);
            for s in &filter.sections {
                // Stability triangle for a1, a2
                assert!(s.coeffs.a2.abs() < 1.0, "order {order}: a2 = {}", s.coeffs.a2);
                assert!(s.coeffs.a1.abs() < 1.0 + s.coeffs.a2);
            }
        }
    }

    #[test]
    fn test_filtfilt_constant_signal_unchanged() {
        let signal = vec![-0.35; 200];
        let out = butter_lowpass(&signal, 1000.0, 20_000.0, 3);
        assert_eq!(out.len(), signal.len());
        for v in out {
            assert!((v + 0.35).abs() < 1e-9);
        }
    }

    #[test]
    fn test_filtfilt_attenuates_high_frequency() {
        let fs = 10_000.0;
        let signal: Vec<f64> = (0..2000)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * 20.0 * t).sin() + 0.5 * (2.0 * PI * 3000.0 * t).sin()
            })
            .collect();
        let slow: Vec<f64> = (0..2000)
            .map(|i| (2.0 * PI * 20.0 * i as f64 / fs).sin())
            .collect();
        let out = butter_lowpass(&signal, 200.0, fs, 4);

        let err: f64 = out[200..1800]
            .iter()
            .zip(&slow[200..1800])
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 0.05, "max deviation from slow component: {err}");
    }
}
