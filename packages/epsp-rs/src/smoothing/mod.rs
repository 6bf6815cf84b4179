//! Smoothing Engine
//!
//! Trace smoothing shared by the feature detectors and by any plotting code that
//! overlays smoothed traces:
//! - identity (`none`)
//! - centered moving average with edge replication
//! - Savitzky-Golay polynomial smoothing
//! - zero-phase Butterworth low-pass
//!
//! Parameter combinations are checked by [`SmoothingConfig::validate`]; `smooth` assumes a
//! validated config and only fails on data-dependent conditions.

mod filters;
mod savgol;

pub use filters::{butter_lowpass, BiquadCoeffs, BiquadFilter, ButterworthFilter, SosFilter};
pub use savgol::{savgol, savgol_coeffs};

use crate::error::{EpspError, Result};
use serde::{Deserialize, Serialize};

/// Highest Butterworth order accepted
pub const MAX_BUTTER_ORDER: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingMethod {
    None,
    MovingAverage,
    Savgol,
    ButterLowpass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmoothingConfig {
    pub method: SmoothingMethod,
    /// Samples, for moving average and savgol
    #[serde(default)]
    pub window_size: Option<usize>,
    /// Polynomial degree, for savgol
    #[serde(default)]
    pub polyorder: Option<usize>,
    /// Hz, for butter_lowpass
    #[serde(default)]
    pub cutoff: Option<f64>,
    /// Filter order, for butter_lowpass
    #[serde(default)]
    pub order: Option<usize>,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self::none()
    }
}

impl SmoothingConfig {
    pub fn none() -> Self {
        Self {
            method: SmoothingMethod::None,
            window_size: None,
            polyorder: None,
            cutoff: None,
            order: None,
        }
    }

    pub fn moving_average(window_size: usize) -> Result<Self> {
        Self {
            method: SmoothingMethod::MovingAverage,
            window_size: Some(window_size),
            ..Self::none()
        }
        .validated()
    }

    pub fn savgol(window_size: usize, polyorder: usize) -> Result<Self> {
        Self {
            method: SmoothingMethod::Savgol,
            window_size: Some(window_size),
            polyorder: Some(polyorder),
            ..Self::none()
        }
        .validated()
    }

    pub fn butter_lowpass(cutoff: f64, order: usize) -> Result<Self> {
        Self {
            method: SmoothingMethod::ButterLowpass,
            cutoff: Some(cutoff),
            order: Some(order),
            ..Self::none()
        }
        .validated()
    }

    pub fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Check that the parameters required by `method` are present and consistent.
    pub fn validate(&self) -> Result<()> {
        match self.method {
            SmoothingMethod::None => Ok(()),
            SmoothingMethod::MovingAverage => {
                let window = require(self.window_size, "window_size", "moving_average")?;
                if window == 0 {
                    return Err(EpspError::Config(
                        "moving_average window_size must be at least 1".into(),
                    ));
                }
                Ok(())
            }
            SmoothingMethod::Savgol => {
                let window = require(self.window_size, "window_size", "savgol")?;
                let poly = require(self.polyorder, "polyorder", "savgol")?;
                if window <= poly {
                    return Err(EpspError::Config(format!(
                        "savgol requires window_size > polyorder \
                         (got window_size={}, polyorder={})",
                        window, poly
                    )));
                }
                if window % 2 == 0 {
                    return Err(EpspError::Config(format!(
                        "savgol window_size must be odd (got {})",
                        window
                    )));
                }
                if window < poly + 2 {
                    return Err(EpspError::Config(format!(
                        "savgol window_size must be at least polyorder + 2 \
                         (got window_size={}, polyorder={})",
                        window, poly
                    )));
                }
                Ok(())
            }
            SmoothingMethod::ButterLowpass => {
                let cutoff = require(self.cutoff, "cutoff", "butter_lowpass")?;
                let order = require(self.order, "order", "butter_lowpass")?;
                if !(cutoff.is_finite() && cutoff > 0.0) {
                    return Err(EpspError::Config(format!(
                        "butter_lowpass cutoff must be a positive frequency (got {})",
                        cutoff
                    )));
                }
                if order == 0 || order > MAX_BUTTER_ORDER {
                    return Err(EpspError::Config(format!(
                        "butter_lowpass order must be in 1..={} (got {})",
                        MAX_BUTTER_ORDER, order
                    )));
                }
                Ok(())
            }
        }
    }

    /// Rate-dependent checks, run once the recording's sample rate is known.
    pub fn validate_for_rate(&self, sample_rate: f64) -> Result<()> {
        self.validate()?;
        if self.method == SmoothingMethod::ButterLowpass {
            let nyquist = sample_rate / 2.0;
            let cutoff = self.cutoff.unwrap_or_default();
            if cutoff >= nyquist {
                return Err(EpspError::Config(format!(
                    "Cutoff frequency ({} Hz) must be less than Nyquist ({} Hz)",
                    cutoff, nyquist
                )));
            }
        }
        Ok(())
    }
}

fn require<T: Copy>(value: Option<T>, param: &str, method: &str) -> Result<T> {
    value.ok_or_else(|| EpspError::Config(format!("{} smoothing requires '{}'", method, param)))
}

/// Smooth `signal` with `config`. `sample_rate` (Hz) is only read by `butter_lowpass`.
pub fn smooth(signal: &[f64], config: &SmoothingConfig, sample_rate: f64) -> Result<Vec<f64>> {
    match config.method {
        SmoothingMethod::None => Ok(signal.to_vec()),
        SmoothingMethod::MovingAverage => {
            let window = require(config.window_size, "window_size", "moving_average")?;
            Ok(moving_average(signal, window))
        }
        SmoothingMethod::Savgol => {
            let window = require(config.window_size, "window_size", "savgol")?;
            let poly = require(config.polyorder, "polyorder", "savgol")?;
            savgol(signal, window, poly)
        }
        SmoothingMethod::ButterLowpass => {
            config.validate_for_rate(sample_rate)?;
            let cutoff = require(config.cutoff, "cutoff", "butter_lowpass")?;
            let order = require(config.order, "order", "butter_lowpass")?;
            Ok(butter_lowpass(signal, cutoff, sample_rate, order))
        }
    }
}

/// Centered rolling mean; samples beyond either end repeat the edge value.
/// Even windows cover `[i - w/2, i + w - w/2 - 1]`.
pub fn moving_average(signal: &[f64], window_size: usize) -> Vec<f64> {
    let n = signal.len();
    if n == 0 || window_size <= 1 {
        return signal.to_vec();
    }
    let left = window_size / 2;
    let right = window_size - left - 1;
    let at = |k: isize| -> f64 { signal[k.clamp(0, n as isize - 1) as usize] };

    let mut out = Vec::with_capacity(n);
    let mut sum: f64 = (-(left as isize)..=right as isize).map(at).sum();
    out.push(sum / window_size as f64);
    for i in 1..n as isize {
        sum += at(i + right as isize) - at(i - left as isize - 1);
        out.push(sum / window_size as f64);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|i| (i as f64 * 0.37).sin() + i as f64 * 0.01).collect()
    }

    #[test]
    fn test_none_is_identity() {
        let x = vec![0.1, f64::NAN, -3.5, 1e-12];
        let y = smooth(&x, &SmoothingConfig::none(), 10_000.0).unwrap();
        assert_eq!(x.len(), y.len());
        for (a, b) in x.iter().zip(&y) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_shape_preserved() {
        let x = ramp(57);
        let configs = [
            SmoothingConfig::moving_average(1).unwrap(),
            SmoothingConfig::moving_average(4).unwrap(),
            SmoothingConfig::moving_average(9).unwrap(),
            SmoothingConfig::savgol(5, 2).unwrap(),
            SmoothingConfig::savgol(21, 3).unwrap(),
            SmoothingConfig::butter_lowpass(500.0, 3).unwrap(),
        ];
        for cfg in &configs {
            assert_eq!(smooth(&x, cfg, 10_000.0).unwrap().len(), x.len(), "{cfg:?}");
        }
    }

    #[test]
    fn test_moving_average_edge_replication() {
        let y = moving_average(&[1.0, 2.0, 3.0, 4.0], 3);
        assert!((y[0] - 4.0 / 3.0).abs() < 1e-12);
        assert!((y[1] - 2.0).abs() < 1e-12);
        assert!((y[3] - 11.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_moving_average_even_window() {
        // window 2 covers [i-1, i]
        let y = moving_average(&[0.0, 2.0, 4.0], 2);
        assert_eq!(y, vec![0.0, 1.0, 3.0]);
    }

    #[test]
    fn test_savgol_validation() {
        assert!(SmoothingConfig::savgol(3, 3).is_err());
        assert!(SmoothingConfig::savgol(4, 2).is_err());
        assert!(SmoothingConfig::savgol(4, 1).is_err());
        assert!(SmoothingConfig::savgol(5, 3).is_ok());
        let missing = SmoothingConfig {
            method: SmoothingMethod::Savgol,
            window_size: Some(11),
            ..SmoothingConfig::none()
        };
        assert!(matches!(missing.validate(), Err(EpspError::Config(_))));
    }

    #[test]
    fn test_butter_validation() {
        assert!(SmoothingConfig::butter_lowpass(0.0, 3).is_err());
        assert!(SmoothingConfig::butter_lowpass(100.0, 0).is_err());
        assert!(SmoothingConfig::butter_lowpass(100.0, 9).is_err());
        let cfg = SmoothingConfig::butter_lowpass(6_000.0, 3).unwrap();
        assert!(cfg.validate_for_rate(10_000.0).is_err());
        assert!(cfg.validate_for_rate(20_000.0).is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let cfg: SmoothingConfig =
            serde_json::from_str(r#"{"method": "savgol", "window_size": 21, "polyorder": 3}"#)
                .unwrap();
        assert_eq!(cfg, SmoothingConfig::savgol(21, 3).unwrap());
        let bad = serde_json::from_str::<SmoothingConfig>(r#"{"method": "gaussian"}"#);
        assert!(bad.is_err());
    }
}
