//! Recordings and their stimulus layout.

use crate::error::{EpspError, Result};
use crate::types::{Sweep, TidyTable};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One acquired sweep before it is assigned to a stimulus group.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSweep {
    /// Seconds
    pub time: Vec<f64>,
    /// mV
    pub voltage: Vec<f64>,
}

/// Protocol of a recording: each intensity is delivered `repnum` times in a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusLayout {
    pub stim_intensities: Vec<f64>,
    pub repnum: usize,
}

impl StimulusLayout {
    pub fn new(stim_intensities: Vec<f64>, repnum: usize) -> Result<Self> {
        let layout = Self {
            stim_intensities,
            repnum,
        };
        layout.validate()?;
        Ok(layout)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stim_intensities.is_empty() {
            return Err(EpspError::Config("stim_intensities must not be empty".into()));
        }
        if self.repnum == 0 {
            return Err(EpspError::Config("repnum must be at least 1".into()));
        }
        for (i, value) in self.stim_intensities.iter().enumerate() {
            if !value.is_finite() {
                return Err(EpspError::Config(format!(
                    "stim_intensities[{}] is not a finite number",
                    i
                )));
            }
            if self.stim_intensities[..i].contains(value) {
                return Err(EpspError::Config(format!(
                    "stim_intensities lists {} more than once",
                    value
                )));
            }
        }
        Ok(())
    }

    pub fn expected_sweeps(&self) -> usize {
        self.stim_intensities.len() * self.repnum
    }

    fn assignment_error(&self, actual: usize) -> EpspError {
        EpspError::Assignment {
            expected: self.expected_sweeps(),
            actual,
            intensities: self.stim_intensities.len(),
            repnum: self.repnum,
        }
    }

    /// Label sweeps in acquisition order: sweep `k` gets intensity `k / repnum`.
    pub fn assign(&self, raw: Vec<RawSweep>) -> Result<TidyTable> {
        if raw.len() != self.expected_sweeps() {
            return Err(self.assignment_error(raw.len()));
        }
        let sweeps = raw
            .into_iter()
            .enumerate()
            .map(|(k, sweep)| {
                if sweep.time.len() != sweep.voltage.len() {
                    return Err(EpspError::Mismatch {
                        sweep: k,
                        detail: format!(
                            "{} time points but {} voltage samples",
                            sweep.time.len(),
                            sweep.voltage.len()
                        ),
                    });
                }
                let stim = self.stim_intensities[k / self.repnum];
                Ok(Sweep {
                    repetition: k % self.repnum + 1,
                    ..Sweep::new(stim, k, sweep.time, sweep.voltage)
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(TidyTable::new(sweeps))
    }

    /// Verify that an already labelled table follows this layout.
    pub fn check(&self, tidy: &TidyTable) -> Result<()> {
        if tidy.sweeps.len() != self.expected_sweeps() {
            return Err(self.assignment_error(tidy.sweeps.len()));
        }
        for (k, sweep) in tidy.sweeps.iter().enumerate() {
            let expected = self.stim_intensities[k / self.repnum];
            if sweep.stim_intensity != expected {
                return Err(EpspError::Mismatch {
                    sweep: sweep.sweep_index,
                    detail: format!(
                        "labelled with stimulus {} but the protocol delivers {} at position {}",
                        sweep.stim_intensity, expected, k
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Sample rate (Hz) implied by an evenly spaced time column in seconds.
pub fn sample_rate_from_time(time: &[f64]) -> Result<f64> {
    if time.len() < 2 {
        return Err(EpspError::Parse(
            "at least two samples are needed to derive the sample rate".into(),
        ));
    }
    let span = time[time.len() - 1] - time[0];
    let dt = span / (time.len() - 1) as f64;
    if !(dt.is_finite() && dt > 0.0) {
        return Err(EpspError::Parse(format!(
            "time column must increase, got a mean step of {} s",
            dt
        )));
    }
    Ok(1.0 / dt)
}

/// A loaded recording ready for the pipeline.
#[derive(Debug, Clone)]
pub struct Recording {
    /// File stem, used in messages and output names
    pub name: String,
    pub source: Option<PathBuf>,
    pub tidy: TidyTable,
    /// Hz
    pub sample_rate: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Recording {
    pub fn new(name: impl Into<String>, tidy: TidyTable, sample_rate: f64) -> Self {
        Self {
            name: name.into(),
            source: None,
            tidy,
            sample_rate,
            metadata: serde_json::Map::new(),
        }
    }
}
