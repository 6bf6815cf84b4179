//! Feature Chain
//!
//! Detectors run per stimulus group on the averaged trace, in configured order. Each one
//! sees the results of the features before it through a [`FeatureContext`]:
//! - `fiber_volley`: presynaptic volley trough
//! - `epsp`: EPSP trough, slope and slope/volley ratio (reads `fiber_volley` if present)
//! - `pop_spike`: population spike amplitude (requires `epsp`)

mod chain;
pub mod epsp;
pub mod fiber_volley;
pub mod pop_spike;

pub use chain::{ConfiguredFeature, FeatureChain, ResultRow, ResultsTable};
pub use epsp::EpspParams;
pub use fiber_volley::FiberVolleyParams;
pub use pop_spike::PopSpikeParams;

use crate::error::{EpspError, Result};
use crate::math::mean;
use crate::smoothing::SmoothingConfig;
use crate::transforms::parse_params;
use crate::types::WindowMs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Registry entry describing one feature detector.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureMetadata {
    pub name: &'static str,
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
    /// Features whose results must already be in the context
    pub requires: &'static [&'static str],
    /// Features whose results are used when present
    pub uses: &'static [&'static str],
    pub outputs: &'static [&'static str],
    pub documentation: &'static str,
}

impl FeatureMetadata {
    pub fn from_name(name: &str) -> Option<&'static FeatureMetadata> {
        FEATURE_REGISTRY.iter().find(|f| f.name == name)
    }
}

/// Fiber Volley
///
/// Most negative sample in `window_ms`; amplitude against the `baseline_ms` mean or 0 mV.
pub const FIBER_VOLLEY: FeatureMetadata = FeatureMetadata {
    name: "fiber_volley",
    required_params: &["window_ms"],
    optional_params: &["baseline_ms"],
    requires: &[],
    uses: &[],
    outputs: &["fv_amp", "fv_s", "fv_v"],
    documentation: "Most negative sample in window_ms. fv_amp is measured from the \
                    baseline_ms mean, or 0 mV when no baseline is given.",
};

/// EPSP
///
/// Trough in `window_ms` and an OLS slope over `fit_distance` samples around the steepest
/// descent.
pub const EPSP: FeatureMetadata = FeatureMetadata {
    name: "epsp",
    required_params: &["window_ms", "fit_distance"],
    optional_params: &["baseline_ms"],
    requires: &[],
    uses: &["fiber_volley"],
    outputs: &[
        "epsp_slope",
        "epsp_r2",
        "epsp_s",
        "epsp_v",
        "epsp_mid_s",
        "epsp_mid_v",
        "epsp_amp",
        "epsp_to_fv",
    ],
    documentation: "EPSP trough and slope (mV/ms) from a linear fit of fit_distance samples \
                    either side of the steepest descent. epsp_to_fv needs a fiber_volley result.",
};

/// Population Spike
pub const POP_SPIKE: FeatureMetadata = FeatureMetadata {
    name: "pop_spike",
    required_params: &["lag_ms", "prominence", "threshold"],
    optional_params: &[],
    requires: &["epsp"],
    uses: &[],
    outputs: &["ps_amp", "ps_s", "ps_v", "ps_fallback"],
    documentation: "Highest peak with prominence >= prominence within lag_ms after the EPSP \
                    trough, falling back to the slope profile (|dV/dt| < threshold ends the hump).",
};

pub const FEATURE_REGISTRY: &[FeatureMetadata] = &[FIBER_VOLLEY, EPSP, POP_SPIKE];

/// Feature as written in a pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
    /// Replaces the global smoothing for this feature only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoothing: Option<SmoothingConfig>,
}

impl FeatureSpec {
    pub fn new(name: &str, params: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            params,
            smoothing: None,
        }
    }

    pub fn with_smoothing(mut self, smoothing: SmoothingConfig) -> Self {
        self.smoothing = Some(smoothing);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Feature {
    FiberVolley(FiberVolleyParams),
    Epsp(EpspParams),
    PopSpike(PopSpikeParams),
}

impl Feature {
    pub fn from_spec(spec: &FeatureSpec) -> Result<Self> {
        let meta = FeatureMetadata::from_name(&spec.name).ok_or_else(|| {
            let options: Vec<&str> = FEATURE_REGISTRY.iter().map(|f| f.name).collect();
            EpspError::Config(format!(
                "Unknown feature '{}'. Available: {}",
                spec.name,
                options.join(", ")
            ))
        })?;

        let feature = match meta.name {
            "fiber_volley" => Feature::FiberVolley(parse_params(meta.name, &spec.params)?),
            "epsp" => Feature::Epsp(parse_params(meta.name, &spec.params)?),
            _ => Feature::PopSpike(parse_params(meta.name, &spec.params)?),
        };
        feature.validate()?;
        Ok(feature)
    }

    pub fn metadata(&self) -> &'static FeatureMetadata {
        match self {
            Feature::FiberVolley(_) => &FIBER_VOLLEY,
            Feature::Epsp(_) => &EPSP,
            Feature::PopSpike(_) => &POP_SPIKE,
        }
    }

    pub fn name(&self) -> &'static str {
        self.metadata().name
    }

    fn validate(&self) -> Result<()> {
        let name = self.name();
        let check_window = |label: &str, w: &WindowMs| -> Result<()> {
            if w.is_valid() {
                Ok(())
            } else {
                Err(EpspError::Config(format!(
                    "{}: {} must be an increasing pair, got [{}, {}]",
                    name, label, w.start, w.end
                )))
            }
        };
        match self {
            Feature::FiberVolley(p) => {
                check_window("window_ms", &p.window_ms)?;
                p.baseline_ms
                    .as_ref()
                    .map_or(Ok(()), |w| check_window("baseline_ms", w))
            }
            Feature::Epsp(p) => {
                check_window("window_ms", &p.window_ms)?;
                p.baseline_ms
                    .as_ref()
                    .map_or(Ok(()), |w| check_window("baseline_ms", w))?;
                if p.fit_distance == 0 {
                    return Err(EpspError::Config(format!(
                        "{}: fit_distance must be at least 1 sample",
                        name
                    )));
                }
                Ok(())
            }
            Feature::PopSpike(p) => {
                for (label, value) in [
                    ("lag_ms", p.lag_ms),
                    ("prominence", p.prominence),
                    ("threshold", p.threshold),
                ] {
                    if !(value.is_finite() && value >= 0.0) {
                        return Err(EpspError::Config(format!(
                            "{}: {} must be a non-negative number, got {}",
                            name, label, value
                        )));
                    }
                }
                if p.lag_ms == 0.0 {
                    return Err(EpspError::Config(format!("{}: lag_ms must be positive", name)));
                }
                Ok(())
            }
        }
    }

    pub fn detect(&self, trace: &TraceView<'_>, ctx: &FeatureContext) -> Result<FeatureResult> {
        match self {
            Feature::FiberVolley(p) => fiber_volley::detect(p, trace, ctx),
            Feature::Epsp(p) => epsp::detect(p, trace, ctx),
            Feature::PopSpike(p) => pop_spike::detect(p, trace, ctx),
        }
    }
}

/// Smoothed trace of one stimulus group as seen by a detector.
#[derive(Debug, Clone, Copy)]
pub struct TraceView<'a> {
    pub stim_intensity: f64,
    /// Seconds
    pub time: &'a [f64],
    /// mV
    pub voltage: &'a [f64],
}

impl<'a> TraceView<'a> {
    pub fn new(stim_intensity: f64, time: &'a [f64], voltage: &'a [f64]) -> Self {
        Self {
            stim_intensity,
            time,
            voltage,
        }
    }
}

/// Mean voltage inside `baseline` (relative to the trace start), or 0 mV.
pub(crate) fn reference_level(trace: &TraceView<'_>, baseline: Option<WindowMs>) -> Result<f64> {
    let Some(window) = baseline else {
        return Ok(0.0);
    };
    let offset = trace.time.first().copied().unwrap_or(0.0);
    let range = window.index_range(trace.time, offset);
    if range.is_empty() {
        return Err(EpspError::range("baseline", window.as_tuple()));
    }
    Ok(mean(&trace.voltage[range]))
}

/// Named outputs of one feature for one stimulus group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureResult {
    pub feature: String,
    pub stim_intensity: f64,
    pub values: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FeatureResult {
    pub fn new(feature: &str, stim_intensity: f64) -> Self {
        Self {
            feature: feature.to_string(),
            stim_intensity,
            values: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn with(mut self, name: &str, value: f64) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// Results accumulated for one stimulus group, keyed by feature name.
#[derive(Debug, Clone, Default)]
pub struct FeatureContext {
    results: HashMap<String, FeatureResult>,
}

impl FeatureContext {
    pub fn get(&self, feature: &str) -> Option<&FeatureResult> {
        self.results.get(feature)
    }

    pub fn insert(&mut self, result: FeatureResult) {
        self.results.insert(result.feature.clone(), result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
