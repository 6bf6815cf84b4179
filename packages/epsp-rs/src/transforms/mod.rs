//! Transform Chain
//!
//! Trace-conditioning stages applied in configured order to every sweep of one recording:
//! 1. `baseline_correction`
//! 2. `crop_stim_artifact` or `template_subtract_stim_artifact`
//! 3. `average_sweeps`
//!
//! The listed order is the recommended one. The chain runs stages exactly as configured;
//! averaging before the per-sweep corrections is the caller's mistake to avoid.

mod average;
mod baseline;
mod stim_artifact;

pub use average::average_sweeps;
pub use baseline::baseline_correction;
pub use stim_artifact::{crop_stim_artifact, template_subtract_stim_artifact};

use crate::error::{EpspError, Result};
use crate::types::{AveragedTable, TidyTable, WindowMs};
use serde::{Deserialize, Serialize};

/// Registry entry describing one transform stage.
#[derive(Debug, Clone, Serialize)]
pub struct TransformMetadata {
    pub name: &'static str,
    pub required_params: &'static [&'static str],
    pub optional_params: &'static [&'static str],
    pub documentation: &'static str,
}

impl TransformMetadata {
    pub fn from_name(name: &str) -> Option<&'static TransformMetadata> {
        TRANSFORM_REGISTRY.iter().find(|t| t.name == name)
    }
}

pub const BASELINE_CORRECTION: TransformMetadata = TransformMetadata {
    name: "baseline_correction",
    required_params: &["window_ms"],
    optional_params: &[],
    documentation: "Subtracts each sweep's mean voltage inside window_ms \
                    (relative to sweep start).",
};

pub const CROP_STIM_ARTIFACT: TransformMetadata = TransformMetadata {
    name: "crop_stim_artifact",
    required_params: &["window_ms"],
    optional_params: &["rezero"],
    documentation: "Excises samples inside window_ms after stimulus onset.",
};

pub const TEMPLATE_SUBTRACT_STIM_ARTIFACT: TransformMetadata = TransformMetadata {
    name: "template_subtract_stim_artifact",
    required_params: &["window_ms"],
    optional_params: &[],
    documentation: "Subtracts the least-squares scaled group-mean artifact inside window_ms.",
};

pub const AVERAGE_SWEEPS: TransformMetadata = TransformMetadata {
    name: "average_sweeps",
    required_params: &[],
    optional_params: &[],
    documentation: "Averages the sweeps of each stimulus group (mean and SEM).",
};

pub const TRANSFORM_REGISTRY: &[TransformMetadata] = &[
    BASELINE_CORRECTION,
    CROP_STIM_ARTIFACT,
    TEMPLATE_SUBTRACT_STIM_ARTIFACT,
    AVERAGE_SWEEPS,
];

/// Transform as written in a pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformSpec {
    pub name: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

impl TransformSpec {
    pub fn new(name: &str, params: serde_json::Value) -> Self {
        Self {
            name: name.to_string(),
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WindowParams {
    window_ms: WindowMs,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CropParams {
    window_ms: WindowMs,
    #[serde(default)]
    rezero: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct NoParams {}

/// Validated transform stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transform {
    BaselineCorrection { window: WindowMs },
    CropStimArtifact { window: WindowMs, rezero: bool },
    TemplateSubtractStimArtifact { window: WindowMs },
    AverageSweeps,
}

impl Transform {
    pub fn from_spec(spec: &TransformSpec) -> Result<Self> {
        let meta = TransformMetadata::from_name(&spec.name).ok_or_else(|| {
            let options: Vec<&str> = TRANSFORM_REGISTRY.iter().map(|t| t.name).collect();
            EpspError::Config(format!(
                "Unknown transform '{}'. Available: {}",
                spec.name,
                options.join(", ")
            ))
        })?;

        let transform = match meta.name {
            "baseline_correction" => {
                let p: WindowParams = parse_params(meta.name, &spec.params)?;
                Transform::BaselineCorrection {
                    window: p.window_ms,
                }
            }
            "crop_stim_artifact" => {
                let p: CropParams = parse_params(meta.name, &spec.params)?;
                Transform::CropStimArtifact {
                    window: p.window_ms,
                    rezero: p.rezero,
                }
            }
            "template_subtract_stim_artifact" => {
                let p: WindowParams = parse_params(meta.name, &spec.params)?;
                Transform::TemplateSubtractStimArtifact {
                    window: p.window_ms,
                }
            }
            _ => {
                let _: NoParams = parse_params(meta.name, &spec.params)?;
                Transform::AverageSweeps
            }
        };

        if let Some(window) = transform.window() {
            if !window.is_valid() {
                return Err(EpspError::Config(format!(
                    "{}: window_ms must be an increasing pair, got [{}, {}]",
                    meta.name, window.start, window.end
                )));
            }
        }
        Ok(transform)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Transform::BaselineCorrection { .. } => BASELINE_CORRECTION.name,
            Transform::CropStimArtifact { .. } => CROP_STIM_ARTIFACT.name,
            Transform::TemplateSubtractStimArtifact { .. } => TEMPLATE_SUBTRACT_STIM_ARTIFACT.name,
            Transform::AverageSweeps => AVERAGE_SWEEPS.name,
        }
    }

    fn window(&self) -> Option<WindowMs> {
        match *self {
            Transform::BaselineCorrection { window }
            | Transform::CropStimArtifact { window, .. }
            | Transform::TemplateSubtractStimArtifact { window } => Some(window),
            Transform::AverageSweeps => None,
        }
    }

    pub fn apply(&self, tidy: &TidyTable) -> Result<TidyTable> {
        match *self {
            Transform::BaselineCorrection { window } => baseline_correction(tidy, window),
            Transform::CropStimArtifact { window, rezero } => {
                crop_stim_artifact(tidy, window, rezero)
            }
            Transform::TemplateSubtractStimArtifact { window } => {
                template_subtract_stim_artifact(tidy, window)
            }
            Transform::AverageSweeps => average_sweeps(tidy),
        }
    }
}

/// Deserialize a params object, treating `null` as an empty object.
pub(crate) fn parse_params<T: serde::de::DeserializeOwned>(
    name: &str,
    params: &serde_json::Value,
) -> Result<T> {
    let value = if params.is_null() {
        serde_json::Value::Object(Default::default())
    } else {
        params.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| EpspError::Config(format!("{}: invalid params: {}", name, e)))
}

/// Ordered, validated transform stages.
#[derive(Debug, Clone, Default)]
pub struct TransformChain {
    stages: Vec<Transform>,
}

impl TransformChain {
    pub fn new(stages: Vec<Transform>) -> Self {
        Self { stages }
    }

    pub fn from_specs(specs: &[TransformSpec]) -> Result<Self> {
        let stages = specs
            .iter()
            .map(Transform::from_spec)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Transform] {
        &self.stages
    }

    /// Run every stage in order; the first failure aborts the chain.
    pub fn run(&self, tidy: &TidyTable, recording: &str) -> Result<TidyTable> {
        let mut current = tidy.clone();
        for stage in &self.stages {
            log::debug!("{}: applying {}", recording, stage.name());
            current = stage
                .apply(&current)
                .map_err(|e| e.in_stage(stage.name(), recording))?;
        }
        Ok(current)
    }

    /// Run the chain and return one averaged trace per stimulus group.
    pub fn apply(&self, tidy: &TidyTable, recording: &str) -> Result<AveragedTable> {
        let transformed = self.run(tidy, recording)?;
        Self::to_averaged(&transformed, recording)
    }

    /// One trace per stimulus group from the output of [`TransformChain::run`]. Groups still
    /// holding several sweeps are averaged here.
    pub fn to_averaged(transformed: &TidyTable, recording: &str) -> Result<AveragedTable> {
        if transformed.max_group_size() <= 1 {
            return Ok(AveragedTable::from_single_sweeps(transformed));
        }
        log::debug!("{}: averaging sweeps after the configured transforms", recording);
        let averaged = average_sweeps(transformed)
            .map_err(|e| e.in_stage(AVERAGE_SWEEPS.name, recording))?;
        Ok(AveragedTable::from_single_sweeps(&averaged))
    }
}
