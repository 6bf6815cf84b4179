//! Pipeline configuration (JSON).

use crate::error::{EpspError, Result};
use crate::features::{FeatureChain, FeatureSpec};
use crate::recording::StimulusLayout;
use crate::smoothing::SmoothingConfig;
use crate::transforms::{TransformChain, TransformSpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_repnum() -> usize {
    3
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IoConfig {
    #[serde(default)]
    pub input_paths: Vec<PathBuf>,
    /// Directory, or a single file when exactly one recording is processed
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    #[serde(default = "default_repnum")]
    pub repnum: usize,
    #[serde(default)]
    pub stim_intensities: Vec<f64>,
    /// Hz; derived from each file's time column when absent
    #[serde(default)]
    pub sample_rate: Option<f64>,
    #[serde(default = "default_true")]
    pub write_results: bool,
    /// Copied into every report
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            input_paths: Vec::new(),
            output_path: None,
            repnum: default_repnum(),
            stim_intensities: Vec::new(),
            sample_rate: None,
            write_results: true,
            metadata: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub io: IoConfig,
    #[serde(default)]
    pub transforms: Vec<TransformSpec>,
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub global_smoothing: SmoothingConfig,
}

/// Everything a run needs, checked up front.
#[derive(Debug, Clone)]
pub struct ValidatedPipeline {
    pub io: IoConfig,
    pub layout: StimulusLayout,
    pub transforms: TransformChain,
    pub features: FeatureChain,
}

impl PipelineConfig {
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content).map_err(|e| match e {
            EpspError::Json(inner) => {
                EpspError::Config(format!("{}: {}", path.display(), inner))
            }
            other => other,
        })
    }

    /// Build every transform, feature and smoothing config. The first problem found is
    /// returned as a configuration error.
    pub fn validate(&self) -> Result<ValidatedPipeline> {
        let layout = StimulusLayout::new(self.io.stim_intensities.clone(), self.io.repnum)?;
        let transforms = TransformChain::from_specs(&self.transforms)?;
        let features = FeatureChain::from_specs(&self.features, &self.global_smoothing)?;

        if let Some(fs) = self.io.sample_rate {
            if !(fs.is_finite() && fs > 0.0) {
                return Err(EpspError::Config(format!(
                    "sample_rate must be a positive frequency, got {}",
                    fs
                )));
            }
            features.validate_for_rate(fs)?;
        }
        if self.features.is_empty() {
            log::warn!("No features configured; reports will only hold averaged traces");
        }

        Ok(ValidatedPipeline {
            io: self.io.clone(),
            layout,
            transforms,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "io": {"input_paths": ["slice_01.csv"], "output_path": "results/",
               "repnum": 3, "stim_intensities": [25, 50]},
        "transforms": [
            {"name": "baseline_correction", "params": {"window_ms": [0.0, 0.1]}},
            {"name": "average_sweeps"}
        ],
        "features": [
            {"name": "fiber_volley", "params": {"window_ms": [0.0, 1.5]},
             "smoothing": {"method": "none"}},
            {"name": "epsp", "params": {"window_ms": [1.5, 6.0], "fit_distance": 3}}
        ],
        "global_smoothing": {"method": "savgol", "window_size": 21, "polyorder": 3}
    }"#;

    #[test]
    fn test_parse_and_validate() {
        let config = PipelineConfig::from_json(CONFIG).unwrap();
        assert!(config.io.write_results);
        assert_eq!(config.io.stim_intensities, vec![25.0, 50.0]);
        let pipeline = config.validate().unwrap();
        assert_eq!(pipeline.transforms.stages().len(), 2);
        assert_eq!(pipeline.features.features().len(), 2);
        assert_eq!(
            pipeline.features.features()[1].smoothing,
            SmoothingConfig::savgol(21, 3).unwrap()
        );
    }

    #[test]
    fn test_unknown_feature_is_config_error() {
        let config = PipelineConfig::from_json(&CONFIG.replace("\"epsp\"", "\"epsc\"")).unwrap();
        match config.validate() {
            Err(EpspError::Config(msg)) => {
                assert!(msg.contains("epsc"));
                assert!(msg.contains("fiber_volley, epsp, pop_spike"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_invalid_global_smoothing_rejected() {
        let content = CONFIG.replace("\"window_size\": 21", "\"window_size\": 3");
        let config = PipelineConfig::from_json(&content).unwrap();
        assert!(matches!(config.validate(), Err(EpspError::Config(_))));
    }

    #[test]
    fn test_unknown_top_level_key_rejected() {
        assert!(PipelineConfig::from_json(r#"{"plots": []}"#).is_err());
    }

    #[test]
    fn test_cutoff_checked_against_configured_rate() {
        let mut config = PipelineConfig::from_json(CONFIG).unwrap();
        config.global_smoothing = SmoothingConfig::butter_lowpass(6_000.0, 2).unwrap();
        config.io.sample_rate = Some(10_000.0);
        assert!(config.validate().is_err());
        config.io.sample_rate = Some(20_000.0);
        assert!(config.validate().is_ok());
    }
}
