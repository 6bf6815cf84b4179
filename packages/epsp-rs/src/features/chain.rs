use super::{Feature, FeatureContext, FeatureResult, FeatureSpec, TraceView};
use crate::error::Result;
use crate::smoothing::{smooth, SmoothingConfig};
use crate::types::{AveragedTable, AveragedTrace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A feature paired with the smoothing it runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfiguredFeature {
    pub feature: Feature,
    pub smoothing: SmoothingConfig,
}

/// One row of the results table: a (stimulus, feature) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub stim_intensity: f64,
    pub feature: String,
    pub outputs: BTreeMap<String, f64>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<FeatureResult> for ResultRow {
    fn from(result: FeatureResult) -> Self {
        Self {
            stim_intensity: result.stim_intensity,
            feature: result.feature,
            outputs: result.values,
            warnings: result.warnings,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsTable {
    pub rows: Vec<ResultRow>,
}

impl ResultsTable {
    pub fn get(&self, stim_intensity: f64, feature: &str) -> Option<&ResultRow> {
        self.rows
            .iter()
            .find(|r| r.stim_intensity == stim_intensity && r.feature == feature)
    }

    pub fn value(&self, stim_intensity: f64, feature: &str, output: &str) -> Option<f64> {
        self.get(stim_intensity, feature)?.outputs.get(output).copied()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ResultRow> {
        self.rows.iter().filter(|r| r.error.is_some())
    }

    pub fn warning_count(&self) -> usize {
        self.rows.iter().map(|r| r.warnings.len()).sum()
    }
}

/// Ordered detectors with their smoothing resolved.
#[derive(Debug, Clone, Default)]
pub struct FeatureChain {
    features: Vec<ConfiguredFeature>,
}

impl FeatureChain {
    pub fn new(features: Vec<ConfiguredFeature>) -> Self {
        Self { features }
    }

    /// Build the chain, giving each feature its own smoothing or else `global_smoothing`.
    pub fn from_specs(specs: &[FeatureSpec], global_smoothing: &SmoothingConfig) -> Result<Self> {
        global_smoothing.validate()?;
        let mut features = Vec::with_capacity(specs.len());
        for spec in specs {
            let feature = Feature::from_spec(spec)?;
            let smoothing = match &spec.smoothing {
                Some(own) => own.clone().validated()?,
                None => global_smoothing.clone(),
            };
            for required in feature.metadata().requires {
                let configured_before = features
                    .iter()
                    .any(|f: &ConfiguredFeature| f.feature.name() == *required);
                if !configured_before {
                    log::warn!(
                        "Feature '{}' requires '{}', which is not configured before it",
                        feature.name(),
                        required
                    );
                }
            }
            features.push(ConfiguredFeature { feature, smoothing });
        }
        Ok(Self { features })
    }

    pub fn features(&self) -> &[ConfiguredFeature] {
        &self.features
    }

    /// Rate-dependent smoothing checks; run before any trace is processed.
    pub fn validate_for_rate(&self, sample_rate: f64) -> Result<()> {
        self.features
            .iter()
            .try_for_each(|f| f.smoothing.validate_for_rate(sample_rate))
    }

    /// Run every feature on every stimulus group. Failures are recorded on the row of the
    /// feature and group they happened in; the remaining features still run.
    pub fn run(&self, averaged: &AveragedTable, sample_rate: f64) -> ResultsTable {
        let rows = averaged
            .traces
            .par_iter()
            .map(|trace| self.run_group(trace, sample_rate))
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();
        ResultsTable { rows }
    }

    fn run_group(&self, trace: &AveragedTrace, sample_rate: f64) -> Vec<ResultRow> {
        let mut ctx = FeatureContext::default();
        let mut rows = Vec::with_capacity(self.features.len());

        for configured in &self.features {
            let name = configured.feature.name();
            let outcome = smooth(&trace.mean, &configured.smoothing, sample_rate).and_then(|y| {
                let view = TraceView::new(trace.stim_intensity, &trace.time, &y);
                configured.feature.detect(&view, &ctx)
            });

            match outcome {
                Ok(result) => {
                    for warning in &result.warnings {
                        log::warn!("Stimulus {} {}: {}", trace.stim_intensity, name, warning);
                    }
                    rows.push(ResultRow::from(result.clone()));
                    ctx.insert(result);
                }
                Err(e) => {
                    log::warn!("Stimulus {} {} failed: {}", trace.stim_intensity, name, e);
                    rows.push(ResultRow {
                        stim_intensity: trace.stim_intensity,
                        feature: name.to_string(),
                        outputs: BTreeMap::new(),
                        warnings: Vec::new(),
                        error: Some(e.to_string()),
                    });
                }
            }
        }

        log::debug!(
            "Stimulus {}: {} of {} features succeeded",
            trace.stim_intensity,
            ctx.len(),
            self.features.len()
        );
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn trace(stim: f64, fv_depth: f64) -> AveragedTrace {
        let time: Vec<f64> = (0..120).map(|i| i as f64 / 10_000.0).collect();
        let mean: Vec<f64> = time
            .iter()
            .map(|t| {
                let ms = t * 1000.0;
                let fv = -fv_depth * (-0.5 * ((ms - 1.0) / 0.2).powi(2)).exp();
                let epsp = -2.0 * (-0.5 * ((ms - 6.0) / 1.0).powi(2)).exp();
                fv + epsp
            })
            .collect();
        AveragedTrace {
            stim_intensity: stim,
            sem: vec![f64::NAN; time.len()],
            time,
            mean,
            n_sweeps: 3,
        }
    }

    fn table() -> AveragedTable {
        AveragedTable {
            traces: vec![trace(25.0, 0.4), trace(50.0, 0.8)],
        }
    }

    fn specs() -> Vec<FeatureSpec> {
        vec![
            FeatureSpec::new("fiber_volley", json!({"window_ms": [0.0, 2.0]})),
            FeatureSpec::new("epsp", json!({"window_ms": [3.0, 10.0], "fit_distance": 3})),
        ]
    }

    #[test]
    fn test_chain_rows_in_input_order() {
        let chain = FeatureChain::from_specs(&specs(), &SmoothingConfig::none()).unwrap();
        let results = chain.run(&table(), 10_000.0);
        let order: Vec<(f64, &str)> = results
            .rows
            .iter()
            .map(|r| (r.stim_intensity, r.feature.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                (25.0, "fiber_volley"),
                (25.0, "epsp"),
                (50.0, "fiber_volley"),
                (50.0, "epsp")
            ]
        );
        for row in &results.rows {
            assert!(row.error.is_none());
            for (name, value) in &row.outputs {
                if name.ends_with("_amp") {
                    assert!(*value >= 0.0);
                }
            }
        }
        assert!(results.value(50.0, "fiber_volley", "fv_amp").unwrap() > 0.75);
        let ratio = results.value(50.0, "epsp", "epsp_to_fv").unwrap();
        assert!(ratio.is_finite());
    }

    #[test]
    fn test_missing_dependency_is_scoped() {
        let mut specs = vec![FeatureSpec::new("fiber_volley", json!({"window_ms": [0.0, 2.0]}))];
        specs.push(FeatureSpec::new(
            "pop_spike",
            json!({"lag_ms": 5.0, "prominence": 0.2, "threshold": 0.1}),
        ));
        let chain = FeatureChain::from_specs(&specs, &SmoothingConfig::none()).unwrap();
        let results = chain.run(&table(), 10_000.0);

        assert_eq!(results.rows.len(), 4);
        assert_eq!(results.errors().count(), 2);
        for row in results.errors() {
            assert_eq!(row.feature, "pop_spike");
            assert!(row.error.as_ref().unwrap().contains("epsp"));
        }
        assert!(results.get(25.0, "fiber_volley").unwrap().error.is_none());
    }

    #[test]
    fn test_range_error_does_not_stop_chain() {
        let specs = vec![
            FeatureSpec::new("epsp", json!({"window_ms": [5.95, 10.0], "fit_distance": 4})),
            FeatureSpec::new("fiber_volley", json!({"window_ms": [0.0, 2.0]})),
        ];
        let chain = FeatureChain::from_specs(&specs, &SmoothingConfig::none()).unwrap();
        let results = chain.run(&table(), 10_000.0);
        let epsp = results.get(25.0, "epsp").unwrap();
        assert!(epsp.error.as_ref().unwrap().contains("EPSP"));
        assert!(results.get(25.0, "fiber_volley").unwrap().error.is_none());
    }

    #[test]
    fn test_feature_smoothing_override() {
        let global = SmoothingConfig::savgol(5, 2).unwrap();
        let specs = vec![
            FeatureSpec::new("fiber_volley", json!({"window_ms": [0.0, 2.0]}))
                .with_smoothing(SmoothingConfig::none()),
            FeatureSpec::new("epsp", json!({"window_ms": [3.0, 10.0], "fit_distance": 3})),
        ];
        let chain = FeatureChain::from_specs(&specs, &global).unwrap();
        assert_eq!(chain.features()[0].smoothing, SmoothingConfig::none());
        assert_eq!(chain.features()[1].smoothing, global);
    }

    #[test]
    fn test_chain_from_configured_features() {
        let built = FeatureChain::from_specs(&specs(), &SmoothingConfig::none()).unwrap();
        let manual = FeatureChain::new(built.features().to_vec());
        let results = manual.run(&table(), 10_000.0);
        assert_eq!(
            serde_json::to_string(&results).unwrap(),
            serde_json::to_string(&built.run(&table(), 10_000.0)).unwrap()
        );
        assert_eq!(results.warning_count(), 0);
    }

    #[test]
    fn test_warning_count_sums_rows() {
        let specs = vec![FeatureSpec::new(
            "epsp",
            json!({"window_ms": [3.0, 10.0], "fit_distance": 3}),
        )];
        let chain = FeatureChain::from_specs(&specs, &SmoothingConfig::none()).unwrap();
        let results = chain.run(&table(), 10_000.0);
        // no fiber volley configured: every group warns about epsp_to_fv
        assert_eq!(results.warning_count(), 2);
        assert!(results.value(25.0, "epsp", "epsp_to_fv").unwrap().is_nan());
    }

    #[test]
    fn test_butterworth_rate_checked_up_front() {
        let global = SmoothingConfig::butter_lowpass(3_000.0, 4).unwrap();
        let chain = FeatureChain::from_specs(&specs(), &global).unwrap();
        assert!(chain.validate_for_rate(10_000.0).is_ok());
        assert!(chain.validate_for_rate(5_000.0).is_err());
    }
}
