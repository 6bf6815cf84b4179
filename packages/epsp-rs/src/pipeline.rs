//! Pipeline orchestration: transform chain, then feature chain, per recording.

use crate::config::ValidatedPipeline;
use crate::error::{EpspError, Result};
use crate::export::{write_reports, RecordingReport};
use crate::loader::load_recording;
use crate::recording::Recording;
use crate::transforms::TransformChain;
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;

/// Run one loaded recording through the validated pipeline.
pub fn run_recording(
    recording: &Recording,
    pipeline: &ValidatedPipeline,
) -> Result<RecordingReport> {
    let start = Instant::now();
    pipeline.layout.check(&recording.tidy)?;
    pipeline.features.validate_for_rate(recording.sample_rate)?;

    let transformed = pipeline.transforms.run(&recording.tidy, &recording.name)?;
    let averaged = TransformChain::to_averaged(&transformed, &recording.name)?;
    let results = pipeline.features.run(&averaged, recording.sample_rate);

    let mut report = RecordingReport::new(
        &recording.name,
        recording.sample_rate,
        pipeline.layout.clone(),
    );
    report.input_path = recording
        .source
        .as_ref()
        .map(|p| p.display().to_string());
    report.transforms = pipeline
        .transforms
        .stages()
        .iter()
        .map(|t| t.name().to_string())
        .collect();
    report.features = pipeline
        .features
        .features()
        .iter()
        .map(|f| f.feature.name().to_string())
        .collect();
    report.metadata = pipeline.io.metadata.clone();
    report
        .metadata
        .extend(recording.metadata.iter().map(|(k, v)| (k.clone(), v.clone())));
    report.tidy = transformed.rows();
    report.averaged = averaged;
    report.results = results;
    report.collect_warnings();

    log::info!(
        "{}: {} stimulus groups, {} result rows ({} failed) in {:.2?}",
        recording.name,
        report.averaged.traces.len(),
        report.results.rows.len(),
        report.results.errors().count(),
        start.elapsed()
    );
    Ok(report)
}

/// A recording that could not be processed.
#[derive(Debug, Clone, Serialize)]
pub struct BatchFailure {
    pub input_path: PathBuf,
    pub error: String,
}

#[derive(Debug, Default, Serialize)]
pub struct BatchSummary {
    pub reports: Vec<RecordingReport>,
    pub failures: Vec<BatchFailure>,
    pub written: Vec<PathBuf>,
}

impl BatchSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Load and run every configured input. A failing recording is reported and skipped;
/// the others still run. Reports are written when `io.write_results` and an output path
/// are set.
pub fn run_batch(pipeline: &ValidatedPipeline) -> Result<BatchSummary> {
    let inputs = &pipeline.io.input_paths;
    if inputs.is_empty() {
        return Err(EpspError::Config("no input paths configured".into()));
    }
    log::info!("Processing {} recording(s)", inputs.len());

    let outcomes: Vec<(PathBuf, Result<RecordingReport>)> = inputs
        .par_iter()
        .map(|path| {
            let outcome = load_recording(path, &pipeline.layout, pipeline.io.sample_rate)
                .and_then(|recording| run_recording(&recording, pipeline));
            (path.clone(), outcome)
        })
        .collect();

    let mut summary = BatchSummary::default();
    for (path, outcome) in outcomes {
        match outcome {
            Ok(report) => summary.reports.push(report),
            Err(e) => {
                log::warn!("{}: {}", path.display(), e);
                summary.failures.push(BatchFailure {
                    input_path: path,
                    error: e.to_string(),
                });
            }
        }
    }

    if pipeline.io.write_results && !summary.reports.is_empty() {
        if let Some(output) = &pipeline.io.output_path {
            summary.written = write_reports(&summary.reports, output, true)?;
        }
    }

    log::info!(
        "Batch finished: {} succeeded, {} failed",
        summary.reports.len(),
        summary.failures.len()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::types::{Sweep, TidyRow, TidyTable};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn pipeline_with(transforms: serde_json::Value) -> ValidatedPipeline {
        let config: PipelineConfig = serde_json::from_value(json!({
            "io": {"repnum": 2, "stim_intensities": [25.0, 50.0]},
            "transforms": transforms,
            "features": [{"name": "fiber_volley", "params": {"window_ms": [0.0, 1.5]}}]
        }))
        .unwrap();
        config.validate().unwrap()
    }

    fn pipeline() -> ValidatedPipeline {
        pipeline_with(json!([{"name": "average_sweeps"}]))
    }

    fn recording(n: usize) -> Recording {
        let time: Vec<f64> = (0..30).map(|i| i as f64 / 10_000.0).collect();
        let sweeps = (0..n)
            .map(|k| {
                let stim = if k < 2 { 25.0 } else { 50.0 };
                let mut voltage = vec![0.0; 30];
                voltage[9] = -(k as f64 + 1.0) / 10.0;
                Sweep {
                    repetition: k % 2 + 1,
                    ..Sweep::new(stim, k, time.clone(), voltage)
                }
            })
            .collect();
        Recording::new("slice_01", TidyTable::new(sweeps), 10_000.0)
    }

    #[test]
    fn test_run_recording() {
        let report = run_recording(&recording(4), &pipeline()).unwrap();
        assert_eq!(report.averaged.traces.len(), 2);
        assert_eq!(report.features, vec!["fiber_volley"]);
        let amp = report.results.value(50.0, "fiber_volley", "fv_amp").unwrap();
        assert!((amp - 0.35).abs() < 1e-12);
        // tidy holds the averaged sweeps when averaging is a configured stage
        assert_eq!(report.tidy.len(), 60);
    }

    #[test]
    fn test_report_tidy_keeps_transformed_sweeps() {
        let dir = TempDir::new().unwrap();
        let report = run_recording(&recording(4), &pipeline_with(json!([]))).unwrap();
        assert_eq!(report.averaged.traces.len(), 2);
        assert_eq!(report.averaged.traces[0].n_sweeps, 2);

        let written = write_reports(&[report], dir.path(), false).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&written[0]).unwrap()).unwrap();
        let rows: Vec<TidyRow> = serde_json::from_value(value["tidy"].clone()).unwrap();
        assert_eq!(rows.len(), 120);

        let tidy = TidyTable::from_rows(&rows);
        assert_eq!(tidy.sweeps.len(), 4);
        let repetitions: Vec<usize> = tidy.sweeps.iter().map(|s| s.repetition).collect();
        assert_eq!(repetitions, vec![1, 2, 1, 2]);
        assert_eq!(tidy.sweeps[3].stim_intensity, 50.0);
        assert!((tidy.sweeps[3].voltage[9] + 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_run_recording_checks_layout() {
        let err = run_recording(&recording(5), &pipeline()).unwrap_err();
        assert!(matches!(err, EpspError::Assignment { .. }));
    }

    #[test]
    fn test_run_batch_requires_inputs() {
        assert!(matches!(run_batch(&pipeline()), Err(EpspError::Config(_))));
    }
}
