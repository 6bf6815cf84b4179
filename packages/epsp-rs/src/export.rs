//! JSON result reports.

use crate::error::Result;
use crate::features::ResultsTable;
use crate::recording::StimulusLayout;
use crate::types::{AveragedTable, TidyRow};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Everything produced for one recording. Non-finite numbers serialize as `null`.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingReport {
    pub id: String,
    pub recording: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_path: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Hz
    pub sample_rate: f64,
    pub stimulus: StimulusLayout,
    pub transforms: Vec<String>,
    pub features: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Long-format sweeps after the configured transforms
    pub tidy: Vec<TidyRow>,
    pub averaged: AveragedTable,
    pub results: ResultsTable,
    /// Row warnings and errors, prefixed with their stimulus and feature
    pub warnings: Vec<String>,
}

impl RecordingReport {
    pub fn new(recording: &str, sample_rate: f64, stimulus: StimulusLayout) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            recording: recording.to_string(),
            input_path: None,
            created_at: Utc::now(),
            sample_rate,
            stimulus,
            transforms: Vec::new(),
            features: Vec::new(),
            metadata: serde_json::Map::new(),
            tidy: Vec::new(),
            averaged: AveragedTable::default(),
            results: ResultsTable::default(),
            warnings: Vec::new(),
        }
    }

    /// Collect the warnings and errors of the results table.
    pub fn collect_warnings(&mut self) {
        self.warnings = self
            .results
            .rows
            .iter()
            .flat_map(|row| {
                let prefix = format!("stimulus {} {}", row.stim_intensity, row.feature);
                row.warnings
                    .iter()
                    .map(move |w| format!("{}: {}", prefix, w))
                    .chain(row.error.iter().map(|e| {
                        format!(
                            "stimulus {} {}: error: {}",
                            row.stim_intensity, row.feature, e
                        )
                    }))
                    .collect::<Vec<_>>()
            })
            .collect();
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        Ok(if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        })
    }
}

/// Where each report is written: `output` itself for a single report when it names a
/// file, otherwise `<output>/<recording>_results.json`. Repeated recording names get a
/// `_2`, `_3`, ... suffix so no report replaces another.
pub fn output_paths(reports: &[RecordingReport], output: &Path) -> Vec<PathBuf> {
    if reports.len() == 1 && output.extension().is_some() {
        return vec![output.to_path_buf()];
    }
    let mut taken = HashSet::new();
    reports
        .iter()
        .map(|r| {
            let mut name = format!("{}_results.json", r.recording);
            let mut n = 1;
            while !taken.insert(name.clone()) {
                n += 1;
                name = format!("{}_{}_results.json", r.recording, n);
            }
            if n > 1 {
                log::warn!(
                    "{}: recording name already used, writing {}",
                    r.input_path.as_deref().unwrap_or(&r.recording),
                    name
                );
            }
            output.join(name)
        })
        .collect()
}

/// Write all reports, creating directories as needed. Returns the written paths.
pub fn write_reports(
    reports: &[RecordingReport],
    output: &Path,
    pretty: bool,
) -> Result<Vec<PathBuf>> {
    let paths = output_paths(reports, output);
    for (report, path) in reports.iter().zip(&paths) {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, report.to_json(pretty)?)?;
        log::info!("Wrote {}", path.display());
    }
    Ok(paths)
}
