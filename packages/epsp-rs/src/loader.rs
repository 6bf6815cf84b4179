//! Plain-text recording loader.
//!
//! Wide layout, one row per time point:
//! - first column is time in seconds, every further column is one sweep in acquisition order
//! - comma, tab or whitespace separated
//! - `#` comment lines and blank lines are ignored
//! - a first row holding any non-numeric field is taken as the header

use crate::error::{EpspError, Result};
use crate::recording::{sample_rate_from_time, RawSweep, Recording, StimulusLayout};
use rayon::prelude::*;
use std::fs;
use std::path::Path;

/// Parsed wide table, column-major.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTable {
    pub labels: Vec<String>,
    pub has_header: bool,
    /// `[column][row]`
    pub columns: Vec<Vec<f64>>,
}

impl TextTable {
    pub fn num_rows(&self) -> usize {
        self.columns.first().map_or(0, Vec::len)
    }
}

fn split_line(line: &str, delimiter: Option<char>) -> Vec<&str> {
    match delimiter {
        Some(d) => line.split(d).map(str::trim).collect(),
        None => line.split_whitespace().collect(),
    }
}

/// Parse the text of a wide table.
pub fn parse_text(content: &str) -> Result<TextTable> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty() && !l.starts_with('#'))
        .collect();

    let Some(&(_, first_line)) = lines.first() else {
        return Err(EpspError::Parse("no data rows found".into()));
    };

    let delimiter = first_line.contains(',').then_some(',');

    let first_row = split_line(first_line, delimiter);
    let has_header = first_row.iter().any(|s| s.parse::<f64>().is_err());
    let labels: Vec<String> = if has_header {
        first_row.iter().map(|s| s.to_string()).collect()
    } else {
        std::iter::once("time".to_string())
            .chain((1..first_row.len()).map(|i| format!("sweep_{}", i)))
            .collect()
    };
    let num_columns = labels.len();
    let data_lines = &lines[usize::from(has_header)..];

    let rows: Vec<Vec<f64>> = data_lines
        .par_iter()
        .map(|&(line_no, line)| {
            let fields = split_line(line, delimiter);
            if fields.len() != num_columns {
                return Err(EpspError::Parse(format!(
                    "line {} has {} values, expected {}",
                    line_no,
                    fields.len(),
                    num_columns
                )));
            }
            fields
                .iter()
                .enumerate()
                .map(|(col, field)| {
                    field.parse::<f64>().map_err(|_| {
                        EpspError::Parse(format!(
                            "invalid number '{}' at line {}, column {}",
                            field,
                            line_no,
                            col + 1
                        ))
                    })
                })
                .collect()
        })
        .collect::<Result<_>>()?;

    if rows.is_empty() {
        return Err(EpspError::Parse("no data rows found".into()));
    }

    let mut columns = vec![Vec::with_capacity(rows.len()); num_columns];
    for row in rows {
        for (col, value) in row.into_iter().enumerate() {
            columns[col].push(value);
        }
    }

    Ok(TextTable {
        labels,
        has_header,
        columns,
    })
}

/// Load a recording file and assign its sweeps to stimulus groups.
///
/// `sample_rate` overrides the rate derived from the time column.
pub fn load_recording(
    path: &Path,
    layout: &StimulusLayout,
    sample_rate: Option<f64>,
) -> Result<Recording> {
    let content = fs::read_to_string(path)?;
    let table = parse_text(&content)?;
    if table.columns.len() < 2 {
        return Err(EpspError::Parse(format!(
            "{}: expected a time column followed by at least one sweep column",
            path.display()
        )));
    }

    let mut columns = table.columns.into_iter();
    let time = columns.next().unwrap_or_default();
    if time.windows(2).any(|w| w[1] <= w[0]) {
        return Err(EpspError::Parse(format!(
            "{}: time column must be strictly increasing",
            path.display()
        )));
    }
    let sample_rate = match sample_rate {
        Some(fs) => fs,
        None => sample_rate_from_time(&time)?,
    };

    let raw: Vec<RawSweep> = columns
        .map(|voltage| RawSweep {
            time: time.clone(),
            voltage,
        })
        .collect();
    let tidy = layout.assign(raw)?;

    let name = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "recording".to_string());

    log::info!(
        "Loaded {}: {} sweeps x {} samples at {:.1} Hz",
        name,
        tidy.sweeps.len(),
        time.len(),
        sample_rate
    );

    let mut recording = Recording::new(name, tidy, sample_rate);
    recording.metadata.insert(
        "input_path".into(),
        serde_json::Value::String(path.display().to_string()),
    );
    if table.has_header {
        recording
            .metadata
            .insert("columns".into(), serde_json::json!(table.labels));
    }
    recording.source = Some(path.to_path_buf());
    Ok(recording)
}
