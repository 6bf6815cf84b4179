use thiserror::Error;

#[derive(Error, Debug)]
pub enum EpspError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{message}{}", sweep_suffix(.sweep))]
    Range {
        message: String,
        sweep: Option<usize>,
    },

    #[error("Transform '{stage}' failed for {recording}{}: {source}", sweep_suffix(.sweep))]
    Transform {
        stage: String,
        recording: String,
        sweep: Option<usize>,
        #[source]
        source: Box<EpspError>,
    },

    #[error("Feature '{feature}' requires a '{requires}' result for stimulus {stim_intensity}")]
    Dependency {
        feature: String,
        requires: String,
        stim_intensity: f64,
    },

    #[error(
        "Expected {expected} sweeps for {intensities} intensities and repnum={repnum}, got {actual}"
    )]
    Assignment {
        expected: usize,
        actual: usize,
        intensities: usize,
        repnum: usize,
    },

    #[error("Sweep {sweep}: {detail}")]
    Mismatch { sweep: usize, detail: String },

    #[error("Failed to parse input: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn sweep_suffix(sweep: &Option<usize>) -> String {
    match sweep {
        Some(idx) => format!(" (sweep {})", idx),
        None => String::new(),
    }
}

impl EpspError {
    pub fn range(what: &str, window_ms: (f64, f64)) -> Self {
        EpspError::Range {
            message: format!(
                "No samples in {} window [{}, {}] ms",
                what, window_ms.0, window_ms.1
            ),
            sweep: None,
        }
    }

    /// Attach the sweep a range error was raised for.
    pub fn for_sweep(self, sweep_index: usize) -> Self {
        match self {
            EpspError::Range { message, .. } => EpspError::Range {
                message,
                sweep: Some(sweep_index),
            },
            other => other,
        }
    }

    /// Wrap a stage failure with the stage name and recording it belongs to.
    pub fn in_stage(self, stage: &str, recording: &str) -> Self {
        let sweep = match &self {
            EpspError::Range { sweep, .. } => *sweep,
            EpspError::Mismatch { sweep, .. } => Some(*sweep),
            _ => None,
        };
        EpspError::Transform {
            stage: stage.to_string(),
            recording: recording.to_string(),
            sweep,
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EpspError>;
