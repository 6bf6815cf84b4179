pub mod config;
pub mod error;
pub mod export;
pub mod features;
pub mod loader;
pub mod math;
pub mod pipeline;
pub mod recording;
pub mod smoothing;
pub mod transforms;
pub mod types;

pub use config::{IoConfig, PipelineConfig, ValidatedPipeline};
pub use error::{EpspError, Result};
pub use export::RecordingReport;
pub use features::{
    FeatureChain, FeatureContext, FeatureResult, FeatureSpec, ResultRow, ResultsTable,
    FEATURE_REGISTRY,
};
pub use pipeline::{run_batch, run_recording, BatchFailure, BatchSummary};
pub use recording::{RawSweep, Recording, StimulusLayout};
pub use smoothing::{smooth, SmoothingConfig, SmoothingMethod};
pub use transforms::{TransformChain, TransformSpec, TRANSFORM_REGISTRY};
pub use types::*;
