use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use epsp_rs::PipelineConfig;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct ValidateOutput {
    config: String,
    valid: bool,
    transforms: Vec<&'static str>,
    features: Vec<&'static str>,
    input_paths: usize,
    missing_inputs: Vec<String>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let mut result = ValidateOutput {
        config: args.config.clone(),
        valid: false,
        transforms: Vec::new(),
        features: Vec::new(),
        input_paths: 0,
        missing_inputs: Vec::new(),
        error: None,
    };

    match PipelineConfig::load(Path::new(&args.config)).and_then(|c| c.validate()) {
        Ok(pipeline) => {
            result.valid = true;
            result.transforms = pipeline.transforms.stages().iter().map(|t| t.name()).collect();
            result.features = pipeline
                .features
                .features()
                .iter()
                .map(|f| f.feature.name())
                .collect();
            result.input_paths = pipeline.io.input_paths.len();
            result.missing_inputs = pipeline
                .io
                .input_paths
                .iter()
                .filter(|p| !p.is_file())
                .map(|p| p.display().to_string())
                .collect();
        }
        Err(e) => result.error = Some(e.to_string()),
    }

    if args.json {
        if !output::print_json(&result, false) {
            return exit_codes::EXECUTION_ERROR;
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        println!(
            "Configuration '{}' is valid: transforms [{}], features [{}]",
            args.config,
            result.transforms.join(", "),
            result.features.join(", ")
        );
        for missing in &result.missing_inputs {
            eprintln!("Warning: input not found: {}", missing);
        }
    }

    if result.valid {
        exit_codes::SUCCESS
    } else {
        exit_codes::INPUT_ERROR
    }
}
