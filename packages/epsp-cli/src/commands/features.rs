use crate::cli::FeaturesArgs;
use crate::exit_codes;
use crate::output;
use epsp_rs::{FEATURE_REGISTRY, TRANSFORM_REGISTRY};
use serde::Serialize;

#[derive(Serialize)]
struct StepInfo {
    kind: &'static str,
    name: &'static str,
    required_params: &'static [&'static str],
    optional_params: &'static [&'static str],
    requires: &'static [&'static str],
    outputs: &'static [&'static str],
    documentation: &'static str,
}

fn registry() -> Vec<StepInfo> {
    let transforms = TRANSFORM_REGISTRY.iter().map(|t| StepInfo {
        kind: "transform",
        name: t.name,
        required_params: t.required_params,
        optional_params: t.optional_params,
        requires: &[],
        outputs: &[],
        documentation: t.documentation,
    });
    let features = FEATURE_REGISTRY.iter().map(|f| StepInfo {
        kind: "feature",
        name: f.name,
        required_params: f.required_params,
        optional_params: f.optional_params,
        requires: f.requires,
        outputs: f.outputs,
        documentation: f.documentation,
    });
    transforms.chain(features).collect()
}

pub fn execute(args: FeaturesArgs) -> i32 {
    let steps = registry();

    if args.json {
        if !output::print_json(&steps, false) {
            return exit_codes::EXECUTION_ERROR;
        }
        return exit_codes::SUCCESS;
    }

    for kind in ["transform", "feature"] {
        println!("Available {}s:\n", kind);
        println!("  {:<32} {:<36} {}", "Name", "Required params", "Outputs");
        println!("  {}", "-".repeat(96));
        for step in steps.iter().filter(|s| s.kind == kind) {
            println!(
                "  {:<32} {:<36} {}",
                step.name,
                step.required_params.join(", "),
                step.outputs.join(", ")
            );
        }
        println!();
    }
    println!("Feature smoothing: none, moving_average, savgol, butter_lowpass");

    exit_codes::SUCCESS
}
