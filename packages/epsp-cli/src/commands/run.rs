use crate::cli::RunArgs;
use crate::exit_codes;
use crate::output;
use epsp_rs::export::write_reports;
use epsp_rs::{run_batch, PipelineConfig};
use std::path::{Path, PathBuf};
use std::time::Instant;

pub fn execute(args: RunArgs) -> i32 {
    let mut config = match PipelineConfig::load(Path::new(&args.config)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    match resolve_inputs(&args) {
        Ok(Some(files)) => config.io.input_paths = files,
        Ok(None) => {}
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    }
    if let Some(ref dir) = args.output_dir {
        config.io.output_path = Some(PathBuf::from(dir));
    }

    // Results are written here, once failures are known.
    let write_results = config.io.write_results;
    config.io.write_results = false;

    let pipeline = match config.validate() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::INPUT_ERROR;
        }
    };

    let total = pipeline.io.input_paths.len();
    if total == 0 {
        eprintln!("Error: No input recordings (use --input, --glob or io.input_paths)");
        return exit_codes::INPUT_ERROR;
    }
    if !args.quiet {
        eprintln!("Processing {} recording(s)...", total);
    }

    let start_time = Instant::now();
    let summary = match run_batch(&pipeline) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    for failure in &summary.failures {
        eprintln!("  Error: {}: {}", failure.input_path.display(), failure.error);
    }
    let failed = summary.failures.len();
    let succeeded = summary.reports.len();

    if !summary.is_complete() && !args.continue_on_error {
        eprintln!(
            "Error: {} recording(s) failed; no results written \
             (use --continue-on-error to keep the rest)",
            failed
        );
        return exit_codes::EXECUTION_ERROR;
    }

    if succeeded > 0 {
        match (&pipeline.io.output_path, write_results) {
            (Some(out), true) => match write_reports(&summary.reports, out, !args.compact) {
                Ok(paths) => {
                    if !args.quiet {
                        for path in &paths {
                            eprintln!("  Wrote {}", path.display());
                        }
                    }
                }
                Err(e) => {
                    eprintln!("Error: Failed to write results: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            },
            _ => {
                if !output::print_json(&summary.reports, args.compact) {
                    return exit_codes::EXECUTION_ERROR;
                }
            }
        }
    }

    if !args.quiet {
        let warnings: usize = summary
            .reports
            .iter()
            .map(|r| r.results.warning_count())
            .sum();
        eprintln!(
            "Run complete: {}/{} succeeded, {}/{} failed, {} warning(s), {:.1}s",
            succeeded,
            total,
            failed,
            total,
            warnings,
            start_time.elapsed().as_secs_f64()
        );
    }

    if summary.is_complete() {
        exit_codes::SUCCESS
    } else if succeeded > 0 {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

/// Inputs given on the command line, if any.
fn resolve_inputs(args: &RunArgs) -> Result<Option<Vec<PathBuf>>, String> {
    if let Some(ref pattern) = args.glob {
        let files = resolve_glob(pattern)?;
        if files.is_empty() {
            return Err(format!("No files match '{}'", pattern));
        }
        Ok(Some(files))
    } else {
        Ok(args
            .input
            .as_ref()
            .map(|files| files.iter().map(PathBuf::from).collect()))
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<PathBuf>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    files.push(path);
                }
            }
            Err(e) => {
                log::warn!("glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}
