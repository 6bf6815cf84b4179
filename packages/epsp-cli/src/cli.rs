use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "epspkit",
    version,
    about = "Evoked field potential feature extraction",
    long_about = "Extract fiber volley, EPSP and population spike features from evoked\n\
                  field potential recordings (CSV/TSV/whitespace text, time column first)\n\
                  using a JSON pipeline configuration."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the pipeline on one or more recordings
    Run(RunArgs),
    /// List available transforms and features
    Features(FeaturesArgs),
    /// Validate a pipeline configuration
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct RunArgs {
    /// Pipeline configuration (JSON)
    #[arg(short, long)]
    pub config: String,

    /// Input recordings; replaces io.input_paths from the configuration
    #[arg(long, num_args = 1..)]
    pub input: Option<Vec<String>>,

    /// Glob pattern selecting input recordings (e.g., "data/*.csv")
    #[arg(long, conflicts_with = "input")]
    pub glob: Option<String>,

    /// Output directory (or file, for a single recording); replaces io.output_path
    #[arg(short, long)]
    pub output_dir: Option<String>,

    /// Write results even when some recordings fail
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Compact JSON output (no indentation)
    #[arg(long, default_value_t = false)]
    pub compact: bool,

    /// Suppress progress messages on stderr
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct FeaturesArgs {
    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Pipeline configuration (JSON)
    #[arg(short, long)]
    pub config: String,

    /// Output as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}
