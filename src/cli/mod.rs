//! Command-line parsing for the `iw` binary.
//!
//! Argument parsing and command dispatch stay separate from the extract
//! client and the prediction engine; `app` turns these structs into the
//! library's config types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{DEFAULT_BASE_URL, DEFAULT_CHUNK_SIZE, DEFAULT_COLLECTION, DEFAULT_OUT_DIR, DEFAULT_VERSION};
use crate::ipums::{DEFAULT_DESCRIPTION, DEFAULT_SAMPLES, DEFAULT_VARIABLES, DataFormat};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "iw", version, about = "IPUMS extracts and household wealth imputation")]
pub struct Cli {
    /// Log filter (e.g. `info`, `debug`, `ipums_wealth=trace`).
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Submit an extract, wait for it, and download every artifact.
    Extract(ExtractArgs),
    /// Print the current status record of an extract as JSON.
    Status(StatusArgs),
    /// Wait for an existing extract and download its artifacts.
    Download(DownloadArgs),
    /// Write cleaned training frames and model files for the external fitter.
    Prep(PrepArgs),
    /// Predict asset/debt outcomes for every row of a population table.
    Predict(PredictArgs),
}

/// Connection settings shared by every API command.
#[derive(Debug, Args, Clone)]
pub struct ApiArgs {
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    #[arg(long, default_value = DEFAULT_COLLECTION)]
    pub collection: String,

    #[arg(long = "api-version", default_value = DEFAULT_VERSION)]
    pub api_version: String,

    /// Timeout for submit/status requests (seconds).
    #[arg(long, default_value_t = 60)]
    pub request_timeout: u64,

    /// Timeout for each artifact download (seconds).
    #[arg(long, default_value_t = 300)]
    pub download_timeout: u64,
}

#[derive(Debug, Args, Clone)]
pub struct PollArgs {
    /// Seconds between status polls.
    #[arg(long, default_value_t = 15)]
    pub poll_seconds: u64,

    /// Give up after this many seconds.
    #[arg(long, default_value_t = 3600)]
    pub timeout_seconds: u64,

    /// Directory for downloaded files.
    #[arg(long, default_value = DEFAULT_OUT_DIR)]
    pub out_dir: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub poll: PollArgs,

    #[arg(long, default_value = DEFAULT_DESCRIPTION)]
    pub description: String,

    /// Sample ids (repeatable or comma-separated).
    #[arg(long = "sample", value_delimiter = ',', default_values_t = owned(DEFAULT_SAMPLES))]
    pub samples: Vec<String>,

    /// Variable names (repeatable or comma-separated).
    #[arg(long = "variable", value_delimiter = ',', default_values_t = owned(DEFAULT_VARIABLES))]
    pub variables: Vec<String>,

    #[arg(long, value_enum, default_value_t = DataFormat::FixedWidth)]
    pub data_format: DataFormat,

    /// Record type for rectangular extracts.
    #[arg(long, default_value = "P")]
    pub rectangular_on: String,

    /// Request a hierarchical extract instead of a rectangular one.
    #[arg(long, conflicts_with = "rectangular_on")]
    pub hierarchical: bool,
}

#[derive(Debug, Args, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    pub number: u64,
}

#[derive(Debug, Args, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub api: ApiArgs,

    #[command(flatten)]
    pub poll: PollArgs,

    pub number: u64,
}

#[derive(Debug, Args, Clone)]
pub struct PrepArgs {
    /// Survey CSV with responses and covariates.
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Directory receiving `<model>.csv` and `<model>.model.json`.
    #[arg(long, value_name = "DIR")]
    pub outdir: PathBuf,
}

#[derive(Debug, Args, Clone)]
pub struct PredictArgs {
    /// Population CSV to predict for.
    #[arg(long, value_name = "CSV")]
    pub input: PathBuf,

    /// Directory with `<model>.model.json` and `<model>.posterior.json`.
    #[arg(long, value_name = "DIR")]
    pub models: PathBuf,

    /// Output CSV.
    #[arg(long, value_name = "CSV")]
    pub output: PathBuf,

    /// Number of full prediction passes.
    #[arg(long, default_value_t = 1)]
    pub ndraw: usize,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Rows per posterior sample.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Drop group-specific effects from the linear predictor.
    #[arg(long)]
    pub no_group_specific: bool,

    /// Draw effects for group levels not seen during fitting.
    #[arg(long)]
    pub sample_new_groups: bool,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_defaults_match_standard_request() {
        let cli = Cli::parse_from(["iw", "extract"]);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.samples, vec!["us2022a"]);
        assert_eq!(args.variables, vec!["AGE", "SEX", "RACE", "HISPAN", "STATEFIP"]);
        assert_eq!(args.poll.poll_seconds, 15);
        assert_eq!(args.api.collection, "usa");
    }

    #[test]
    fn predict_flags_parse() {
        let cli = Cli::parse_from([
            "iw", "predict", "--input", "in.csv", "--models", "m", "--output", "o.csv",
            "--ndraw", "3", "--seed", "9", "--chunk-size", "10", "--sample-new-groups",
        ]);
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        assert_eq!((args.ndraw, args.seed, args.chunk_size), (3, Some(9), 10));
        assert!(args.sample_new_groups && !args.no_group_specific);
    }

    #[test]
    fn variables_accept_comma_lists() {
        let cli = Cli::parse_from(["iw", "extract", "--variable", "AGE,SEX", "--variable", "INCTOT"]);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        assert_eq!(args.variables, vec!["AGE", "SEX", "INCTOT"]);
    }
}
