//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments and sets up logging
//! - resolves the API key (extract commands only)
//! - converts arguments to config structs and runs a pipeline

use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{ApiArgs, Command, DownloadArgs, ExtractArgs, PollArgs, PredictArgs, StatusArgs};
use crate::domain::{ClientConfig, PollConfig, PredictConfig};
use crate::error::AppError;
use crate::ipums::{ApiKey, DataStructure, ExtractRequest, IpumsClient, SelectionMap};

pub mod pipeline;

/// Entry point for the `iw` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Command::Extract(args) => handle_extract(args),
        Command::Status(args) => handle_status(args),
        Command::Download(args) => handle_download(args),
        Command::Prep(args) => {
            let written = pipeline::run_prep(&args.input, &args.outdir)?;
            for (role, rows) in written {
                println!("{}: {rows} rows", role.file_stem());
            }
            Ok(())
        }
        Command::Predict(args) => handle_predict(args),
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn client(api: &ApiArgs, poll: Option<&PollArgs>) -> Result<IpumsClient, AppError> {
    let api_key = ApiKey::from_env()?;
    IpumsClient::new(api_key, client_config_from_args(api, poll))
}

pub fn client_config_from_args(api: &ApiArgs, poll: Option<&PollArgs>) -> ClientConfig {
    let mut config = ClientConfig {
        base_url: api.base_url.clone(),
        collection: api.collection.clone(),
        version: api.api_version.clone(),
        request_timeout: Duration::from_secs(api.request_timeout),
        download_timeout: Duration::from_secs(api.download_timeout),
        ..ClientConfig::default()
    };
    if let Some(poll) = poll {
        config.out_dir = poll.out_dir.clone();
    }
    config
}

pub fn poll_config_from_args(poll: &PollArgs) -> PollConfig {
    PollConfig {
        interval: Duration::from_secs(poll.poll_seconds),
        timeout: Duration::from_secs(poll.timeout_seconds),
    }
}

pub fn extract_request_from_args(args: &ExtractArgs) -> Result<ExtractRequest, AppError> {
    let mut request = ExtractRequest::new(
        args.description.clone(),
        SelectionMap::new(args.samples.iter().cloned()),
        SelectionMap::new(args.variables.iter().map(|v| v.to_ascii_uppercase())),
    )?;
    request.data_format = args.data_format;
    request.data_structure = if args.hierarchical {
        DataStructure::Hierarchical {}
    } else {
        DataStructure::Rectangular {
            on: args.rectangular_on.clone(),
        }
    };
    Ok(request)
}

pub fn predict_config_from_args(args: &PredictArgs) -> PredictConfig {
    PredictConfig {
        ndraw: args.ndraw,
        seed: args.seed,
        chunk_size: args.chunk_size,
        include_group_specific: !args.no_group_specific,
        sample_new_groups: args.sample_new_groups,
    }
}

fn handle_extract(args: ExtractArgs) -> Result<(), AppError> {
    let request = extract_request_from_args(&args)?;
    let client = client(&args.api, Some(&args.poll))?;
    let manifest = pipeline::run_extract(&client, &request, poll_config_from_args(&args.poll))?;
    println!(
        "Done. {} file(s) saved to: {}",
        manifest.files.len(),
        client.config().out_dir.display()
    );
    Ok(())
}

fn handle_status(args: StatusArgs) -> Result<(), AppError> {
    let client = client(&args.api, None)?;
    let info = client.get_extract(args.number)?;
    let text = serde_json::to_string_pretty(&info.raw)
        .map_err(|e| AppError::format(format!("Failed to render status record: {e}")))?;
    println!("{text}");
    Ok(())
}

fn handle_download(args: DownloadArgs) -> Result<(), AppError> {
    let client = client(&args.api, Some(&args.poll))?;
    let manifest = pipeline::run_download(&client, args.number, poll_config_from_args(&args.poll))?;
    for f in &manifest.files {
        println!("{} -> {}", f.artifact, f.path.display());
    }
    Ok(())
}

fn handle_predict(args: PredictArgs) -> Result<(), AppError> {
    let config = predict_config_from_args(&args);
    let rows = pipeline::run_predict(&args.input, &args.models, &args.output, &config)?;
    println!("Wrote {rows} rows to {}", args.output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::ipums::DataFormat;

    #[test]
    fn extract_args_become_request() {
        let cli = Cli::parse_from([
            "iw", "extract", "--variable", "age,sex", "--data-format", "csv", "--rectangular-on", "H",
        ]);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let req = extract_request_from_args(&args).unwrap();
        assert_eq!(req.variables.ids(), &["AGE".to_string(), "SEX".to_string()]);
        assert_eq!(req.data_format, DataFormat::Csv);
        assert_eq!(req.data_structure, DataStructure::Rectangular { on: "H".to_string() });

        let cfg = client_config_from_args(&args.api, Some(&args.poll));
        assert_eq!(cfg.out_dir, std::path::PathBuf::from("ipums_downloads"));
        assert_eq!(poll_config_from_args(&args.poll).timeout, Duration::from_secs(3600));
    }

    #[test]
    fn hierarchical_flag_switches_structure() {
        let cli = Cli::parse_from(["iw", "extract", "--hierarchical"]);
        let Command::Extract(args) = cli.command else {
            panic!("expected extract");
        };
        let req = extract_request_from_args(&args).unwrap();
        assert_eq!(req.data_structure, DataStructure::Hierarchical {});
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["data_structure"], serde_json::json!({"hierarchical": {}}));

        assert!(Cli::try_parse_from(["iw", "extract", "--hierarchical", "--rectangular-on", "H"]).is_err());
    }

    #[test]
    fn predict_args_invert_group_flag() {
        let cli = Cli::parse_from([
            "iw", "predict", "--input", "a", "--models", "b", "--output", "c", "--no-group-specific",
        ]);
        let Command::Predict(args) = cli.command else {
            panic!("expected predict");
        };
        let cfg = predict_config_from_args(&args);
        assert!(!cfg.include_group_specific);
        assert_eq!(cfg.chunk_size, 50_000);
    }
}
