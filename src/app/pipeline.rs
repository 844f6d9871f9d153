//! Shared workflows behind the CLI commands.
//!
//! Keeping these here lets the binary focus on argument handling and printing:
//! - submit -> wait -> download
//! - survey table -> training frames + model files
//! - population table + fitted models -> predictions CSV

use std::fs::create_dir_all;
use std::path::Path;

use tracing::info;

use crate::domain::{PollConfig, PredictConfig};
use crate::error::AppError;
use crate::io::{LoadedModels, read_table_csv, write_predictions_csv, write_training_files};
use crate::ipums::{DownloadManifest, ExtractRequest, IpumsClient};
use crate::models::presets::ModelRole;
use crate::predict::predict_allmodels;

/// Submit `request`, wait for completion, and download every artifact.
pub fn run_extract(
    client: &IpumsClient,
    request: &ExtractRequest,
    poll: PollConfig,
) -> Result<DownloadManifest, AppError> {
    info!("submitting extract");
    let number = client.submit_extract(request)?;
    info!(extract = number, "extract submitted");
    run_download(client, number, poll)
}

/// Wait for an already-submitted extract and download it.
pub fn run_download(
    client: &IpumsClient,
    number: u64,
    poll: PollConfig,
) -> Result<DownloadManifest, AppError> {
    let info = client.wait_for_extract(number, poll)?;
    let manifest = client.download_all(&info, &client.config().out_dir)?;
    info!(
        extract = number,
        files = manifest.files.len(),
        out_dir = %client.config().out_dir.display(),
        "download complete"
    );
    Ok(manifest)
}

/// Write the training frame and model file of each of the four models.
pub fn run_prep(input: &Path, outdir: &Path) -> Result<Vec<(ModelRole, usize)>, AppError> {
    let survey = read_table_csv(input)?;
    create_dir_all(outdir)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", outdir.display())))?;

    let mut written = Vec::with_capacity(ModelRole::ALL.len());
    for role in ModelRole::ALL {
        let rows = write_training_files(outdir, role, &survey)?;
        info!(model = role.file_stem(), rows, dropped = survey.len() - rows, "wrote training frame");
        written.push((role, rows));
    }
    Ok(written)
}

/// Predict every row of `input` with the models in `models_dir`; returns the
/// number of rows written.
pub fn run_predict(
    input: &Path,
    models_dir: &Path,
    output: &Path,
    config: &PredictConfig,
) -> Result<usize, AppError> {
    config.validate()?;
    let table = read_table_csv(input)?;
    let models = LoadedModels::load(models_dir)?;
    info!(rows = table.len(), ndraw = config.ndraw, chunk_size = config.chunk_size, "predicting");

    let predictions = predict_allmodels(&table, &models.model_set(), config)?;
    write_predictions_csv(output, &predictions)?;
    Ok(predictions.len())
}
