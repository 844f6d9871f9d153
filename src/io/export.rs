//! Write prediction results and training frames to disk.

use std::path::Path;

use crate::error::AppError;
use crate::io::table::{Table, write_table_csv};
use crate::models::presets::ModelRole;
use crate::predict::PredictionTable;

/// Write the augmented prediction table as CSV.
pub fn write_predictions_csv(path: &Path, predictions: &PredictionTable<'_>) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writer
        .write_record(predictions.columns())
        .map_err(|e| AppError::io(format!("Failed to write export CSV header: {e}")))?;

    for record in predictions.records() {
        writer
            .write_record(&record)
            .map_err(|e| AppError::io(format!("Failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(format!("Failed to flush export CSV '{}': {e}", path.display())))
}

/// Write `<stem>.csv` and `<stem>.model.json` for one model into `dir`.
pub fn write_training_files(dir: &Path, role: ModelRole, survey: &Table) -> Result<usize, AppError> {
    let preset = role.preset();
    let frame = preset.training_frame(survey)?;
    let spec = preset.glm_spec(&frame)?;

    write_table_csv(&dir.join(format!("{}.csv", role.file_stem())), &frame)?;

    let spec_path = dir.join(format!("{}.model.json", role.file_stem()));
    let file = std::fs::File::create(&spec_path)
        .map_err(|e| AppError::io(format!("Failed to create '{}': {e}", spec_path.display())))?;
    serde_json::to_writer_pretty(file, &spec)
        .map_err(|e| AppError::io(format!("Failed to write model file: {e}")))?;

    Ok(frame.len())
}
