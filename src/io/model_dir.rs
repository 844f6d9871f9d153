//! Load the four fitted models from a directory.
//!
//! Layout: `<stem>.model.json` + `<stem>.posterior.json` for each of
//! `asset_class`, `asset`, `debt_class`, `debt`.

use std::path::Path;

use tracing::info;

use crate::error::AppError;
use crate::models::presets::ModelRole;
use crate::models::{GlmModel, Posterior};
use crate::predict::{FittedModel, ModelSet};

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model: GlmModel,
    pub posterior: Posterior,
}

impl LoadedModel {
    pub fn load(dir: &Path, role: ModelRole) -> Result<Self, AppError> {
        let stem = role.file_stem();
        let model = GlmModel::read_json(&dir.join(format!("{stem}.model.json")))?;
        let posterior = Posterior::read_json(&dir.join(format!("{stem}.posterior.json")))?;
        info!(
            model = stem,
            chains = posterior.n_chain(),
            draws = posterior.n_draw(),
            "loaded model"
        );
        Ok(Self { model, posterior })
    }

    pub fn fitted(&self) -> FittedModel<'_> {
        FittedModel {
            model: &self.model,
            posterior: &self.posterior,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub asset_class: LoadedModel,
    pub asset: LoadedModel,
    pub debt_class: LoadedModel,
    pub debt: LoadedModel,
}

impl LoadedModels {
    pub fn load(dir: &Path) -> Result<Self, AppError> {
        Ok(Self {
            asset_class: LoadedModel::load(dir, ModelRole::AssetClass)?,
            asset: LoadedModel::load(dir, ModelRole::Asset)?,
            debt_class: LoadedModel::load(dir, ModelRole::DebtClass)?,
            debt: LoadedModel::load(dir, ModelRole::Debt)?,
        })
    }

    pub fn model_set(&self) -> ModelSet<'_> {
        ModelSet {
            asset_class: self.asset_class.fitted(),
            asset: self.asset.fitted(),
            debt_class: self.debt_class.fitted(),
            debt: self.debt.fitted(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn missing_files_are_io_errors() {
        let dir = std::env::temp_dir().join(format!("iw-models-missing-{}", std::process::id()));
        let err = LoadedModels::load(&dir).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.message().contains("asset_class.model.json"), "{err}");
    }
}
