//! The one capability the prediction engine needs from a fitted model.

use crate::error::AppError;
use crate::io::table::TableView;
use crate::models::posterior::Posterior;

pub const CHAIN_DIM: &str = "chain";
pub const DRAW_DIM: &str = "draw";
pub const OBS_DIM: &str = "__obs__";

#[derive(Debug, Clone, Copy, Default)]
pub struct PredictOptions {
    /// Add group-specific (random) effects to the linear predictor.
    pub include_group_specific: bool,
    /// Draw offsets for group levels not seen during fitting instead of failing.
    pub sample_new_groups: bool,
    /// Seed for the outcome noise; `None` uses OS entropy.
    pub random_seed: Option<u64>,
}

/// One labelled array of posterior-predictive draws.
#[derive(Debug, Clone, PartialEq)]
pub struct PredictiveVar {
    pub name: String,
    pub dims: Vec<String>,
    pub shape: Vec<usize>,
    /// Row-major over `dims`.
    pub values: Vec<f64>,
}

impl PredictiveVar {
    /// Collapse a single-sample `(chain, draw, obs)` array (in any dim order)
    /// to the per-observation vector.
    pub fn into_observations(self, expected: usize) -> Result<Vec<f64>, AppError> {
        if self.dims.len() != self.shape.len() {
            return Err(AppError::model(format!(
                "Variable `{}` has {} dims but {} sizes.",
                self.name,
                self.dims.len(),
                self.shape.len()
            )));
        }

        let mut obs_dims = Vec::new();
        for (dim, &size) in self.dims.iter().zip(&self.shape) {
            if dim == CHAIN_DIM || dim == DRAW_DIM {
                if size != 1 {
                    return Err(AppError::model(format!(
                        "Variable `{}` has {size} entries along `{dim}`; expected a single sample.",
                        self.name
                    )));
                }
            } else {
                obs_dims.push((dim.as_str(), size));
            }
        }

        let [(_, n_obs)] = obs_dims.as_slice() else {
            return Err(AppError::model(format!(
                "Variable `{}` must have exactly one observation dimension, found {:?}.",
                self.name, obs_dims
            )));
        };
        if *n_obs != expected || self.values.len() != expected {
            return Err(AppError::model(format!(
                "Variable `{}` has {} observations; expected {expected}.",
                self.name, n_obs
            )));
        }
        Ok(self.values)
    }
}

/// Posterior-predictive output: by convention a single response variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PredictiveDataset {
    pub vars: Vec<PredictiveVar>,
}

impl PredictiveDataset {
    pub fn into_response(self) -> Result<PredictiveVar, AppError> {
        let mut vars = self.vars;
        match vars.len() {
            1 => Ok(vars.remove(0)),
            0 => Err(AppError::model("Posterior predictive output has no variables.")),
            n => {
                let names: Vec<&str> = vars.iter().map(|v| v.name.as_str()).collect();
                Err(AppError::model(format!(
                    "Posterior predictive output has {n} variables {names:?}; expected a single response."
                )))
            }
        }
    }
}

/// A fitted model that can produce posterior-predictive draws for new rows.
pub trait PosteriorPredictive {
    /// Draw one outcome per `(chain, draw, row)` of `posterior` x `data`.
    fn predict(
        &self,
        posterior: &Posterior,
        data: &TableView<'_>,
        options: &PredictOptions,
    ) -> Result<PredictiveDataset, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(dims: &[&str], shape: &[usize], values: Vec<f64>) -> PredictiveVar {
        PredictiveVar {
            name: "y".to_string(),
            dims: dims.iter().map(|d| d.to_string()).collect(),
            shape: shape.to_vec(),
            values,
        }
    }

    #[test]
    fn flattens_single_sample_regardless_of_dim_order() {
        let v = var(&["chain", "draw", "__obs__"], &[1, 1, 3], vec![1.0, 2.0, 3.0]);
        assert_eq!(v.into_observations(3).unwrap(), vec![1.0, 2.0, 3.0]);

        let v = var(&["y_obs", "chain", "draw"], &[2, 1, 1], vec![4.0, 5.0]);
        assert_eq!(v.into_observations(2).unwrap(), vec![4.0, 5.0]);
    }

    #[test]
    fn rejects_multiple_samples_or_wrong_length() {
        let v = var(&["chain", "draw", "__obs__"], &[2, 1, 1], vec![1.0, 2.0]);
        assert!(v.into_observations(1).is_err());

        let v = var(&["chain", "draw", "__obs__"], &[1, 1, 2], vec![1.0, 2.0]);
        assert!(v.into_observations(3).is_err());

        let v = var(&["chain", "draw", "a", "b"], &[1, 1, 1, 1], vec![1.0]);
        assert!(v.into_observations(1).is_err());
    }

    #[test]
    fn empty_dataset_has_no_response() {
        assert!(PredictiveDataset::default().into_response().is_err());
    }

    #[test]
    fn response_must_be_the_only_variable() {
        let one = PredictiveDataset {
            vars: vec![var(&["chain", "draw", "__obs__"], &[1, 1, 1], vec![0.5])],
        };
        assert_eq!(one.into_response().unwrap().values, vec![0.5]);

        let mut mu = var(&["chain", "draw", "__obs__"], &[1, 1, 1], vec![0.1]);
        mu.name = "mu".to_string();
        let two = PredictiveDataset {
            vars: vec![var(&["chain", "draw", "__obs__"], &[1, 1, 1], vec![0.5]), mu],
        };
        let err = two.into_response().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Model);
        assert!(err.message().contains("\"mu\""), "{err}");
    }
}
