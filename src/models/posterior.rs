//! Posterior sample collections exported from the fitting library.
//!
//! Every parameter is stored flat in `(chain, draw, *shape)` row-major order,
//! which is how the fitting side dumps its arrays.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSamples {
    /// Trailing (per-sample) shape; empty for scalars.
    #[serde(default)]
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl ParamSamples {
    pub fn sample_len(&self) -> usize {
        self.shape.iter().product()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PosteriorFile", into = "PosteriorFile")]
pub struct Posterior {
    n_chain: usize,
    n_draw: usize,
    params: BTreeMap<String, ParamSamples>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PosteriorFile {
    chains: usize,
    draws: usize,
    params: BTreeMap<String, ParamSamples>,
}

impl TryFrom<PosteriorFile> for Posterior {
    type Error = AppError;

    fn try_from(f: PosteriorFile) -> Result<Self, Self::Error> {
        Posterior::new(f.chains, f.draws, f.params)
    }
}

impl From<Posterior> for PosteriorFile {
    fn from(p: Posterior) -> Self {
        PosteriorFile {
            chains: p.n_chain,
            draws: p.n_draw,
            params: p.params,
        }
    }
}

impl Posterior {
    pub fn new(
        n_chain: usize,
        n_draw: usize,
        params: BTreeMap<String, ParamSamples>,
    ) -> Result<Self, AppError> {
        if n_chain == 0 || n_draw == 0 {
            return Err(AppError::model(format!(
                "Posterior needs at least one chain and one draw (got {n_chain} x {n_draw})."
            )));
        }
        for (name, p) in &params {
            let expected = p
                .shape
                .iter()
                .try_fold(n_chain, |acc, &d| acc.checked_mul(d))
                .and_then(|n| n.checked_mul(n_draw))
                .ok_or_else(|| {
                    AppError::model(format!(
                        "Parameter `{name}` is too large: {n_chain} chains x {n_draw} draws x {:?} overflows.",
                        p.shape
                    ))
                })?;
            if p.values.len() != expected {
                return Err(AppError::model(format!(
                    "Parameter `{name}` has {} values; expected {expected} ({n_chain} chains x {n_draw} draws x {:?}).",
                    p.values.len(),
                    p.shape
                )));
            }
        }
        Ok(Self {
            n_chain,
            n_draw,
            params,
        })
    }

    pub fn n_chain(&self) -> usize {
        self.n_chain
    }

    pub fn n_draw(&self) -> usize {
        self.n_draw
    }

    pub fn param(&self, name: &str) -> Option<&ParamSamples> {
        self.params.get(name)
    }

    /// Values of `name` at one `(chain, draw)` position.
    pub fn sample(&self, name: &str, chain: usize, draw: usize) -> Result<&[f64], AppError> {
        let p = self
            .param(name)
            .ok_or_else(|| AppError::model(format!("Posterior has no parameter `{name}`.")))?;
        if chain >= self.n_chain || draw >= self.n_draw {
            return Err(AppError::model(format!(
                "Sample ({chain}, {draw}) out of range for {} x {} posterior.",
                self.n_chain, self.n_draw
            )));
        }
        let len = p.sample_len();
        let start = (chain * self.n_draw + draw) * len;
        Ok(&p.values[start..start + len])
    }

    pub fn scalar(&self, name: &str, chain: usize, draw: usize) -> Result<f64, AppError> {
        match self.sample(name, chain, draw)? {
            [v] => Ok(*v),
            other => Err(AppError::model(format!(
                "Parameter `{name}` is not a scalar ({} values per sample).",
                other.len()
            ))),
        }
    }

    /// Posterior reduced to the single `(chain, draw)` pair.
    pub fn select(&self, chain: usize, draw: usize) -> Result<Posterior, AppError> {
        let mut params = BTreeMap::new();
        for (name, p) in &self.params {
            params.insert(
                name.clone(),
                ParamSamples {
                    shape: p.shape.clone(),
                    values: self.sample(name, chain, draw)?.to_vec(),
                },
            );
        }
        Posterior::new(1, 1, params)
    }

    pub fn read_json(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open posterior '{}': {e}", path.display())))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| {
            AppError::model(format!("Invalid posterior file '{}': {e}", path.display()))
        })
    }
}
