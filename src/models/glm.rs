//! Hierarchical GLM evaluator for models fitted by an external sampler.
//!
//! A model file describes the response, family/link, common (fixed) terms and
//! group-specific intercepts; the companion posterior file carries the draws.
//! Parameter naming follows the fitting side:
//!
//! - `Intercept`
//! - one entry per common term, named after its column (categorical terms hold
//!   one coefficient per non-reference level)
//! - `1|g` (one offset per level) and `1|g_sigma` for each group term, where
//!   `g` is the column name or `a:b` for interaction groups
//! - `kappa` for the beta family's precision

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use nalgebra::{DMatrix, DVector};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Bernoulli, Beta, Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::io::table::{TableView, is_missing};
use crate::models::posterior::Posterior;
use crate::models::predictive::{
    CHAIN_DIM, DRAW_DIM, OBS_DIM, PosteriorPredictive, PredictOptions, PredictiveDataset,
    PredictiveVar,
};

pub const INTERCEPT: &str = "Intercept";
pub const BETA_PRECISION: &str = "kappa";

/// Mean is clamped away from 0/1 before parameterising the beta draw.
const MU_EPS: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Family {
    Bernoulli,
    Beta,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Link {
    Logit,
    Cloglog,
}

impl Link {
    pub fn inverse(self, eta: f64) -> f64 {
        match self {
            Link::Logit => 1.0 / (1.0 + (-eta).exp()),
            Link::Cloglog => 1.0 - (-eta.exp()).exp(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommonTerm {
    pub column: String,
    /// Present for categorical terms; the first level is the reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupTerm {
    /// One column, or several for an interaction group.
    pub columns: Vec<String>,
    /// Observed levels, `:`-joined for interactions, in posterior order.
    pub levels: Vec<String>,
}

impl GroupTerm {
    pub fn name(&self) -> String {
        format!("1|{}", self.columns.join(":"))
    }

    pub fn sigma_name(&self) -> String {
        format!("{}_sigma", self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlmSpec {
    pub response: String,
    pub family: Family,
    pub link: Link,
    #[serde(default = "default_true")]
    pub intercept: bool,
    #[serde(default)]
    pub common: Vec<CommonTerm>,
    #[serde(default)]
    pub group_specific: Vec<GroupTerm>,
}

fn default_true() -> bool {
    true
}

/// `GlmSpec` plus precomputed lookups.
#[derive(Debug, Clone)]
pub struct GlmModel {
    spec: GlmSpec,
    group_levels: Vec<HashMap<String, usize>>,
    n_coef: usize,
}

impl GlmModel {
    pub fn new(spec: GlmSpec) -> Result<Self, AppError> {
        let mut n_coef = usize::from(spec.intercept);
        for term in &spec.common {
            n_coef += match &term.levels {
                None => 1,
                Some(levels) if levels.len() >= 2 => levels.len() - 1,
                Some(_) => {
                    return Err(AppError::model(format!(
                        "Categorical term `{}` needs at least two levels.",
                        term.column
                    )));
                }
            };
        }

        let mut group_levels = Vec::with_capacity(spec.group_specific.len());
        for term in &spec.group_specific {
            if term.columns.is_empty() {
                return Err(AppError::model("Group term without columns."));
            }
            let map: HashMap<String, usize> = term
                .levels
                .iter()
                .enumerate()
                .map(|(i, l)| (l.clone(), i))
                .collect();
            if map.len() != term.levels.len() {
                return Err(AppError::model(format!(
                    "Group term `{}` lists duplicate levels.",
                    term.name()
                )));
            }
            group_levels.push(map);
        }

        Ok(Self {
            spec,
            group_levels,
            n_coef,
        })
    }

    pub fn read_json(path: &Path) -> Result<Self, AppError> {
        let file = File::open(path)
            .map_err(|e| AppError::io(format!("Failed to open model '{}': {e}", path.display())))?;
        let spec: GlmSpec = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| AppError::model(format!("Invalid model file '{}': {e}", path.display())))?;
        Self::new(spec)
    }

    pub fn spec(&self) -> &GlmSpec {
        &self.spec
    }

    /// Dense common-effects design block for the view (rows x coefficients).
    fn design_matrix(&self, data: &TableView<'_>) -> Result<DMatrix<f64>, AppError> {
        let n = data.len();
        let mut x = DMatrix::<f64>::zeros(n, self.n_coef);
        let mut col = 0;

        if self.spec.intercept {
            x.column_mut(col).fill(1.0);
            col += 1;
        }

        for term in &self.spec.common {
            let idx = data.require_column(&term.column)?;
            match &term.levels {
                None => {
                    for i in 0..n {
                        x[(i, col)] = parse_numeric(data, i, idx, &term.column)?;
                    }
                    col += 1;
                }
                Some(levels) => {
                    for i in 0..n {
                        let raw = present_value(data, i, idx, &term.column)?;
                        let level = levels.iter().position(|l| l == raw).ok_or_else(|| {
                            AppError::model(format!(
                                "Row {}: unknown level '{raw}' for `{}`.",
                                data.offset() + i,
                                term.column
                            ))
                        })?;
                        if level > 0 {
                            x[(i, col + level - 1)] = 1.0;
                        }
                    }
                    col += levels.len() - 1;
                }
            }
        }

        Ok(x)
    }

    fn coefficients(&self, posterior: &Posterior, chain: usize, draw: usize) -> Result<DVector<f64>, AppError> {
        let mut beta = Vec::with_capacity(self.n_coef);
        if self.spec.intercept {
            beta.push(posterior.scalar(INTERCEPT, chain, draw)?);
        }
        for term in &self.spec.common {
            let values = posterior.sample(&term.column, chain, draw)?;
            let expected = term.levels.as_ref().map_or(1, |l| l.len() - 1);
            if values.len() != expected {
                return Err(AppError::model(format!(
                    "Parameter `{}` has {} values per sample; expected {expected}.",
                    term.column,
                    values.len()
                )));
            }
            beta.extend_from_slice(values);
        }
        Ok(DVector::from_vec(beta))
    }

    /// Per term, per row: the level key and its index (None = unseen).
    fn group_keys<'a>(&self, data: &TableView<'a>) -> Result<Vec<Vec<(String, Option<usize>)>>, AppError> {
        let mut out = Vec::with_capacity(self.spec.group_specific.len());
        for (term, lookup) in self.spec.group_specific.iter().zip(&self.group_levels) {
            let cols = term
                .columns
                .iter()
                .map(|c| data.require_column(c))
                .collect::<Result<Vec<_>, _>>()?;
            let mut keys = Vec::with_capacity(data.len());
            for i in 0..data.len() {
                let parts = cols
                    .iter()
                    .zip(&term.columns)
                    .map(|(&idx, name)| present_value(data, i, idx, name))
                    .collect::<Result<Vec<_>, _>>()?;
                let key = parts.join(":");
                let level = lookup.get(&key).copied();
                keys.push((key, level));
            }
            out.push(keys);
        }
        Ok(out)
    }

    fn draw_outcome(&self, mu: f64, kappa: Option<f64>, rng: &mut StdRng) -> Result<f64, AppError> {
        match self.spec.family {
            Family::Bernoulli => {
                let dist = Bernoulli::new(mu.clamp(0.0, 1.0))
                    .map_err(|e| AppError::model(format!("Bernoulli parameter {mu}: {e}")))?;
                Ok(if dist.sample(rng) { 1.0 } else { 0.0 })
            }
            Family::Beta => {
                let kappa = kappa.ok_or_else(|| AppError::model("Beta family needs `kappa`."))?;
                let mu = mu.clamp(MU_EPS, 1.0 - MU_EPS);
                let dist = Beta::new(mu * kappa, (1.0 - mu) * kappa)
                    .map_err(|e| AppError::model(format!("Beta(mu={mu}, kappa={kappa}): {e}")))?;
                Ok(dist.sample(rng))
            }
        }
    }
}

impl PosteriorPredictive for GlmModel {
    fn predict(
        &self,
        posterior: &Posterior,
        data: &TableView<'_>,
        options: &PredictOptions,
    ) -> Result<PredictiveDataset, AppError> {
        let n = data.len();
        let mut rng = match options.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let x = self.design_matrix(data)?;
        let groups = if options.include_group_specific {
            self.group_keys(data)?
        } else {
            Vec::new()
        };

        let (n_chain, n_draw) = (posterior.n_chain(), posterior.n_draw());
        let mut values = Vec::with_capacity(n_chain * n_draw * n);

        for chain in 0..n_chain {
            for draw in 0..n_draw {
                let beta = self.coefficients(posterior, chain, draw)?;
                let mut eta = &x * &beta;

                for (term, keys) in self.spec.group_specific.iter().zip(&groups) {
                    let offsets = posterior.sample(&term.name(), chain, draw)?;
                    if offsets.len() != term.levels.len() {
                        return Err(AppError::model(format!(
                            "Parameter `{}` has {} levels; model lists {}.",
                            term.name(),
                            offsets.len(),
                            term.levels.len()
                        )));
                    }
                    // Unseen levels share one fresh offset per sample.
                    let mut fresh: HashMap<&str, f64> = HashMap::new();
                    for (i, (key, level)) in keys.iter().enumerate() {
                        eta[i] += match level {
                            Some(l) => offsets[*l],
                            None if options.sample_new_groups => {
                                if let Some(v) = fresh.get(key.as_str()) {
                                    *v
                                } else {
                                    let sigma = posterior.scalar(&term.sigma_name(), chain, draw)?;
                                    let dist = Normal::new(0.0, sigma).map_err(|e| {
                                        AppError::model(format!("`{}` = {sigma}: {e}", term.sigma_name()))
                                    })?;
                                    let v = dist.sample(&mut rng);
                                    fresh.insert(key.as_str(), v);
                                    v
                                }
                            }
                            None => {
                                return Err(AppError::model(format!(
                                    "Row {}: level '{key}' of `{}` was not seen during fitting; enable sampling of new groups to predict it.",
                                    data.offset() + i,
                                    term.name()
                                )));
                            }
                        };
                    }
                }

                let kappa = match self.spec.family {
                    Family::Beta => Some(posterior.scalar(BETA_PRECISION, chain, draw)?),
                    Family::Bernoulli => None,
                };
                for &e in eta.iter() {
                    values.push(self.draw_outcome(self.spec.link.inverse(e), kappa, &mut rng)?);
                }
            }
        }

        Ok(PredictiveDataset {
            vars: vec![PredictiveVar {
                name: self.spec.response.clone(),
                dims: vec![CHAIN_DIM.to_string(), DRAW_DIM.to_string(), OBS_DIM.to_string()],
                shape: vec![n_chain, n_draw, n],
                values,
            }],
        })
    }
}

fn present_value<'a>(data: &TableView<'a>, row: usize, col: usize, name: &str) -> Result<&'a str, AppError> {
    let raw = data.value(row, col);
    if is_missing(raw) {
        return Err(AppError::model(format!(
            "Row {}: missing value for `{name}`.",
            data.offset() + row
        )));
    }
    Ok(raw)
}

fn parse_numeric(data: &TableView<'_>, row: usize, col: usize, name: &str) -> Result<f64, AppError> {
    let raw = present_value(data, row, col, name)?;
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(AppError::model(format!(
            "Row {}: `{name}` = '{raw}' is not numeric.",
            data.offset() + row
        ))),
    }
}
