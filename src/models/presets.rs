//! The four household wealth models and their training frames.
//!
//! Fitting happens outside this crate; `prep` writes, per model, the cleaned
//! training CSV plus a model file whose level lists the exported posterior has
//! to follow.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::AppError;
use crate::io::table::{Table, is_missing};
use crate::models::glm::{CommonTerm, Family, GlmSpec, GroupTerm, Link};

/// Clip bounds keeping debt ranks strictly inside (0, 1) for the beta family.
pub const RANK_EPS: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    AssetClass,
    Asset,
    DebtClass,
    Debt,
}

impl ModelRole {
    pub const ALL: [ModelRole; 4] = [
        ModelRole::AssetClass,
        ModelRole::Asset,
        ModelRole::DebtClass,
        ModelRole::Debt,
    ];

    /// File stem used for `<stem>.csv`, `<stem>.model.json`, `<stem>.posterior.json`.
    pub fn file_stem(self) -> &'static str {
        match self {
            ModelRole::AssetClass => "asset_class",
            ModelRole::Asset => "asset",
            ModelRole::DebtClass => "debt_class",
            ModelRole::Debt => "debt",
        }
    }

    pub fn preset(self) -> Preset {
        match self {
            ModelRole::AssetClass => classifier("hh_any_asset"),
            ModelRole::DebtClass => classifier("hh_any_debt"),
            ModelRole::Asset => rank_regressor("prank_assets", None),
            ModelRole::Debt => rank_regressor("prank_debts", Some("prank_debts_adj")),
        }
    }
}

/// Column layout of one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    /// Response column in the survey table.
    pub response: &'static str,
    /// Name the clipped response is stored under, when clipping applies.
    pub clipped_response: Option<&'static str>,
    pub family: Family,
    pub numeric: Vec<&'static str>,
    pub categorical: Vec<&'static str>,
    pub groups: Vec<Vec<&'static str>>,
    /// Extra columns kept in the training frame (and required complete).
    pub passthrough: Vec<&'static str>,
}

const CLASS_NUMERIC: &[&str] = &[
    "male",
    "metro",
    "disability",
    "public_assistance",
    "social_security",
    "poverty",
    "citizen",
];

const GROUP_COLUMNS: &[&str] = &["state", "hh_income", "age", "race_eth", "edu", "household_type"];

fn classifier(response: &'static str) -> Preset {
    Preset {
        response,
        clipped_response: None,
        family: Family::Bernoulli,
        numeric: CLASS_NUMERIC.to_vec(),
        categorical: vec!["class_worker", "tenure"],
        groups: GROUP_COLUMNS.iter().map(|c| vec![*c]).collect(),
        passthrough: vec![],
    }
}

fn rank_regressor(response: &'static str, clipped: Option<&'static str>) -> Preset {
    let mut numeric = CLASS_NUMERIC.to_vec();
    numeric.push("english_at_home");

    let mut groups: Vec<Vec<&'static str>> = GROUP_COLUMNS.iter().map(|c| vec![*c]).collect();
    for other in ["state", "edu", "age", "hh_income"] {
        groups.push(vec!["race_eth", other]);
    }

    Preset {
        response,
        clipped_response: clipped,
        family: Family::Beta,
        numeric,
        categorical: vec!["class_worker", "homevalue", "tenure"],
        groups,
        passthrough: vec!["race_eth_state", "race_eth_edu", "race_eth_age", "race_eth_income"],
    }
}

impl Preset {
    /// Columns required from the survey table, response first.
    pub fn columns(&self) -> Vec<&'static str> {
        let mut out = vec![self.response];
        for c in self
            .groups
            .iter()
            .flatten()
            .chain(&self.numeric)
            .chain(&self.categorical)
            .chain(&self.passthrough)
        {
            if !out.contains(c) {
                out.push(*c);
            }
        }
        out
    }

    fn response_name(&self) -> &'static str {
        self.clipped_response.unwrap_or(self.response)
    }

    /// Select the model's columns, drop incomplete rows, clip the response
    /// if required.
    pub fn training_frame(&self, table: &Table) -> Result<Table, AppError> {
        let columns = self.columns();
        let indices = columns
            .iter()
            .map(|c| {
                table
                    .column_index(c)
                    .ok_or_else(|| AppError::format(format!("Missing required column: `{c}`")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::new();
        for (line, row) in table.rows().iter().enumerate() {
            if indices.iter().any(|&i| is_missing(&row[i])) {
                continue;
            }
            let mut out: Vec<String> = indices.iter().map(|&i| row[i].clone()).collect();
            if self.clipped_response.is_some() {
                let raw = &out[0];
                let v: f64 = raw.parse().map_err(|_| {
                    AppError::format(format!("Row {line}: `{}` = '{raw}' is not numeric.", self.response))
                })?;
                out[0] = v.clamp(RANK_EPS, 1.0 - RANK_EPS).to_string();
            }
            rows.push(out);
        }

        let mut names: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
        names[0] = self.response_name().to_string();
        Table::new(names, rows)
    }

    /// Model description with level lists taken from the training frame.
    pub fn glm_spec(&self, frame: &Table) -> Result<GlmSpec, AppError> {
        let mut common: Vec<CommonTerm> = self
            .numeric
            .iter()
            .map(|c| CommonTerm {
                column: c.to_string(),
                levels: None,
            })
            .collect();
        for c in &self.categorical {
            let levels = observed_levels(frame, &[*c])?;
            if levels.len() < 2 {
                return Err(AppError::format(format!(
                    "Categorical `{c}` has fewer than two observed levels."
                )));
            }
            common.push(CommonTerm {
                column: c.to_string(),
                levels: Some(levels),
            });
        }

        let group_specific = self
            .groups
            .iter()
            .map(|cols| {
                Ok(GroupTerm {
                    columns: cols.iter().map(|c| c.to_string()).collect(),
                    levels: observed_levels(frame, cols)?,
                })
            })
            .collect::<Result<Vec<_>, AppError>>()?;

        Ok(GlmSpec {
            response: self.response_name().to_string(),
            family: self.family,
            link: Link::Logit,
            intercept: true,
            common,
            group_specific,
        })
    }
}

/// Distinct `:`-joined values, numerically sorted when every part parses.
fn observed_levels(frame: &Table, cols: &[&str]) -> Result<Vec<String>, AppError> {
    let idx = cols
        .iter()
        .map(|c| {
            frame
                .column_index(c)
                .ok_or_else(|| AppError::format(format!("Missing required column: `{c}`")))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let set: BTreeSet<Vec<&str>> = frame
        .rows()
        .iter()
        .map(|row| idx.iter().map(|&i| row[i].as_str()).collect())
        .collect();

    let mut levels: Vec<Vec<&str>> = set.into_iter().collect();
    levels.sort_by(|a, b| compare_levels(a, b));
    Ok(levels.into_iter().map(|parts| parts.join(":")).collect())
}

fn compare_levels(a: &[&str], b: &[&str]) -> Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = match (x.parse::<f64>(), y.parse::<f64>()) {
            (Ok(fx), Ok(fy)) => fx.partial_cmp(&fy).unwrap_or(Ordering::Equal).then_with(|| x.cmp(y)),
            _ => x.cmp(y),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
