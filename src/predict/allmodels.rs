//! Asset/debt prediction across the four wealth models.

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use crate::domain::PredictConfig;
use crate::error::AppError;
use crate::io::table::Table;
use crate::models::{Posterior, PosteriorPredictive};
use crate::predict::chunked::{ChunkOptions, ChunkedDraws, posterior_predictive_chunked};

pub const ANY_ASSET: &str = "any_asset";
pub const ASSET_PRED: &str = "asset_pred";
pub const ASSET_DRAW: &str = "asset_draw";
pub const ANY_DEBT: &str = "any_debt";
pub const DEBT_PRED: &str = "debt_pred";
pub const DEBT_DRAW: &str = "debt_draw";
pub const DRAW_BLOCK: &str = "draw_block";

/// A model together with the posterior it was fitted to.
#[derive(Clone, Copy)]
pub struct FittedModel<'a> {
    pub model: &'a dyn PosteriorPredictive,
    pub posterior: &'a Posterior,
}

#[derive(Clone, Copy)]
pub struct ModelSet<'a> {
    pub asset_class: FittedModel<'a>,
    pub asset: FittedModel<'a>,
    pub debt_class: FittedModel<'a>,
    pub debt: FittedModel<'a>,
}

/// Predictions for one pass over the input table.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockPrediction {
    pub any_asset: Vec<i8>,
    pub asset_pred: Vec<f64>,
    pub asset_draw: Vec<usize>,
    pub any_debt: Vec<i8>,
    pub debt_pred: Vec<f64>,
    pub debt_draw: Vec<usize>,
}

/// Input table augmented with predictions, one block of rows per repetition.
#[derive(Debug, Clone)]
pub struct PredictionTable<'a> {
    input: &'a Table,
    blocks: Vec<BlockPrediction>,
}

impl<'a> PredictionTable<'a> {
    pub fn blocks(&self) -> &[BlockPrediction] {
        &self.blocks
    }

    /// Whether the `draw_block` column is present.
    pub fn tagged(&self) -> bool {
        self.blocks.len() > 1
    }

    pub fn len(&self) -> usize {
        self.blocks.len() * self.input.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn columns(&self) -> Vec<String> {
        let mut cols = self.input.columns().to_vec();
        for c in [ANY_ASSET, ASSET_PRED, ASSET_DRAW, ANY_DEBT, DEBT_PRED, DEBT_DRAW] {
            cols.push(c.to_string());
        }
        if self.tagged() {
            cols.push(DRAW_BLOCK.to_string());
        }
        cols
    }

    /// Output rows in order: block 0 rows 0..N, block 1 rows 0..N, ...
    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        let tagged = self.tagged();
        self.blocks.iter().enumerate().flat_map(move |(k, block)| {
            self.input.rows().iter().enumerate().map(move |(i, row)| {
                let mut out = row.clone();
                out.push(block.any_asset[i].to_string());
                out.push(block.asset_pred[i].to_string());
                out.push(block.asset_draw[i].to_string());
                out.push(block.any_debt[i].to_string());
                out.push(block.debt_pred[i].to_string());
                out.push(block.debt_draw[i].to_string());
                if tagged {
                    out.push(k.to_string());
                }
                out
            })
        })
    }
}

/// Predict asset/debt existence and amounts for every row of `table`.
///
/// Runs `config.ndraw` full passes; pass `k` seeds the models' outcome noise
/// with `seed + k`. Amounts are forced to zero wherever the paired existence
/// draw is 0.
pub fn predict_allmodels<'a>(
    table: &'a Table,
    models: &ModelSet<'_>,
    config: &PredictConfig,
) -> Result<PredictionTable<'a>, AppError> {
    config.validate()?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let mut blocks = Vec::with_capacity(config.ndraw);
    for k in 0..config.ndraw {
        let options = ChunkOptions {
            chunk_size: config.chunk_size,
            include_group_specific: config.include_group_specific,
            sample_new_groups: config.sample_new_groups,
            random_seed: config.seed.map(|s| s.wrapping_add(k as u64)),
        };
        let mut run = |m: FittedModel| {
            posterior_predictive_chunked(m.model, m.posterior, table, &mut rng, &options)
        };

        let any_asset = run(models.asset_class)?;
        let asset = run(models.asset)?;
        let any_debt = run(models.debt_class)?;
        let debt = run(models.debt)?;

        let any_asset = indicators(any_asset);
        let any_debt = indicators(any_debt);
        let asset_pred = force_zero(&any_asset, asset.values);
        let debt_pred = force_zero(&any_debt, debt.values);

        info!(block = k, rows = table.len(), "predicted block");
        blocks.push(BlockPrediction {
            any_asset,
            asset_pred,
            asset_draw: asset.draw_ids,
            any_debt,
            debt_pred,
            debt_draw: debt.draw_ids,
        });
    }

    Ok(PredictionTable {
        input: table,
        blocks,
    })
}

/// Existence draws as 0/1 integers (truncating).
fn indicators(draws: ChunkedDraws) -> Vec<i8> {
    draws.values.into_iter().map(|v| v.trunc() as i8).collect()
}

fn force_zero(indicator: &[i8], amounts: Vec<f64>) -> Vec<f64> {
    indicator
        .iter()
        .zip(amounts)
        .map(|(&flag, amount)| if flag == 0 { 0.0 } else { amount })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::ErrorKind;
    use crate::io::table::TableView;
    use crate::models::{ParamSamples, PredictOptions, PredictiveDataset, PredictiveVar};
    use crate::predict::chunked::tests::{EchoModel, id_posterior, rows};

    /// Emits a fixed per-row pattern, cycling by absolute row index.
    struct PatternModel {
        pattern: Vec<f64>,
        calls: Cell<usize>,
    }

    impl PatternModel {
        fn new(pattern: &[f64]) -> Self {
            Self {
                pattern: pattern.to_vec(),
                calls: Cell::new(0),
            }
        }
    }

    impl PosteriorPredictive for PatternModel {
        fn predict(
            &self,
            _posterior: &Posterior,
            data: &TableView<'_>,
            _options: &PredictOptions,
        ) -> Result<PredictiveDataset, AppError> {
            self.calls.set(self.calls.get() + 1);
            Ok(PredictiveDataset {
                vars: vec![PredictiveVar {
                    name: "y".to_string(),
                    dims: vec!["chain".into(), "draw".into(), "__obs__".into()],
                    shape: vec![1, 1, data.len()],
                    values: (0..data.len())
                        .map(|i| self.pattern[(data.offset() + i) % self.pattern.len()])
                        .collect(),
                }],
            })
        }
    }

    fn small_posterior() -> Posterior {
        let mut params = BTreeMap::new();
        params.insert(
            "mu".to_string(),
            ParamSamples { shape: vec![], values: vec![0.0; 8] },
        );
        Posterior::new(2, 4, params).unwrap()
    }

    fn config(ndraw: usize, chunk_size: usize) -> PredictConfig {
        PredictConfig {
            ndraw,
            seed: Some(123),
            chunk_size,
            ..PredictConfig::default()
        }
    }

    #[test]
    fn amounts_are_zero_exactly_where_indicator_is_zero() {
        let posterior = small_posterior();
        let class = PatternModel::new(&[1.0, 0.0, 1.0, 0.0, 0.0]);
        let amount = PatternModel::new(&[0.25, 0.5, 0.75]);

        let c = FittedModel { model: &class, posterior: &posterior };
        let a = FittedModel { model: &amount, posterior: &posterior };
        let models = ModelSet { asset_class: c, asset: a, debt_class: c, debt: a };

        let table = rows(10);
        let out = predict_allmodels(&table, &models, &config(1, 3)).unwrap();
        let block = &out.blocks()[0];

        for i in 0..10 {
            let raw = [0.25, 0.5, 0.75][i % 3];
            if block.any_asset[i] == 0 {
                assert_eq!(block.asset_pred[i], 0.0);
            } else {
                assert_eq!(block.asset_pred[i], raw);
            }
            assert_eq!(block.any_debt[i], block.any_asset[i]);
        }
        assert_eq!(block.any_asset[..5], [1, 0, 1, 0, 0]);
    }

    #[test]
    fn single_draw_has_no_block_column() {
        let echo = EchoModel::new();
        let posterior = id_posterior(4, 10);
        let m = FittedModel { model: &echo, posterior: &posterior };
        let models = ModelSet { asset_class: m, asset: m, debt_class: m, debt: m };

        let table = rows(7);
        let out = predict_allmodels(&table, &models, &config(1, 3)).unwrap();
        assert_eq!(out.len(), 7);
        assert!(!out.columns().contains(&DRAW_BLOCK.to_string()));
        assert_eq!(out.columns().len(), 1 + 6);
        assert!(out.records().all(|r| r.len() == 7));
        assert!(out.blocks()[0].asset_draw.iter().all(|&d| d < 40));
    }

    #[test]
    fn multiple_draws_repeat_rows_and_tag_blocks() {
        let echo = EchoModel::new();
        let posterior = id_posterior(2, 3);
        let m = FittedModel { model: &echo, posterior: &posterior };
        let models = ModelSet { asset_class: m, asset: m, debt_class: m, debt: m };

        let table = rows(4);
        let out = predict_allmodels(&table, &models, &config(3, 2)).unwrap();
        assert_eq!(out.len(), 12);
        let cols = out.columns();
        assert_eq!(cols.last().map(String::as_str), Some(DRAW_BLOCK));

        let records: Vec<Vec<String>> = out.records().collect();
        assert_eq!(records.len(), 12);
        let tags: Vec<&str> = records.iter().map(|r| r.last().unwrap().as_str()).collect();
        assert_eq!(tags, ["0", "0", "0", "0", "1", "1", "1", "1", "2", "2", "2", "2"]);
        // Input columns repeat in order within each block.
        assert_eq!(records[5][0], "1");
    }

    #[test]
    fn chunk_size_changes_values_but_not_schema() {
        let echo = EchoModel::new();
        let posterior = id_posterior(4, 50);
        let m = FittedModel { model: &echo, posterior: &posterior };
        let models = ModelSet { asset_class: m, asset: m, debt_class: m, debt: m };
        let table = rows(250);

        let a = predict_allmodels(&table, &models, &config(1, 10)).unwrap();
        let b = predict_allmodels(&table, &models, &config(1, 100)).unwrap();
        assert_eq!(a.len(), b.len());
        assert_eq!(a.columns(), b.columns());
    }

    #[test]
    fn invalid_config_rejected_before_any_model_call() {
        let class = PatternModel::new(&[1.0]);
        let posterior = small_posterior();
        let m = FittedModel { model: &class, posterior: &posterior };
        let models = ModelSet { asset_class: m, asset: m, debt_class: m, debt: m };
        let table = rows(3);

        for cfg in [config(0, 10), config(1, 0)] {
            let err = predict_allmodels(&table, &models, &cfg).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Contract);
        }
        assert_eq!(class.calls.get(), 0);
    }

    #[test]
    fn three_rows_two_chunks_end_to_end() {
        let echo = EchoModel::new();
        let posterior = id_posterior(4, 1000);
        let m = FittedModel { model: &echo, posterior: &posterior };
        let models = ModelSet { asset_class: m, asset: m, debt_class: m, debt: m };
        let table = rows(3);

        let out = predict_allmodels(&table, &models, &config(1, 2)).unwrap();
        // Two chunks per model, four models.
        assert_eq!(*echo.calls.borrow(), [(0, 2), (2, 1)].repeat(4));

        let records: Vec<Vec<String>> = out.records().collect();
        let ids: Vec<&str> = records.iter().map(|r| r[0].as_str()).collect();
        assert_eq!(ids, ["0", "1", "2"]);
        let block = &out.blocks()[0];
        assert!(block.asset_draw.iter().chain(&block.debt_draw).all(|&d| d <= 3999));
    }
}
