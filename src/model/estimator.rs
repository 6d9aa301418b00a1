use crate::error::{PipelineError, Result};
use crate::model::forest::{ForestParams, RandomForest};
use crate::model::{FittedModel, HoldoutMetrics, Predictor};
use crate::pipeline::types::{FeatureColumn, FeatureRecord};
use chrono::Utc;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Training settings: holdout split plus forest hyperparameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub seed: u64,
    pub test_fraction: f64,
    pub forest: ForestParams,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            test_fraction: 0.2,
            forest: ForestParams::default(),
        }
    }
}

/// Builds the zero-filled design matrix in [`FeatureColumn::ALL`] order.
///
/// Returns the matrix, the labels and the number of null cells that were filled.
pub fn design_matrix(records: &[FeatureRecord]) -> (Vec<Vec<f64>>, Vec<f64>, usize) {
    let mut filled = 0usize;
    let x: Vec<Vec<f64>> = records
        .iter()
        .map(|r| {
            FeatureColumn::ALL
                .iter()
                .map(|&c| {
                    r.feature(c).unwrap_or_else(|| {
                        filled += 1;
                        0.0
                    })
                })
                .collect::<Vec<f64>>()
        })
        .collect();
    let y: Vec<f64> = records.iter().map(|r| r.travel_time_minutes).collect();
    (x, y, filled)
}

/// Shuffles row indices with `seed` and splits off `ceil(n * test_fraction)` for testing.
///
/// # Errors
///
/// Returns [`PipelineError::TrainingInsufficiency`] if either partition would be empty.
pub fn train_test_split(n: usize, test_fraction: f64, seed: u64) -> Result<(Vec<usize>, Vec<usize>)> {
    let n_test = (n as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::TrainingInsufficiency { rows: n });
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok((train, indices))
}

/// Fits the travel-time model and scores it on a seeded holdout split.
///
/// Missing feature values are zero-filled before fitting.
///
/// # Errors
///
/// Returns [`PipelineError::TrainingInsufficiency`] when the table cannot be
/// split into non-empty train and test partitions.
#[tracing::instrument(skip_all, fields(rows = records.len(), seed = config.seed))]
pub fn train(records: &[FeatureRecord], config: &EstimatorConfig) -> Result<FittedModel> {
    let (x, y, filled) = design_matrix(records);
    if filled > 0 {
        debug!(filled, "Zero-filled missing feature values");
    }

    let (train_idx, test_idx) = train_test_split(records.len(), config.test_fraction, config.seed)?;

    let x_train: Vec<Vec<f64>> = train_idx.iter().map(|&i| x[i].clone()).collect();
    let y_train: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();

    let forest = RandomForest::fit(&x_train, &y_train, &config.forest, config.seed);

    let mut model = FittedModel {
        feature_columns: FeatureColumn::names(),
        forest,
        metrics: HoldoutMetrics {
            mae: 0.0,
            rmse: 0.0,
            train_rows: train_idx.len(),
            test_rows: test_idx.len(),
        },
        trained_at: Utc::now(),
    };

    let errors: Vec<f64> = test_idx
        .iter()
        .map(|&i| model.predict(&x[i]) - y[i])
        .collect();
    let (mae, rmse) = error_summary(&errors);
    model.metrics.mae = mae;
    model.metrics.rmse = rmse;

    info!(
        mae,
        rmse,
        train_rows = model.metrics.train_rows,
        test_rows = model.metrics.test_rows,
        "Model trained"
    );

    Ok(model)
}

/// Mean absolute error and root-mean-square error of prediction residuals.
pub fn error_summary(residuals: &[f64]) -> (f64, f64) {
    if residuals.is_empty() {
        return (0.0, 0.0);
    }
    let n = residuals.len() as f64;
    let mae = residuals.iter().map(|e| e.abs()).sum::<f64>() / n;
    let mse = residuals.iter().map(|e| e * e).sum::<f64>() / n;
    (mae, mse.sqrt())
}
