//! Travel-time regression model and its persisted artifact.
//!
//! [`estimator::train`] fits a [`FittedModel`] on the feature table and reports
//! holdout error. The recommender only sees the model through [`Predictor`],
//! which lets it score candidates with any function that declares its input
//! columns.

pub mod estimator;
pub mod forest;

use crate::error::Result;
use chrono::{DateTime, Utc};
use forest::RandomForest;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Anything that maps an ordered feature vector to a travel time in minutes.
pub trait Predictor {
    /// Feature column names in the order `predict` expects them.
    fn feature_columns(&self) -> &[String];

    fn predict(&self, features: &[f64]) -> f64;
}

/// Error of the fitted model on the holdout partition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HoldoutMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// The persisted model artifact: the forest plus the exact columns it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    pub feature_columns: Vec<String>,
    pub forest: RandomForest,
    pub metrics: HoldoutMetrics,
    pub trained_at: DateTime<Utc>,
}

impl FittedModel {
    /// Writes the artifact as JSON, creating parent directories as needed.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(self)?)?;
        info!(path = %path.display(), trees = self.forest.n_trees(), "Model artifact saved");
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let model: FittedModel = serde_json::from_slice(&fs::read(path)?)?;
        debug!(path = %path.display(), columns = model.feature_columns.len(), "Model artifact loaded");
        Ok(model)
    }
}

impl Predictor for FittedModel {
    fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    /// Forest mean, clamped at zero.
    fn predict(&self, features: &[f64]) -> f64 {
        self.forest.predict(features).max(0.0)
    }
}
