//! Pipeline configuration.
//!
//! Stored as a JSON object on disk. Every field has a default, so a partial
//! file (or none at all) is valid:
//! ```json
//! {
//!   "paths": { "traffic_csv": "data/traffic.csv", "model": "models/travel_time.json" },
//!   "traffic_columns": { "segment_id": ["location", "link_id"] },
//!   "estimator": { "seed": 7, "forest": { "n_trees": 200 } }
//! }
//! ```

use crate::model::estimator::EstimatorConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where each stage reads and writes its artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataPaths {
    pub traffic_csv: PathBuf,
    pub weather_csv: PathBuf,
    pub hourly_csv: PathBuf,
    pub features_csv: PathBuf,
    pub model: PathBuf,
}

impl Default for DataPaths {
    fn default() -> Self {
        Self {
            traffic_csv: PathBuf::from("data/traffic.csv"),
            weather_csv: PathBuf::from("data/weather.csv"),
            hourly_csv: PathBuf::from("data/hourly.csv"),
            features_csv: PathBuf::from("data/features.csv"),
            model: PathBuf::from("models/travel_time_model.json"),
        }
    }
}

/// Accepted header names for one field, in order of preference.
pub type HeaderAliases = Vec<String>;

fn aliases(names: &[&str]) -> HeaderAliases {
    names.iter().map(|n| n.to_string()).collect()
}

/// Header names of the traffic CSV, keyed by the field they feed.
///
/// Each field lists its aliases; the first one present in the file is used.
/// Only `timestamp` and `segment_id` are required to exist in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrafficColumns {
    pub timestamp: HeaderAliases,
    pub segment_id: HeaderAliases,
    pub avg_speed: HeaderAliases,
    pub travel_time_minutes: HeaderAliases,
    pub vehicle_count: HeaderAliases,
}

impl Default for TrafficColumns {
    fn default() -> Self {
        Self {
            timestamp: aliases(&["timestamp", "date_time"]),
            segment_id: aliases(&["road_segment", "segment", "location"]),
            avg_speed: aliases(&["avg_speed", "speed", "mean_speed"]),
            travel_time_minutes: aliases(&["travel_time_min", "travel_time", "duration_min"]),
            vehicle_count: aliases(&["vehicle_count", "count", "volume"]),
        }
    }
}

/// Header names of the weather CSV. Only `timestamp` is required.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherColumns {
    pub timestamp: HeaderAliases,
    pub temperature_c: HeaderAliases,
    pub precipitation_mm: HeaderAliases,
    pub visibility_m: HeaderAliases,
    pub weather_category: HeaderAliases,
}

impl Default for WeatherColumns {
    fn default() -> Self {
        Self {
            timestamp: aliases(&["timestamp", "date_time"]),
            temperature_c: aliases(&["temp_c"]),
            precipitation_mm: aliases(&["precipitation_mm"]),
            visibility_m: aliases(&["visibility_m"]),
            weather_category: aliases(&["weather_main"]),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub paths: DataPaths,
    pub traffic_columns: TrafficColumns,
    pub weather_columns: WeatherColumns,
    pub estimator: EstimatorConfig,
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: &str) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).with_context(|| format!("reading config '{path}'"))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config '{path}'"))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise falls back to defaults.
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }
}
