//! Data types flowing through the alignment and feature pipeline.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// A single raw traffic reading for one road segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficObservation {
    pub timestamp: NaiveDateTime,
    pub segment_id: String,
    pub avg_speed: Option<f64>,
    pub travel_time_minutes: Option<f64>,
    pub vehicle_count: Option<u64>,
}

/// A single raw weather reading. Applies to the whole network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub timestamp: NaiveDateTime,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub visibility_m: Option<f64>,
    pub weather_category: Option<String>,
}

/// Traffic aggregated to one (segment, hour) cell, joined with that hour's weather.
///
/// Cells without a travel-time label never become an `HourlyRecord`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlyRecord {
    pub segment_id: String,
    pub hour_bucket: NaiveDateTime,
    pub avg_speed: Option<f64>,
    pub travel_time_minutes: f64,
    pub vehicle_count: Option<u64>,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub visibility_m: Option<f64>,
    pub weather_category: Option<String>,
}

/// An `HourlyRecord` enriched with temporal, lag and weather-severity features.
///
/// This is the row type of the persisted training/lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub segment_id: String,
    pub hour_bucket: NaiveDateTime,
    pub avg_speed: Option<f64>,
    pub travel_time_minutes: f64,
    pub vehicle_count: Option<u64>,
    pub temperature_c: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub visibility_m: Option<f64>,
    pub weather_category: Option<String>,

    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub previous_avg_speed: Option<f64>,
    pub weather_severity_index: u8,
}

impl FeatureRecord {
    /// Returns the numeric value of a model feature, `None` when it is null.
    pub fn feature(&self, column: FeatureColumn) -> Option<f64> {
        match column {
            FeatureColumn::AvgSpeed => self.avg_speed,
            FeatureColumn::PreviousAvgSpeed => self.previous_avg_speed,
            FeatureColumn::VehicleCount => self.vehicle_count.map(|c| c as f64),
            FeatureColumn::HourOfDay => Some(f64::from(self.hour_of_day)),
            FeatureColumn::DayOfWeek => Some(f64::from(self.day_of_week)),
            FeatureColumn::WeatherSeverityIndex => Some(f64::from(self.weather_severity_index)),
            FeatureColumn::TemperatureC => self.temperature_c,
            FeatureColumn::PrecipitationMm => self.precipitation_mm,
            FeatureColumn::VisibilityM => self.visibility_m,
        }
    }
}

/// The model's input columns, in the fixed training order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureColumn {
    AvgSpeed,
    PreviousAvgSpeed,
    VehicleCount,
    HourOfDay,
    DayOfWeek,
    WeatherSeverityIndex,
    TemperatureC,
    PrecipitationMm,
    VisibilityM,
}

impl FeatureColumn {
    pub const ALL: [FeatureColumn; 9] = [
        FeatureColumn::AvgSpeed,
        FeatureColumn::PreviousAvgSpeed,
        FeatureColumn::VehicleCount,
        FeatureColumn::HourOfDay,
        FeatureColumn::DayOfWeek,
        FeatureColumn::WeatherSeverityIndex,
        FeatureColumn::TemperatureC,
        FeatureColumn::PrecipitationMm,
        FeatureColumn::VisibilityM,
    ];

    pub fn name(self) -> &'static str {
        match self {
            FeatureColumn::AvgSpeed => "avg_speed",
            FeatureColumn::PreviousAvgSpeed => "previous_avg_speed",
            FeatureColumn::VehicleCount => "vehicle_count",
            FeatureColumn::HourOfDay => "hour_of_day",
            FeatureColumn::DayOfWeek => "day_of_week",
            FeatureColumn::WeatherSeverityIndex => "weather_severity_index",
            FeatureColumn::TemperatureC => "temperature_c",
            FeatureColumn::PrecipitationMm => "precipitation_mm",
            FeatureColumn::VisibilityM => "visibility_m",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Column names in training order.
    pub fn names() -> Vec<String> {
        Self::ALL.iter().map(|c| c.name().to_string()).collect()
    }
}
