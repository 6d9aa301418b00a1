//! Departure-time recommendation by exhaustive grid search.
//!
//! Every candidate instant in the window is scored. Tree ensembles give
//! piecewise-constant predictions, so no candidate can be skipped.

use crate::error::{PipelineError, Result};
use crate::model::Predictor;
use crate::pipeline::types::{FeatureColumn, FeatureRecord};
use crate::pipeline::utility::median_present;
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL_MINUTES: u32 = 15;

/// A departure window on one segment.
#[derive(Debug, Clone)]
pub struct RecommendationQuery {
    pub segment_id: String,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub interval_minutes: u32,
}

/// Which level of history the candidate's feature vector was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackLevel {
    /// Same segment, same hour of day.
    SegmentHour,
    /// Same segment, any hour.
    Segment,
    /// Whole table, segment ignored.
    Global,
}

impl FallbackLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackLevel::SegmentHour => "segment_hour",
            FallbackLevel::Segment => "segment",
            FallbackLevel::Global => "global",
        }
    }
}

impl fmt::Display for FallbackLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FallbackLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A scored departure time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Candidate {
    #[serde(serialize_with = "serialize_hhmm")]
    pub time: NaiveDateTime,
    pub predicted_minutes: f64,
    pub fallback: FallbackLevel,
}

impl Candidate {
    /// Time of day as `HH:MM`.
    pub fn label(&self) -> String {
        self.time.format("%H:%M").to_string()
    }
}

fn serialize_hhmm<S: Serializer>(time: &NaiveDateTime, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format("%H:%M").to_string())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub segment_id: String,
    pub date: NaiveDate,
    pub candidates: Vec<Candidate>,
    pub best: Candidate,
}

/// Per-column medians of historical features. Columns with no data are absent.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: HashMap<FeatureColumn, f64>,
}

impl FeatureVector {
    fn median_of(rows: &[&FeatureRecord]) -> Self {
        let values = FeatureColumn::ALL
            .into_iter()
            .filter_map(|c| median_present(rows.iter().map(|r| r.feature(c))).map(|m| (c, m)))
            .collect();
        Self { values }
    }

    pub fn get(&self, column: FeatureColumn) -> Option<f64> {
        self.values.get(&column).copied()
    }

    pub fn set(&mut self, column: FeatureColumn, value: f64) {
        self.values.insert(column, value);
    }

    /// Lays the vector out in `columns` order, substituting 0.0 for anything absent
    /// or unknown.
    pub fn to_ordered(&self, columns: &[String]) -> Vec<f64> {
        columns
            .iter()
            .map(|name| {
                FeatureColumn::from_name(name)
                    .and_then(|c| self.get(c))
                    .unwrap_or_else(|| {
                        debug!(column = %name, "Feature absent from candidate vector, using 0.0");
                        0.0
                    })
            })
            .collect()
    }
}

/// Builds a historical feature vector for `segment_id` at `at`.
///
/// Tries the segment's records at the same hour of day, then all of the
/// segment's records, then the whole table, taking per-column medians of the
/// first non-empty level.
///
/// # Errors
///
/// Returns [`PipelineError::NoHistory`] if `history` is empty.
pub fn synthesize_vector(
    history: &[FeatureRecord],
    segment_id: &str,
    at: NaiveDateTime,
) -> Result<(FeatureVector, FallbackLevel)> {
    if history.is_empty() {
        return Err(PipelineError::NoHistory);
    }

    let segment: Vec<&FeatureRecord> = history.iter().filter(|r| r.segment_id == segment_id).collect();
    let same_hour: Vec<&FeatureRecord> = segment
        .iter()
        .copied()
        .filter(|r| r.hour_of_day == at.hour())
        .collect();

    if !same_hour.is_empty() {
        return Ok((FeatureVector::median_of(&same_hour), FallbackLevel::SegmentHour));
    }
    if !segment.is_empty() {
        return Ok((FeatureVector::median_of(&segment), FallbackLevel::Segment));
    }

    let all: Vec<&FeatureRecord> = history.iter().collect();
    Ok((FeatureVector::median_of(&all), FallbackLevel::Global))
}

/// Enumerates `start, start + interval, ...` up to and including `end` on `date`.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyWindow`] when `start > end` and
/// [`PipelineError::InvalidInterval`] for a zero interval.
pub fn candidate_times(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    interval_minutes: u32,
) -> Result<Vec<NaiveDateTime>> {
    if start > end {
        return Err(PipelineError::EmptyWindow {
            start: start.format("%H:%M").to_string(),
            end: end.format("%H:%M").to_string(),
        });
    }
    if interval_minutes == 0 {
        return Err(PipelineError::InvalidInterval(interval_minutes));
    }

    let step = Duration::minutes(i64::from(interval_minutes));
    let end = date.and_time(end);
    let mut t = date.and_time(start);
    let mut times = Vec::new();
    while t <= end {
        times.push(t);
        t += step;
    }
    Ok(times)
}

/// Scores every candidate in the query window and picks the fastest departure.
///
/// Ties go to the earliest candidate.
///
/// # Errors
///
/// [`PipelineError::EmptyWindow`] or [`PipelineError::InvalidInterval`] for a
/// bad window, [`PipelineError::NoHistory`] for an empty feature table.
#[tracing::instrument(
    skip(history, model),
    fields(segment = %query.segment_id, date = %query.date, start = %query.start, end = %query.end)
)]
pub fn recommend<P: Predictor + ?Sized>(
    history: &[FeatureRecord],
    model: &P,
    query: &RecommendationQuery,
) -> Result<Recommendation> {
    let times = candidate_times(query.date, query.start, query.end, query.interval_minutes)?;
    if history.is_empty() {
        return Err(PipelineError::NoHistory);
    }

    let columns = model.feature_columns();
    let mut candidates = Vec::with_capacity(times.len());

    for t in times {
        let (mut vector, fallback) = synthesize_vector(history, &query.segment_id, t)?;
        if fallback == FallbackLevel::Global {
            warn!(time = %t.format("%H:%M"), "No history for segment, using global medians");
        }

        vector.set(FeatureColumn::HourOfDay, f64::from(t.hour()));
        vector.set(
            FeatureColumn::DayOfWeek,
            f64::from(t.weekday().num_days_from_monday()),
        );

        let predicted_minutes = model.predict(&vector.to_ordered(columns));
        debug!(time = %t.format("%H:%M"), predicted_minutes, ?fallback, "Candidate scored");

        candidates.push(Candidate {
            time: t,
            predicted_minutes,
            fallback,
        });
    }

    let mut best = &candidates[0];
    for c in &candidates[1..] {
        if c.predicted_minutes < best.predicted_minutes {
            best = c;
        }
    }
    let best = best.clone();

    info!(
        candidates = candidates.len(),
        best_time = %best.label(),
        best_minutes = best.predicted_minutes,
        "Recommendation ready"
    );

    Ok(Recommendation {
        segment_id: query.segment_id.clone(),
        date: query.date,
        candidates,
        best,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SpeedModel {
        columns: Vec<String>,
    }

    impl SpeedModel {
        fn new() -> Self {
            Self {
                columns: FeatureColumn::names(),
            }
        }
    }

    impl Predictor for SpeedModel {
        fn feature_columns(&self) -> &[String] {
            &self.columns
        }

        fn predict(&self, features: &[f64]) -> f64 {
            if features[0] == 0.0 { 0.0 } else { 600.0 / features[0] }
        }
    }

    /// Scores by hour of day so that later hours are faster.
    struct HourModel {
        columns: Vec<String>,
    }

    impl Predictor for HourModel {
        fn feature_columns(&self) -> &[String] {
            &self.columns
        }

        fn predict(&self, features: &[f64]) -> f64 {
            30.0 - features[0]
        }
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 6).unwrap()
    }

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn row(segment: &str, hour: u32, speed: f64) -> FeatureRecord {
        FeatureRecord {
            segment_id: segment.to_string(),
            hour_bucket: date().and_hms_opt(hour, 0, 0).unwrap(),
            avg_speed: Some(speed),
            travel_time_minutes: 600.0 / speed,
            vehicle_count: Some(10),
            temperature_c: Some(12.0),
            precipitation_mm: None,
            visibility_m: None,
            weather_category: None,
            hour_of_day: hour,
            day_of_week: 0,
            previous_avg_speed: Some(speed),
            weather_severity_index: 0,
        }
    }

    fn query(segment: &str, start: NaiveTime, end: NaiveTime) -> RecommendationQuery {
        RecommendationQuery {
            segment_id: segment.to_string(),
            date: date(),
            start,
            end,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }

    #[test]
    fn test_candidate_times_inclusive() {
        let times = candidate_times(date(), time(8, 0), time(8, 30), 15).unwrap();
        let labels: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
        assert_eq!(labels, vec!["08:00", "08:15", "08:30"]);

        let uneven = candidate_times(date(), time(8, 0), time(8, 40), 15).unwrap();
        assert_eq!(uneven.len(), 3);
    }

    #[test]
    fn test_single_instant_window() {
        let times = candidate_times(date(), time(9, 0), time(9, 0), 15).unwrap();
        assert_eq!(times.len(), 1);
    }

    #[test]
    fn test_inverted_window_is_empty_window_error() {
        let result = candidate_times(date(), time(9, 0), time(8, 0), 15);
        assert!(matches!(result, Err(PipelineError::EmptyWindow { .. })));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = candidate_times(date(), time(8, 0), time(9, 0), 0);
        assert!(matches!(result, Err(PipelineError::InvalidInterval(0))));
    }

    #[test]
    fn test_no_history() {
        let result = recommend(&[], &SpeedModel::new(), &query("A", time(8, 0), time(9, 0)));
        assert!(matches!(result, Err(PipelineError::NoHistory)));
    }

    #[test]
    fn test_fallback_segment_hour() {
        let history = vec![row("S1", 14, 40.0), row("S1", 14, 60.0), row("S1", 9, 10.0)];
        let (vector, level) =
            synthesize_vector(&history, "S1", date().and_hms_opt(14, 0, 0).unwrap()).unwrap();
        assert_eq!(level, FallbackLevel::SegmentHour);
        assert_eq!(vector.get(FeatureColumn::AvgSpeed), Some(50.0));
    }

    #[test]
    fn test_fallback_segment_wide() {
        let history = vec![row("S1", 9, 35.0), row("S2", 14, 80.0)];
        let (vector, level) =
            synthesize_vector(&history, "S1", date().and_hms_opt(14, 0, 0).unwrap()).unwrap();

        assert_eq!(level, FallbackLevel::Segment);
        let only = &history[0];
        for column in FeatureColumn::ALL {
            assert_eq!(vector.get(column), only.feature(column));
        }
    }

    #[test]
    fn test_fallback_global() {
        let history = vec![row("S1", 9, 30.0), row("S2", 14, 50.0)];
        let (vector, level) =
            synthesize_vector(&history, "unknown", date().and_hms_opt(14, 0, 0).unwrap()).unwrap();
        assert_eq!(level, FallbackLevel::Global);
        assert_eq!(vector.get(FeatureColumn::AvgSpeed), Some(40.0));
    }

    #[test]
    fn test_absent_columns_fill_with_zero() {
        let history = vec![row("S1", 9, 30.0)];
        let (vector, _) =
            synthesize_vector(&history, "S1", date().and_hms_opt(9, 0, 0).unwrap()).unwrap();
        assert_eq!(vector.get(FeatureColumn::PrecipitationMm), None);

        let columns = vec![
            "avg_speed".to_string(),
            "precipitation_mm".to_string(),
            "road_works".to_string(),
        ];
        assert_eq!(vector.to_ordered(&columns), vec![30.0, 0.0, 0.0]);
    }

    #[test]
    fn test_calendar_position_overrides_history() {
        let history = vec![row("S1", 9, 30.0)];
        let model = HourModel {
            columns: vec!["hour_of_day".to_string(), "day_of_week".to_string()],
        };
        // 2024-05-06 is a Monday, history says hour 9
        let rec = recommend(&history, &model, &query("S1", time(20, 0), time(22, 0))).unwrap();

        assert_eq!(rec.candidates[0].predicted_minutes, 10.0);
        assert_eq!(rec.best.label(), "22:00");
        assert_eq!(rec.best.predicted_minutes, 8.0);
    }

    #[test]
    fn test_fallback_level_text_matches_json() {
        for level in [FallbackLevel::SegmentHour, FallbackLevel::Segment, FallbackLevel::Global] {
            let json = serde_json::to_string(&level).unwrap();
            assert_eq!(json, format!("\"{level}\""));
        }
        assert_eq!(FallbackLevel::SegmentHour.to_string(), "segment_hour");
    }

    #[test]
    fn test_ties_break_to_earliest() {
        let history = vec![row("A", 8, 40.0)];
        let rec = recommend(&history, &SpeedModel::new(), &query("A", time(7, 0), time(9, 0))).unwrap();

        assert_eq!(rec.candidates.len(), 9);
        assert!(rec.candidates.iter().all(|c| c.predicted_minutes == 15.0));
        assert_eq!(rec.best.label(), "07:00");
    }

    #[test]
    fn test_recommend_is_deterministic() {
        let history = vec![row("A", 8, 40.0), row("A", 9, 20.0), row("B", 8, 60.0)];
        let q = query("A", time(7, 30), time(9, 30));

        let first = recommend(&history, &SpeedModel::new(), &q).unwrap();
        let second = recommend(&history, &SpeedModel::new(), &q).unwrap();
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
        assert_eq!(first.best, second.best);
        assert_eq!(first.best.label(), "08:00");
    }
}
