use crate::error::{PipelineError, Result};
use crate::pipeline::severity::WeatherConditions;
use crate::pipeline::types::{FeatureRecord, HourlyRecord};
use crate::pipeline::utility::mean_present;
use chrono::{Datelike, Timelike};
use tracing::{debug, info};

/// Number of records (current included) in the trailing lag fallback window.
const LAG_FALLBACK_WINDOW: usize = 3;

/// Derives temporal, lag and weather-severity features from aligned records.
///
/// The output is sorted by segment then hour bucket. `previous_avg_speed` is the
/// preceding record's `avg_speed` within the segment; when that is missing it
/// falls back to the trailing mean over the current and up to two preceding
/// records, and stays null when the window holds no speed at all.
///
/// # Errors
///
/// Returns [`PipelineError::Data`] if a record has an empty segment id.
#[tracing::instrument(skip_all, fields(records = records.len()))]
pub fn synthesize(records: &[HourlyRecord]) -> Result<Vec<FeatureRecord>> {
    if let Some(bad) = records.iter().find(|r| r.segment_id.trim().is_empty()) {
        return Err(PipelineError::data(format!(
            "hourly record at {} has no segment_id",
            bad.hour_bucket
        )));
    }

    let mut sorted: Vec<&HourlyRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        a.segment_id
            .cmp(&b.segment_id)
            .then(a.hour_bucket.cmp(&b.hour_bucket))
    });

    let mut features = Vec::with_capacity(sorted.len());
    let mut lag_fallbacks = 0usize;
    let mut null_lags = 0usize;

    for segment in sorted.chunk_by(|a, b| a.segment_id == b.segment_id) {
        for (i, record) in segment.iter().enumerate() {
            let true_lag = i
                .checked_sub(1)
                .and_then(|prev| segment[prev].avg_speed);

            let previous_avg_speed = match true_lag {
                Some(lag) => Some(lag),
                None => {
                    lag_fallbacks += 1;
                    let start = (i + 1).saturating_sub(LAG_FALLBACK_WINDOW);
                    let rolling = mean_present(segment[start..=i].iter().map(|r| r.avg_speed));
                    if rolling.is_none() {
                        null_lags += 1;
                    }
                    rolling
                }
            };

            features.push(to_feature_record(record, previous_avg_speed));
        }
    }

    debug!(lag_fallbacks, null_lags, "Lag features derived");
    info!(feature_records = features.len(), "Feature synthesis complete");

    Ok(features)
}

fn to_feature_record(record: &HourlyRecord, previous_avg_speed: Option<f64>) -> FeatureRecord {
    let weather_severity_index = WeatherConditions {
        precipitation_mm: record.precipitation_mm,
        visibility_m: record.visibility_m,
        weather_category: record.weather_category.as_deref(),
    }
    .severity_index();

    FeatureRecord {
        segment_id: record.segment_id.clone(),
        hour_bucket: record.hour_bucket,
        avg_speed: record.avg_speed,
        travel_time_minutes: record.travel_time_minutes,
        vehicle_count: record.vehicle_count,
        temperature_c: record.temperature_c,
        precipitation_mm: record.precipitation_mm,
        visibility_m: record.visibility_m,
        weather_category: record.weather_category.clone(),
        hour_of_day: record.hour_bucket.hour(),
        day_of_week: record.hour_bucket.weekday().num_days_from_monday(),
        previous_avg_speed,
        weather_severity_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn hour(h: u32) -> NaiveDateTime {
        // 2024-05-06 is a Monday
        NaiveDate::from_ymd_opt(2024, 5, 6)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn record(segment: &str, h: u32, speed: Option<f64>) -> HourlyRecord {
        HourlyRecord {
            segment_id: segment.to_string(),
            hour_bucket: hour(h),
            avg_speed: speed,
            travel_time_minutes: 10.0,
            vehicle_count: Some(4),
            temperature_c: None,
            precipitation_mm: None,
            visibility_m: None,
            weather_category: None,
        }
    }

    #[test]
    fn test_temporal_features() {
        let mut r = record("A", 17, Some(50.0));
        r.hour_bucket = NaiveDate::from_ymd_opt(2024, 5, 12)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap();

        let out = synthesize(&[r]).unwrap();
        assert_eq!(out[0].hour_of_day, 17);
        assert_eq!(out[0].day_of_week, 6);

        let monday = synthesize(&[record("A", 0, Some(1.0))]).unwrap();
        assert_eq!(monday[0].day_of_week, 0);
    }

    #[test]
    fn test_lag_fallback_policy() {
        let records = vec![
            record("S", 1, Some(10.0)),
            record("S", 2, None),
            record("S", 3, Some(30.0)),
        ];

        let out = synthesize(&records).unwrap();
        // first record: own rolling mean
        assert_eq!(out[0].previous_avg_speed, Some(10.0));
        // true lag from hour 1
        assert_eq!(out[1].previous_avg_speed, Some(10.0));
        // hour 2 speed is null, trailing window over hours 1..=3
        assert_eq!(out[2].previous_avg_speed, Some(20.0));
    }

    #[test]
    fn test_true_lag_preferred() {
        let records = vec![
            record("S", 1, Some(10.0)),
            record("S", 2, Some(20.0)),
            record("S", 3, Some(30.0)),
        ];
        let out = synthesize(&records).unwrap();
        assert_eq!(out[1].previous_avg_speed, Some(10.0));
        assert_eq!(out[2].previous_avg_speed, Some(20.0));
    }

    #[test]
    fn test_fallback_window_is_three_records() {
        let records = vec![
            record("S", 1, Some(100.0)),
            record("S", 2, Some(20.0)),
            record("S", 3, None),
            record("S", 4, Some(40.0)),
        ];
        let out = synthesize(&records).unwrap();
        // hour 1 drops out of the window for hour 4
        assert_eq!(out[3].previous_avg_speed, Some(30.0));
    }

    #[test]
    fn test_lag_stays_null_without_speeds() {
        let records = vec![record("S", 1, None), record("S", 2, None)];
        let out = synthesize(&records).unwrap();
        assert_eq!(out[0].previous_avg_speed, None);
        assert_eq!(out[1].previous_avg_speed, None);
    }

    #[test]
    fn test_lag_does_not_cross_segments() {
        let records = vec![
            record("B", 2, Some(80.0)),
            record("A", 1, Some(10.0)),
            record("B", 1, Some(60.0)),
        ];
        let out = synthesize(&records).unwrap();

        assert_eq!(out[0].segment_id, "A");
        assert_eq!(out[1].segment_id, "B");
        assert_eq!(out[1].hour_of_day, 1);
        // first B record uses its own value, not A's
        assert_eq!(out[1].previous_avg_speed, Some(60.0));
        assert_eq!(out[2].previous_avg_speed, Some(60.0));
    }

    #[test]
    fn test_severity_is_attached() {
        let mut r = record("A", 5, Some(50.0));
        r.precipitation_mm = Some(2.0);
        r.weather_category = Some("Snow".to_string());
        let out = synthesize(&[r]).unwrap();
        assert_eq!(out[0].weather_severity_index, 3);
    }

    #[test]
    fn test_missing_segment_is_data_error() {
        let r = record("", 5, Some(50.0));
        assert!(matches!(synthesize(&[r]), Err(PipelineError::Data(_))));
    }
}
