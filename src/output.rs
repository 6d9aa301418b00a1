//! Persistence of pipeline tables and formatting of recommendations.
//!
//! Tables are written as CSV with a header row, replacing any previous file.

use crate::error::Result;
use crate::recommend::Recommendation;
use csv::WriterBuilder;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::{self, File};
use std::path::Path;
use tracing::{debug, info};

/// Writes `rows` to a CSV file at `path`, creating parent directories as needed.
pub fn write_table<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), rows = rows.len(), "Writing CSV table");

    let file = File::create(path)?;
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(path = %path.display(), rows = rows.len(), "Table written");
    Ok(())
}

/// Reads every row of a CSV table written by [`write_table`].
pub fn read_table<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut rdr = csv::Reader::from_reader(File::open(path)?);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let record: T = result?;
        rows.push(record);
    }
    debug!(path = %path.display(), rows = rows.len(), "Table read");
    Ok(rows)
}

/// Renders a recommendation as a plain-text table.
pub fn format_recommendation(rec: &Recommendation) -> String {
    let mut out = format!(
        "Recommended departure for {} on {}: {} (predicted travel time {:.2} minutes)\n\n",
        rec.segment_id,
        rec.date,
        rec.best.label(),
        rec.best.predicted_minutes
    );
    out.push_str("All candidates (time -> predicted minutes):\n");
    for c in &rec.candidates {
        out.push_str(&format!(
            "{} -> {:.2}  [{}]\n",
            c.label(),
            c.predicted_minutes,
            c.fallback
        ));
    }
    out
}

/// Renders a recommendation as pretty-printed JSON.
pub fn recommendation_json(rec: &Recommendation) -> Result<String> {
    Ok(serde_json::to_string_pretty(rec)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::HourlyRecord;
    use crate::recommend::{Candidate, FallbackLevel};
    use chrono::NaiveDate;

    fn hourly(segment: &str, h: u32, speed: Option<f64>) -> HourlyRecord {
        HourlyRecord {
            segment_id: segment.to_string(),
            hour_bucket: NaiveDate::from_ymd_opt(2024, 5, 6)
                .unwrap()
                .and_hms_opt(h, 0, 0)
                .unwrap(),
            avg_speed: speed,
            travel_time_minutes: 11.5,
            vehicle_count: None,
            temperature_c: Some(3.5),
            precipitation_mm: None,
            visibility_m: Some(900.0),
            weather_category: Some("Snow".into()),
        }
    }

    #[test]
    fn test_table_round_trip_keeps_nulls() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("hourly.csv");
        let rows = vec![hourly("A", 8, Some(40.0)), hourly("B", 9, None)];

        write_table(&path, &rows).unwrap();
        let back: Vec<HourlyRecord> = read_table(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_write_table_replaces_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hourly.csv");

        write_table(&path, &[hourly("A", 8, Some(40.0)), hourly("A", 9, Some(41.0))]).unwrap();
        write_table(&path, &[hourly("B", 8, Some(40.0))]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header_count = content.lines().filter(|l| l.starts_with("segment_id")).count();
        assert_eq!(header_count, 1);
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_format_recommendation() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        let best = Candidate {
            time: date.and_hms_opt(8, 0, 0).unwrap(),
            predicted_minutes: 15.0,
            fallback: FallbackLevel::SegmentHour,
        };
        let rec = Recommendation {
            segment_id: "A".into(),
            date,
            candidates: vec![best.clone()],
            best,
        };

        let text = format_recommendation(&rec);
        assert!(text.contains("08:00 (predicted travel time 15.00 minutes)"));
        assert!(text.contains("08:00 -> 15.00  [segment_hour]"));

        let json = recommendation_json(&rec).unwrap();
        assert!(json.contains("\"time\": \"08:00\""));
        assert!(json.contains("\"fallback\": \"segment_hour\""));
    }
}
