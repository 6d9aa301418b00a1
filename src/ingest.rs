//! CSV ingestion of raw traffic and weather observations.
//!
//! Headers are resolved through an explicit [`TrafficColumns`] /
//! [`WeatherColumns`] mapping. Optional measurement columns may be missing
//! from the file entirely; their values then ingest as null.

use crate::config::{TrafficColumns, WeatherColumns};
use crate::error::{PipelineError, Result};
use crate::pipeline::types::{TrafficObservation, WeatherObservation};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::StringRecord;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses a timestamp in one of the accepted layouts, RFC 3339 included
/// (offsets are dropped after conversion to UTC).
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

struct HeaderIndex<'a> {
    headers: &'a StringRecord,
}

/// A mapped field located in the header row.
#[derive(Clone, Copy)]
struct Column<'h> {
    idx: usize,
    name: &'h str,
}

impl<'a> HeaderIndex<'a> {
    fn required(&self, field: &str, aliases: &[String]) -> Result<Column<'a>> {
        self.optional(aliases).ok_or_else(|| {
            PipelineError::data(format!(
                "required {field} column not found (tried {})",
                aliases.join(", ")
            ))
        })
    }

    /// First alias present in the header row, compared case-insensitively.
    fn optional(&self, aliases: &[String]) -> Option<Column<'a>> {
        let headers = self.headers;
        aliases.iter().find_map(|alias| {
            let wanted = alias.trim().to_lowercase();
            headers
                .iter()
                .enumerate()
                .find(|(_, h)| h.trim().to_lowercase() == wanted)
                .map(|(idx, name)| Column { idx, name })
        })
    }
}

fn cell<'r>(record: &'r StringRecord, column: Option<Column>) -> Option<&'r str> {
    column
        .and_then(|c| record.get(c.idx))
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan") && !v.eq_ignore_ascii_case("null"))
}

fn parse_f64(record: &StringRecord, column: Option<Column>, line: u64) -> Result<Option<f64>> {
    cell(record, column)
        .map(|v| {
            v.parse::<f64>().map_err(|_| {
                let name = column.map_or("", |c| c.name);
                PipelineError::data(format!("line {line}: column '{name}' has non-numeric value '{v}'"))
            })
        })
        .transpose()
}

/// Parses a vehicle count. Integral floats such as `30.0` are accepted;
/// negative or fractional values are rejected.
fn parse_count(record: &StringRecord, column: Option<Column>, line: u64) -> Result<Option<u64>> {
    match parse_f64(record, column, line)? {
        Some(v) if v >= 0.0 && v.is_finite() && v.fract() == 0.0 => Ok(Some(v as u64)),
        Some(v) => {
            let name = column.map_or("", |c| c.name);
            Err(PipelineError::data(format!(
                "line {line}: column '{name}' has invalid count {v}"
            )))
        }
        None => Ok(None),
    }
}

fn required_timestamp(record: &StringRecord, column: Column, line: u64) -> Result<NaiveDateTime> {
    let raw = cell(record, Some(column))
        .ok_or_else(|| PipelineError::data(format!("line {line}: missing timestamp")))?;
    parse_timestamp(raw)
        .ok_or_else(|| PipelineError::data(format!("line {line}: unparseable timestamp '{raw}'")))
}

/// Reads traffic observations from CSV.
///
/// # Errors
///
/// Returns [`PipelineError::Data`] if the timestamp or segment column is
/// missing, or a row has an empty/unparseable required value.
pub fn read_traffic<R: Read>(reader: R, columns: &TrafficColumns) -> Result<Vec<TrafficObservation>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let index = HeaderIndex { headers: &headers };

    let ts_col = index.required("timestamp", &columns.timestamp)?;
    let seg_col = index.required("segment id", &columns.segment_id)?;
    let speed_col = index.optional(&columns.avg_speed);
    let tt_col = index.optional(&columns.travel_time_minutes);
    let count_col = index.optional(&columns.vehicle_count);
    debug!(
        timestamp = ts_col.name,
        segment = seg_col.name,
        speed = speed_col.map(|c| c.name),
        travel_time = tt_col.map(|c| c.name),
        count = count_col.map(|c| c.name),
        "Traffic headers resolved"
    );

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        let segment_id = cell(&record, Some(seg_col))
            .ok_or_else(|| PipelineError::data(format!("line {line}: missing segment id")))?
            .to_string();

        rows.push(TrafficObservation {
            timestamp: required_timestamp(&record, ts_col, line)?,
            segment_id,
            avg_speed: parse_f64(&record, speed_col, line)?,
            travel_time_minutes: parse_f64(&record, tt_col, line)?,
            vehicle_count: parse_count(&record, count_col, line)?,
        });
    }

    Ok(rows)
}

/// Reads weather observations from CSV.
///
/// # Errors
///
/// Returns [`PipelineError::Data`] if the timestamp column is missing or a
/// value cannot be parsed.
pub fn read_weather<R: Read>(reader: R, columns: &WeatherColumns) -> Result<Vec<WeatherObservation>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let headers = rdr.headers()?.clone();
    let index = HeaderIndex { headers: &headers };

    let ts_col = index.required("timestamp", &columns.timestamp)?;
    let temp_col = index.optional(&columns.temperature_c);
    let precip_col = index.optional(&columns.precipitation_mm);
    let vis_col = index.optional(&columns.visibility_m);
    let cat_col = index.optional(&columns.weather_category);

    let mut rows = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let line = record.position().map_or(0, |p| p.line());

        rows.push(WeatherObservation {
            timestamp: required_timestamp(&record, ts_col, line)?,
            temperature_c: parse_f64(&record, temp_col, line)?,
            precipitation_mm: parse_f64(&record, precip_col, line)?,
            visibility_m: parse_f64(&record, vis_col, line)?,
            weather_category: cell(&record, cat_col).map(str::to_string),
        });
    }

    Ok(rows)
}

#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_traffic(path: &Path, columns: &TrafficColumns) -> Result<Vec<TrafficObservation>> {
    let rows = read_traffic(std::fs::File::open(path)?, columns)?;
    info!(rows = rows.len(), "Traffic observations loaded");
    Ok(rows)
}

#[tracing::instrument(skip_all, fields(path = %path.display()))]
pub fn load_weather(path: &Path, columns: &WeatherColumns) -> Result<Vec<WeatherObservation>> {
    let rows = read_weather(std::fs::File::open(path)?, columns)?;
    info!(rows = rows.len(), "Weather observations loaded");
    Ok(rows)
}
