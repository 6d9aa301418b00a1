use crate::error::{PipelineError, Result};
use crate::pipeline::types::{HourlyRecord, TrafficObservation, WeatherObservation};
use crate::pipeline::utility::{mean_present, round_to_hour, sum_present};
use chrono::NaiveDateTime;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Weather aggregated to a single hour bucket.
#[derive(Debug, Clone, Default, PartialEq)]
struct HourlyWeather {
    temperature_c: Option<f64>,
    precipitation_mm: Option<f64>,
    visibility_m: Option<f64>,
    weather_category: Option<String>,
}

/// Buckets traffic and weather to the hourly grid and left-joins weather onto traffic.
///
/// Output is ordered by segment then hour and holds at most one record per
/// (segment, hour). Cells whose travel-time mean is null are dropped here and
/// nowhere else.
///
/// # Errors
///
/// Returns [`PipelineError::Data`] if either corpus is empty or a traffic
/// observation has an empty segment id.
#[tracing::instrument(skip_all, fields(traffic = traffic.len(), weather = weather.len()))]
pub fn align(
    traffic: &[TrafficObservation],
    weather: &[WeatherObservation],
) -> Result<Vec<HourlyRecord>> {
    if traffic.is_empty() {
        return Err(PipelineError::data("traffic corpus is empty"));
    }
    if weather.is_empty() {
        return Err(PipelineError::data("weather corpus is empty"));
    }

    let mut groups: BTreeMap<(&str, NaiveDateTime), Vec<&TrafficObservation>> = BTreeMap::new();
    for obs in traffic {
        if obs.segment_id.trim().is_empty() {
            return Err(PipelineError::data(format!(
                "traffic observation at {} has no segment_id",
                obs.timestamp
            )));
        }
        groups
            .entry((obs.segment_id.as_str(), round_to_hour(obs.timestamp)))
            .or_default()
            .push(obs);
    }

    let hourly_weather = aggregate_weather(weather);
    debug!(
        traffic_groups = groups.len(),
        weather_hours = hourly_weather.len(),
        "Observations bucketed"
    );

    let mut records = Vec::with_capacity(groups.len());
    let mut unlabelled = 0usize;

    for ((segment_id, hour_bucket), rows) in groups {
        let Some(travel_time_minutes) = mean_present(rows.iter().map(|r| r.travel_time_minutes))
        else {
            unlabelled += 1;
            continue;
        };

        let w = hourly_weather.get(&hour_bucket).cloned().unwrap_or_default();

        records.push(HourlyRecord {
            segment_id: segment_id.to_string(),
            hour_bucket,
            avg_speed: mean_present(rows.iter().map(|r| r.avg_speed)),
            travel_time_minutes,
            vehicle_count: Some(sum_present(rows.iter().map(|r| r.vehicle_count))),
            temperature_c: w.temperature_c,
            precipitation_mm: w.precipitation_mm,
            visibility_m: w.visibility_m,
            weather_category: w.weather_category,
        });
    }

    info!(
        hourly_records = records.len(),
        dropped_unlabelled = unlabelled,
        "Alignment complete"
    );

    Ok(records)
}

/// Groups weather by hour bucket: numeric means, most recent non-null category.
fn aggregate_weather(weather: &[WeatherObservation]) -> BTreeMap<NaiveDateTime, HourlyWeather> {
    let mut buckets: BTreeMap<NaiveDateTime, Vec<&WeatherObservation>> = BTreeMap::new();
    for obs in weather {
        buckets.entry(round_to_hour(obs.timestamp)).or_default().push(obs);
    }

    buckets
        .into_iter()
        .map(|(hour, rows)| {
            // max_by_key keeps the last maximum, so later input wins a timestamp tie
            let weather_category = rows
                .iter()
                .filter(|r| r.weather_category.is_some())
                .max_by_key(|r| r.timestamp)
                .and_then(|r| r.weather_category.clone());

            let aggregate = HourlyWeather {
                temperature_c: mean_present(rows.iter().map(|r| r.temperature_c)),
                precipitation_mm: mean_present(rows.iter().map(|r| r.precipitation_mm)),
                visibility_m: mean_present(rows.iter().map(|r| r.visibility_m)),
                weather_category,
            };
            (hour, aggregate)
        })
        .collect()
}
