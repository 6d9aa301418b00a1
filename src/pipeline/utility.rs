use chrono::{Duration, NaiveDateTime, Timelike};

/// Computes the arithmetic mean of the non-null values. Returns `None` when there are none.
pub fn mean_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let (sum, count) = values
        .into_iter()
        .flatten()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Sums the non-null counts. A cell with no counts sums to 0.
pub fn sum_present<I>(values: I) -> u64
where
    I: IntoIterator<Item = Option<u64>>,
{
    values.into_iter().flatten().sum()
}

/// Median of the non-null values; the mean of the two middle values for even counts.
pub fn median_present<I>(values: I) -> Option<f64>
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut sorted: Vec<f64> = values.into_iter().flatten().collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(f64::total_cmp);

    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Rounds a timestamp to the nearest hour. Exactly half past rounds up.
pub fn round_to_hour(ts: NaiveDateTime) -> NaiveDateTime {
    let floor = ts
        .date()
        .and_hms_opt(ts.hour(), 0, 0)
        .unwrap_or(ts);

    if ts - floor >= Duration::minutes(30) {
        floor + Duration::hours(1)
    } else {
        floor
    }
}
