//! Time-aligned feature pipeline.
//!
//! Raw traffic and weather observations are bucketed to an hourly grid per
//! road segment and joined ([`align`]), then enriched with temporal, lag and
//! weather-severity features ([`features`]) to form the training/lookup table.

pub mod align;
pub mod features;
pub mod severity;
pub mod types;
pub mod utility;
