//! Time-series samples collected from individuals.
//!
//! Samples are append-only: once ingested they are only ever read and
//! filtered, never updated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Streams ─────────────────────────────────────────────────────────────────

/// A named data stream. Also the key type of a query's attribute filter set.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
  #[serde(alias = "gps_coordinates")]
  Location,
  Accelerometer,
  HeartRate,
}

impl Stream {
  pub const ALL: [Stream; 3] =
    [Stream::Location, Stream::Accelerometer, Stream::HeartRate];

  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Location => "location",
      Self::Accelerometer => "accelerometer",
      Self::HeartRate => "heart_rate",
    }
  }

  /// Numeric field names a filter may constrain on this stream.
  pub fn fields(&self) -> &'static [&'static str] {
    match self {
      Self::Location => &["lat", "long"],
      Self::Accelerometer => &["acc_x", "acc_y", "acc_z"],
      Self::HeartRate => &["bpm"],
    }
  }
}

// ─── Sample records ──────────────────────────────────────────────────────────

/// Common read access over the per-stream sample records.
pub trait Sample {
  fn timestamp(&self) -> DateTime<Utc>;

  /// The value of a numeric field, or `None` if the stream has no such field.
  fn field(&self, name: &str) -> Option<f64>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
  pub timestamp: DateTime<Utc>,
  pub lat:       f64,
  pub long:      f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccelerometerSample {
  pub timestamp: DateTime<Utc>,
  pub acc_x:     f64,
  pub acc_y:     f64,
  pub acc_z:     f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartRateSample {
  pub timestamp: DateTime<Utc>,
  pub bpm:       f64,
}

impl Sample for LocationSample {
  fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

  fn field(&self, name: &str) -> Option<f64> {
    match name {
      "lat" => Some(self.lat),
      "long" => Some(self.long),
      _ => None,
    }
  }
}

impl Sample for AccelerometerSample {
  fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

  fn field(&self, name: &str) -> Option<f64> {
    match name {
      "acc_x" => Some(self.acc_x),
      "acc_y" => Some(self.acc_y),
      "acc_z" => Some(self.acc_z),
      _ => None,
    }
  }
}

impl Sample for HeartRateSample {
  fn timestamp(&self) -> DateTime<Utc> { self.timestamp }

  fn field(&self, name: &str) -> Option<f64> {
    match name {
      "bpm" => Some(self.bpm),
      _ => None,
    }
  }
}

// ─── SampleSet ───────────────────────────────────────────────────────────────

/// Samples of every stream for one individual, or an anonymous aggregate of
/// several individuals. Also the body of an ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
  #[serde(default, alias = "gps_coordinates")]
  pub location:      Vec<LocationSample>,
  #[serde(default)]
  pub accelerometer: Vec<AccelerometerSample>,
  #[serde(default)]
  pub heart_rate:    Vec<HeartRateSample>,
}

impl SampleSet {
  pub fn is_empty(&self) -> bool {
    self.location.is_empty()
      && self.accelerometer.is_empty()
      && self.heart_rate.is_empty()
  }

  pub fn len(&self) -> usize {
    self.location.len() + self.accelerometer.len() + self.heart_rate.len()
  }

  /// Append every sample of `other`.
  pub fn extend(&mut self, other: SampleSet) {
    self.location.extend(other.location);
    self.accelerometer.extend(other.accelerometer);
    self.heart_rate.extend(other.heart_rate);
  }

  /// Sort each stream chronologically (stable for equal timestamps).
  pub fn sort_by_time(&mut self) {
    self.location.sort_by_key(|s| s.timestamp);
    self.accelerometer.sort_by_key(|s| s.timestamp);
    self.heart_rate.sort_by_key(|s| s.timestamp);
  }

  /// Keep only the samples of `stream` for which `keep` holds, returning how
  /// many remain.
  pub fn retain_in(
    &mut self,
    stream: Stream,
    keep: impl Fn(&dyn Sample) -> bool,
  ) -> usize {
    fn retain<T: Sample>(v: &mut Vec<T>, keep: impl Fn(&dyn Sample) -> bool) -> usize {
      v.retain(|s| keep(s));
      v.len()
    }
    match stream {
      Stream::Location => retain(&mut self.location, keep),
      Stream::Accelerometer => retain(&mut self.accelerometer, keep),
      Stream::HeartRate => retain(&mut self.heart_rate, keep),
    }
  }

  /// Reject batches that are empty or carry non-finite values.
  pub fn validate_batch(&self) -> Result<()> {
    if self.is_empty() {
      return Err(Error::invalid("the batch contains no samples"));
    }
    let finite = self.location.iter().all(|s| s.lat.is_finite() && s.long.is_finite())
      && self
        .accelerometer
        .iter()
        .all(|s| s.acc_x.is_finite() && s.acc_y.is_finite() && s.acc_z.is_finite())
      && self.heart_rate.iter().all(|s| s.bpm.is_finite());
    if !finite {
      return Err(Error::invalid("sample values must be finite numbers"));
    }
    if self
      .location
      .iter()
      .any(|s| !(-90.0..=90.0).contains(&s.lat) || !(-180.0..=180.0).contains(&s.long))
    {
      return Err(Error::invalid("location sample out of range"));
    }
    Ok(())
  }
}

/// Inclusive time bounds for reading samples back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
  pub from: DateTime<Utc>,
  pub to:   DateTime<Utc>,
}

impl TimeWindow {
  pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Self> {
    if from > to {
      return Err(Error::invalid("`from` must not be later than `to`"));
    }
    Ok(Self { from, to })
  }
}
