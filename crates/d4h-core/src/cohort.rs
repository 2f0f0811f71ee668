//! Cohort computation: who a query applies to, which of their samples
//! survive the attribute filter, and whether the result is large enough to
//! be released.
//!
//! Everything here is pure. Storage backends feed these functions with rows
//! read inside their own transaction and act on the outcome.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  query::{QueryKind, RadiusQuery},
  sample::{SampleSet, Stream},
};

/// Per-individual sample data for a cohort, ordered by individual id.
pub type CohortData = BTreeMap<Uuid, SampleSet>;

// ─── Geography ───────────────────────────────────────────────────────────────

/// Kilometres per degree of latitude.
pub const KM_PER_LAT_DEGREE: f64 = 110.57;
/// Kilometres per degree of longitude (equatorial value; no cosine
/// correction, so only meaningful for local-scale radii away from the poles).
pub const KM_PER_LONG_DEGREE: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
  pub lat:  f64,
  pub long: f64,
}

impl GeoPoint {
  pub fn new(lat: f64, long: f64) -> Self { Self { lat, long } }

  /// Flat-earth distance in kilometres.
  pub fn flat_distance_km(&self, other: &GeoPoint) -> f64 {
    let dy = (self.lat - other.lat) * KM_PER_LAT_DEGREE;
    let dx = (self.long - other.long) * KM_PER_LONG_DEGREE;
    dx.hypot(dy)
  }
}

impl RadiusQuery {
  /// Whether `point` lies inside this query's geographic window.
  pub fn contains(&self, point: &GeoPoint) -> bool {
    self.center.flat_distance_km(point) <= self.radius_km
  }
}

/// The radius variant of the cohort resolver: every individual whose most
/// recent position lies within the query window, de-duplicated.
pub fn resolve_radius(
  query: &RadiusQuery,
  latest_positions: impl IntoIterator<Item = (Uuid, GeoPoint)>,
) -> Vec<Uuid> {
  latest_positions
    .into_iter()
    .filter(|(_, pos)| query.contains(pos))
    .map(|(id, _)| id)
    .collect::<BTreeSet<_>>()
    .into_iter()
    .collect()
}

// ─── Attribute filters ───────────────────────────────────────────────────────

/// An inclusive numeric range, written `[min, max]` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct Range {
  pub min: f64,
  pub max: f64,
}

impl Range {
  pub fn new(min: f64, max: f64) -> Self { Self { min, max } }

  pub fn contains(&self, value: f64) -> bool {
    value >= self.min && value <= self.max
  }
}

impl From<(f64, f64)> for Range {
  fn from((min, max): (f64, f64)) -> Self { Self { min, max } }
}

impl From<Range> for (f64, f64) {
  fn from(r: Range) -> Self { (r.min, r.max) }
}

/// Mapping from stream to field name to the range its values must fall in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(pub BTreeMap<Stream, BTreeMap<String, Range>>);

impl FilterSet {
  pub fn is_empty(&self) -> bool { self.0.values().all(BTreeMap::is_empty) }

  /// Builder used mostly by tests and callers assembling filters in code.
  pub fn with(mut self, stream: Stream, field: &str, range: Range) -> Self {
    self.0.entry(stream).or_default().insert(field.to_owned(), range);
    self
  }

  /// Field names must exist on their stream; ranges must be finite and
  /// ordered.
  pub fn validate(&self) -> Result<()> {
    for (stream, fields) in &self.0 {
      for (field, range) in fields {
        if !stream.fields().contains(&field.as_str()) {
          return Err(Error::invalid(format!(
            "unknown field {field:?} for stream {}",
            stream.as_str()
          )));
        }
        if !range.min.is_finite() || !range.max.is_finite() {
          return Err(Error::invalid(format!("range for {field:?} must be finite")));
        }
        if range.min > range.max {
          return Err(Error::invalid(format!("range for {field:?} has min > max")));
        }
      }
    }
    Ok(())
  }
}

/// Narrows cohort data to the samples matching a [`FilterSet`].
///
/// Within a stream a sample must satisfy every constrained field. Across
/// streams the semantics are conjunctive: an individual left with zero
/// samples on any constrained stream is dropped from the cohort.
pub struct AttributeFilter<'a> {
  filters: &'a FilterSet,
}

impl<'a> AttributeFilter<'a> {
  pub fn new(filters: &'a FilterSet) -> Self { Self { filters } }

  pub fn apply(&self, cohort: CohortData) -> CohortData {
    if self.filters.is_empty() {
      return cohort;
    }
    cohort
      .into_iter()
      .filter_map(|(id, mut samples)| {
        for (stream, ranges) in &self.filters.0 {
          if ranges.is_empty() {
            continue;
          }
          let left = samples.retain_in(*stream, |s| {
            ranges
              .iter()
              .all(|(field, range)| s.field(field).is_some_and(|v| range.contains(v)))
          });
          if left == 0 {
            return None;
          }
        }
        Some((id, samples))
      })
      .collect()
  }
}

// ─── Feasibility ─────────────────────────────────────────────────────────────

/// What protects the individuals a query touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrivacyPolicy {
  /// Safety in numbers: the cohort must reach the minimum size.
  Anonymity,
  /// The single target's explicit authorization.
  Consent,
}

impl QueryKind {
  pub fn privacy_policy(&self) -> PrivacyPolicy {
    match self {
      Self::Individual => PrivacyPolicy::Consent,
      Self::Radius => PrivacyPolicy::Anonymity,
    }
  }
}

/// Enforces the minimum cohort size on anonymity-protected queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeasibilityGate {
  min_cohort_size: usize,
}

impl FeasibilityGate {
  pub fn new(min_cohort_size: usize) -> Self { Self { min_cohort_size } }

  pub fn min_cohort_size(&self) -> usize { self.min_cohort_size }

  /// Fails with [`Error::QueryTooRestrictive`] when `size` is strictly below
  /// the minimum and the policy is [`PrivacyPolicy::Anonymity`].
  pub fn check(&self, policy: PrivacyPolicy, size: usize) -> Result<()> {
    match policy {
      PrivacyPolicy::Consent => Ok(()),
      PrivacyPolicy::Anonymity if size < self.min_cohort_size => {
        tracing::warn!(size, minimum = self.min_cohort_size, "cohort below minimum size");
        Err(Error::QueryTooRestrictive { size, minimum: self.min_cohort_size })
      }
      PrivacyPolicy::Anonymity => Ok(()),
    }
  }
}
