//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings so that text order
//! equals chronological order. Filter sets are stored as compact JSON. UUIDs
//! are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use d4h_core::{
  account::Individual,
  cohort::{FilterSet, GeoPoint},
  consent::Consent,
  query::{IndividualQuery, Query, QueryKind, RadiusQuery},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── QueryKind ───────────────────────────────────────────────────────────────

pub fn encode_query_kind(k: QueryKind) -> &'static str {
  match k {
    QueryKind::Individual => "individual",
    QueryKind::Radius => "radius",
  }
}

pub fn decode_query_kind(s: &str) -> Result<QueryKind> {
  match s {
    "individual" => Ok(QueryKind::Individual),
    "radius" => Ok(QueryKind::Radius),
    other => Err(Error::UnknownValue { column: "query_type", value: other.to_owned() }),
  }
}

// ─── FilterSet ───────────────────────────────────────────────────────────────

pub fn encode_filters(f: &FilterSet) -> Result<String> { Ok(serde_json::to_string(f)?) }

pub fn decode_filters(s: &str) -> Result<FilterSet> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `queries` row.
pub struct RawQuery {
  pub query_id:   String,
  pub issuer_id:  String,
  pub created_at: String,
  pub query_type: String,
  pub valid:      bool,
}

impl RawQuery {
  pub const COLUMNS: &'static str = "q.query_id, q.issuer_id, q.created_at, q.query_type, q.valid";

  /// Read the five [`Self::COLUMNS`] starting at `offset`.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      query_id:   row.get(offset)?,
      issuer_id:  row.get(offset + 1)?,
      created_at: row.get(offset + 2)?,
      query_type: row.get(offset + 3)?,
      valid:      row.get(offset + 4)?,
    })
  }

  pub fn into_query(self) -> Result<Query> {
    Ok(Query {
      query_id:   decode_uuid(&self.query_id)?,
      issuer_id:  decode_uuid(&self.issuer_id)?,
      created_at: decode_dt(&self.created_at)?,
      kind:       decode_query_kind(&self.query_type)?,
      valid:      self.valid,
    })
  }
}

/// A `queries` row joined with `individual_queries`.
pub struct RawIndividualQuery {
  pub query:   RawQuery,
  pub ssn:     String,
  pub consent: Option<bool>,
}

impl RawIndividualQuery {
  pub fn into_individual_query(self) -> Result<IndividualQuery> {
    Ok(IndividualQuery {
      query:   self.query.into_query()?,
      ssn:     self.ssn,
      consent: Consent::from_decision(self.consent),
    })
  }
}

/// A `queries` row joined with `radius_queries`.
pub struct RawRadiusQuery {
  pub query:       RawQuery,
  pub center_lat:  f64,
  pub center_long: f64,
  pub radius_km:   f64,
  pub filters:     String,
}

impl RawRadiusQuery {
  pub fn into_radius_query(self) -> Result<RadiusQuery> {
    Ok(RadiusQuery {
      query:     self.query.into_query()?,
      center:    GeoPoint::new(self.center_lat, self.center_long),
      radius_km: self.radius_km,
      filters:   decode_filters(&self.filters)?,
    })
  }
}

/// Raw values read from an `individuals` row.
pub struct RawIndividual {
  pub individual_id: String,
  pub email:         String,
  pub ssn:           String,
  pub full_name:     String,
  pub created_at:    String,
}

impl RawIndividual {
  pub const COLUMNS: &'static str = "individual_id, email, ssn, full_name, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      individual_id: row.get(0)?,
      email:         row.get(1)?,
      ssn:           row.get(2)?,
      full_name:     row.get(3)?,
      created_at:    row.get(4)?,
    })
  }

  pub fn into_individual(self) -> Result<Individual> {
    Ok(Individual {
      individual_id: decode_uuid(&self.individual_id)?,
      email:         self.email,
      ssn:           self.ssn,
      full_name:     self.full_name,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_text() {
    let earlier = Utc.timestamp_opt(1_700_000_000, 5_000).unwrap();
    let later = Utc.timestamp_opt(1_700_000_000, 120_000_000).unwrap();
    assert!(encode_dt(earlier) < encode_dt(later));
    assert_eq!(decode_dt(&encode_dt(later)).unwrap(), later);
  }

  #[test]
  fn timestamps_keep_nanoseconds() {
    let at = Utc.timestamp_opt(1_700_000_020, 123_456_789).unwrap();
    let text = encode_dt(at);
    assert!(text.ends_with(".123456789Z"));
    assert_eq!(decode_dt(&text).unwrap(), at);
    assert_eq!(encode_dt(Utc.timestamp_opt(1_700_000_020, 0).unwrap()).len(), text.len());
  }

  #[test]
  fn unknown_query_type_is_an_error() {
    assert!(decode_query_kind("polygon").is_err());
  }
}
