//! Query definitions: the issuer-facing request, the validated input, and
//! the persisted records.
//!
//! A query is immutable once created except for its `valid` flag and, for
//! individual queries, the single consent transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  cohort::{FilterSet, GeoPoint},
  consent::Consent,
  sample::SampleSet,
};

// ─── Kind ────────────────────────────────────────────────────────────────────

/// The type tag of a query; selects its parameter table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryKind {
  Individual,
  Radius,
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A query as submitted by an issuer, before validation. Every field is
/// optional here so absent ones can be reported as
/// [`Error::MissingParameter`] rather than a generic decoding failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryRequest {
  #[serde(rename = "type")]
  pub kind:              Option<QueryKind>,
  /// Identity number of the target (individual queries).
  pub ssn:               Option<String>,
  pub center_lat:        Option<f64>,
  pub center_long:       Option<f64>,
  /// Radius in kilometres.
  pub radius:            Option<f64>,
  /// Attribute ranges (radius queries; ignored for individual ones).
  #[serde(default)]
  pub additional_params: FilterSet,
}

/// Validated input to [`crate::store::QueryStore::create_query`].
#[derive(Debug, Clone, PartialEq)]
pub enum NewQuery {
  Individual { ssn: String },
  Radius {
    center:    GeoPoint,
    radius_km: f64,
    filters:   FilterSet,
  },
}

impl NewQuery {
  pub fn kind(&self) -> QueryKind {
    match self {
      Self::Individual { .. } => QueryKind::Individual,
      Self::Radius { .. } => QueryKind::Radius,
    }
  }
}

impl QueryRequest {
  pub fn validate(self) -> Result<NewQuery> {
    match self.kind.ok_or(Error::MissingParameter("type"))? {
      QueryKind::Individual => {
        let ssn = self.ssn.ok_or(Error::MissingParameter("ssn"))?;
        if ssn.trim().is_empty() {
          return Err(Error::invalid("ssn must not be empty"));
        }
        Ok(NewQuery::Individual { ssn })
      }
      QueryKind::Radius => {
        let lat = self.center_lat.ok_or(Error::MissingParameter("center_lat"))?;
        let long = self.center_long.ok_or(Error::MissingParameter("center_long"))?;
        let radius_km = self.radius.ok_or(Error::MissingParameter("radius"))?;

        if !(-90.0..=90.0).contains(&lat) {
          return Err(Error::invalid("center_lat must lie in [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&long) {
          return Err(Error::invalid("center_long must lie in [-180, 180]"));
        }
        if !radius_km.is_finite() || radius_km <= 0.0 {
          return Err(Error::invalid("radius must be a positive number of kilometres"));
        }
        self.additional_params.validate()?;

        Ok(NewQuery::Radius {
          center: GeoPoint::new(lat, long),
          radius_km,
          filters: self.additional_params,
        })
      }
    }
  }
}

// ─── Persisted records ───────────────────────────────────────────────────────

/// The common row every query has, whatever its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
  pub query_id:   Uuid,
  pub issuer_id:  Uuid,
  pub created_at: DateTime<Utc>,
  #[serde(rename = "type")]
  pub kind:       QueryKind,
  pub valid:      bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndividualQuery {
  #[serde(flatten)]
  pub query:   Query,
  pub ssn:     String,
  pub consent: Consent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RadiusQuery {
  #[serde(flatten)]
  pub query:     Query,
  pub center:    GeoPoint,
  pub radius_km: f64,
  pub filters:   FilterSet,
}

/// A query joined with its type-specific parameter row.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredQuery {
  Individual(IndividualQuery),
  Radius(RadiusQuery),
}

impl StoredQuery {
  pub fn query(&self) -> &Query {
    match self {
      Self::Individual(q) => &q.query,
      Self::Radius(q) => &q.query,
    }
  }
}

/// An issuer's past queries, grouped by type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IssuerQueries {
  pub individual: Vec<IndividualQuery>,
  pub radius:     Vec<RadiusQuery>,
}

// ─── Operation results ───────────────────────────────────────────────────────

/// Returned by the store after a creation commits.
#[derive(Debug, Clone)]
pub struct CreatedQuery {
  pub query:           Query,
  /// For individual queries: the target's address, to ask for consent.
  pub consent_request: Option<String>,
}

/// An individual query awaiting its target's decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingConsent {
  pub query_id:     Uuid,
  pub company_name: String,
  pub requested_at: DateTime<Utc>,
}

/// Returned by the store after a consent decision commits.
#[derive(Debug, Clone)]
pub struct ConsentReceipt {
  pub query_id:     Uuid,
  pub consent:      Consent,
  pub issuer_email: String,
  pub ssn:          String,
}

/// The response to a performed query, after anonymisation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
  pub query_id:      Uuid,
  pub cohort_size:   usize,
  /// Present only when the cohort is exactly one consenting individual.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub individual_id: Option<Uuid>,
  pub data:          SampleSet,
}
