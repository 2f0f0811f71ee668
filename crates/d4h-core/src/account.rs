//! Actors: the companies that issue queries and the individuals whose data
//! is queried.
//!
//! Registration and password management live outside the engine; these
//! records only carry what the engine and the identity check need.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which kind of account a verified caller is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
  Company,
  Individual,
}

/// A query issuer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
  pub company_id:   Uuid,
  pub email:        String,
  pub company_name: String,
  pub created_at:   DateTime<Utc>,
}

/// A person contributing time-series data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Individual {
  pub individual_id: Uuid,
  pub email:         String,
  /// Identity number used by issuers to target individual queries.
  pub ssn:           String,
  pub full_name:     String,
  pub created_at:    DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCompany {
  pub email:         String,
  pub company_name:  String,
  /// argon2 PHC string.
  pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewIndividual {
  pub email:         String,
  pub ssn:           String,
  pub full_name:     String,
  /// argon2 PHC string.
  pub password_hash: String,
}

/// What an identity check needs to verify a login.
#[derive(Debug, Clone)]
pub struct Credentials {
  pub actor_id:      Uuid,
  pub password_hash: String,
}
