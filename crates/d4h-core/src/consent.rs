//! The consent state machine of individual queries.
//!
//! ```text
//! PENDING ──decide(true)──▶ AUTHORIZED
//!    │
//!    └─────decide(false)──▶ DENIED
//! ```
//!
//! `AUTHORIZED` and `DENIED` are terminal. A decision against a terminal
//! state is rejected with [`Error::ConsentAlreadyRecorded`]; the recorded
//! answer is never overwritten.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
  #[default]
  Pending,
  Authorized,
  Denied,
}

impl Consent {
  /// Apply the target's decision for `query_id`.
  pub fn decide(self, query_id: Uuid, decision: bool) -> Result<Consent> {
    match self {
      Self::Pending if decision => Ok(Self::Authorized),
      Self::Pending => Ok(Self::Denied),
      Self::Authorized | Self::Denied => Err(Error::ConsentAlreadyRecorded(query_id)),
    }
  }

  pub fn is_pending(&self) -> bool { matches!(self, Self::Pending) }

  pub fn is_authorized(&self) -> bool { matches!(self, Self::Authorized) }

  /// The nullable boolean stored in the database: `NULL` while pending.
  pub fn as_decision(&self) -> Option<bool> {
    match self {
      Self::Pending => None,
      Self::Authorized => Some(true),
      Self::Denied => Some(false),
    }
  }

  pub fn from_decision(decision: Option<bool>) -> Self {
    match decision {
      None => Self::Pending,
      Some(true) => Self::Authorized,
      Some(false) => Self::Denied,
    }
  }
}
