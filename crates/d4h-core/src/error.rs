//! Error types for `d4h-core`.
//!
//! Every failure carries a machine-checkable [`ErrorKind`] and a
//! human-readable message. Messages never contain internal identifiers.

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  /// The client supplied an incomplete query or request.
  #[error("missing {0}")]
  MissingParameter(&'static str),

  /// A supplied value is present but unusable (inverted range, unknown
  /// field, coordinate out of bounds, non-finite sample, ...).
  #[error("invalid parameter: {0}")]
  InvalidParameter(String),

  /// An individual query names an identity number nobody is registered with.
  #[error("user not found")]
  TargetNotFound,

  /// The cohort is smaller than the configured minimum, before or after
  /// attribute filtering.
  #[error("query too restrictive")]
  QueryTooRestrictive { size: usize, minimum: usize },

  #[error("the individual has not authorized this query")]
  ConsentRequired(Uuid),

  #[error("query not found")]
  QueryNotFound(Uuid),

  /// A decision arrived for a query whose consent is no longer pending.
  #[error("a decision has already been recorded for this query")]
  ConsentAlreadyRecorded(Uuid),

  #[error("account not found")]
  AccountNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("storage failure")]
  Storage(#[source] Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The closed set of failure kinds surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  MissingParameter,
  InvalidParameter,
  TargetNotFound,
  QueryTooRestrictive,
  ConsentRequired,
  QueryNotFound,
  ConsentAlreadyRecorded,
  AccountNotFound,
  StorageFailure,
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::MissingParameter(_) => ErrorKind::MissingParameter,
      Self::InvalidParameter(_) => ErrorKind::InvalidParameter,
      Self::TargetNotFound => ErrorKind::TargetNotFound,
      Self::QueryTooRestrictive { .. } => ErrorKind::QueryTooRestrictive,
      Self::ConsentRequired(_) => ErrorKind::ConsentRequired,
      Self::QueryNotFound(_) => ErrorKind::QueryNotFound,
      Self::ConsentAlreadyRecorded(_) => ErrorKind::ConsentAlreadyRecorded,
      Self::AccountNotFound(_) => ErrorKind::AccountNotFound,
      Self::Serialization(_) | Self::Storage(_) => ErrorKind::StorageFailure,
    }
  }

  pub fn invalid(msg: impl Into<String>) -> Self {
    Self::InvalidParameter(msg.into())
  }
}
