//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure is answered as `{"kind": ..., "error": ...}`, where `kind`
//! is the engine's [`ErrorKind`] in snake case.

use axum::{
  Json,
  extract::rejection::JsonRejection,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use d4h_core::ErrorKind;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
  /// Missing or wrong credentials, or an actor of the wrong kind.
  #[error("unauthorized")]
  Unauthorized,

  #[error(transparent)]
  Engine(#[from] d4h_core::Error),
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    ApiError::Engine(d4h_core::Error::invalid(rejection.body_text()))
  }
}

pub fn status_of(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::MissingParameter | ErrorKind::InvalidParameter => StatusCode::BAD_REQUEST,
    ErrorKind::TargetNotFound | ErrorKind::QueryNotFound | ErrorKind::AccountNotFound => {
      StatusCode::NOT_FOUND
    }
    ErrorKind::QueryTooRestrictive => StatusCode::UNPROCESSABLE_ENTITY,
    ErrorKind::ConsentRequired => StatusCode::FORBIDDEN,
    ErrorKind::ConsentAlreadyRecorded => StatusCode::CONFLICT,
    ErrorKind::StorageFailure => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    match self {
      ApiError::Unauthorized => {
        let body = json!({ "kind": "unauthorized", "error": "unauthorized" });
        let mut res = (StatusCode::UNAUTHORIZED, Json(body)).into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"data4help\""),
        );
        res
      }
      ApiError::Engine(e) => {
        let kind = e.kind();
        // Storage details stay in the logs.
        let message = match kind {
          ErrorKind::StorageFailure => "storage failure".to_owned(),
          _ => e.to_string(),
        };
        (status_of(kind), Json(json!({ "kind": kind, "error": message }))).into_response()
      }
    }
  }
}
