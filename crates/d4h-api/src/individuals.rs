//! Handlers for `/individuals/data`: sample ingestion and own-data reads.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/individuals/data` | Body: `{"location": [...], "heart_rate": [...], ...}` |
//! | `GET`  | `/individuals/data` | Optional `?from=<rfc3339>&to=<rfc3339>`, both or neither |

use axum::{
  Json,
  extract::{Query, State},
  http::StatusCode,
  response::IntoResponse,
};
use chrono::{DateTime, Utc};
use d4h_core::{
  Error,
  sample::{SampleSet, TimeWindow},
  store::QueryStore,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, auth::IndividualActor, body::JsonBody, error::ApiError};

// ─── Ingest ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct Ingested {
  pub written: usize,
}

/// `POST /individuals/data`
pub async fn ingest<S>(
  State(state): State<AppState<S>>,
  IndividualActor(individual_id): IndividualActor,
  JsonBody(batch): JsonBody<SampleSet>,
) -> Result<impl IntoResponse, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  let written = state.engine.ingest(individual_id, batch).await?;
  Ok((StatusCode::CREATED, Json(Ingested { written })))
}

// ─── Read back ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct WindowParams {
  pub from: Option<DateTime<Utc>>,
  pub to:   Option<DateTime<Utc>>,
}

impl WindowParams {
  fn into_window(self) -> Result<Option<TimeWindow>, Error> {
    match (self.from, self.to) {
      (None, None) => Ok(None),
      (Some(from), Some(to)) => TimeWindow::new(from, to).map(Some),
      (None, Some(_)) => Err(Error::MissingParameter("from")),
      (Some(_), None) => Err(Error::MissingParameter("to")),
    }
  }
}

/// `GET /individuals/data[?from=..&to=..]`
pub async fn own<S>(
  State(state): State<AppState<S>>,
  IndividualActor(individual_id): IndividualActor,
  Query(params): Query<WindowParams>,
) -> Result<Json<SampleSet>, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  let window = params.into_window()?;
  Ok(Json(state.engine.own_samples(individual_id, window).await?))
}
