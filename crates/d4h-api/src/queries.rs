//! Handlers for `/queries` endpoints. Company actors only.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/queries` | Body: `{"query": {"type": "radius", ...}}` |
//! | `GET`  | `/queries` | The caller's queries, grouped by type |
//! | `GET`  | `/queries/{id}/data` | Perform the query |
//! | `POST` | `/queries/{id}/close` | Clear the validity flag |

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::IntoResponse,
};
use d4h_core::{
  Error,
  query::{IssuerQueries, QueryRequest, QueryResult},
  store::QueryStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::CompanyActor, body::JsonBody, error::ApiError};

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub query: Option<QueryRequest>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Created {
  pub query_id: Uuid,
}

/// `POST /queries`
pub async fn create<S>(
  State(state): State<AppState<S>>,
  CompanyActor(issuer_id): CompanyActor,
  JsonBody(body): JsonBody<CreateBody>,
) -> Result<impl IntoResponse, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  let request = body.query.ok_or(Error::MissingParameter("query"))?;
  let query_id = state.engine.create_query(issuer_id, request).await?;
  Ok((StatusCode::CREATED, Json(Created { query_id })))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /queries`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  CompanyActor(issuer_id): CompanyActor,
) -> Result<Json<IssuerQueries>, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  Ok(Json(state.engine.list_queries(issuer_id).await?))
}

// ─── Perform ──────────────────────────────────────────────────────────────────

/// `GET /queries/{id}/data`
pub async fn perform<S>(
  State(state): State<AppState<S>>,
  CompanyActor(issuer_id): CompanyActor,
  Path(query_id): Path<Uuid>,
) -> Result<Json<QueryResult>, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  Ok(Json(state.engine.perform_query(issuer_id, query_id).await?))
}

// ─── Close ────────────────────────────────────────────────────────────────────

/// `POST /queries/{id}/close`
pub async fn close<S>(
  State(state): State<AppState<S>>,
  CompanyActor(issuer_id): CompanyActor,
  Path(query_id): Path<Uuid>,
) -> Result<StatusCode, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  state.engine.close_query(issuer_id, query_id).await?;
  Ok(StatusCode::NO_CONTENT)
}
