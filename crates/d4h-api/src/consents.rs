//! Handlers for `/consents` endpoints. Individual actors only.

use axum::{
  Json,
  extract::{Path, State},
};
use d4h_core::{Error, consent::Consent, query::PendingConsent, store::QueryStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, auth::IndividualActor, body::JsonBody, error::ApiError};

/// `GET /consents/pending`
pub async fn pending<S>(
  State(state): State<AppState<S>>,
  IndividualActor(individual_id): IndividualActor,
) -> Result<Json<Vec<PendingConsent>>, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  Ok(Json(state.engine.pending_consents(individual_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
  pub decision: Option<bool>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Decided {
  pub query_id: Uuid,
  pub consent:  Consent,
}

/// `POST /consents/{id}` — body: `{"decision": true}`
pub async fn decide<S>(
  State(state): State<AppState<S>>,
  IndividualActor(individual_id): IndividualActor,
  Path(query_id): Path<Uuid>,
  JsonBody(body): JsonBody<DecisionBody>,
) -> Result<Json<Decided>, ApiError>
where
  S: QueryStore + Clone + 'static,
{
  let decision = body.decision.ok_or(Error::MissingParameter("decision"))?;
  let consent = state
    .engine
    .record_consent(individual_id, query_id, decision)
    .await?;
  Ok(Json(Decided { query_id, consent }))
}
