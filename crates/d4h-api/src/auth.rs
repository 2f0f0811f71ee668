//! HTTP Basic-auth extractors for the two actor kinds.
//!
//! A company logs in with its email and password, and so does an
//! individual. The verified account id is what the engine receives as the
//! issuer or individual id.

use argon2::{Argon2, PasswordHash, PasswordVerifier};
use axum::extract::FromRequestParts;
use axum::http::{HeaderMap, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use d4h_core::{account::ActorKind, store::QueryStore};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// A verified company; the inner id is the issuer id.
#[derive(Debug, Clone, Copy)]
pub struct CompanyActor(pub Uuid);

/// A verified individual.
#[derive(Debug, Clone, Copy)]
pub struct IndividualActor(pub Uuid);

/// Split a `Basic` authorization header into `(email, password)`.
fn basic_credentials(headers: &HeaderMap) -> Result<(String, String), ApiError> {
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(ApiError::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(ApiError::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| ApiError::Unauthorized)?;
  let creds   = String::from_utf8(decoded).map_err(|_| ApiError::Unauthorized)?;

  let (email, password) = creds.split_once(':').ok_or(ApiError::Unauthorized)?;
  Ok((email.to_owned(), password.to_owned()))
}

/// Verify the request's credentials against the accounts of `kind`.
pub async fn authenticate<S: QueryStore>(
  headers: &HeaderMap,
  store: &S,
  kind: ActorKind,
) -> Result<Uuid, ApiError> {
  let (email, password) = basic_credentials(headers)?;

  let creds = store
    .find_credentials(kind, &email)
    .await
    .map_err(|e| ApiError::Engine(e.into()))?
    .ok_or_else(|| {
      tracing::debug!(?kind, "login for unknown account");
      ApiError::Unauthorized
    })?;

  let parsed_hash = PasswordHash::new(&creds.password_hash)
    .map_err(|_| ApiError::Unauthorized)?;

  Argon2::default()
    .verify_password(password.as_bytes(), &parsed_hash)
    .map_err(|_| {
      tracing::debug!(?kind, "password mismatch");
      ApiError::Unauthorized
    })?;

  Ok(creds.actor_id)
}

impl<S> FromRequestParts<AppState<S>> for CompanyActor
where
  S: QueryStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let id = authenticate(&parts.headers, state.engine.store().as_ref(), ActorKind::Company)
      .await?;
    Ok(CompanyActor(id))
  }
}

impl<S> FromRequestParts<AppState<S>> for IndividualActor
where
  S: QueryStore + Clone + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let id = authenticate(&parts.headers, state.engine.store().as_ref(), ActorKind::Individual)
      .await?;
    Ok(IndividualActor(id))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::http::{Request, header};
  use d4h_core::account::{NewCompany, NewIndividual};
  use d4h_store_sqlite::SqliteStore;

  use crate::test_support::{basic, hash, state};

  async fn fixture() -> (AppState<SqliteStore>, Uuid, Uuid) {
    let state = state(3).await;
    let store = state.engine.store();
    let company = store
      .add_company(NewCompany {
        email:         "acme@example.com".to_string(),
        company_name:  "Acme".to_string(),
        password_hash: hash("secret"),
      })
      .await
      .unwrap();
    let person = store
      .add_individual(NewIndividual {
        email:         "ada@example.com".to_string(),
        ssn:           "AAA111".to_string(),
        full_name:     "Ada".to_string(),
        password_hash: hash("hunter2"),
      })
      .await
      .unwrap();
    (state, company.company_id, person.individual_id)
  }

  fn request(auth: Option<&str>) -> Parts {
    let mut builder = Request::builder();
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    builder.body(axum::body::Body::empty()).unwrap().into_parts().0
  }

  #[tokio::test]
  async fn correct_company_credentials() {
    let (state, company_id, _) = fixture().await;
    let mut parts = request(Some(&basic("acme@example.com", "secret")));
    let actor = CompanyActor::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(actor.0, company_id);
  }

  #[tokio::test]
  async fn correct_individual_credentials() {
    let (state, _, individual_id) = fixture().await;
    let mut parts = request(Some(&basic("ada@example.com", "hunter2")));
    let actor = IndividualActor::from_request_parts(&mut parts, &state).await.unwrap();
    assert_eq!(actor.0, individual_id);
  }

  #[tokio::test]
  async fn individual_cannot_act_as_company() {
    let (state, _, _) = fixture().await;
    let mut parts = request(Some(&basic("ada@example.com", "hunter2")));
    let res = CompanyActor::from_request_parts(&mut parts, &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn wrong_password() {
    let (state, _, _) = fixture().await;
    let mut parts = request(Some(&basic("acme@example.com", "wrong")));
    let res = CompanyActor::from_request_parts(&mut parts, &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn missing_header() {
    let (state, _, _) = fixture().await;
    let mut parts = request(None);
    let res = IndividualActor::from_request_parts(&mut parts, &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }

  #[tokio::test]
  async fn invalid_base64() {
    let (state, _, _) = fixture().await;
    let mut parts = request(Some("Basic !!!not-base64!!!"));
    let res = CompanyActor::from_request_parts(&mut parts, &state).await;
    assert!(matches!(res, Err(ApiError::Unauthorized)));
  }
}
