//! JSON HTTP surface of the Data4Help query engine.
//!
//! Exposes an axum [`Router`] backed by an [`Engine`] over any
//! [`QueryStore`]. Companies and individuals authenticate with HTTP Basic
//! credentials; see [`auth`].

pub mod auth;
pub mod body;
pub mod consents;
pub mod error;
pub mod individuals;
pub mod notifier;
pub mod queries;

pub use error::ApiError;

use std::path::PathBuf;

use axum::{
  Router,
  routing::{get, post},
};
use d4h_core::{Engine, store::QueryStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `D4H_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:            String,
  pub port:            u16,
  pub store_path:      PathBuf,
  /// Radius queries whose cohort is smaller than this are rejected.
  pub min_cohort_size: usize,
  /// Sender address of outbound notices.
  pub mail_from:       String,
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers.
#[derive(Clone)]
pub struct AppState<S: QueryStore> {
  pub engine: Engine<S>,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router.
pub fn router<S>(state: AppState<S>) -> Router
where
  S: QueryStore + Clone + 'static,
{
  Router::new()
    // Issuers
    .route("/queries", get(queries::list::<S>).post(queries::create::<S>))
    .route("/queries/{id}/data", get(queries::perform::<S>))
    .route("/queries/{id}/close", post(queries::close::<S>))
    // Individuals
    .route("/consents/pending", get(consents::pending::<S>))
    .route("/consents/{id}", post(consents::decide::<S>))
    .route(
      "/individuals/data",
      get(individuals::own::<S>).post(individuals::ingest::<S>),
    )
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Test support ─────────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod test_support {
  use std::sync::{Arc, Mutex};

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use d4h_core::{
    Engine,
    cohort::FeasibilityGate,
    notify::{Notice, Notifier},
  };
  use d4h_store_sqlite::SqliteStore;
  use rand_core::OsRng;

  use crate::AppState;

  #[derive(Default)]
  pub struct Outbox(pub Mutex<Vec<Notice>>);

  impl Notifier for Outbox {
    fn notify(&self, notice: Notice) { self.0.lock().unwrap().push(notice); }
  }

  pub async fn state_with_outbox(min_cohort_size: usize) -> (AppState<SqliteStore>, Arc<Outbox>) {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let outbox = Arc::new(Outbox::default());
    let engine = Engine::new(
      Arc::new(store),
      outbox.clone(),
      FeasibilityGate::new(min_cohort_size),
    );
    (AppState { engine }, outbox)
  }

  pub async fn state(min_cohort_size: usize) -> AppState<SqliteStore> {
    state_with_outbox(min_cohort_size).await.0
  }

  pub fn hash(password: &str) -> String {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
      .hash_password(password.as_bytes(), &salt)
      .unwrap()
      .to_string()
  }

  pub fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", B64.encode(format!("{user}:{pass}")))
  }
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use d4h_core::account::{NewCompany, NewIndividual};
  use d4h_store_sqlite::SqliteStore;
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use crate::test_support::{Outbox, basic, hash, state_with_outbox};

  const MILAN: (f64, f64) = (45.4773403, 9.2335757);

  struct Harness {
    state:   AppState<SqliteStore>,
    outbox:  std::sync::Arc<Outbox>,
    company: String,
    people:  Vec<String>,
  }

  /// A company plus `residents` individuals living near Milan, each with
  /// one location sample and one heart-rate sample of `bpm`.
  async fn harness(min_cohort_size: usize, residents: &[f64]) -> Harness {
    let (state, outbox) = state_with_outbox(min_cohort_size).await;
    let store = state.engine.store().clone();
    let password = hash("secret");

    store
      .add_company(NewCompany {
        email:         "acme@example.com".to_string(),
        company_name:  "Acme".to_string(),
        password_hash: password.clone(),
      })
      .await
      .unwrap();
    let company = basic("acme@example.com", "secret");

    let mut people = Vec::new();
    for (i, bpm) in residents.iter().enumerate() {
      let email = format!("p{i}@example.com");
      store
        .add_individual(NewIndividual {
          email:         email.clone(),
          ssn:           format!("SSN{i}"),
          full_name:     format!("Person {i}"),
          password_hash: password.clone(),
        })
        .await
        .unwrap();
      let auth = basic(&email, "secret");
      let offset = 0.001 * i as f64;
      let batch = json!({
        "location": [{
          "timestamp": "2024-01-01T10:00:00Z",
          "lat": MILAN.0 + offset,
          "long": MILAN.1 + offset
        }],
        "heart_rate": [{ "timestamp": "2024-01-01T10:00:00Z", "bpm": bpm }]
      });
      let (status, _) = call(&state, "POST", "/individuals/data", Some(&auth), Some(batch)).await;
      assert_eq!(status, StatusCode::CREATED);
      people.push(auth);
    }

    Harness { state, outbox, company, people }
  }

  async fn call(
    state: &AppState<SqliteStore>,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(auth) = auth {
      builder = builder.header(header::AUTHORIZATION, auth);
    }
    let req = match body {
      Some(json) => builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap(),
      None => builder.body(Body::empty()).unwrap(),
    };

    let resp = router(state.clone()).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
  }

  fn radius_body(radius: f64, params: Value) -> Value {
    json!({
      "query": {
        "type": "radius",
        "center_lat": MILAN.0,
        "center_long": MILAN.1,
        "radius": radius,
        "additional_params": params
      }
    })
  }

  // ── Auth ─────────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unauthenticated_requests_return_401() {
    let h = harness(1, &[]).await;
    let (status, body) = call(&h.state, "GET", "/queries", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["kind"], "unauthorized");
  }

  #[tokio::test]
  async fn individuals_cannot_issue_queries() {
    let h = harness(1, &[70.0]).await;
    let (status, _) = call(
      &h.state,
      "POST",
      "/queries",
      Some(&h.people[0]),
      Some(radius_body(10.0, json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
  }

  // ── Radius queries ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn radius_query_lifecycle() {
    let h = harness(3, &[70.0, 75.0, 80.0]).await;

    let (status, created) = call(
      &h.state,
      "POST",
      "/queries",
      Some(&h.company),
      Some(radius_body(100.0, json!({}))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let query_id = created["query_id"].as_str().unwrap().to_owned();

    let (status, listed) = call(&h.state, "GET", "/queries", Some(&h.company), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["radius"].as_array().unwrap().len(), 1);
    assert_eq!(listed["radius"][0]["type"], "radius");

    let (status, result) = call(
      &h.state,
      "GET",
      &format!("/queries/{query_id}/data"),
      Some(&h.company),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["cohort_size"], 3);
    assert!(result.get("individual_id").is_none());
    assert_eq!(result["data"]["heart_rate"].as_array().unwrap().len(), 3);

    let (status, _) = call(
      &h.state,
      "POST",
      &format!("/queries/{query_id}/close"),
      Some(&h.company),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = call(
      &h.state,
      "GET",
      &format!("/queries/{query_id}/data"),
      Some(&h.company),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "query_not_found");
  }

  #[tokio::test]
  async fn restrictive_filter_is_rejected() {
    let h = harness(3, &[70.0, 75.0, 80.0]).await;
    let (status, body) = call(
      &h.state,
      "POST",
      "/queries",
      Some(&h.company),
      Some(radius_body(10.0, json!({ "heart_rate": { "bpm": [81, 86] } }))),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["kind"], "query_too_restrictive");
    assert_eq!(body["error"], "query too restrictive");
  }

  #[tokio::test]
  async fn missing_parameters_are_named() {
    let h = harness(1, &[]).await;

    let (status, body) = call(
      &h.state,
      "POST",
      "/queries",
      Some(&h.company),
      Some(json!({ "query": { "type": "radius", "center_lat": 45.0, "center_long": 9.0 } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_parameter");
    assert_eq!(body["error"], "missing radius");

    let (status, body) = call(&h.state, "POST", "/queries", Some(&h.company), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "missing query");
  }

  #[tokio::test]
  async fn malformed_bodies_are_invalid_parameters() {
    let h = harness(1, &[70.0]).await;
    let person = &h.people[0];

    let mut polygon = radius_body(10.0, json!({}));
    polygon["query"]["type"] = json!("polygon");
    let mut wordy = radius_body(10.0, json!({}));
    wordy["query"]["radius"] = json!("ten");
    let gps = radius_body(10.0, json!({ "gps": { "lat": [45.0, 46.0] } }));

    for bad in [polygon, wordy, gps] {
      let (status, body) = call(&h.state, "POST", "/queries", Some(&h.company), Some(bad)).await;
      assert_eq!(status, StatusCode::BAD_REQUEST);
      assert_eq!(body["kind"], "invalid_parameter");
    }

    let (status, body) = call(
      &h.state,
      "POST",
      "/individuals/data",
      Some(person),
      Some(json!({ "heart_rate": [{ "timestamp": "yesterday", "bpm": 70.0 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_parameter");

    let uri = format!("/consents/{}", Uuid::new_v4());
    let (status, body) =
      call(&h.state, "POST", &uri, Some(person), Some(json!({ "decision": "yes" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_parameter");
  }

  #[tokio::test]
  async fn unknown_query_is_not_found() {
    let h = harness(1, &[]).await;
    let (status, body) = call(
      &h.state,
      "GET",
      &format!("/queries/{}/data", Uuid::new_v4()),
      Some(&h.company),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "query_not_found");
  }

  // ── Individual queries ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn individual_query_consent_flow() {
    let h = harness(3, &[]).await;
    h.state
      .engine
      .store()
      .add_individual(NewIndividual {
        email:         "ada@example.com".to_string(),
        ssn:           "AAA111".to_string(),
        full_name:     "Ada".to_string(),
        password_hash: hash("secret"),
      })
      .await
      .unwrap();
    let ada = basic("ada@example.com", "secret");

    let (status, created) = call(
      &h.state,
      "POST",
      "/queries",
      Some(&h.company),
      Some(json!({ "query": { "type": "individual", "ssn": "AAA111" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let query_id = created["query_id"].as_str().unwrap().to_owned();
    assert_eq!(h.outbox.0.lock().unwrap().len(), 1);

    let (status, body) = call(
      &h.state,
      "GET",
      &format!("/queries/{query_id}/data"),
      Some(&h.company),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["kind"], "consent_required");

    let (status, pending) = call(&h.state, "GET", "/consents/pending", Some(&ada), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(pending[0]["query_id"], query_id.as_str());
    assert_eq!(pending[0]["company_name"], "Acme");

    let (status, decided) = call(
      &h.state,
      "POST",
      &format!("/consents/{query_id}"),
      Some(&ada),
      Some(json!({ "decision": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(decided["consent"], "authorized");
    assert_eq!(h.outbox.0.lock().unwrap().len(), 2);

    let (status, again) = call(
      &h.state,
      "POST",
      &format!("/consents/{query_id}"),
      Some(&ada),
      Some(json!({ "decision": false })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["kind"], "consent_already_recorded");

    let (status, result) = call(
      &h.state,
      "GET",
      &format!("/queries/{query_id}/data"),
      Some(&h.company),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["cohort_size"], 1);
    assert!(result["individual_id"].is_string());
  }

  #[tokio::test]
  async fn unknown_target_is_not_found() {
    let h = harness(1, &[]).await;
    let (status, body) = call(
      &h.state,
      "POST",
      "/queries",
      Some(&h.company),
      Some(json!({ "query": { "type": "individual", "ssn": "NOBODY" } })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "target_not_found");
  }

  // ── Own data ─────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn own_data_reads_back_within_window() {
    let h = harness(1, &[70.0]).await;
    let me = &h.people[0];

    let (status, all) = call(&h.state, "GET", "/individuals/data", Some(me), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(all["location"].as_array().unwrap().len(), 1);
    assert_eq!(all["heart_rate"].as_array().unwrap().len(), 1);

    let (status, none) = call(
      &h.state,
      "GET",
      "/individuals/data?from=2024-02-01T00:00:00Z&to=2024-03-01T00:00:00Z",
      Some(me),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(none["location"].as_array().unwrap().is_empty());

    let (status, body) = call(
      &h.state,
      "GET",
      "/individuals/data?from=2024-03-01T00:00:00Z&to=2024-02-01T00:00:00Z",
      Some(me),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_parameter");

    let (status, body) = call(
      &h.state,
      "GET",
      "/individuals/data?from=2024-02-01T00:00:00Z",
      Some(me),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "missing_parameter");
  }

  #[tokio::test]
  async fn out_of_range_samples_are_rejected() {
    let h = harness(1, &[70.0]).await;
    let (status, body) = call(
      &h.state,
      "POST",
      "/individuals/data",
      Some(&h.people[0]),
      Some(json!({ "gps_coordinates": [{ "timestamp": "2024-01-01T10:00:00Z", "lat": 95.0, "long": 9.0 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_parameter");
  }
}
