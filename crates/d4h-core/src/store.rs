//! The `QueryStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `d4h-store-sqlite`).
//! The backend owns every transaction: each query-lifecycle method must run
//! to completion or roll back entirely, and only the backend writes cohort
//! membership rows.

use std::future::Future;

use uuid::Uuid;

use crate::{
  account::{ActorKind, Company, Credentials, Individual, NewCompany, NewIndividual},
  cohort::{CohortData, FeasibilityGate, GeoPoint},
  dispatch::Subscription,
  query::{
    ConsentReceipt, CreatedQuery, IssuerQueries, NewQuery, PendingConsent, QueryKind,
    RadiusQuery,
  },
  sample::{SampleSet, TimeWindow},
};

/// The cohort a performed query resolved to, before anonymisation.
#[derive(Debug, Clone)]
pub struct PerformedQuery {
  pub query_id: Uuid,
  pub kind:     QueryKind,
  pub cohort:   CohortData,
}

/// Abstraction over a query registry, account directory and time-series
/// store.
///
/// Domain failures raised inside a backend (`TargetNotFound`,
/// `QueryTooRestrictive`, ...) must survive the conversion into
/// [`crate::Error`] unchanged.
pub trait QueryStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + Into<crate::Error> + 'static;

  // ── Accounts ──────────────────────────────────────────────────────────

  fn add_company(
    &self,
    input: NewCompany,
  ) -> impl Future<Output = Result<Company, Self::Error>> + Send + '_;

  fn add_individual(
    &self,
    input: NewIndividual,
  ) -> impl Future<Output = Result<Individual, Self::Error>> + Send + '_;

  /// Retrieve an individual by id. Returns `None` if not found.
  fn get_individual(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Individual>, Self::Error>> + Send + '_;

  /// Look up the login record of an account by email.
  fn find_credentials<'a>(
    &'a self,
    kind: ActorKind,
    email: &'a str,
  ) -> impl Future<Output = Result<Option<Credentials>, Self::Error>> + Send + 'a;

  // ── Time series, append-only ──────────────────────────────────────────

  /// Append every sample of `batch` in one transaction; returns the number
  /// of samples written.
  fn append_samples(
    &self,
    individual_id: Uuid,
    batch: SampleSet,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Read an individual's samples, optionally restricted to a time window.
  fn get_samples(
    &self,
    individual_id: Uuid,
    window: Option<TimeWindow>,
  ) -> impl Future<Output = Result<SampleSet, Self::Error>> + Send + '_;

  /// The individual's most recent location, if any was ever recorded.
  fn latest_position(
    &self,
    individual_id: Uuid,
  ) -> impl Future<Output = Result<Option<GeoPoint>, Self::Error>> + Send + '_;

  // ── Query registry ────────────────────────────────────────────────────

  /// Persist a query, its parameter row and its initial cohort membership as one
  /// unit. Radius queries are resolved, filtered and checked against `gate`
  /// first; individual queries fail with `TargetNotFound` for an unknown
  /// identity number. Any failure leaves no rows behind.
  fn create_query(
    &self,
    issuer_id: Uuid,
    query: NewQuery,
    gate: FeasibilityGate,
  ) -> impl Future<Output = Result<CreatedQuery, Self::Error>> + Send + '_;

  /// All queries issued by `issuer_id`, grouped by type.
  fn list_queries(
    &self,
    issuer_id: Uuid,
  ) -> impl Future<Output = Result<IssuerQueries, Self::Error>> + Send + '_;

  /// Re-evaluate a stored query from its persisted parameters and refresh its
  /// membership. Fails with `QueryNotFound` for unknown, closed or foreign
  /// queries and with `ConsentRequired` for individual queries that are not
  /// authorized. Membership is left untouched on failure.
  fn perform_query(
    &self,
    issuer_id: Uuid,
    query_id: Uuid,
    gate: FeasibilityGate,
  ) -> impl Future<Output = Result<PerformedQuery, Self::Error>> + Send + '_;

  /// Clear the validity flag of one of `issuer_id`'s queries.
  fn close_query(
    &self,
    issuer_id: Uuid,
    query_id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Current cohort membership of a query.
  fn members(
    &self,
    query_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Uuid>, Self::Error>> + Send + '_;

  // ── Consent ───────────────────────────────────────────────────────────

  /// Open individual queries targeting `individual_id` that await a decision.
  fn pending_consents(
    &self,
    individual_id: Uuid,
  ) -> impl Future<Output = Result<Vec<PendingConsent>, Self::Error>> + Send + '_;

  /// Record the target's decision. Fails with `QueryNotFound` unless the
  /// query is an individual query targeting `individual_id`, and with
  /// `ConsentAlreadyRecorded` once a decision exists. Authorization inserts
  /// the target into the cohort membership.
  fn record_consent(
    &self,
    individual_id: Uuid,
    query_id: Uuid,
    decision: bool,
  ) -> impl Future<Output = Result<ConsentReceipt, Self::Error>> + Send + '_;

  // ── Ingestion notifications ───────────────────────────────────────────

  /// Open queries whose cohort currently includes `individual_id`.
  fn subscriptions_for(
    &self,
    individual_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Subscription>, Self::Error>> + Send + '_;

  /// Every open radius query with its issuer's address.
  fn open_radius_queries(
    &self,
  ) -> impl Future<Output = Result<Vec<(Subscription, RadiusQuery)>, Self::Error>> + Send + '_;
}
