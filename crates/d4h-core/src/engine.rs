//! [`Engine`]: the entry point the surrounding service calls.
//!
//! The engine validates input, delegates every transactional step to the
//! [`QueryStore`], shapes results with the anonymizer, and sends notices
//! through the [`Notifier`] only after the owning transaction committed.

use std::sync::Arc;

use uuid::Uuid;

use crate::{
  Error, Result,
  anonymize::anonymize,
  cohort::FeasibilityGate,
  consent::Consent,
  dispatch::{self, IngestionNotice},
  notify::{Notice, Notifier},
  query::{IssuerQueries, PendingConsent, QueryRequest, QueryResult},
  sample::{SampleSet, TimeWindow},
  store::QueryStore,
};

/// The query feasibility and consent engine.
///
/// Cloning is cheap; the store and notifier are reference-counted.
pub struct Engine<S> {
  store:    Arc<S>,
  notifier: Arc<dyn Notifier>,
  gate:     FeasibilityGate,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self {
      store:    self.store.clone(),
      notifier: self.notifier.clone(),
      gate:     self.gate,
    }
  }
}

fn storage<E: Into<Error>>(e: E) -> Error {
  let err = e.into();
  if let Error::Storage(source) = &err {
    tracing::error!(error = %source, "storage failure");
  }
  err
}

impl<S: QueryStore> Engine<S> {
  pub fn new(store: Arc<S>, notifier: Arc<dyn Notifier>, gate: FeasibilityGate) -> Self {
    Self { store, notifier, gate }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  // ── Issuer operations ─────────────────────────────────────────────────

  /// CreateQuery: validate, persist atomically, then ask the target for
  /// consent if the query is individual.
  pub async fn create_query(&self, issuer_id: Uuid, request: QueryRequest) -> Result<Uuid> {
    let query = request.validate()?;
    let kind = query.kind();

    let created = self
      .store
      .create_query(issuer_id, query, self.gate)
      .await
      .map_err(storage)?;

    tracing::info!(
      query_id = %created.query.query_id,
      %issuer_id,
      ?kind,
      "query created"
    );

    if let Some(target) = &created.consent_request {
      self.notifier.notify(Notice::consent_request(target));
    }

    Ok(created.query.query_id)
  }

  /// ListIssuerQueries.
  pub async fn list_queries(&self, issuer_id: Uuid) -> Result<IssuerQueries> {
    self.store.list_queries(issuer_id).await.map_err(storage)
  }

  /// PerformQuery: re-derive the cohort from the persisted parameters and return
  /// its data, identified only for single-member cohorts.
  pub async fn perform_query(&self, issuer_id: Uuid, query_id: Uuid) -> Result<QueryResult> {
    let performed = self
      .store
      .perform_query(issuer_id, query_id, self.gate)
      .await
      .map_err(storage)?;

    tracing::debug!(
      %query_id,
      kind = ?performed.kind,
      cohort_size = performed.cohort.len(),
      "query performed"
    );

    Ok(anonymize(
      performed.query_id,
      performed.kind.privacy_policy(),
      performed.cohort,
    ))
  }

  /// Close one of the issuer's queries.
  pub async fn close_query(&self, issuer_id: Uuid, query_id: Uuid) -> Result<()> {
    self.store.close_query(issuer_id, query_id).await.map_err(storage)?;
    tracing::info!(%query_id, %issuer_id, "query closed");
    Ok(())
  }

  // ── Individual operations ─────────────────────────────────────────────

  /// ListPendingConsents.
  pub async fn pending_consents(&self, individual_id: Uuid) -> Result<Vec<PendingConsent>> {
    self.store.pending_consents(individual_id).await.map_err(storage)
  }

  /// RecordConsentDecision. The issuer hears back only on authorization.
  pub async fn record_consent(
    &self,
    individual_id: Uuid,
    query_id: Uuid,
    decision: bool,
  ) -> Result<Consent> {
    let receipt = self
      .store
      .record_consent(individual_id, query_id, decision)
      .await
      .map_err(storage)?;

    tracing::info!(%query_id, consent = ?receipt.consent, "consent decision recorded");

    if receipt.consent.is_authorized() {
      self.notifier.notify(Notice::consent_granted(
        &receipt.issuer_email,
        receipt.query_id,
        &receipt.ssn,
      ));
    }

    Ok(receipt.consent)
  }

  /// Append a batch of samples, then run NotifyOnIngestion.
  pub async fn ingest(&self, individual_id: Uuid, batch: SampleSet) -> Result<usize> {
    batch.validate_batch()?;
    self
      .store
      .get_individual(individual_id)
      .await
      .map_err(storage)?
      .ok_or(Error::AccountNotFound(individual_id))?;

    let written = self
      .store
      .append_samples(individual_id, batch)
      .await
      .map_err(storage)?;
    tracing::debug!(%individual_id, written, "samples ingested");

    // The batch is committed; a failed dispatch must not fail the request.
    if let Err(e) = self.notify_on_ingestion(individual_id).await {
      tracing::error!(%individual_id, error = %e, "ingestion notices not sent");
    }
    Ok(written)
  }

  /// NotifyOnIngestion: tell every interested issuer, once each, that new
  /// data exists. Returns the notices that were sent.
  pub async fn notify_on_ingestion(&self, individual_id: Uuid) -> Result<Vec<IngestionNotice>> {
    let members = self
      .store
      .subscriptions_for(individual_id)
      .await
      .map_err(storage)?;

    let in_range = match self
      .store
      .latest_position(individual_id)
      .await
      .map_err(storage)?
    {
      Some(position) => {
        let open = self.store.open_radius_queries().await.map_err(storage)?;
        dispatch::in_range(&position, open)
      }
      None => Vec::new(),
    };

    let notices = dispatch::merge(members, in_range);
    for notice in &notices {
      tracing::info!(issuer_id = %notice.issuer_id, "notifying issuer of new data");
      self.notifier.notify(notice.to_notice());
    }
    Ok(notices)
  }

  /// An individual's own samples within a window.
  pub async fn own_samples(
    &self,
    individual_id: Uuid,
    window: Option<TimeWindow>,
  ) -> Result<SampleSet> {
    self
      .store
      .get_samples(individual_id, window)
      .await
      .map_err(storage)
  }
}
