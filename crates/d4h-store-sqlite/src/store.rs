//! [`SqliteStore`] — the SQLite implementation of [`QueryStore`].

use std::path::Path;

use chrono::Utc;
use d4h_core::{
  account::{ActorKind, Company, Credentials, Individual, NewCompany, NewIndividual},
  cohort::{FeasibilityGate, GeoPoint},
  dispatch::Subscription,
  query::{ConsentReceipt, CreatedQuery, IssuerQueries, NewQuery, PendingConsent, RadiusQuery},
  sample::{SampleSet, TimeWindow},
  store::{PerformedQuery, QueryStore},
};
use rusqlite::{Connection, OptionalExtension as _};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawIndividual, decode_uuid, encode_dt, encode_uuid},
  registry, samples,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Data4Help store backed by a single SQLite file.
///
/// Cloning is cheap — the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store — useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `work` inside one transaction on the connection thread.
  ///
  /// The transaction commits only if `work` returns `Ok`; on `Err` it is
  /// dropped and rolled back, and the error is handed back unchanged.
  async fn unit_of_work<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match work(&*tx) {
          Ok(value) => {
            tx.commit()?;
            Ok(Ok(value))
          }
          Err(e) => Ok(Err(e)),
        }
      })
      .await?
  }

  /// Run a read-only `work` on the connection thread.
  async fn read<T, F>(&self, work: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(work(conn))).await?
  }

  #[cfg(test)]
  pub(crate) async fn execute_batch(&self, sql: &'static str) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute_batch(sql)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── QueryStore impl ─────────────────────────────────────────────────────────

impl QueryStore for SqliteStore {
  type Error = Error;

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn add_company(&self, input: NewCompany) -> Result<Company> {
    let company = Company {
      company_id:   Uuid::new_v4(),
      email:        input.email,
      company_name: input.company_name,
      created_at:   Utc::now(),
    };

    let id_str = encode_uuid(company.company_id);
    let at_str = encode_dt(company.created_at);
    let email  = company.email.clone();
    let name   = company.company_name.clone();
    let hash   = input.password_hash;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO companies (company_id, email, company_name, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![id_str, email, name, hash, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(company)
  }

  async fn add_individual(&self, input: NewIndividual) -> Result<Individual> {
    let individual = Individual {
      individual_id: Uuid::new_v4(),
      email:         input.email,
      ssn:           input.ssn,
      full_name:     input.full_name,
      created_at:    Utc::now(),
    };

    let id_str = encode_uuid(individual.individual_id);
    let at_str = encode_dt(individual.created_at);
    let email  = individual.email.clone();
    let ssn    = individual.ssn.clone();
    let name   = individual.full_name.clone();
    let hash   = input.password_hash;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO individuals
             (individual_id, email, ssn, full_name, password_hash, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![id_str, email, ssn, name, hash, at_str],
        )?;
        Ok(())
      })
      .await?;

    Ok(individual)
  }

  async fn get_individual(&self, id: Uuid) -> Result<Option<Individual>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawIndividual> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {} FROM individuals WHERE individual_id = ?1",
              RawIndividual::COLUMNS
            ),
            rusqlite::params![id_str],
            RawIndividual::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawIndividual::into_individual).transpose()
  }

  async fn find_credentials<'a>(
    &'a self,
    kind: ActorKind,
    email: &'a str,
  ) -> Result<Option<Credentials>> {
    let sql = match kind {
      ActorKind::Company => "SELECT company_id, password_hash FROM companies WHERE email = ?1",
      ActorKind::Individual => {
        "SELECT individual_id, password_hash FROM individuals WHERE email = ?1"
      }
    };
    let email = email.to_owned();

    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(sql, rusqlite::params![email], |r| Ok((r.get(0)?, r.get(1)?)))
          .optional()?)
      })
      .await?;

    row
      .map(|(id, password_hash)| {
        Ok(Credentials { actor_id: decode_uuid(&id)?, password_hash })
      })
      .transpose()
  }

  // ── Time series ───────────────────────────────────────────────────────────

  async fn append_samples(&self, individual_id: Uuid, batch: SampleSet) -> Result<usize> {
    self
      .unit_of_work(move |conn| samples::insert_batch(conn, individual_id, &batch))
      .await
  }

  async fn get_samples(
    &self,
    individual_id: Uuid,
    window: Option<TimeWindow>,
  ) -> Result<SampleSet> {
    self
      .read(move |conn| samples::read_samples(conn, individual_id, window))
      .await
  }

  async fn latest_position(&self, individual_id: Uuid) -> Result<Option<GeoPoint>> {
    self
      .read(move |conn| samples::latest_position(conn, individual_id))
      .await
  }

  // ── Query registry ────────────────────────────────────────────────────────

  async fn create_query(
    &self,
    issuer_id: Uuid,
    query: NewQuery,
    gate: FeasibilityGate,
  ) -> Result<CreatedQuery> {
    self
      .unit_of_work(move |conn| registry::create_query(conn, issuer_id, query, gate))
      .await
  }

  async fn list_queries(&self, issuer_id: Uuid) -> Result<IssuerQueries> {
    self
      .read(move |conn| registry::list_queries(conn, issuer_id))
      .await
  }

  async fn perform_query(
    &self,
    issuer_id: Uuid,
    query_id: Uuid,
    gate: FeasibilityGate,
  ) -> Result<PerformedQuery> {
    self
      .unit_of_work(move |conn| registry::perform_query(conn, issuer_id, query_id, gate))
      .await
  }

  async fn close_query(&self, issuer_id: Uuid, query_id: Uuid) -> Result<()> {
    self
      .unit_of_work(move |conn| registry::close_query(conn, issuer_id, query_id))
      .await
  }

  async fn members(&self, query_id: Uuid) -> Result<Vec<Uuid>> {
    self.read(move |conn| registry::members(conn, query_id)).await
  }

  // ── Consent ───────────────────────────────────────────────────────────────

  async fn pending_consents(&self, individual_id: Uuid) -> Result<Vec<PendingConsent>> {
    self
      .read(move |conn| registry::pending_consents(conn, individual_id))
      .await
  }

  async fn record_consent(
    &self,
    individual_id: Uuid,
    query_id: Uuid,
    decision: bool,
  ) -> Result<ConsentReceipt> {
    self
      .unit_of_work(move |conn| {
        registry::record_consent(conn, individual_id, query_id, decision)
      })
      .await
  }

  // ── Ingestion notifications ───────────────────────────────────────────────

  async fn subscriptions_for(&self, individual_id: Uuid) -> Result<Vec<Subscription>> {
    self
      .read(move |conn| registry::subscriptions_for(conn, individual_id))
      .await
  }

  async fn open_radius_queries(&self) -> Result<Vec<(Subscription, RadiusQuery)>> {
    self.read(registry::open_radius_queries).await
  }
}
