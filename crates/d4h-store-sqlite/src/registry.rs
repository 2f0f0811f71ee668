//! The query registry: creation, evaluation, consent and membership.
//!
//! Every public function here expects to run inside the transaction opened by
//! [`crate::SqliteStore`]; returning `Err` makes the caller drop the
//! transaction, which rolls back everything written so far.

use chrono::Utc;
use d4h_core::{
  Error as CoreError,
  cohort::{self, AttributeFilter, CohortData, FeasibilityGate},
  consent::Consent,
  dispatch::Subscription,
  query::{
    ConsentReceipt, CreatedQuery, IndividualQuery, IssuerQueries, NewQuery, PendingConsent,
    Query, QueryKind, RadiusQuery, StoredQuery,
  },
  store::PerformedQuery,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{
    RawIndividual, RawIndividualQuery, RawQuery, RawRadiusQuery, decode_dt, decode_uuid,
    encode_dt, encode_filters, encode_query_kind, encode_uuid,
  },
  samples::{latest_positions, read_samples},
};

// ─── Creation ────────────────────────────────────────────────────────────────

pub fn create_query(
  conn: &Connection,
  issuer_id: Uuid,
  input: NewQuery,
  gate: FeasibilityGate,
) -> Result<CreatedQuery> {
  let query = Query {
    query_id:   Uuid::new_v4(),
    issuer_id,
    created_at: Utc::now(),
    kind:       input.kind(),
    valid:      true,
  };

  match input {
    NewQuery::Individual { ssn } => {
      let target = find_individual_by_ssn(conn, &ssn)?.ok_or(CoreError::TargetNotFound)?;

      insert_query_row(conn, &query)?;
      conn.execute(
        "INSERT INTO individual_queries (query_id, ssn, consent) VALUES (?1, ?2, NULL)",
        params![encode_uuid(query.query_id), ssn],
      )?;

      Ok(CreatedQuery { query, consent_request: Some(target.email) })
    }
    NewQuery::Radius { center, radius_km, filters } => {
      let radius = RadiusQuery { query, center, radius_km, filters };
      let cohort = evaluate_radius(conn, &radius, gate)?;

      insert_query_row(conn, &radius.query)?;
      conn.execute(
        "INSERT INTO radius_queries (query_id, center_lat, center_long, radius_km, filters)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
          encode_uuid(radius.query.query_id),
          radius.center.lat,
          radius.center.long,
          radius.radius_km,
          encode_filters(&radius.filters)?,
        ],
      )?;
      replace_members(conn, radius.query.query_id, cohort.keys().copied())?;

      Ok(CreatedQuery { query: radius.query, consent_request: None })
    }
  }
}

fn insert_query_row(conn: &Connection, query: &Query) -> Result<()> {
  conn.execute(
    "INSERT INTO queries (query_id, issuer_id, created_at, query_type, valid)
     VALUES (?1, ?2, ?3, ?4, ?5)",
    params![
      encode_uuid(query.query_id),
      encode_uuid(query.issuer_id),
      encode_dt(query.created_at),
      encode_query_kind(query.kind),
      query.valid,
    ],
  )?;
  Ok(())
}

// ─── Evaluation ──────────────────────────────────────────────────────────────

/// Resolve, gate, filter and gate again. Nothing is written.
fn evaluate_radius(
  conn: &Connection,
  radius: &RadiusQuery,
  gate: FeasibilityGate,
) -> Result<CohortData> {
  let policy = QueryKind::Radius.privacy_policy();

  let candidates = cohort::resolve_radius(radius, latest_positions(conn)?);
  tracing::debug!(candidates = candidates.len(), "radius cohort resolved");
  gate.check(policy, candidates.len())?;

  let data = candidates
    .into_iter()
    .map(|id| Ok((id, read_samples(conn, id, None)?)))
    .collect::<Result<CohortData>>()?;

  let filtered = AttributeFilter::new(&radius.filters).apply(data);
  tracing::debug!(remaining = filtered.len(), "attribute filters applied");
  gate.check(policy, filtered.len())?;

  Ok(filtered)
}

pub fn perform_query(
  conn: &Connection,
  issuer_id: Uuid,
  query_id: Uuid,
  gate: FeasibilityGate,
) -> Result<PerformedQuery> {
  let stored = load_query(conn, query_id)?
    .filter(|q| q.query().issuer_id == issuer_id && q.query().valid)
    .ok_or(CoreError::QueryNotFound(query_id))?;

  match stored {
    StoredQuery::Individual(q) => {
      if !q.consent.is_authorized() {
        return Err(CoreError::ConsentRequired(query_id).into());
      }
      let target = find_individual_by_ssn(conn, &q.ssn)?.ok_or(CoreError::TargetNotFound)?;
      let samples = read_samples(conn, target.individual_id, None)?;
      Ok(PerformedQuery {
        query_id,
        kind: QueryKind::Individual,
        cohort: CohortData::from([(target.individual_id, samples)]),
      })
    }
    StoredQuery::Radius(q) => {
      let cohort = evaluate_radius(conn, &q, gate)?;
      replace_members(conn, query_id, cohort.keys().copied())?;
      Ok(PerformedQuery { query_id, kind: QueryKind::Radius, cohort })
    }
  }
}

// ─── Membership ──────────────────────────────────────────────────────────────

/// Delete-then-insert the membership of a radius query.
fn replace_members(
  conn: &Connection,
  query_id: Uuid,
  members: impl IntoIterator<Item = Uuid>,
) -> Result<()> {
  let qid = encode_uuid(query_id);
  conn.execute("DELETE FROM query_members WHERE query_id = ?1", params![qid])?;
  let mut stmt = conn.prepare_cached(
    "INSERT INTO query_members (query_id, individual_id) VALUES (?1, ?2)",
  )?;
  for id in members {
    stmt.execute(params![qid, encode_uuid(id)])?;
  }
  Ok(())
}

pub fn members(conn: &Connection, query_id: Uuid) -> Result<Vec<Uuid>> {
  let mut stmt = conn.prepare_cached(
    "SELECT individual_id FROM query_members WHERE query_id = ?1 ORDER BY individual_id",
  )?;
  let ids = stmt
    .query_map(params![encode_uuid(query_id)], |r| r.get::<_, String>(0))?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  ids.iter().map(|s| decode_uuid(s)).collect()
}

// ─── Lookups ─────────────────────────────────────────────────────────────────

pub fn find_individual_by_ssn(
  conn: &Connection,
  ssn: &str,
) -> Result<Option<d4h_core::account::Individual>> {
  let raw = conn
    .query_row(
      &format!("SELECT {} FROM individuals WHERE ssn = ?1", RawIndividual::COLUMNS),
      params![ssn],
      RawIndividual::from_row,
    )
    .optional()?;
  raw.map(RawIndividual::into_individual).transpose()
}

fn load_query(conn: &Connection, query_id: Uuid) -> Result<Option<StoredQuery>> {
  let qid = encode_uuid(query_id);

  let individual = conn
    .query_row(
      &format!(
        "SELECT {}, iq.ssn, iq.consent
         FROM queries q JOIN individual_queries iq ON iq.query_id = q.query_id
         WHERE q.query_id = ?1",
        RawQuery::COLUMNS
      ),
      params![qid],
      individual_from_row,
    )
    .optional()?;
  if let Some(raw) = individual {
    return Ok(Some(StoredQuery::Individual(raw.into_individual_query()?)));
  }

  let radius = conn
    .query_row(
      &format!(
        "SELECT {}, rq.center_lat, rq.center_long, rq.radius_km, rq.filters
         FROM queries q JOIN radius_queries rq ON rq.query_id = q.query_id
         WHERE q.query_id = ?1",
        RawQuery::COLUMNS
      ),
      params![qid],
      radius_from_row,
    )
    .optional()?;
  radius
    .map(|raw| raw.into_radius_query().map(StoredQuery::Radius))
    .transpose()
}

fn individual_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawIndividualQuery> {
  Ok(RawIndividualQuery {
    query:   RawQuery::from_row(r, 0)?,
    ssn:     r.get(5)?,
    consent: r.get(6)?,
  })
}

fn radius_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<RawRadiusQuery> {
  Ok(RawRadiusQuery {
    query:       RawQuery::from_row(r, 0)?,
    center_lat:  r.get(5)?,
    center_long: r.get(6)?,
    radius_km:   r.get(7)?,
    filters:     r.get(8)?,
  })
}

pub fn list_queries(conn: &Connection, issuer_id: Uuid) -> Result<IssuerQueries> {
  let id = encode_uuid(issuer_id);

  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {}, iq.ssn, iq.consent
     FROM queries q JOIN individual_queries iq ON iq.query_id = q.query_id
     WHERE q.issuer_id = ?1
     ORDER BY q.created_at",
    RawQuery::COLUMNS
  ))?;
  let individual = stmt
    .query_map(params![id], individual_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawIndividualQuery::into_individual_query)
    .collect::<Result<Vec<IndividualQuery>>>()?;

  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {}, rq.center_lat, rq.center_long, rq.radius_km, rq.filters
     FROM queries q JOIN radius_queries rq ON rq.query_id = q.query_id
     WHERE q.issuer_id = ?1
     ORDER BY q.created_at",
    RawQuery::COLUMNS
  ))?;
  let radius = stmt
    .query_map(params![id], radius_from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(RawRadiusQuery::into_radius_query)
    .collect::<Result<Vec<RadiusQuery>>>()?;

  Ok(IssuerQueries { individual, radius })
}

pub fn close_query(conn: &Connection, issuer_id: Uuid, query_id: Uuid) -> Result<()> {
  let changed = conn.execute(
    "UPDATE queries SET valid = 0 WHERE query_id = ?1 AND issuer_id = ?2 AND valid = 1",
    params![encode_uuid(query_id), encode_uuid(issuer_id)],
  )?;
  if changed == 0 {
    return Err(CoreError::QueryNotFound(query_id).into());
  }
  Ok(())
}

// ─── Consent ─────────────────────────────────────────────────────────────────

pub fn pending_consents(conn: &Connection, individual_id: Uuid) -> Result<Vec<PendingConsent>> {
  let mut stmt = conn.prepare_cached(
    "SELECT iq.query_id, c.company_name, q.created_at
     FROM individuals i
     JOIN individual_queries iq ON iq.ssn = i.ssn
     JOIN queries q             ON q.query_id = iq.query_id
     JOIN companies c           ON c.company_id = q.issuer_id
     WHERE i.individual_id = ?1 AND iq.consent IS NULL AND q.valid = 1
     ORDER BY q.created_at",
  )?;
  let rows = stmt
    .query_map(params![encode_uuid(individual_id)], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(id, company_name, at)| {
      Ok(PendingConsent {
        query_id: decode_uuid(&id)?,
        company_name,
        requested_at: decode_dt(&at)?,
      })
    })
    .collect()
}

pub fn record_consent(
  conn: &Connection,
  individual_id: Uuid,
  query_id: Uuid,
  decision: bool,
) -> Result<ConsentReceipt> {
  let qid = encode_uuid(query_id);
  let iid = encode_uuid(individual_id);

  // Only the targeted individual may see (and therefore decide on) the query.
  let row: Option<(Option<bool>, String, String)> = conn
    .query_row(
      "SELECT iq.consent, iq.ssn, c.email
       FROM individual_queries iq
       JOIN queries q     ON q.query_id = iq.query_id
       JOIN companies c   ON c.company_id = q.issuer_id
       JOIN individuals i ON i.ssn = iq.ssn
       WHERE iq.query_id = ?1 AND i.individual_id = ?2 AND q.valid = 1",
      params![qid, iid],
      |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
    )
    .optional()?;
  let (current, ssn, issuer_email) = row.ok_or(CoreError::QueryNotFound(query_id))?;

  let next = Consent::from_decision(current).decide(query_id, decision)?;

  conn.execute(
    "UPDATE individual_queries SET consent = ?1 WHERE query_id = ?2 AND consent IS NULL",
    params![next.as_decision(), qid],
  )?;
  if next.is_authorized() {
    conn.execute(
      "INSERT INTO query_members (query_id, individual_id) VALUES (?1, ?2)",
      params![qid, iid],
    )?;
  }

  Ok(ConsentReceipt { query_id, consent: next, issuer_email, ssn })
}

// ─── Ingestion subscriptions ─────────────────────────────────────────────────

pub fn subscriptions_for(conn: &Connection, individual_id: Uuid) -> Result<Vec<Subscription>> {
  let mut stmt = conn.prepare_cached(
    "SELECT q.query_id, q.issuer_id, c.email
     FROM query_members m
     JOIN queries q   ON q.query_id = m.query_id
     JOIN companies c ON c.company_id = q.issuer_id
     WHERE m.individual_id = ?1 AND q.valid = 1",
  )?;
  let rows = stmt
    .query_map(params![encode_uuid(individual_id)], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?, r.get::<_, String>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(q, i, email)| {
      Ok(Subscription {
        query_id:     decode_uuid(&q)?,
        issuer_id:    decode_uuid(&i)?,
        issuer_email: email,
      })
    })
    .collect()
}

pub fn open_radius_queries(conn: &Connection) -> Result<Vec<(Subscription, RadiusQuery)>> {
  let mut stmt = conn.prepare_cached(&format!(
    "SELECT {}, rq.center_lat, rq.center_long, rq.radius_km, rq.filters, c.email
     FROM queries q
     JOIN radius_queries rq ON rq.query_id = q.query_id
     JOIN companies c       ON c.company_id = q.issuer_id
     WHERE q.valid = 1",
    RawQuery::COLUMNS
  ))?;
  let rows = stmt
    .query_map([], |r| Ok((radius_from_row(r)?, r.get::<_, String>(9)?)))?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(raw, issuer_email)| {
      let query = raw.into_radius_query()?;
      let sub = Subscription {
        query_id: query.query.query_id,
        issuer_id: query.query.issuer_id,
        issuer_email,
      };
      Ok((sub, query))
    })
    .collect()
}
