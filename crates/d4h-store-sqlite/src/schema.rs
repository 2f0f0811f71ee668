//! SQL schema for the Data4Help SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS companies (
    company_id    TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    company_name  TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS individuals (
    individual_id TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    ssn           TEXT NOT NULL UNIQUE,
    full_name     TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    created_at    TEXT NOT NULL
);

-- Immutable after creation except for `valid`.
CREATE TABLE IF NOT EXISTS queries (
    query_id    TEXT PRIMARY KEY,
    issuer_id   TEXT NOT NULL REFERENCES companies(company_id),
    created_at  TEXT NOT NULL,
    query_type  TEXT NOT NULL CHECK (query_type IN ('individual', 'radius')),
    valid       INTEGER NOT NULL DEFAULT 1
);

-- `consent` is NULL while pending, then 1 (authorized) or 0 (denied) forever.
CREATE TABLE IF NOT EXISTS individual_queries (
    query_id  TEXT PRIMARY KEY REFERENCES queries(query_id) ON DELETE CASCADE,
    ssn       TEXT NOT NULL,
    consent   INTEGER
);

CREATE TABLE IF NOT EXISTS radius_queries (
    query_id     TEXT PRIMARY KEY REFERENCES queries(query_id) ON DELETE CASCADE,
    center_lat   REAL NOT NULL,
    center_long  REAL NOT NULL,
    radius_km    REAL NOT NULL,
    filters      TEXT NOT NULL DEFAULT '{}'   -- JSON-encoded FilterSet
);

-- Written only by the query registry.
CREATE TABLE IF NOT EXISTS query_members (
    query_id      TEXT NOT NULL REFERENCES queries(query_id) ON DELETE CASCADE,
    individual_id TEXT NOT NULL REFERENCES individuals(individual_id),
    PRIMARY KEY (query_id, individual_id)
);

-- Samples are strictly append-only.
-- No UPDATE or DELETE is ever issued against these tables.
CREATE TABLE IF NOT EXISTS location_samples (
    sample_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    individual_id TEXT NOT NULL REFERENCES individuals(individual_id),
    recorded_at   TEXT NOT NULL,   -- fixed-width RFC 3339 UTC
    lat           REAL NOT NULL,
    long          REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS accelerometer_samples (
    sample_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    individual_id TEXT NOT NULL REFERENCES individuals(individual_id),
    recorded_at   TEXT NOT NULL,
    acc_x         REAL NOT NULL,
    acc_y         REAL NOT NULL,
    acc_z         REAL NOT NULL
);

CREATE TABLE IF NOT EXISTS heart_rate_samples (
    sample_id     INTEGER PRIMARY KEY AUTOINCREMENT,
    individual_id TEXT NOT NULL REFERENCES individuals(individual_id),
    recorded_at   TEXT NOT NULL,
    bpm           REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS queries_issuer_idx        ON queries(issuer_id);
CREATE INDEX IF NOT EXISTS individual_queries_ssn_idx ON individual_queries(ssn);
CREATE INDEX IF NOT EXISTS query_members_ind_idx     ON query_members(individual_id);
CREATE INDEX IF NOT EXISTS location_ind_time_idx     ON location_samples(individual_id, recorded_at);
CREATE INDEX IF NOT EXISTS accelerometer_ind_time_idx ON accelerometer_samples(individual_id, recorded_at);
CREATE INDEX IF NOT EXISTS heart_rate_ind_time_idx   ON heart_rate_samples(individual_id, recorded_at);

PRAGMA user_version = 1;
";
