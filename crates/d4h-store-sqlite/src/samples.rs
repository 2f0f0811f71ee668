//! Synchronous reads and appends over the three sample tables.
//!
//! These run on the connection thread, usually inside a registry
//! transaction (`Transaction` derefs to `Connection`).

use d4h_core::{
  cohort::GeoPoint,
  sample::{AccelerometerSample, HeartRateSample, LocationSample, SampleSet, TimeWindow},
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Result,
  encode::{decode_dt, decode_uuid, encode_dt, encode_uuid},
};

/// Append every sample of `batch`; returns the number of rows written.
pub fn insert_batch(conn: &Connection, individual_id: Uuid, batch: &SampleSet) -> Result<usize> {
  let id = encode_uuid(individual_id);
  let mut written = 0;

  let mut stmt = conn.prepare_cached(
    "INSERT INTO location_samples (individual_id, recorded_at, lat, long)
     VALUES (?1, ?2, ?3, ?4)",
  )?;
  for s in &batch.location {
    written += stmt.execute(params![id, encode_dt(s.timestamp), s.lat, s.long])?;
  }

  let mut stmt = conn.prepare_cached(
    "INSERT INTO accelerometer_samples (individual_id, recorded_at, acc_x, acc_y, acc_z)
     VALUES (?1, ?2, ?3, ?4, ?5)",
  )?;
  for s in &batch.accelerometer {
    written += stmt.execute(params![id, encode_dt(s.timestamp), s.acc_x, s.acc_y, s.acc_z])?;
  }

  let mut stmt = conn.prepare_cached(
    "INSERT INTO heart_rate_samples (individual_id, recorded_at, bpm)
     VALUES (?1, ?2, ?3)",
  )?;
  for s in &batch.heart_rate {
    written += stmt.execute(params![id, encode_dt(s.timestamp), s.bpm])?;
  }

  Ok(written)
}

/// Read all samples of one individual, oldest first.
pub fn read_samples(
  conn: &Connection,
  individual_id: Uuid,
  window: Option<TimeWindow>,
) -> Result<SampleSet> {
  let id = encode_uuid(individual_id);
  // Unbounded windows are expressed with bounds every stored value satisfies.
  let (from, to) = match window {
    Some(w) => (encode_dt(w.from), encode_dt(w.to)),
    None => (String::new(), "~".to_owned()),
  };

  let mut stmt = conn.prepare_cached(
    "SELECT recorded_at, lat, long FROM location_samples
     WHERE individual_id = ?1 AND recorded_at BETWEEN ?2 AND ?3
     ORDER BY recorded_at, sample_id",
  )?;
  let location = stmt
    .query_map(params![id, from, to], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(|(at, lat, long)| Ok(LocationSample { timestamp: decode_dt(&at)?, lat, long }))
    .collect::<Result<Vec<_>>>()?;

  let mut stmt = conn.prepare_cached(
    "SELECT recorded_at, acc_x, acc_y, acc_z FROM accelerometer_samples
     WHERE individual_id = ?1 AND recorded_at BETWEEN ?2 AND ?3
     ORDER BY recorded_at, sample_id",
  )?;
  let accelerometer = stmt
    .query_map(params![id, from, to], |r| {
      Ok((
        r.get::<_, String>(0)?,
        r.get::<_, f64>(1)?,
        r.get::<_, f64>(2)?,
        r.get::<_, f64>(3)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(|(at, acc_x, acc_y, acc_z)| {
      Ok(AccelerometerSample { timestamp: decode_dt(&at)?, acc_x, acc_y, acc_z })
    })
    .collect::<Result<Vec<_>>>()?;

  let mut stmt = conn.prepare_cached(
    "SELECT recorded_at, bpm FROM heart_rate_samples
     WHERE individual_id = ?1 AND recorded_at BETWEEN ?2 AND ?3
     ORDER BY recorded_at, sample_id",
  )?;
  let heart_rate = stmt
    .query_map(params![id, from, to], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?
    .into_iter()
    .map(|(at, bpm)| Ok(HeartRateSample { timestamp: decode_dt(&at)?, bpm }))
    .collect::<Result<Vec<_>>>()?;

  Ok(SampleSet { location, accelerometer, heart_rate })
}

/// The most recent location of every individual that has one.
///
/// Ties on `recorded_at` go to the later insert, same as [`latest_position`].
pub fn latest_positions(conn: &Connection) -> Result<Vec<(Uuid, GeoPoint)>> {
  let mut stmt = conn.prepare_cached(
    "SELECT individual_id, lat, long FROM (
       SELECT individual_id, lat, long,
              ROW_NUMBER() OVER (
                PARTITION BY individual_id
                ORDER BY recorded_at DESC, sample_id DESC
              ) AS rn
       FROM location_samples
     )
     WHERE rn = 1",
  )?;
  let rows = stmt
    .query_map([], |r| {
      Ok((r.get::<_, String>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  rows
    .into_iter()
    .map(|(id, lat, long)| Ok((decode_uuid(&id)?, GeoPoint::new(lat, long))))
    .collect()
}

pub fn latest_position(conn: &Connection, individual_id: Uuid) -> Result<Option<GeoPoint>> {
  let pos = conn
    .query_row(
      "SELECT lat, long FROM location_samples
       WHERE individual_id = ?1
       ORDER BY recorded_at DESC, sample_id DESC
       LIMIT 1",
      params![encode_uuid(individual_id)],
      |r| Ok(GeoPoint::new(r.get(0)?, r.get(1)?)),
    )
    .optional()?;
  Ok(pos)
}
