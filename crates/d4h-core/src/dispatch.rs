//! Decides which issuers to tell about newly ingested samples.
//!
//! Two sources are merged per ingestion: queries the individual is already a
//! member of (updated data), and open radius queries whose window now
//! contains the individual's latest position (a possible new match).
//! Recipients are de-duplicated by issuer id, so each issuer receives at most
//! one notice per ingestion. Nothing here touches cohort membership.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{cohort::GeoPoint, notify::Notice, query::RadiusQuery};

/// An issuer's interest in one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
  pub query_id:     Uuid,
  pub issuer_id:    Uuid,
  pub issuer_email: String,
}

/// The merged notification for one issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionNotice {
  pub issuer_id:    Uuid,
  pub issuer_email: String,
  pub updated:      BTreeSet<Uuid>,
  pub new_matches:  BTreeSet<Uuid>,
}

impl IngestionNotice {
  pub fn to_notice(&self) -> Notice {
    Notice::new_data(&self.issuer_email, &self.updated, &self.new_matches)
  }
}

/// Open radius queries whose window contains `position`.
pub fn in_range(
  position: &GeoPoint,
  open_queries: impl IntoIterator<Item = (Subscription, RadiusQuery)>,
) -> Vec<Subscription> {
  open_queries
    .into_iter()
    .filter(|(_, q)| q.contains(position))
    .map(|(sub, _)| sub)
    .collect()
}

/// Merge both sources into one notice per issuer. A query that appears in
/// both is reported once, as updated.
pub fn merge(
  members: impl IntoIterator<Item = Subscription>,
  in_range: impl IntoIterator<Item = Subscription>,
) -> Vec<IngestionNotice> {
  let mut by_issuer: BTreeMap<Uuid, IngestionNotice> = BTreeMap::new();

  for sub in members {
    entry(&mut by_issuer, &sub).updated.insert(sub.query_id);
  }
  for sub in in_range {
    let notice = entry(&mut by_issuer, &sub);
    if !notice.updated.contains(&sub.query_id) {
      notice.new_matches.insert(sub.query_id);
    }
  }

  by_issuer.into_values().collect()
}

fn entry<'a>(
  by_issuer: &'a mut BTreeMap<Uuid, IngestionNotice>,
  sub: &Subscription,
) -> &'a mut IngestionNotice {
  by_issuer.entry(sub.issuer_id).or_insert_with(|| IngestionNotice {
    issuer_id:    sub.issuer_id,
    issuer_email: sub.issuer_email.clone(),
    updated:      BTreeSet::new(),
    new_matches:  BTreeSet::new(),
  })
}
