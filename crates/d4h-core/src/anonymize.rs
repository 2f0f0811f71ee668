//! Shapes a performed query's cohort into the response returned to the
//! issuer.
//!
//! Identity is attached only to consent-protected results, which always
//! hold exactly the one authorizing individual. Anonymity-protected cohorts
//! are merged into a single per-stream aggregate with no trace of who
//! contributed which sample, even when the cohort happens to be one person.

use uuid::Uuid;

use crate::{
  cohort::{CohortData, PrivacyPolicy},
  query::QueryResult,
  sample::SampleSet,
};

pub fn anonymize(query_id: Uuid, policy: PrivacyPolicy, cohort: CohortData) -> QueryResult {
  let cohort_size = cohort.len();
  let individual_id = match (policy, cohort_size) {
    (PrivacyPolicy::Consent, 1) => cohort.keys().next().copied(),
    _ => None,
  };

  let mut data = SampleSet::default();
  for (_, samples) in cohort {
    data.extend(samples);
  }
  data.sort_by_time();

  QueryResult { query_id, cohort_size, individual_id, data }
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::sample::HeartRateSample;

  fn hr(secs: i64, bpm: f64) -> SampleSet {
    SampleSet {
      heart_rate: vec![HeartRateSample { timestamp: Utc.timestamp_opt(secs, 0).unwrap(), bpm }],
      ..Default::default()
    }
  }

  #[test]
  fn single_member_cohort_is_identified() {
    let a = Uuid::new_v4();
    let cohort = CohortData::from([(a, hr(0, 70.0))]);
    let result = anonymize(Uuid::new_v4(), PrivacyPolicy::Consent, cohort);
    assert_eq!(result.individual_id, Some(a));
    assert_eq!(result.cohort_size, 1);
  }

  #[test]
  fn larger_cohorts_are_merged_anonymously() {
    let cohort = CohortData::from([
      (Uuid::new_v4(), hr(20, 80.0)),
      (Uuid::new_v4(), hr(10, 60.0)),
    ]);
    let result = anonymize(Uuid::new_v4(), PrivacyPolicy::Anonymity, cohort);
    assert_eq!(result.individual_id, None);
    assert_eq!(result.cohort_size, 2);
    let bpms: Vec<f64> = result.data.heart_rate.iter().map(|s| s.bpm).collect();
    assert_eq!(bpms, vec![60.0, 80.0]);
  }

  #[test]
  fn lone_member_of_anonymous_cohort_stays_anonymous() {
    let cohort = CohortData::from([(Uuid::new_v4(), hr(0, 70.0))]);
    let result = anonymize(Uuid::new_v4(), PrivacyPolicy::Anonymity, cohort);
    assert_eq!(result.individual_id, None);
    assert_eq!(result.cohort_size, 1);
  }

  #[test]
  fn empty_cohort_has_no_identity() {
    let result = anonymize(Uuid::new_v4(), PrivacyPolicy::Anonymity, CohortData::new());
    assert_eq!(result.individual_id, None);
    assert!(result.data.is_empty());
  }
}
