//! Outbound notices and the transport abstraction that delivers them.
//!
//! Delivery is fire-and-forget: the engine never observes whether a notice
//! arrived, and a failed delivery never fails the operation that caused it.

use std::collections::BTreeSet;

use uuid::Uuid;

/// A message for a single recipient address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
  pub recipient: String,
  pub subject:   String,
  pub body:      String,
}

impl Notice {
  /// Sent to the target of a newly created individual query.
  pub fn consent_request(recipient: &str) -> Self {
    Self {
      recipient: recipient.to_owned(),
      subject:   "Request to data".to_owned(),
      body:      "A new company has requested access to your data, open the app to \
                  accept or decline."
        .to_owned(),
    }
  }

  /// Sent to the issuer once the target authorizes an individual query.
  pub fn consent_granted(recipient: &str, query_id: Uuid, ssn: &str) -> Self {
    Self {
      recipient: recipient.to_owned(),
      subject:   "Data4Help, user confirmed one of your queries".to_owned(),
      body:      format!("User with SSN {ssn} has accepted your request {query_id}."),
    }
  }

  /// Sent to an issuer after an individual relevant to its queries uploaded
  /// new samples.
  pub fn new_data(
    recipient: &str,
    updated: &BTreeSet<Uuid>,
    new_matches: &BTreeSet<Uuid>,
  ) -> Self {
    let mut lines = Vec::new();
    if !updated.is_empty() {
      lines.push(format!("New data available for your queries: {}.", join(updated)));
    }
    if !new_matches.is_empty() {
      lines.push(format!("New individuals may now match your queries: {}.", join(new_matches)));
    }
    Self {
      recipient: recipient.to_owned(),
      subject:   "Data4Help, new data available".to_owned(),
      body:      lines.join("\n"),
    }
  }
}

fn join(ids: &BTreeSet<Uuid>) -> String {
  ids.iter().map(Uuid::to_string).collect::<Vec<_>>().join(", ")
}

/// A mail (or other side-channel) transport.
pub trait Notifier: Send + Sync {
  fn notify(&self, notice: Notice);
}
