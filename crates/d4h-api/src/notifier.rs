//! The server's [`Notifier`]: renders each notice as an outbound mail and
//! writes it to the log.

use d4h_core::notify::{Notice, Notifier};

/// Logs every notice as a mail from `from`.
#[derive(Debug, Clone)]
pub struct MailLog {
  from: String,
}

impl MailLog {
  pub fn new(from: impl Into<String>) -> Self { Self { from: from.into() } }
}

impl Notifier for MailLog {
  fn notify(&self, notice: Notice) {
    tracing::info!(
      target: "d4h::mail",
      from = %self.from,
      to = %notice.recipient,
      subject = %notice.subject,
      body = %notice.body,
      "mail sent"
    );
  }
}
