// ── Field-dispatch email handoff ──
//
// Agent C composes deterministic dispatch emails; this module is the seam
// they leave through. The shipped transport is the logging dry-run — real
// SMTP lives outside this system.

use tracing::info;

/// A composed dispatch email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchEmail {
    pub subject: String,
    pub body: String,
}

pub trait Mailer: Send + Sync {
    fn send(&self, email: &DispatchEmail);
}

/// Logs the email instead of sending it.
pub struct DryRunMailer;

impl Mailer for DryRunMailer {
    fn send(&self, email: &DispatchEmail) {
        info!(subject = %email.subject, "dispatch email (dry-run)\n{}", email.body);
    }
}
