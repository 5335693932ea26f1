use super::{MailTransport, OutgoingEmail, SentEmail, build_message};
use crate::error::TransportError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Transport that renders each message and logs it without contacting any
/// relay. Used when `smtp.dry_run` is set or the SMTP transport cannot be
/// initialised.
#[derive(Debug)]
pub struct DryRunMailer {
    sender: String,
    rendered: AtomicU64,
}

impl DryRunMailer {
    pub fn new(sender: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            rendered: AtomicU64::new(0),
        }
    }

    /// Number of messages rendered so far.
    pub fn rendered(&self) -> u64 {
        self.rendered.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MailTransport for DryRunMailer {
    fn name(&self) -> &'static str {
        "dry-run"
    }

    fn sender(&self) -> &str {
        &self.sender
    }

    async fn send(&self, email: OutgoingEmail) -> Result<SentEmail, TransportError> {
        let (message, message_id) = build_message(&email)?;
        let raw = message.formatted();
        self.rendered.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            name = "transport.dry_run.rendered",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            to = %email.to,
            message_id = %message_id,
            bytes = raw.len(),
            message = "Dry-run transport rendered message without sending"
        );
        tracing::debug!(raw = %String::from_utf8_lossy(&raw), "dry-run message");
        Ok(SentEmail { message_id })
    }
}
