//! Outbound mail transports.
//!
//! - `smtp` - pooled, rate limited SMTP relay built on lettre
//! - `dry_run` - renders messages and logs them instead of sending
//! - `governor` - fixed-window rate limiter shared by the SMTP pool

pub mod dry_run;
pub mod governor;
pub mod smtp;

pub use dry_run::DryRunMailer;
pub use governor::RateGovernor;
pub use smtp::SmtpMailer;

use crate::config::SmtpConfig;
use crate::error::TransportError;
use crate::model::Priority;
use async_trait::async_trait;
use lettre::Message;
use lettre::message::header::{Header, HeaderName, HeaderValue};
use lettre::message::{Mailbox, SinglePart};
use std::sync::Arc;
use uuid::Uuid;

/// Body of an outgoing message; requests pick one with their `html` flag.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EmailBody {
    Html(String),
    Text(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingEmail {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: EmailBody,
    pub priority: Priority,
}

/// What the transport reports back for an accepted message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentEmail {
    /// The `Message-ID` the message was sent with.
    pub message_id: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &'static str;

    /// Sender address derived from the configured account.
    fn sender(&self) -> &str;

    async fn send(&self, email: OutgoingEmail) -> Result<SentEmail, TransportError>;
}

/// Build the mail transport for `config`.
///
/// A transport that fails to initialise is replaced by a [`DryRunMailer`] so
/// the service keeps accepting and recording requests.
#[tracing::instrument(skip_all)]
pub fn from_config(config: &SmtpConfig) -> Arc<dyn MailTransport> {
    if config.dry_run {
        tracing::warn!(
            name = "transport.from_config.dry_run",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            sender = %config.sender(),
            message = "smtp.dry_run is enabled; messages will not be sent"
        );
        return Arc::new(DryRunMailer::new(config.sender()));
    }
    match SmtpMailer::new(config) {
        Ok(mailer) => {
            tracing::info!(
                name = "transport.from_config.initialized",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                sender = %config.sender(),
                max_connections = config.max_connections,
                max_messages = config.max_messages,
                rate_limit = config.rate_limit,
                rate_window_ms = config.rate_window_ms,
                message = "Email transporter initialized"
            );
            Arc::new(mailer)
        }
        Err(e) => {
            tracing::error!(
                name = "transport.from_config.init_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                error = %e,
                message = "Failed to initialize SMTP transport, falling back to dry-run"
            );
            Arc::new(DryRunMailer::new(config.sender()))
        }
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, TransportError> {
    address
        .trim()
        .parse()
        .map_err(|e: lettre::address::AddressError| TransportError::InvalidAddress {
            address: address.to_string(),
            reason: e.to_string(),
        })
}

/// Build the lettre message for `email` and return it with its `Message-ID`.
pub fn build_message(email: &OutgoingEmail) -> Result<(Message, String), TransportError> {
    let from = parse_mailbox(&email.from)?;
    let to = parse_mailbox(&email.to)?;
    let message_id = format!("<{}@{}>", Uuid::new_v4(), from.email.domain());

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(email.subject.as_str())
        .message_id(Some(message_id.clone()));

    builder = match email.priority {
        Priority::High => builder
            .header(XPriority::from("1 (Highest)".to_string()))
            .header(Importance::from("High".to_string())),
        Priority::Low => builder
            .header(XPriority::from("5 (Lowest)".to_string()))
            .header(Importance::from("Low".to_string())),
        Priority::Normal => builder,
    };

    let part = match &email.body {
        EmailBody::Html(html) => SinglePart::html(html.clone()),
        EmailBody::Text(text) => SinglePart::plain(text.clone()),
    };
    let message = builder
        .singlepart(part)
        .map_err(|e| TransportError::Message(e.to_string()))?;
    Ok((message, message_id))
}

/// `X-Priority` header understood by most mail clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XPriority(String);

impl Header for XPriority {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("X-Priority")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn core::error::Error + Send + Sync>> {
        Ok(Self(s.into()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

impl From<String> for XPriority {
    fn from(content: String) -> Self {
        Self(content)
    }
}

/// `Importance` header (RFC 2156), the Outlook counterpart of `X-Priority`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Importance(String);

impl Header for Importance {
    fn name() -> HeaderName {
        HeaderName::new_from_ascii_str("Importance")
    }

    fn parse(s: &str) -> Result<Self, Box<dyn core::error::Error + Send + Sync>> {
        Ok(Self(s.into()))
    }

    fn display(&self) -> HeaderValue {
        HeaderValue::new(Self::name(), self.0.clone())
    }
}

impl From<String> for Importance {
    fn from(content: String) -> Self {
        Self(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(body: EmailBody, priority: Priority) -> OutgoingEmail {
        OutgoingEmail {
            from: "relay@example.com".into(),
            to: "a@b.com".into(),
            subject: "Hi".into(),
            body,
            priority,
        }
    }

    fn render(email: &OutgoingEmail) -> (String, String) {
        let (message, id) = build_message(email).unwrap();
        (String::from_utf8(message.formatted()).unwrap(), id)
    }

    #[test]
    fn plain_text_body_is_text_plain() {
        let (raw, _) = render(&email(EmailBody::Text("Body".into()), Priority::Normal));
        assert!(raw.contains("Content-Type: text/plain"));
        assert!(raw.contains("Subject: Hi"));
        assert!(!raw.contains("X-Priority"));
    }

    #[test]
    fn html_body_is_text_html() {
        let (raw, _) = render(&email(
            EmailBody::Html("<b>Body</b>".into()),
            Priority::Normal,
        ));
        assert!(raw.contains("Content-Type: text/html"));
    }

    #[test]
    fn message_id_uses_sender_domain_and_is_sent() {
        let (raw, id) = render(&email(EmailBody::Text("Body".into()), Priority::Normal));
        assert!(id.starts_with('<') && id.ends_with("@example.com>"));
        assert!(raw.contains(&id));
    }

    #[test]
    fn high_priority_sets_headers() {
        let (raw, _) = render(&email(EmailBody::Text("Body".into()), Priority::High));
        assert!(raw.contains("X-Priority: 1 (Highest)"));
        assert!(raw.contains("Importance: High"));
    }

    #[test]
    fn invalid_recipient_is_reported() {
        let mut bad = email(EmailBody::Text("Body".into()), Priority::Normal);
        bad.to = "not an address".into();
        assert!(matches!(
            build_message(&bad),
            Err(TransportError::InvalidAddress { address, .. }) if address == "not an address"
        ));
    }

    fn unreachable_smtp() -> SmtpConfig {
        SmtpConfig {
            service: "nowhere".into(),
            server: None,
            port: None,
            tls: None,
            username: "relay@example.com".into(),
            password: "secret".into(),
            from: None,
            max_connections: 5,
            max_messages: 100,
            rate_limit: 5,
            rate_window_ms: 1000,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn failed_initialisation_falls_back_to_dry_run() {
        let mailer = from_config(&unreachable_smtp());
        assert_eq!(mailer.name(), "dry-run");
        assert_eq!(mailer.sender(), "relay@example.com");

        let sent = mailer
            .send(email(EmailBody::Text("Body".into()), Priority::Normal))
            .await
            .unwrap();
        assert!(sent.message_id.starts_with('<'));
        assert!(sent.message_id.ends_with("@example.com>"));
    }
}
