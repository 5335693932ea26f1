use super::{MailTransport, OutgoingEmail, RateGovernor, SentEmail, build_message};
use crate::config::{SmtpConfig, SmtpEndpoint, TlsMode};
use crate::error::TransportError;
use async_trait::async_trait;
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use tokio::sync::{Mutex, Semaphore};

/// One SMTP connection and the number of messages it has carried.
struct PooledConnection {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    sent: u32,
}

/// SMTP relay with bounded concurrency and throughput.
///
/// At most `max_connections` messages are in flight, each connection carries
/// at most `max_messages` messages before it is replaced, and no more than
/// `rate_limit` messages start per rate window. Sends over any bound wait.
pub struct SmtpMailer {
    endpoint: SmtpEndpoint,
    credentials: Credentials,
    sender: String,
    max_messages: u32,
    permits: Semaphore,
    idle: Mutex<Vec<PooledConnection>>,
    governor: RateGovernor,
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("endpoint", &self.endpoint)
            .field("sender", &self.sender)
            .field("max_messages", &self.max_messages)
            .field("available_permits", &self.permits.available_permits())
            .finish()
    }
}

fn connect(
    endpoint: &SmtpEndpoint,
    credentials: &Credentials,
) -> Result<PooledConnection, TransportError> {
    let host = endpoint.host.as_str();
    let builder = match endpoint.tls {
        TlsMode::Implicit => AsyncSmtpTransport::<Tokio1Executor>::relay(host)
            .map_err(|e| TransportError::Init(format!("SMTP relay error: {e}")))?,
        TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| TransportError::Init(format!("SMTP STARTTLS relay error: {e}")))?,
        TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
    };
    // One connection per pooled transport; the semaphore bounds how many exist.
    let transport = builder
        .port(endpoint.port)
        .credentials(credentials.clone())
        .pool_config(PoolConfig::new().max_size(1))
        .build();
    Ok(PooledConnection { transport, sent: 0 })
}

impl SmtpMailer {
    /// Build the pool. The first connection's transport is created eagerly so
    /// a bad host or TLS setup surfaces here rather than on the first send.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let endpoint = config
            .endpoint()
            .map_err(|e| TransportError::Init(e.to_string()))?;
        let credentials = Credentials::new(config.username.clone(), config.password.clone());
        let first = connect(&endpoint, &credentials)?;
        let mut idle = Vec::with_capacity(config.max_connections);
        idle.push(first);
        Ok(Self {
            endpoint,
            credentials,
            sender: config.sender().to_string(),
            max_messages: config.max_messages.max(1),
            permits: Semaphore::new(config.max_connections.max(1)),
            idle: Mutex::new(idle),
            governor: RateGovernor::new(config.rate_limit, config.rate_window()),
        })
    }

    fn open(&self) -> Result<PooledConnection, TransportError> {
        connect(&self.endpoint, &self.credentials)
    }

    async fn checkout(&self) -> Result<PooledConnection, TransportError> {
        let pooled = self.idle.lock().await.pop();
        match pooled {
            Some(conn) if conn.sent < self.max_messages => Ok(conn),
            Some(conn) => {
                tracing::debug!(
                    name = "transport.smtp.recycle",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    sent = conn.sent,
                    message = "Connection reached max_messages, opening a new one"
                );
                self.open()
            }
            None => self.open(),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    fn name(&self) -> &'static str {
        "smtp"
    }

    fn sender(&self) -> &str {
        &self.sender
    }

    #[tracing::instrument(skip(self, email), fields(host = %self.endpoint.host))]
    async fn send(&self, email: OutgoingEmail) -> Result<SentEmail, TransportError> {
        let (message, message_id) = build_message(&email)?;

        self.governor.acquire().await;
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| TransportError::Smtp(format!("connection pool closed: {e}")))?;
        let mut conn = self.checkout().await?;

        match conn.transport.send(message).await {
            Ok(response) => {
                conn.sent += 1;
                tracing::debug!(
                    name = "transport.smtp.sent",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    code = %response.code(),
                    message_id = %message_id,
                    message = "SMTP relay accepted message"
                );
                self.idle.lock().await.push(conn);
                Ok(SentEmail { message_id })
            }
            Err(e) => {
                // The connection is dropped; the next send opens a fresh one.
                tracing::error!(
                    name = "transport.smtp.send_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    error = %e,
                    transient = e.is_transient(),
                    permanent = e.is_permanent(),
                    message = "SMTP send failed"
                );
                Err(TransportError::Smtp(e.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SmtpConfig {
        SmtpConfig {
            service: "gmail".into(),
            server: Some("localhost".into()),
            port: Some(2525),
            tls: Some(TlsMode::None),
            username: "relay@example.com".into(),
            password: "secret".into(),
            from: None,
            max_connections: 2,
            max_messages: 3,
            rate_limit: 5,
            rate_window_ms: 1000,
            dry_run: false,
        }
    }

    #[tokio::test]
    async fn new_opens_one_idle_connection() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        assert_eq!(mailer.idle.lock().await.len(), 1);
        assert_eq!(mailer.permits.available_permits(), 2);
        assert_eq!(mailer.sender(), "relay@example.com");
        assert_eq!(mailer.name(), "smtp");
    }

    #[tokio::test]
    async fn exhausted_connections_are_replaced() {
        let mailer = SmtpMailer::new(&config()).unwrap();
        let mut conn = mailer.checkout().await.unwrap();
        conn.sent = 3;
        mailer.idle.lock().await.push(conn);
        let fresh = mailer.checkout().await.unwrap();
        assert_eq!(fresh.sent, 0);
        assert!(mailer.idle.lock().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_service_fails_initialisation() {
        let mut cfg = config();
        cfg.server = None;
        cfg.service = "nowhere".into();
        assert!(matches!(
            SmtpMailer::new(&cfg),
            Err(TransportError::Init(_))
        ));
    }
}
