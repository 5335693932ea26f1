use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// How the SMTP connection is secured.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    /// TLS from the first byte (SMTPS, usually port 465).
    Implicit,
    /// Plain connection upgraded with STARTTLS (usually port 587).
    Starttls,
    /// No TLS at all. Only useful against local test relays.
    None,
}

/// Resolved SMTP host, port and TLS mode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmtpEndpoint {
    pub host: String,
    pub port: u16,
    pub tls: TlsMode,
}

/// Outbound mail account. `username`/`password` are secrets and are expected to
/// come from the environment (`SMTP__USERNAME`, `SMTP__PASSWORD`).
#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    /// Provider name such as `gmail`; ignored when `server` is set.
    #[serde(default = "default_service")]
    pub service: String,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub tls: Option<TlsMode>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Sender address. Defaults to `username`.
    #[serde(default)]
    pub from: Option<String>,
    /// Maximum simultaneous SMTP connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Messages sent over one connection before it is recycled.
    #[serde(default = "default_max_messages")]
    pub max_messages: u32,
    /// Messages allowed per `rate_window_ms`.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,
    /// Render and log messages instead of sending them.
    #[serde(default)]
    pub dry_run: bool,
}

impl fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("service", &self.service)
            .field("server", &self.server)
            .field("port", &self.port)
            .field("tls", &self.tls)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("from", &self.from)
            .field("max_connections", &self.max_connections)
            .field("max_messages", &self.max_messages)
            .field("rate_limit", &self.rate_limit)
            .field("rate_window_ms", &self.rate_window_ms)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl SmtpConfig {
    /// The address every outgoing message is sent from.
    pub fn sender(&self) -> &str {
        match self.from.as_deref() {
            Some(from) if !from.trim().is_empty() => from,
            _ if !self.username.is_empty() => &self.username,
            _ => "mail-relay@localhost",
        }
    }

    /// Resolve the configured server or well-known service to a concrete endpoint.
    pub fn endpoint(&self) -> Result<SmtpEndpoint, ConfigError> {
        let (host, default_port) = match self.server.as_deref() {
            Some(server) if !server.trim().is_empty() => (server.to_string(), 587),
            _ => {
                let (host, port) = well_known_service(&self.service).ok_or_else(|| {
                    ConfigError::Validation(format!(
                        "unknown smtp.service '{}' and no smtp.server configured",
                        self.service
                    ))
                })?;
                (host.to_string(), port)
            }
        };
        let port = self.port.unwrap_or(default_port);
        let tls = self.tls.unwrap_or(if port == 465 {
            TlsMode::Implicit
        } else {
            TlsMode::Starttls
        });
        Ok(SmtpEndpoint { host, port, tls })
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms)
    }
}

/// Host and port for provider names commonly used as `smtp.service`.
pub fn well_known_service(name: &str) -> Option<(&'static str, u16)> {
    let endpoint = match name.trim().to_ascii_lowercase().as_str() {
        "gmail" | "googlemail" => ("smtp.gmail.com", 465),
        "outlook" | "outlook365" | "hotmail" | "live" => ("smtp-mail.outlook.com", 587),
        "yahoo" => ("smtp.mail.yahoo.com", 465),
        "icloud" => ("smtp.mail.me.com", 587),
        "zoho" => ("smtp.zoho.com", 465),
        "sendgrid" => ("smtp.sendgrid.net", 587),
        "mailgun" => ("smtp.mailgun.org", 587),
        "ses" | "ses-us-east-1" => ("email-smtp.us-east-1.amazonaws.com", 587),
        _ => return None,
    };
    Some(endpoint)
}

/// Settings for the trigger watcher that picks up new request documents.
#[derive(Clone, Debug, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Maximum documents claimed per collection per poll.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Upper bound for one dispatch; the request stays `processing` when hit.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            batch_size: default_batch_size(),
            timeout_secs: default_dispatch_timeout_secs(),
        }
    }
}

impl DispatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings for the sweep that looks for requests stuck in `processing`.
#[derive(Clone, Debug, Deserialize)]
pub struct ReconcileConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_reconcile_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_stuck_after_secs")]
    pub stuck_after_secs: u64,
    /// Transition stuck requests to `failed` instead of only reporting them.
    #[serde(default)]
    pub mark_failed: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_reconcile_interval_secs(),
            stuck_after_secs: default_stuck_after_secs(),
            mark_failed: false,
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stuck_after(&self) -> Duration {
        Duration::from_secs(self.stuck_after_secs)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    /// A sea-orm connection URL, or `memory://` for the in-process store.
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub reconcile: ReconcileConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let smtp = &self.smtp;
        if smtp.max_connections == 0 {
            return Err(ConfigError::Validation(
                "smtp.max_connections must be > 0".into(),
            ));
        }
        if smtp.max_messages == 0 {
            return Err(ConfigError::Validation("smtp.max_messages must be > 0".into()));
        }
        if smtp.rate_limit == 0 || smtp.rate_window_ms == 0 {
            return Err(ConfigError::Validation(
                "smtp.rate_limit and smtp.rate_window_ms must be > 0".into(),
            ));
        }
        if smtp.port == Some(0) {
            return Err(ConfigError::Validation("smtp.port must be > 0".into()));
        }
        if !smtp.dry_run {
            if smtp.username.is_empty() {
                return Err(ConfigError::Validation(
                    "smtp.username must be set unless smtp.dry_run is enabled".into(),
                ));
            }
            smtp.endpoint()?;
        }
        if self.dispatcher.batch_size == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.batch_size must be > 0".into(),
            ));
        }
        if self.dispatcher.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "dispatcher.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.reconcile.enabled && self.reconcile.interval_secs == 0 {
            return Err(ConfigError::Validation(
                "reconcile.interval_secs must be > 0".into(),
            ));
        }
        // A request may only be failed by the sweep once its dispatch can no
        // longer be running.
        if self.reconcile.enabled
            && self.reconcile.mark_failed
            && self.reconcile.stuck_after_secs <= self.dispatcher.timeout_secs
        {
            return Err(ConfigError::Validation(format!(
                "reconcile.stuck_after_secs ({}) must exceed dispatcher.timeout_secs ({}) when reconcile.mark_failed is set",
                self.reconcile.stuck_after_secs, self.dispatcher.timeout_secs
            )));
        }
        Ok(())
    }
}

fn default_service() -> String {
    "gmail".to_string()
}

fn default_max_connections() -> usize {
    5
}

fn default_max_messages() -> u32 {
    100
}

fn default_rate_limit() -> u32 {
    5
}

fn default_rate_window_ms() -> u64 {
    1000
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_batch_size() -> u64 {
    50
}

fn default_dispatch_timeout_secs() -> u64 {
    60
}

fn default_true() -> bool {
    true
}

fn default_reconcile_interval_secs() -> u64 {
    300
}

fn default_stuck_after_secs() -> u64 {
    600
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `SMTP__PASSWORD`) overrides the file value. A `.env` file
/// in the working directory is loaded first when present.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let _ = dotenvy::dotenv();
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml"))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(service: &str) -> SmtpConfig {
        SmtpConfig {
            service: service.into(),
            server: None,
            port: None,
            tls: None,
            username: "relay@example.com".into(),
            password: "hunter2".into(),
            from: None,
            max_connections: 5,
            max_messages: 100,
            rate_limit: 5,
            rate_window_ms: 1000,
            dry_run: false,
        }
    }

    #[test]
    fn gmail_uses_implicit_tls() {
        let endpoint = smtp("gmail").endpoint().unwrap();
        assert_eq!(endpoint.host, "smtp.gmail.com");
        assert_eq!(endpoint.port, 465);
        assert_eq!(endpoint.tls, TlsMode::Implicit);
    }

    #[test]
    fn service_lookup_ignores_case() {
        let endpoint = smtp("SendGrid").endpoint().unwrap();
        assert_eq!(endpoint.host, "smtp.sendgrid.net");
        assert_eq!(endpoint.tls, TlsMode::Starttls);
    }

    #[test]
    fn explicit_server_wins_over_service() {
        let mut cfg = smtp("gmail");
        cfg.server = Some("mail.internal".into());
        cfg.port = Some(25);
        cfg.tls = Some(TlsMode::None);
        let endpoint = cfg.endpoint().unwrap();
        assert_eq!(
            endpoint,
            SmtpEndpoint {
                host: "mail.internal".into(),
                port: 25,
                tls: TlsMode::None
            }
        );
    }

    #[test]
    fn unknown_service_is_rejected() {
        assert!(matches!(
            smtp("carrier-pigeon").endpoint(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn sender_falls_back_to_username() {
        let mut cfg = smtp("gmail");
        assert_eq!(cfg.sender(), "relay@example.com");
        cfg.from = Some("Alerts <alerts@example.com>".into());
        assert_eq!(cfg.sender(), "Alerts <alerts@example.com>");
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", smtp("gmail"));
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
