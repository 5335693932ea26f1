//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use mail_relay::AppResources;
use mail_relay::config::{AppConfig, DispatcherConfig, ReconcileConfig, SmtpConfig};
use mail_relay::error::{StoreError, TransportError};
use mail_relay::model::{
    DeliveryStatusRecord, EmailRequest, NewEmailRequest, NewStatusRecord, RequestProfile,
    RequestUpdate,
};
use mail_relay::store::{DocumentStore, MemoryStore, SeaOrmStore};
use mail_relay::transport::{MailTransport, OutgoingEmail, SentEmail};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, DbBackend, Statement};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use time::OffsetDateTime;

pub const SENDER: &str = "relay@example.com";

/// Transport that answers from a script instead of talking SMTP. Sends past
/// the end of the script succeed with a generated message id.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<(), String>>>,
    sent: Mutex<Vec<OutgoingEmail>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails with `error`, reported verbatim.
    pub fn failing(error: &str) -> Self {
        let transport = Self::default();
        transport
            .script
            .lock()
            .unwrap()
            .extend(std::iter::repeat_n(Err(error.to_string()), 64));
        transport
    }

    /// Every send waits `delay` before answering.
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl MailTransport for ScriptedTransport {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn sender(&self) -> &str {
        SENDER
    }

    async fn send(&self, email: OutgoingEmail) -> Result<SentEmail, TransportError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let step = self.script.lock().unwrap().pop_front().unwrap_or(Ok(()));
        let n = {
            let mut sent = self.sent.lock().unwrap();
            sent.push(email);
            sent.len()
        };
        match step {
            Ok(()) => Ok(SentEmail {
                message_id: format!("<scripted-{n}@example.com>"),
            }),
            Err(e) => Err(TransportError::Smtp(e)),
        }
    }
}

/// Store whose every call fails, for the 500 paths.
pub struct BrokenStore;

fn broken() -> StoreError {
    StoreError::Unavailable("database offline".into())
}

#[async_trait]
impl DocumentStore for BrokenStore {
    async fn create_request(
        &self,
        _profile: RequestProfile,
        _request: NewEmailRequest,
    ) -> Result<EmailRequest, StoreError> {
        Err(broken())
    }

    async fn get_request(
        &self,
        _profile: RequestProfile,
        _id: &str,
    ) -> Result<Option<EmailRequest>, StoreError> {
        Err(broken())
    }

    async fn claim_new_requests(
        &self,
        _profile: RequestProfile,
        _limit: u64,
    ) -> Result<Vec<EmailRequest>, StoreError> {
        Err(broken())
    }

    async fn update_request(&self, _id: &str, _update: &RequestUpdate) -> Result<(), StoreError> {
        Err(broken())
    }

    async fn update_unfinished_request(
        &self,
        _id: &str,
        _update: &RequestUpdate,
    ) -> Result<bool, StoreError> {
        Err(broken())
    }

    async fn append_status(
        &self,
        _record: NewStatusRecord,
    ) -> Result<DeliveryStatusRecord, StoreError> {
        Err(broken())
    }

    async fn latest_status(
        &self,
        _collection: &str,
        _email_id: &str,
    ) -> Result<Option<DeliveryStatusRecord>, StoreError> {
        Err(broken())
    }

    async fn stuck_requests(
        &self,
        _started_before: OffsetDateTime,
    ) -> Result<Vec<EmailRequest>, StoreError> {
        Err(broken())
    }
}

pub fn smtp_config() -> SmtpConfig {
    SmtpConfig {
        service: "gmail".into(),
        server: None,
        port: None,
        tls: None,
        username: SENDER.into(),
        password: "super-secret-app-password".into(),
        from: None,
        max_connections: 5,
        max_messages: 100,
        rate_limit: 5,
        rate_window_ms: 1000,
        dry_run: true,
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        smtp: smtp_config(),
        dispatcher: DispatcherConfig::default(),
        reconcile: ReconcileConfig::default(),
    }
}

pub fn resources(store: Arc<dyn DocumentStore>, mailer: Arc<dyn MailTransport>) -> AppResources {
    AppResources {
        store,
        mailer,
        config: Arc::new(test_config()),
    }
}

pub fn memory_resources() -> (Arc<MemoryStore>, Arc<ScriptedTransport>, AppResources) {
    let store = Arc::new(MemoryStore::new());
    let mailer = Arc::new(ScriptedTransport::new());
    let resources = resources(store.clone(), mailer.clone());
    (store, mailer, resources)
}

/// A request body with the three required fields set.
pub fn valid_request() -> NewEmailRequest {
    NewEmailRequest {
        to: Some("a@b.com".into()),
        subject: Some("Hi".into()),
        message: Some("Body".into()),
        ..Default::default()
    }
}

/// Fresh SQLite database with the relay's tables.
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE email_requests (
            id TEXT PRIMARY KEY NOT NULL,
            collection TEXT NOT NULL,
            recipient TEXT NULL,
            subject TEXT NULL,
            message TEXT NULL,
            html BOOLEAN NOT NULL DEFAULT 0,
            priority TEXT NULL,
            request_id TEXT NULL,
            confirm_path TEXT NULL,
            metadata TEXT NULL,
            created_at TEXT NOT NULL,
            claimed_at TEXT NULL,
            processing BOOLEAN NOT NULL DEFAULT 0,
            processing_start TEXT NULL,
            processed BOOLEAN NOT NULL DEFAULT 0,
            status TEXT NULL,
            email_id TEXT NULL,
            processed_at TEXT NULL,
            error TEXT NULL
        );"#,
    ))
    .await
    .expect("create email_requests table");

    db.execute(Statement::from_string(
        DbBackend::Sqlite,
        r#"CREATE TABLE email_delivery_status (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL,
            email_id TEXT NOT NULL,
            request_id TEXT NULL,
            delivered BOOLEAN NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            details TEXT NULL,
            timestamp TEXT NOT NULL
        );"#,
    ))
    .await
    .expect("create email_delivery_status table");

    db
}

pub async fn sqlite_store() -> SeaOrmStore {
    SeaOrmStore::new(Arc::new(create_test_db().await))
}
