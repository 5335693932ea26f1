//! Single-attempt dispatch of one request and recording of its transitions.

use crate::error::ValidationError;
use crate::model::{
    DeliveryStatus, EmailRequest, NewStatusRecord, Priority, RequestUpdate,
};
use crate::store::DocumentStore;
use crate::transport::{EmailBody, MailTransport, OutgoingEmail};
use serde_json::{Value, json};
use std::sync::Arc;
use time::OffsetDateTime;

/// How a dispatch ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { message_id: String },
    Failed { error: String },
    /// The document already carried a terminal status; nothing was sent.
    Skipped { status: DeliveryStatus },
}

/// Required fields of a request that passed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ValidatedRequest<'a> {
    pub to: &'a str,
    pub subject: &'a str,
    pub message: &'a str,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Check that recipient, subject and body are present and non-blank. Direct
/// requests fall back to a default subject.
pub fn validate(request: &EmailRequest) -> Result<ValidatedRequest<'_>, ValidationError> {
    let to = present(request.to.as_deref());
    let subject = present(request.subject.as_deref()).or(request.profile.default_subject());
    let message = present(request.message.as_deref());

    match (to, subject, message) {
        (Some(to), Some(subject), Some(message)) => Ok(ValidatedRequest {
            to,
            subject,
            message,
        }),
        _ => {
            let missing = [("to", to), ("subject", subject), ("message", message)]
                .into_iter()
                .filter_map(|(field, value)| value.is_none().then_some(field))
                .collect();
            Err(ValidationError::MissingRequiredFields { missing })
        }
    }
}

/// Runs the `received -> [processing] -> delivered | failed` state machine for
/// one request at a time. Holds no per-request state, so one instance serves
/// every concurrent dispatch.
pub struct Dispatcher {
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn MailTransport>,
}

impl Dispatcher {
    pub fn new(store: Arc<dyn DocumentStore>, mailer: Arc<dyn MailTransport>) -> Self {
        Self { store, mailer }
    }

    /// Dispatch `request` once. Never retries; every error ends in `failed`.
    #[tracing::instrument(skip(self, request), fields(email_id = %request.id, profile = ?request.profile))]
    pub async fn dispatch(&self, request: &EmailRequest) -> DispatchOutcome {
        if let Some(status) = request.terminal_status() {
            tracing::warn!(
                name = "dispatch.skip_terminal",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %request.id,
                status = %status,
                message = "Request already has a terminal status, not dispatching again"
            );
            return DispatchOutcome::Skipped { status };
        }

        let validated = match validate(request) {
            Ok(validated) => validated,
            Err(e) => {
                let ValidationError::MissingRequiredFields { missing } = &e;
                tracing::warn!(
                    name = "dispatch.validation_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email_id = %request.id,
                    missing = ?missing,
                    message = "Rejecting request with missing required fields"
                );
                let error = e.to_string();
                self.transition(
                    request,
                    RequestUpdate::failed(error.clone(), OffsetDateTime::now_utc()),
                    DeliveryStatus::Failed,
                    Value::String(error.clone()),
                )
                .await;
                return DispatchOutcome::Failed { error };
            }
        };

        let sender = self.mailer.sender().to_string();
        if request.profile.records_processing() {
            self.transition(
                request,
                RequestUpdate::processing(OffsetDateTime::now_utc()),
                DeliveryStatus::Processing,
                json!({ "from": sender }),
            )
            .await;
        }

        let body = if request.html {
            EmailBody::Html(validated.message.to_string())
        } else {
            EmailBody::Text(validated.message.to_string())
        };
        let email = OutgoingEmail {
            from: sender,
            to: validated.to.to_string(),
            subject: validated.subject.to_string(),
            body,
            priority: Priority::from_hint(request.priority.as_deref()),
        };

        match self.mailer.send(email).await {
            Ok(sent) => {
                tracing::info!(
                    name = "dispatch.delivered",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email_id = %request.id,
                    message_id = %sent.message_id,
                    transport = self.mailer.name(),
                    message = "Email handed to transport"
                );
                self.transition(
                    request,
                    RequestUpdate::delivered(sent.message_id.clone(), OffsetDateTime::now_utc()),
                    DeliveryStatus::Delivered,
                    json!({ "messageId": sent.message_id }),
                )
                .await;
                DispatchOutcome::Delivered {
                    message_id: sent.message_id,
                }
            }
            Err(e) => {
                let error = e.to_string();
                tracing::error!(
                    name = "dispatch.send_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email_id = %request.id,
                    error = %error,
                    transport = self.mailer.name(),
                    message = "Failed to send email"
                );
                self.transition(
                    request,
                    RequestUpdate::failed(error.clone(), OffsetDateTime::now_utc()),
                    DeliveryStatus::Failed,
                    json!({ "error": error }),
                )
                .await;
                DispatchOutcome::Failed { error }
            }
        }
    }

    /// Move a request that never finished to `failed` with `reason`. The
    /// document is only changed while it is still unfinished, and the status
    /// record is only appended when it was. Returns whether it was failed.
    #[tracing::instrument(skip(self, request), fields(email_id = %request.id))]
    pub async fn fail_stuck(&self, request: &EmailRequest, reason: &str) -> bool {
        let update = RequestUpdate::failed(reason, OffsetDateTime::now_utc());
        match self.store.update_unfinished_request(&request.id, &update).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!(
                    name = "dispatch.stuck_request_finished",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email_id = %request.id,
                    message = "Request finished before it could be failed"
                );
                return false;
            }
            Err(e) => {
                tracing::error!(
                    name = "dispatch.request_update_failed",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    email_id = %request.id,
                    status = %DeliveryStatus::Failed,
                    error = %e,
                    message = "Failed to update request document"
                );
                return false;
            }
        }

        let record =
            NewStatusRecord::for_request(request, DeliveryStatus::Failed, json!({ "error": reason }));
        if let Err(e) = self.store.append_status(record).await {
            tracing::error!(
                name = "dispatch.status_append_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %request.id,
                status = %DeliveryStatus::Failed,
                error = %e,
                message = "Failed to append delivery status record"
            );
        }
        true
    }

    /// Write the request document first, then append the status record.
    /// Store failures are logged; they never change the dispatch outcome.
    async fn transition(
        &self,
        request: &EmailRequest,
        update: RequestUpdate,
        status: DeliveryStatus,
        details: Value,
    ) {
        if let Err(e) = self.store.update_request(&request.id, &update).await {
            tracing::error!(
                name = "dispatch.request_update_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %request.id,
                status = %status,
                error = %e,
                message = "Failed to update request document"
            );
        }

        let record = NewStatusRecord::for_request(request, status, details);
        if let Err(e) = self.store.append_status(record).await {
            tracing::error!(
                name = "dispatch.status_append_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %request.id,
                status = %status,
                error = %e,
                message = "Failed to append delivery status record"
            );
        }
    }
}
