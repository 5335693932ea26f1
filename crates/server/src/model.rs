//! Documents exchanged between request writers, the dispatcher and the status query.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Collection receiving status records when a request does not override it.
pub const DEFAULT_STATUS_COLLECTION: &str = "email_delivery_status";

/// Subject used by direct requests that do not carry one.
pub const DIRECT_DEFAULT_SUBJECT: &str = "Direct Email";

/// Which request collection a document lives in, and therefore which
/// transition set the dispatcher applies to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestProfile {
    /// `email_requests`: validated, records `processing` before sending.
    Full,
    /// `email_direct_requests`: fire-and-forget, no `processing` record.
    Direct,
}

impl RequestProfile {
    pub const ALL: [RequestProfile; 2] = [RequestProfile::Full, RequestProfile::Direct];

    pub fn collection(self) -> &'static str {
        match self {
            RequestProfile::Full => "email_requests",
            RequestProfile::Direct => "email_direct_requests",
        }
    }

    pub fn from_collection(collection: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.collection() == collection)
    }

    /// Label reported by the status query when it falls back to the request itself.
    pub fn source_label(self) -> &'static str {
        match self {
            RequestProfile::Full => "email_request",
            RequestProfile::Direct => "direct_request",
        }
    }

    pub fn records_processing(self) -> bool {
        matches!(self, RequestProfile::Full)
    }

    pub fn default_subject(self) -> Option<&'static str> {
        match self {
            RequestProfile::Full => None,
            RequestProfile::Direct => Some(DIRECT_DEFAULT_SUBJECT),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Processing,
    Delivered,
    Failed,
}

impl DeliveryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryStatus::Processing => "processing",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, DeliveryStatus::Processing)
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(DeliveryStatus::Processing),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "failed" => Ok(DeliveryStatus::Failed),
            other => Err(format!("unknown delivery status '{other}'")),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Interpret a caller-supplied hint. Anything unrecognised is `Normal`.
    pub fn from_hint(hint: Option<&str>) -> Self {
        match hint.map(|h| h.trim().to_ascii_lowercase()).as_deref() {
            Some("high" | "urgent") => Priority::High,
            Some("low") => Priority::Low,
            _ => Priority::Normal,
        }
    }
}

/// One outbound email intent, as stored in a request collection.
#[derive(Clone, Debug, PartialEq)]
pub struct EmailRequest {
    pub id: String,
    pub profile: RequestProfile,
    pub to: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
    pub html: bool,
    /// Raw priority hint as written by the caller.
    pub priority: Option<String>,
    /// Caller-supplied correlation id, copied onto status records.
    pub request_id: Option<String>,
    pub confirm_path: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: OffsetDateTime,
    pub processing: bool,
    pub processing_start: Option<OffsetDateTime>,
    pub processed: bool,
    pub status: Option<String>,
    pub email_id: Option<String>,
    pub processed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
}

impl EmailRequest {
    /// The collection status records for this request are appended to.
    pub fn status_collection(&self) -> &str {
        match (self.profile, self.confirm_path.as_deref()) {
            (RequestProfile::Full, Some(path)) if !path.trim().is_empty() => path,
            _ => DEFAULT_STATUS_COLLECTION,
        }
    }

    /// The terminal status already recorded on the document, if any.
    pub fn terminal_status(&self) -> Option<DeliveryStatus> {
        self.status
            .as_deref()
            .and_then(|s| s.parse::<DeliveryStatus>().ok())
            .filter(|s| s.is_terminal())
    }
}

/// The shape writers submit. Every field is optional: validation is deferred
/// to dispatch, and unknown fields are preserved as metadata.
///
/// Any JSON object is accepted. Numbers and booleans given for text fields are
/// kept as text, `html` follows JSON truthiness, and a field holding an array
/// or object is left in `extra` instead.
#[derive(Clone, Debug, Default, Serialize, ToSchema)]
pub struct NewEmailRequest {
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub html: bool,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default, rename = "requestId")]
    pub request_id: Option<String>,
    #[serde(default)]
    pub confirm_path: Option<String>,
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub extra: Map<String, Value>,
}

fn take_text(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    let text = match fields.get(key)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => {
            fields.remove(key);
            return None;
        }
        Value::Array(_) | Value::Object(_) => return None,
    };
    fields.remove(key);
    Some(text)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl<'de> Deserialize<'de> for NewEmailRequest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut fields = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self {
            to: take_text(&mut fields, "to"),
            subject: take_text(&mut fields, "subject"),
            message: take_text(&mut fields, "message"),
            html: fields.remove("html").is_some_and(|v| truthy(&v)),
            priority: take_text(&mut fields, "priority"),
            request_id: take_text(&mut fields, "requestId"),
            confirm_path: take_text(&mut fields, "confirm_path"),
            extra: fields,
        })
    }
}

/// Fields the dispatcher writes back onto a request document. `None` leaves the
/// stored value untouched.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestUpdate {
    pub status: Option<DeliveryStatus>,
    pub processing: Option<bool>,
    pub processing_start: Option<OffsetDateTime>,
    pub processed: Option<bool>,
    pub email_id: Option<String>,
    pub processed_at: Option<OffsetDateTime>,
    pub error: Option<String>,
}

impl RequestUpdate {
    pub fn processing(now: OffsetDateTime) -> Self {
        Self {
            status: Some(DeliveryStatus::Processing),
            processing: Some(true),
            processing_start: Some(now),
            ..Default::default()
        }
    }

    pub fn delivered(message_id: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            status: Some(DeliveryStatus::Delivered),
            processed: Some(true),
            email_id: Some(message_id.into()),
            processed_at: Some(now),
            ..Default::default()
        }
    }

    pub fn failed(error: impl Into<String>, now: OffsetDateTime) -> Self {
        Self {
            status: Some(DeliveryStatus::Failed),
            error: Some(error.into()),
            processed_at: Some(now),
            ..Default::default()
        }
    }
}

/// Append-only audit entry for one transition of one request.
#[derive(Clone, Debug, PartialEq)]
pub struct DeliveryStatusRecord {
    pub id: i64,
    pub collection: String,
    pub email_id: String,
    pub request_id: Option<String>,
    pub delivered: bool,
    pub status: String,
    pub details: Option<Value>,
    pub timestamp: OffsetDateTime,
}

/// A status record before the store assigns its id and timestamp.
#[derive(Clone, Debug, PartialEq)]
pub struct NewStatusRecord {
    pub collection: String,
    pub email_id: String,
    pub request_id: Option<String>,
    pub status: DeliveryStatus,
    pub details: Value,
}

impl NewStatusRecord {
    pub fn for_request(request: &EmailRequest, status: DeliveryStatus, details: Value) -> Self {
        Self {
            collection: request.status_collection().to_string(),
            email_id: request.id.clone(),
            request_id: request.request_id.clone(),
            status,
            details,
        }
    }

    pub fn delivered(&self) -> bool {
        self.status == DeliveryStatus::Delivered
    }
}
