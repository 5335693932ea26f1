use thiserror::Error;

/// Message recorded when a request lacks a recipient, subject or body.
pub const MISSING_REQUIRED_FIELDS: &str = "Missing required fields";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing required fields")]
    MissingRequiredFields { missing: Vec<&'static str> },
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Transport initialization failed: {0}")]
    Init(String),
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("Failed to build message: {0}")]
    Message(String),
    /// Failure reported by the SMTP relay, kept verbatim.
    #[error("{0}")]
    Smtp(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Invalid document {id}: {reason}")]
    InvalidDocument { id: String, reason: String },
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}
