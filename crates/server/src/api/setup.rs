//! Configuration instructions for operators.

use super::delivery::EMAIL_TAG;
use crate::AppResources;
use axum::{Extension, Json};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct SetupInstructions {
    pub success: bool,
    pub message: String,
    /// Active transport: `smtp` or `dry-run`.
    pub transport: String,
    pub sender: String,
    pub service: String,
    pub instructions: Vec<String>,
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/setup",
    operation_id = "Email Setup Instructions",
    tag = EMAIL_TAG,
    summary = "How to configure the outbound account",
    description = "Lists the settings the relay reads its SMTP account from. \
                   Credentials are never returned and are never accepted as request parameters.",
    responses(
        (status = 200, description = "Setup instructions", body = SetupInstructions)
    )
)]
pub async fn setup_instructions(
    Extension(resources): Extension<AppResources>,
) -> Json<SetupInstructions> {
    let smtp = &resources.config.smtp;
    Json(SetupInstructions {
        success: true,
        message: "Email configuration setup instructions:".to_string(),
        transport: resources.mailer.name().to_string(),
        sender: resources.mailer.sender().to_string(),
        service: smtp.service.clone(),
        instructions: vec![
            "Set the outbound account in config.yaml under `smtp`, or through the environment:"
                .to_string(),
            "SMTP__USERNAME=your-email@domain.com".to_string(),
            "SMTP__PASSWORD=your-app-password".to_string(),
            "SMTP__SERVICE=gmail".to_string(),
            "Use SMTP__SERVER and SMTP__PORT for providers without a well-known service name."
                .to_string(),
            "Restart the service to apply the new account.".to_string(),
            String::new(),
            "Note: Never pass credentials via URL parameters for security reasons.".to_string(),
        ],
    })
}
