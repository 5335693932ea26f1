//! OpenAPI/Utoipa configuration.

use crate::api::{delivery::EMAIL_TAG, health::MISC_TAG};
use utoipa::OpenApi;

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mail Relay API",
        version = "1.0.0",
        description = "Queue transactional email and poll its delivery status."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = EMAIL_TAG, description = "Email intake and delivery status endpoints")
    )
)]
pub struct ApiDoc;
