//! Request intake endpoints.
//!
//! Writing the document is the whole submission. Nothing is validated here;
//! the dispatcher rejects incomplete requests when their trigger fires.

use super::delivery::EMAIL_TAG;
use crate::AppResources;
use crate::model::{NewEmailRequest, RequestProfile};
use axum::{Extension, Json, response::IntoResponse};
use hyper::StatusCode;
use serde::Serialize;
use serde_json::json;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedRequest {
    /// Document id, also the `emailId` to poll with.
    pub id: String,
    pub collection: String,
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/requests",
    operation_id = "Create Email Request",
    tag = EMAIL_TAG,
    summary = "Queue an email request",
    description = "Stores the body in `email_requests`. Dispatch happens asynchronously; \
                   poll `/api/email/delivery` with the returned id.\n\n\
                   `to`, `subject` and `message` are required at dispatch time. Unknown fields \
                   are kept as metadata. `confirm_path` redirects status records to another collection.",
    request_body = NewEmailRequest,
    responses(
        (status = 201, description = "Request stored", body = CreatedRequest),
        (status = 500, description = "Store failure")
    )
)]
pub async fn create_request(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<NewEmailRequest>,
) -> impl IntoResponse {
    intake(&resources, RequestProfile::Full, payload).await
}

#[tracing::instrument(skip(resources, payload))]
#[utoipa::path(
    post,
    path = "/direct-requests",
    operation_id = "Create Direct Email Request",
    tag = EMAIL_TAG,
    summary = "Queue a direct email request",
    description = "Stores the body in `email_direct_requests`. Only `to` and `message` are required; \
                   the subject defaults to `Direct Email`. No `processing` status is recorded.",
    request_body = NewEmailRequest,
    responses(
        (status = 201, description = "Request stored", body = CreatedRequest),
        (status = 500, description = "Store failure")
    )
)]
pub async fn create_direct_request(
    Extension(resources): Extension<AppResources>,
    Json(payload): Json<NewEmailRequest>,
) -> impl IntoResponse {
    intake(&resources, RequestProfile::Direct, payload).await
}

async fn intake(
    resources: &AppResources,
    profile: RequestProfile,
    payload: NewEmailRequest,
) -> axum::response::Response {
    match resources.store.create_request(profile, payload).await {
        Ok(request) => {
            tracing::info!(
                name = "api.requests.created",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %request.id,
                collection = profile.collection(),
                message = "Email request stored"
            );
            (
                StatusCode::CREATED,
                Json(CreatedRequest {
                    id: request.id,
                    collection: profile.collection().to_string(),
                }),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(
                name = "api.requests.create_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                collection = profile.collection(),
                error = %e,
                message = "Failed to store email request"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
