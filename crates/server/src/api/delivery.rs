//! Delivery status polling endpoint.

use crate::AppResources;
use crate::query::{DeliveryStatusResponse, lookup_delivery};
use axum::{Extension, Json, extract::Query, response::IntoResponse};
use hyper::StatusCode;
use serde::Deserialize;
use serde_json::json;
use utoipa::IntoParams;

/// Tag for OpenAPI documentation.
pub const EMAIL_TAG: &str = "Email API";

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeliveryParams {
    /// Id of the request document to look up.
    #[serde(rename = "emailId")]
    pub email_id: Option<String>,
}

#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/delivery",
    operation_id = "Check Email Delivery",
    tag = EMAIL_TAG,
    summary = "Best-known delivery status of a request",
    description = "Looks the id up in the delivery status log first (most recent record wins), \
                   then in the full and direct request collections.\n\n\
                   An unknown id is not an error: the response is `{\"found\": false}`.",
    params(DeliveryParams),
    responses(
        (status = 200, description = "Lookup result", body = DeliveryStatusResponse),
        (status = 400, description = "emailId missing or empty", example = json!({"error": "Missing emailId parameter"})),
        (status = 500, description = "Store failure", example = json!({"error": "Database error: connection refused"}))
    )
)]
pub async fn delivery_status(
    Extension(resources): Extension<AppResources>,
    Query(params): Query<DeliveryParams>,
) -> impl IntoResponse {
    respond(&resources, params).await
}

/// Same lookup at the path existing pollers already call.
#[tracing::instrument(skip(resources))]
#[utoipa::path(
    get,
    path = "/checkEmailDelivery",
    operation_id = "Check Email Delivery (legacy path)",
    tag = EMAIL_TAG,
    summary = "Alias of /api/email/delivery",
    params(DeliveryParams),
    responses(
        (status = 200, description = "Lookup result", body = DeliveryStatusResponse),
        (status = 400, description = "emailId missing or empty"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn check_email_delivery(
    Extension(resources): Extension<AppResources>,
    Query(params): Query<DeliveryParams>,
) -> impl IntoResponse {
    respond(&resources, params).await
}

async fn respond(resources: &AppResources, params: DeliveryParams) -> axum::response::Response {
    let Some(email_id) = params.email_id.filter(|id| !id.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Missing emailId parameter" })),
        )
            .into_response();
    };

    match lookup_delivery(resources.store.as_ref(), &email_id).await {
        Ok(lookup) => (StatusCode::OK, Json(DeliveryStatusResponse::from(lookup))).into_response(),
        Err(e) => {
            tracing::error!(
                name = "api.delivery.lookup_failed",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                email_id = %email_id,
                error = %e,
                message = "Failed to look up delivery status"
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
