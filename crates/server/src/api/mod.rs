//! API module providing HTTP endpoints for the mail relay.
//!
//! This module is organized into submodules:
//! - `delivery` - Delivery status polling (/api/email/delivery, /checkEmailDelivery)
//! - `requests` - Request intake (/api/email/requests, /api/email/direct-requests)
//! - `setup` - Configuration instructions (/api/email/setup)
//! - `health` - Health check endpoint (/healthz)
//! - `openapi` - OpenAPI/Utoipa configuration

pub mod delivery;
pub mod health;
pub mod openapi;
pub mod requests;
pub mod setup;

pub use delivery::EMAIL_TAG;
pub use health::MISC_TAG;

use crate::AppResources;
use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_axum::{router::OpenApiRouter, routes};
use utoipa_redoc::{Redoc, Servable};

/// Routes under `/api/email`.
pub fn email_router() -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(delivery::delivery_status))
        .routes(routes!(requests::create_request))
        .routes(routes!(requests::create_direct_request))
        .routes(routes!(setup::setup_instructions))
}

/// Build the full application router.
#[tracing::instrument(skip_all)]
pub fn app(resources: AppResources) -> Router {
    let (router, api) = OpenApiRouter::with_openapi(openapi::ApiDoc::openapi())
        .nest("/api/email", email_router())
        .routes(routes!(delivery::check_email_delivery))
        .routes(routes!(health::health))
        .layer(axum::Extension(resources))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .split_for_parts();

    router.merge(Redoc::with_url("/api-docs", api))
}

/// Starts the web server with all configured routes.
#[tracing::instrument(skip(resources))]
pub async fn start_webserver(resources: AppResources) -> color_eyre::Result<()> {
    let addr = resources.config.listen_addr.clone();
    let router = app(resources);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(
        name = "api.start_webserver.listening",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = %addr,
        message = "Server running"
    );
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await
    .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}
