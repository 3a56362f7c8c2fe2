//! Folio Server Library
//!
//! PDF to Word conversion backend for the document tools web app.
//! The server binary is in main.rs; [`app`] builds the router so tests can
//! drive it in-process.
//!
//! # Modules
//!
//! - `upload`: multipart receiver with type and size checks
//! - `convert`: conversion engine adapter (in-process library or external program)
//! - `stream`: download response that cleans up after the transfer
//! - `scratch`: per-request scratch files with guaranteed removal

pub mod config;
pub mod convert;
pub mod error;
pub mod routes;
pub mod scratch;
pub mod state;
pub mod stream;
pub mod upload;

use std::any::Any;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use error::ErrorResponse;
use state::AppState;

/// Build the HTTP application
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config().server.allowed_origin);
    let max_upload_bytes = state.config().upload.max_upload_bytes;

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/api/v1/health", get(routes::health::health_check))
        .nest("/convert", routes::convert::router(max_upload_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    let origin = match allowed_origin.parse::<HeaderValue>() {
        Ok(value) => AllowOrigin::exact(value),
        Err(_) => {
            tracing::warn!(origin = %allowed_origin, "Invalid allowed origin, cross-origin calls disabled");
            AllowOrigin::list(Vec::<HeaderValue>::new())
        }
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION])
}

/// Last-resort handler: log the panic, answer with a generic 500
fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic payload"
    };
    tracing::error!(panic = %detail, "Request handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::internal())).into_response()
}
