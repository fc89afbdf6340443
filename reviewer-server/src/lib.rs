//! HTTP service and persistent storage for reviewer assignment.

pub mod api;
pub mod config;
pub mod repository;

use reviewer_core::ReviewService;

/// Shared state handed to every request handler.
pub struct AppState {
    pub service: ReviewService,
}

/// Version of this service, as reported in the startup log.
pub fn get_service_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
