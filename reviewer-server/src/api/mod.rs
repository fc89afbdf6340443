//! HTTP transport for the reviewer service.

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub use error::ApiError;

/// Build the application router with all routes and tracing attached.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/team/add", post(handlers::add_team))
        .route("/team/get", get(handlers::get_team))
        .route("/users/setIsActive", post(handlers::set_user_active))
        .route("/users/getReview", get(handlers::get_user_reviews))
        .route("/pullRequest/create", post(handlers::create_pr))
        .route("/pullRequest/merge", post(handlers::merge_pr))
        .route("/pullRequest/reassign", post(handlers::reassign_reviewer))
        .route("/stats", get(handlers::get_stats))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}
