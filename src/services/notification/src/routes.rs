//! Routes module for the notification service

use crate::handlers::{admin_action_handler, admin_query_handler, health_handler, metrics_handler};
use crate::manager::NotificationManager;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};

pub const ADMIN_NOTIFICATIONS_PATH: &str = "/api/admin/notifications";

/// Build the main router for the notification service
pub fn create_router(manager: Arc<NotificationManager>, request_timeout: Duration) -> Router {
    Router::new()
        .merge(create_admin_router(Arc::clone(&manager)))
        .merge(create_health_router(manager))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(TimeoutLayer::new(request_timeout))
                .into_inner(),
        )
}

fn create_admin_router(manager: Arc<NotificationManager>) -> Router {
    Router::new()
        .route(
            ADMIN_NOTIFICATIONS_PATH,
            post(admin_action_handler).get(admin_query_handler),
        )
        .with_state(manager)
}

/// Create health and metrics routes
fn create_health_router(manager: Arc<NotificationManager>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(manager)
}
