//! # Notification Service
//!
//! Notification dispatch and delivery tracking for the ExpoBuild admin
//! platform. An administrator's request ("tell these builders about this
//! lead", "notify every verified builder in Berlin") becomes one intent,
//! which is resolved into recipients and fanned out across email, SMS and
//! the builder dashboard.
//!
//! ## Features
//!
//! - **Independent failure domains**: every (recipient, channel) attempt runs
//!   on its own; one failure never aborts its siblings
//! - **Template overrides**: Handlebars templates per notification type and
//!   channel, with deterministic built-in defaults
//! - **Scheduled bulk dispatch**: deferred intents fire exactly once
//! - **Audit trail**: one bounded, append-only entry per administrative action
//! - **Delivery tracking**: per-builder history and platform-wide totals
//! - **Preferences**: builders can opt out of individual channels
//!
//! ## Usage
//!
//! ```rust,no_run
//! use notification_service::{NotificationConfig, NotificationService};
//! use expo_shared::types::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = NotificationService::new(NotificationConfig::default())?;
//!
//!     let body = service
//!         .handle(
//!             "admin-42",
//!             AdminAction::BulkNotify(BulkNotifyRequest {
//!                 filters: BuilderFilter {
//!                     city: Some("Berlin".to_string()),
//!                     ..Default::default()
//!                 },
//!                 message: "Hall 4 opens one hour early on Monday".to_string(),
//!                 methods: vec![Channel::Email, Channel::Dashboard],
//!                 priority: None,
//!                 schedule_at: None,
//!             }),
//!         )
//!         .await?;
//!     println!("{}", body);
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod audit;
pub mod channels;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod masking;
pub mod metrics;
pub mod recipients;
pub mod routes;
pub mod scheduler;
pub mod templates;
pub mod tracker;

pub use config::NotificationConfig;
pub use error::{NotificationError, Result};
pub use manager::{NotificationManager, ServiceComponents};

// Re-export shared types for convenience
pub use expo_shared::types::{
    AdminAction, AuditAction, AuditEntry, Channel, ChannelAttemptResult, FailureReason,
    IntentDispatchReport, IntentState, NotificationIntent, Recipient, RecipientDispatchResult,
};

/// Cloneable handle over the manager, shared by the HTTP layer and the
/// background scheduler
#[derive(Clone)]
pub struct NotificationService {
    manager: Arc<NotificationManager>,
}

impl NotificationService {
    /// Service with in-memory stores and the configured providers
    pub fn new(config: NotificationConfig) -> Result<Self> {
        Ok(Self::from_manager(NotificationManager::in_memory(config)?))
    }

    pub fn from_manager(manager: NotificationManager) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Run one admin action on behalf of `admin_id`
    pub async fn handle(&self, admin_id: &str, action: AdminAction) -> Result<serde_json::Value> {
        self.manager.handle(admin_id, action).await
    }

    /// Get the notification manager for advanced operations
    pub fn manager(&self) -> &NotificationManager {
        &self.manager
    }

    /// Shared handle for the HTTP router state
    pub fn shared_manager(&self) -> Arc<NotificationManager> {
        Arc::clone(&self.manager)
    }

    /// Start the background scheduler for due dispatches
    pub fn start_scheduler(&self) {
        self.manager.scheduler().start();
    }

    pub fn stop_scheduler(&self) {
        self.manager.scheduler().stop();
    }

    /// Get service health status
    pub async fn health_check(&self) -> serde_json::Value {
        self.manager.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notification_service_creation() {
        let service = NotificationService::new(NotificationConfig::default()).unwrap();
        let health = service.health_check().await;
        assert_eq!(health["service"], "notification");
        assert_eq!(health["components"]["channels"]["email"]["enabled"], true);
    }

    #[tokio::test]
    async fn test_scheduler_start_stop_is_idempotent() {
        let service = NotificationService::new(NotificationConfig::default()).unwrap();
        service.start_scheduler();
        service.start_scheduler();
        assert!(service.manager().scheduler().is_running());
        service.stop_scheduler();
        service.stop_scheduler();
        assert!(!service.manager().scheduler().is_running());
    }
}
