//! Error handling for the notification service
//!
//! `NotificationError` covers everything that can surface to an admin caller.
//! Channel-level delivery problems never become a `NotificationError`; they are
//! recovered inside the channel senders as a failed attempt (see
//! [`crate::channels::ProviderError`]).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Result type alias for notification service operations
pub type Result<T> = std::result::Result<T, NotificationError>;

/// Main error type for the notification service
#[derive(Error, Debug)]
pub enum NotificationError {
    /// None of the explicitly requested builders exist
    #[error("Recipient not found: {message}")]
    RecipientNotFound { message: String },

    /// A bulk filter matched no builder
    #[error("No builders match the given filters")]
    FilterMatchedNone,

    #[error("Lead not found: {lead_id}")]
    LeadNotFound { lead_id: String },

    /// Unknown value of the `action` discriminator
    #[error("Invalid action")]
    InvalidAction { action: String },

    #[error("Validation error: {field}: {message}")]
    Validation { field: String, message: String },

    /// Cancellation of a scheduled dispatch that already fired
    #[error("Scheduled dispatch already executed: {schedule_id}")]
    AlreadyExecuted { schedule_id: String },

    #[error("Scheduled dispatch not found: {schedule_id}")]
    ScheduleNotFound { schedule_id: String },

    #[error("Template error: {message}")]
    Template { message: String },

    /// Audit, tracker, template or preference store failures
    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Operation timed out: {operation}")]
    Timeout { operation: String },

    /// Catch-all for anything not anticipated above
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl NotificationError {
    /// Get the HTTP status code that should be returned for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            NotificationError::RecipientNotFound { .. } => StatusCode::NOT_FOUND,
            NotificationError::FilterMatchedNone => StatusCode::NOT_FOUND,
            NotificationError::LeadNotFound { .. } => StatusCode::NOT_FOUND,
            NotificationError::InvalidAction { .. } => StatusCode::BAD_REQUEST,
            NotificationError::Validation { .. } => StatusCode::BAD_REQUEST,
            NotificationError::AlreadyExecuted { .. } => StatusCode::CONFLICT,
            NotificationError::ScheduleNotFound { .. } => StatusCode::NOT_FOUND,
            NotificationError::Template { .. } => StatusCode::BAD_REQUEST,
            NotificationError::Storage { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::Config { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            NotificationError::Serialization { .. } => StatusCode::BAD_REQUEST,
            NotificationError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            NotificationError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            NotificationError::RecipientNotFound { .. } => "RECIPIENT_NOT_FOUND",
            NotificationError::FilterMatchedNone => "FILTER_MATCHED_NONE",
            NotificationError::LeadNotFound { .. } => "LEAD_NOT_FOUND",
            NotificationError::InvalidAction { .. } => "INVALID_ACTION",
            NotificationError::Validation { .. } => "VALIDATION_ERROR",
            NotificationError::AlreadyExecuted { .. } => "ALREADY_EXECUTED",
            NotificationError::ScheduleNotFound { .. } => "SCHEDULE_NOT_FOUND",
            NotificationError::Template { .. } => "TEMPLATE_ERROR",
            NotificationError::Storage { .. } => "STORAGE_ERROR",
            NotificationError::Config { .. } => "CONFIG_ERROR",
            NotificationError::Serialization { .. } => "SERIALIZATION_ERROR",
            NotificationError::Timeout { .. } => "TIMEOUT",
            NotificationError::Internal { .. } => "UNEXPECTED",
        }
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
            "code": self.error_code(),
        }));

        (status, body).into_response()
    }
}

// Conversion implementations for external error types

impl From<serde_json::Error> for NotificationError {
    fn from(err: serde_json::Error) -> Self {
        NotificationError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<validator::ValidationErrors> for NotificationError {
    fn from(err: validator::ValidationErrors) -> Self {
        let field = err
            .field_errors()
            .keys()
            .next()
            .map(|field| field.to_string())
            .unwrap_or_else(|| "request".to_string());
        NotificationError::Validation {
            field,
            message: err.to_string(),
        }
    }
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::Template {
            message: err.to_string(),
        }
    }
}

impl From<handlebars::TemplateError> for NotificationError {
    fn from(err: handlebars::TemplateError) -> Self {
        NotificationError::Template {
            message: err.to_string(),
        }
    }
}

impl From<config::ConfigError> for NotificationError {
    fn from(err: config::ConfigError) -> Self {
        NotificationError::Config {
            message: err.to_string(),
        }
    }
}

impl From<tokio::time::error::Elapsed> for NotificationError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        NotificationError::Timeout {
            operation: err.to_string(),
        }
    }
}

impl From<std::io::Error> for NotificationError {
    fn from(err: std::io::Error) -> Self {
        NotificationError::Storage {
            message: err.to_string(),
        }
    }
}

// Utility functions for creating specific error types

impl NotificationError {
    pub fn recipient_not_found<S: Into<String>>(message: S) -> Self {
        Self::RecipientNotFound {
            message: message.into(),
        }
    }

    pub fn lead_not_found<S: Into<String>>(lead_id: S) -> Self {
        Self::LeadNotFound {
            lead_id: lead_id.into(),
        }
    }

    pub fn invalid_action<S: Into<String>>(action: S) -> Self {
        Self::InvalidAction {
            action: action.into(),
        }
    }

    /// Create a validation error
    pub fn validation<S1: Into<String>, S2: Into<String>>(field: S1, message: S2) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn already_executed<S: Into<String>>(schedule_id: S) -> Self {
        Self::AlreadyExecuted {
            schedule_id: schedule_id.into(),
        }
    }

    pub fn schedule_not_found<S: Into<String>>(schedule_id: S) -> Self {
        Self::ScheduleNotFound {
            schedule_id: schedule_id.into(),
        }
    }

    /// Create a template error
    pub fn template<S: Into<String>>(message: S) -> Self {
        Self::Template {
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            NotificationError::recipient_not_found("b-1").status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NotificationError::FilterMatchedNone.status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            NotificationError::invalid_action("nope").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            NotificationError::already_executed("s-1").status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            NotificationError::internal("boom").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_invalid_action_message_is_stable() {
        let error = NotificationError::invalid_action("drop_tables");
        assert_eq!(error.to_string(), "Invalid action");
        assert_eq!(error.error_code(), "INVALID_ACTION");
    }

    #[test]
    fn test_error_display() {
        let error = NotificationError::validation("methods", "at least one method required");
        assert_eq!(
            error.to_string(),
            "Validation error: methods: at least one method required"
        );
    }

    #[test]
    fn test_from_conversions() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let notification_error: NotificationError = json_error.into();
        assert!(matches!(
            notification_error,
            NotificationError::Serialization { .. }
        ));
    }
}
