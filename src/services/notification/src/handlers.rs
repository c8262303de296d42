//! Request handlers for the notification service
//!
//! The admin surface is a single POST endpoint dispatching on the `action`
//! field of the body, plus a read-only GET companion dispatching on the
//! `action` query parameter.

use crate::audit::AuditQuery;
use crate::error::{NotificationError, Result};
use crate::manager::NotificationManager;
use expo_shared::types::*;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info};

/// Header carrying the acting administrator's id
pub const ADMIN_ID_HEADER: &str = "x-admin-id";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminQuery {
    pub action: Option<String>,
    pub admin_id: Option<String>,
    pub audit_action: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// `POST /api/admin/notifications`
pub async fn admin_action_handler(
    State(manager): State<Arc<NotificationManager>>,
    headers: HeaderMap,
    payload: std::result::Result<Json<serde_json::Value>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let admin_id = admin_id(&headers)?;
    let Json(body) =
        payload.map_err(|e| NotificationError::validation("body", e.body_text()))?;

    let action = parse_action(body)?;
    let name = action.name();

    match manager.handle(&admin_id, action).await {
        Ok(response) => {
            info!(admin_id = %admin_id, action = name, "Admin action completed");
            Ok(Json(response))
        }
        Err(e) => {
            error!(admin_id = %admin_id, action = name, "Admin action failed: {}", e);
            Err(e)
        }
    }
}

/// `GET /api/admin/notifications?action=...`
pub async fn admin_query_handler(
    State(manager): State<Arc<NotificationManager>>,
    Query(query): Query<AdminQuery>,
) -> Result<impl IntoResponse> {
    let body = match query.action.as_deref() {
        Some("templates") => serde_json::to_value(manager.list_templates().await?)?,
        Some("delivery_stats") => serde_json::to_value(manager.delivery_stats().await?)?,
        Some("scheduled") => serde_json::to_value(manager.list_scheduled())?,
        Some("audit_log") => {
            let action = query
                .audit_action
                .as_deref()
                .map(str::parse::<AuditAction>)
                .transpose()
                .map_err(|e| NotificationError::validation("auditAction", e))?;

            let audit_query = AuditQuery {
                admin_id: query.admin_id,
                action,
                since: query.since,
                until: query.until,
                limit: query.limit,
            };
            serde_json::to_value(manager.audit_log(&audit_query).await?)?
        }
        other => {
            return Err(NotificationError::invalid_action(other.unwrap_or_default()));
        }
    };

    Ok(Json(body))
}

/// Health check handler
pub async fn health_handler(State(manager): State<Arc<NotificationManager>>) -> impl IntoResponse {
    Json(manager.health_check().await)
}

/// Prometheus text exposition
pub async fn metrics_handler(
    State(manager): State<Arc<NotificationManager>>,
) -> Result<impl IntoResponse> {
    let body = manager.metrics().export_metrics()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

fn admin_id(headers: &HeaderMap) -> Result<String> {
    headers
        .get(ADMIN_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            NotificationError::validation(ADMIN_ID_HEADER, "administrator identity is required")
        })
}

/// Unknown or missing discriminators are rejected before the body is
/// interpreted, so a malformed body for a known action reports the field.
fn parse_action(body: serde_json::Value) -> Result<AdminAction> {
    let name = body
        .get("action")
        .and_then(|action| action.as_str())
        .unwrap_or_default();

    if !AdminAction::is_known(name) {
        return Err(NotificationError::invalid_action(name));
    }

    serde_json::from_value(body).map_err(|e| NotificationError::validation("body", e.to_string()))
}
