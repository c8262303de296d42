//! Admin API request and response type definitions
//!
//! The admin surface exposes one endpoint that accepts an `action`
//! discriminator; every action carries its own typed body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

use super::core::*;

// =============================================================================
// Action envelope
// =============================================================================

/// Every state-changing or status request accepted by the admin endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AdminAction {
    SendLeadNotification(SendLeadNotificationRequest),
    BulkNotify(BulkNotifyRequest),
    TestNotification(TestNotificationRequest),
    UpdateTemplates(UpdateTemplatesRequest),
    UpdatePreferences(UpdatePreferencesRequest),
    GetDeliveryStatus(GetDeliveryStatusRequest),
    CancelScheduled(CancelScheduledRequest),
}

impl AdminAction {
    pub const NAMES: [&'static str; 7] = [
        "send_lead_notification",
        "bulk_notify",
        "test_notification",
        "update_templates",
        "update_preferences",
        "get_delivery_status",
        "cancel_scheduled",
    ];

    pub fn is_known(action: &str) -> bool {
        Self::NAMES.contains(&action)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SendLeadNotification(_) => "send_lead_notification",
            Self::BulkNotify(_) => "bulk_notify",
            Self::TestNotification(_) => "test_notification",
            Self::UpdateTemplates(_) => "update_templates",
            Self::UpdatePreferences(_) => "update_preferences",
            Self::GetDeliveryStatus(_) => "get_delivery_status",
            Self::CancelScheduled(_) => "cancel_scheduled",
        }
    }
}

// =============================================================================
// Lead notifications
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendLeadNotificationRequest {
    #[validate(length(min = 1, max = 100))]
    pub lead_id: String,
    #[validate(length(min = 1, message = "at least one builder is required"))]
    pub builder_ids: Vec<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub custom_message: Option<String>,
    #[validate(length(min = 1, message = "at least one method is required"))]
    pub methods: Vec<Channel>,
    #[serde(default)]
    pub priority: Option<NotificationPriority>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadNotificationResponse {
    pub success: bool,
    pub lead_id: String,
    pub intent_id: String,
    pub results: Vec<RecipientDispatchResult>,
    pub success_count: usize,
    pub total_count: usize,
}

// =============================================================================
// Bulk notifications
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BulkNotifyRequest {
    #[serde(default)]
    pub filters: BuilderFilter,
    #[validate(length(min = 1, max = 2000))]
    pub message: String,
    #[validate(length(min = 1, message = "at least one method is required"))]
    pub methods: Vec<Channel>,
    #[serde(default)]
    pub priority: Option<NotificationPriority>,
    #[serde(default)]
    pub schedule_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImmediateResponse {
    pub success: bool,
    pub intent_id: String,
    pub results: Vec<RecipientDispatchResult>,
    pub summary: BulkSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkScheduledResponse {
    pub success: bool,
    pub intent_id: String,
    pub schedule_id: String,
    pub scheduled_for: DateTime<Utc>,
    pub builder_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkNotifyResponse {
    Immediate(BulkImmediateResponse),
    Scheduled(BulkScheduledResponse),
}

// =============================================================================
// Test notifications
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationRequest {
    #[validate(length(min = 1, max = 50))]
    pub test_type: String,
    /// Raw address for the chosen method (email, phone or dashboard account)
    #[validate(length(min = 1, max = 254))]
    pub recipient: String,
    pub method: Channel,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub custom_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestNotificationResponse {
    pub success: bool,
    pub test_result: RecipientDispatchResult,
    pub sent_at: DateTime<Utc>,
}

// =============================================================================
// Templates and preferences
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplatesRequest {
    pub template_type: NotificationType,
    pub templates: BTreeMap<Channel, TemplateContent>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplatesResponse {
    pub success: bool,
    pub template_type: NotificationType,
    pub channels: Vec<Channel>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplatesResponse {
    pub success: bool,
    pub templates: Vec<Template>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesRequest {
    #[validate(length(min = 1, max = 100))]
    pub builder_id: String,
    #[serde(default)]
    pub email: Option<bool>,
    #[serde(default)]
    pub sms: Option<bool>,
    #[serde(default)]
    pub dashboard: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePreferencesResponse {
    pub success: bool,
    pub builder_id: String,
    pub preferences: ChannelPreferences,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Status and scheduling
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct GetDeliveryStatusRequest {
    #[validate(length(min = 1, max = 100))]
    pub builder_id: String,
    #[serde(default)]
    pub time_range: TimeRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusResponse {
    pub success: bool,
    pub delivery_status: DeliveryStatusSummary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatsResponse {
    pub success: bool,
    pub stats: DeliveryStats,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CancelScheduledRequest {
    #[validate(length(min = 1))]
    pub schedule_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelScheduledResponse {
    pub success: bool,
    pub schedule_id: String,
    pub cancelled: bool,
}

/// Pending scheduled dispatch as shown to operators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDispatchView {
    pub schedule_id: String,
    pub intent_id: String,
    pub kind: IntentKind,
    pub initiated_by: String,
    pub scheduled_for: DateTime<Utc>,
    pub builder_count: usize,
}

impl From<&ScheduledDispatch> for ScheduledDispatchView {
    fn from(dispatch: &ScheduledDispatch) -> Self {
        Self {
            schedule_id: dispatch.id.clone(),
            intent_id: dispatch.intent.id.clone(),
            kind: dispatch.intent.kind(),
            initiated_by: dispatch.intent.initiated_by.clone(),
            scheduled_for: dispatch.scheduled_at,
            builder_count: dispatch.recipients.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledListResponse {
    pub success: bool,
    pub scheduled: Vec<ScheduledDispatchView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogResponse {
    pub success: bool,
    pub entries: Vec<AuditEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_envelope_parses_camel_case_body() {
        let body = serde_json::json!({
            "action": "send_lead_notification",
            "leadId": "lead-1",
            "builderIds": ["b-1", "b-2"],
            "methods": ["email", "dashboard"],
            "priority": "high"
        });

        let action: AdminAction = serde_json::from_value(body).unwrap();
        match action {
            AdminAction::SendLeadNotification(request) => {
                assert_eq!(request.lead_id, "lead-1");
                assert_eq!(request.builder_ids.len(), 2);
                assert_eq!(request.priority, Some(NotificationPriority::High));
                assert!(request.custom_message.is_none());
            }
            other => panic!("unexpected action {}", other.name()),
        }
    }

    #[test]
    fn test_request_validation_rejects_empty_lists() {
        let request = SendLeadNotificationRequest {
            lead_id: "lead-1".to_string(),
            builder_ids: Vec::new(),
            custom_message: None,
            methods: vec![Channel::Email],
            priority: None,
        };
        let errors = request.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("builder_ids"));

        let bulk: BulkNotifyRequest = serde_json::from_value(serde_json::json!({
            "message": "Hall 4 opens early",
            "methods": []
        }))
        .unwrap();
        assert!(bulk.validate().is_err());
    }

    #[test]
    fn test_known_action_names_match_variants() {
        for name in AdminAction::NAMES {
            assert!(AdminAction::is_known(name));
        }
        assert!(!AdminAction::is_known("delete_everything"));
    }

    #[test]
    fn test_bulk_response_is_untagged() {
        let response = BulkNotifyResponse::Scheduled(BulkScheduledResponse {
            success: true,
            intent_id: "i-1".to_string(),
            schedule_id: "s-1".to_string(),
            scheduled_for: Utc::now(),
            builder_count: 3,
        });
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["builderCount"], 3);
        assert!(value.get("scheduledFor").is_some());
    }
}
