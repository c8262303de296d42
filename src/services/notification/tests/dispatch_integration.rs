//! # Integration Tests for Notification Dispatch
//!
//! These tests drive the manager end to end: resolution, fan-out over the
//! channel senders, tracking, audit and scheduling.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use pretty_assertions::assert_eq;
use std::sync::Arc;

use common::{manager_with_email_provider, service, service_with, PanickingEmailProvider};
use expo_shared::types::*;
use notification_service::audit::AuditQuery;
use notification_service::masking::{mask_email, mask_phone};
use notification_service::templates::default_content;
use notification_service::{NotificationConfig, NotificationError};

fn lead_request(builder_ids: &[&str], methods: Vec<Channel>) -> SendLeadNotificationRequest {
    SendLeadNotificationRequest {
        lead_id: "lead-1".to_string(),
        builder_ids: builder_ids.iter().map(|id| id.to_string()).collect(),
        custom_message: None,
        methods,
        priority: None,
    }
}

#[tokio::test]
async fn test_three_recipient_scenario() {
    let test = service();

    let response = test
        .manager
        .send_lead_notification(
            "admin-1",
            lead_request(&["b-1", "b-2", "b-3"], vec![Channel::Email, Channel::Dashboard]),
        )
        .await
        .unwrap();

    assert_eq!(response.total_count, 3);
    assert_eq!(response.success_count, 2);

    let b1 = &response.results[0];
    assert_eq!(b1.recipient_id, "b-1");
    assert!(!b1.overall_succeeded);
    assert_eq!(b1.failure_reasons, vec![FailureReason::NoUsableChannel]);
    assert!(b1.attempts.is_empty());

    let b2 = &response.results[1];
    assert!(b2.overall_succeeded);
    assert_eq!(b2.successful_channels, vec![Channel::Dashboard]);
    assert_eq!(b2.failure_reasons, vec![FailureReason::ProviderUnavailable]);

    let b3 = &response.results[2];
    assert!(b3.overall_succeeded);
    assert_eq!(b3.successful_channels, vec![Channel::Email, Channel::Dashboard]);
    assert!(b3.failure_reasons.is_empty());

    for result in &response.results {
        assert_eq!(
            result.overall_succeeded,
            result.attempts.iter().any(|a| a.succeeded)
        );
        for attempt in &result.attempts {
            assert_eq!(attempt.succeeded, attempt.tracking_id.is_some());
            assert_eq!(attempt.succeeded, attempt.delivered_at.is_some());
            assert_eq!(attempt.succeeded, attempt.error_reason.is_none());
        }
    }

    // b-1 never reached a sender; b-2 and b-3 each made one email call
    assert_eq!(test.email.calls(), 2);
}

#[tokio::test]
async fn test_failure_reasons_are_masked_in_audit() {
    let test = service();
    test.manager
        .send_lead_notification("admin-1", lead_request(&["b-2"], vec![Channel::Email]))
        .await
        .unwrap();

    let entries = test
        .manager
        .audit_log(&AuditQuery::default())
        .await
        .unwrap()
        .entries;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::SendLeadNotification);

    let details = entries[0].details.to_string();
    assert!(!details.contains("refused@example.com"));
    assert!(details.contains("re***@example.com"));
    assert_eq!(entries[0].details["failures"][0]["recipientId"], "b-2");
}

#[tokio::test]
async fn test_delivery_history_is_queryable() {
    let test = service();
    test.manager
        .send_lead_notification(
            "admin-1",
            lead_request(&["b-2"], vec![Channel::Email, Channel::Dashboard]),
        )
        .await
        .unwrap();

    let status = test
        .manager
        .get_delivery_status(GetDeliveryStatusRequest {
            builder_id: "b-2".to_string(),
            time_range: TimeRange::LastHour,
        })
        .await
        .unwrap()
        .delivery_status;
    assert_eq!(status.total_attempts, 2);
    assert_eq!(status.successful, 1);
    assert_eq!(status.failed, 1);

    let stats = test.manager.delivery_stats().await.unwrap().stats;
    assert_eq!(stats.total_attempts, 2);

    let err = test
        .manager
        .get_delivery_status(GetDeliveryStatusRequest {
            builder_id: "ghost".to_string(),
            time_range: TimeRange::All,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::RecipientNotFound { .. }));
}

#[tokio::test]
async fn test_scheduled_bulk_sends_nothing_until_due() {
    let test = service();
    let at = Utc::now() + ChronoDuration::minutes(30);

    let response = test
        .manager
        .bulk_notify(
            "admin-1",
            BulkNotifyRequest {
                filters: BuilderFilter {
                    country: Some("Germany".to_string()),
                    ..Default::default()
                },
                message: "Build-up starts Thursday 7am".to_string(),
                methods: vec![Channel::Email],
                priority: Some(NotificationPriority::High),
                schedule_at: Some(at),
            },
        )
        .await
        .unwrap();

    let BulkNotifyResponse::Scheduled(scheduled) = response else {
        panic!("expected a scheduled response");
    };
    assert_eq!(scheduled.scheduled_for, at);
    assert_eq!(scheduled.builder_count, 3);
    assert_eq!(test.email.calls(), 0);

    let scheduler = test.manager.scheduler();
    assert!(scheduler.tick(Utc::now()).await.is_empty());
    assert_eq!(test.email.calls(), 0);

    let due = at + ChronoDuration::seconds(1);
    let first = scheduler.tick(due).await;
    let second = scheduler.tick(due).await;
    assert_eq!(first.len(), 1);
    assert!(second.is_empty());
    assert_eq!(first[0].success_count, 1);
    assert_eq!(test.email.calls(), 2);

    assert_eq!(
        test.manager.intent_state(&scheduled.intent_id),
        Some(IntentState::Completed)
    );

    let err = test
        .manager
        .cancel_scheduled(
            "admin-1",
            CancelScheduledRequest {
                schedule_id: scheduled.schedule_id,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), axum::http::StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_filter_matching_nothing_is_rejected() {
    let test = service();
    let err = test
        .manager
        .bulk_notify(
            "admin-1",
            BulkNotifyRequest {
                filters: BuilderFilter {
                    city: Some("Lisbon".to_string()),
                    ..Default::default()
                },
                message: "Hello".to_string(),
                methods: vec![Channel::Email],
                priority: None,
                schedule_at: None,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, NotificationError::FilterMatchedNone));
    assert_eq!(test.email.calls(), 0);
}

#[tokio::test]
async fn test_audit_log_evicts_oldest_first() {
    let mut config = NotificationConfig::default();
    config.audit.capacity = 3;
    let test = service_with(config);

    for n in 0..4 {
        test.manager
            .update_preferences(
                &format!("admin-{}", n),
                UpdatePreferencesRequest {
                    builder_id: "b-3".to_string(),
                    email: Some(n % 2 == 0),
                    sms: None,
                    dashboard: None,
                },
            )
            .await
            .unwrap();
    }

    let entries = test
        .manager
        .audit_log(&AuditQuery::default())
        .await
        .unwrap()
        .entries;
    let admins: Vec<&str> = entries.iter().map(|e| e.admin_id.as_str()).collect();
    assert_eq!(admins, vec!["admin-3", "admin-2", "admin-1"]);
}

#[tokio::test]
async fn test_opted_out_channel_is_not_attempted() {
    let test = service();
    test.manager
        .update_preferences(
            "admin-1",
            UpdatePreferencesRequest {
                builder_id: "b-3".to_string(),
                email: Some(false),
                sms: None,
                dashboard: None,
            },
        )
        .await
        .unwrap();

    let response = test
        .manager
        .send_lead_notification(
            "admin-1",
            lead_request(&["b-3"], vec![Channel::Email, Channel::Dashboard]),
        )
        .await
        .unwrap();

    assert_eq!(test.email.calls(), 0);
    assert_eq!(
        response.results[0].successful_channels,
        vec![Channel::Dashboard]
    );
}

#[tokio::test]
async fn test_default_templates_are_deterministic() {
    let test = service();
    for _ in 0..2 {
        test.manager
            .send_lead_notification("admin-1", lead_request(&["b-3"], vec![Channel::Dashboard]))
            .await
            .unwrap();
    }

    let inbox = test.manager.dashboard_inbox().unwrap();
    let messages = inbox.messages_for("b-3");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].title, messages[1].title);
    assert_eq!(messages[0].body, messages[1].body);

    let payload = IntentPayload::BulkNotification {
        message: "Doors open at 9".to_string(),
        priority: NotificationPriority::Normal,
    };
    assert_eq!(
        default_content(&payload, Channel::Email, "Stand Builder b-3"),
        default_content(&payload, Channel::Email, "Stand Builder b-3")
    );
}

#[test]
fn test_contact_masking() {
    assert_eq!(mask_email("john.doe@example.com"), "jo***@example.com");
    assert_eq!(mask_phone("+15551234567"), "+*******4567");
}

#[tokio::test]
async fn test_panicking_email_provider_does_not_lose_dashboard_delivery() {
    let manager = manager_with_email_provider(Arc::new(PanickingEmailProvider));

    let response = manager
        .send_lead_notification(
            "admin-1",
            lead_request(&["b-3"], vec![Channel::Email, Channel::Dashboard]),
        )
        .await
        .unwrap();

    let b3 = &response.results[0];
    assert_eq!(b3.attempts.len(), 2);
    assert!(b3.overall_succeeded);
    assert_eq!(b3.successful_channels, vec![Channel::Dashboard]);
    assert_eq!(b3.failure_reasons, vec![FailureReason::Unexpected]);

    let inbox = manager.dashboard_inbox().unwrap();
    assert_eq!(inbox.messages_for("b-3").len(), 1);

    let status = manager
        .get_delivery_status(GetDeliveryStatusRequest {
            builder_id: "b-3".to_string(),
            time_range: TimeRange::LastDay,
        })
        .await
        .unwrap();
    assert_eq!(status.delivery_status.total_attempts, 2);
    assert_eq!(status.delivery_status.failed, 1);
}
