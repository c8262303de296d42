//! Fan-out of one intent across recipients and channels
//!
//! Each recipient runs in its own task; inside it, the recipient's channel
//! attempts run concurrently and are joined before the recipient result is
//! built. A semaphore bounds in-flight channel attempts across the whole
//! dispatch. Results come back in input order regardless of completion order.
//! A panicking sender only fails its own attempt.

use crate::audit::AuditStore;
use crate::channels::{DeliveryRequest, SenderMap};
use crate::masking::mask_contact;
use crate::metrics::NotificationMetrics;
use crate::templates::TemplateResolver;
use crate::tracker::DeliveryTracker;
use expo_shared::types::*;

use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

const DEFAULT_STATE_RETENTION: usize = 10_000;

/// Current state per intent. Live intents are always kept; finished ones
/// are evicted oldest first once `retention` is exceeded.
#[derive(Default)]
struct IntentStates {
    states: HashMap<String, IntentState>,
    finished: VecDeque<String>,
}

impl IntentStates {
    fn set(&mut self, intent_id: &str, state: IntentState, retention: usize) {
        let previous = self.states.insert(intent_id.to_string(), state);
        let was_finished = previous.map_or(false, |s| s.is_terminal());
        if state.is_terminal() && !was_finished {
            self.finished.push_back(intent_id.to_string());
        }

        while self.finished.len() > retention {
            if let Some(oldest) = self.finished.pop_front() {
                if self.states.get(&oldest).map_or(false, |s| s.is_terminal()) {
                    self.states.remove(&oldest);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    senders: Arc<SenderMap>,
    templates: TemplateResolver,
    tracker: Arc<dyn DeliveryTracker>,
    audit: Arc<dyn AuditStore>,
    metrics: NotificationMetrics,
    max_concurrent_attempts: usize,
    states: Arc<Mutex<IntentStates>>,
    state_retention: usize,
}

impl Dispatcher {
    pub fn new(
        senders: SenderMap,
        templates: TemplateResolver,
        tracker: Arc<dyn DeliveryTracker>,
        audit: Arc<dyn AuditStore>,
        metrics: NotificationMetrics,
        max_concurrent_attempts: usize,
    ) -> Self {
        Self {
            senders: Arc::new(senders),
            templates,
            tracker,
            audit,
            metrics,
            max_concurrent_attempts: max_concurrent_attempts.max(1),
            states: Arc::new(Mutex::new(IntentStates::default())),
            state_retention: DEFAULT_STATE_RETENTION,
        }
    }

    pub fn with_state_retention(mut self, retention: usize) -> Self {
        self.state_retention = retention.max(1);
        self
    }

    pub fn senders(&self) -> &SenderMap {
        &self.senders
    }

    pub fn metrics(&self) -> &NotificationMetrics {
        &self.metrics
    }

    pub fn set_state(&self, intent_id: &str, state: IntentState) {
        self.states
            .lock()
            .set(intent_id, state, self.state_retention);
    }

    pub fn state(&self, intent_id: &str) -> Option<IntentState> {
        self.states.lock().states.get(intent_id).copied()
    }

    /// Number of intents with a recorded state
    pub fn tracked_states(&self) -> usize {
        self.states.lock().states.len()
    }

    /// Execute `intent` against `recipients` and return the aggregate report.
    /// Tracking and audit writes happen after all recipients finish and never
    /// fail the dispatch.
    pub async fn dispatch(
        &self,
        intent: &NotificationIntent,
        recipients: Vec<Recipient>,
    ) -> IntentDispatchReport {
        let started_at = Utc::now();
        let timer = Instant::now();
        let intent = Arc::new(intent.clone());
        let permits = Arc::new(Semaphore::new(self.max_concurrent_attempts));
        self.set_state(&intent.id, IntentState::Dispatching);
        self.metrics.record_intent(intent.kind());

        info!(
            intent_id = %intent.id,
            kind = %intent.kind(),
            recipients = recipients.len(),
            channels = ?intent.channels.as_slice(),
            "Dispatching intent"
        );

        let mut handles = Vec::with_capacity(recipients.len());
        for (index, recipient) in recipients.iter().cloned().enumerate() {
            let dispatcher = self.clone();
            let intent = intent.clone();
            let permits = permits.clone();

            let handle = tokio::spawn(async move {
                dispatcher
                    .dispatch_recipient(&intent, recipient, permits)
                    .await
            });
            handles.push((index, handle));
        }

        let mut results = Vec::with_capacity(handles.len());
        for (index, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    let recipient = &recipients[index];
                    error!(
                        intent_id = %intent.id,
                        recipient_id = %recipient.id,
                        "Recipient dispatch task failed: {}", e
                    );
                    RecipientDispatchResult::unattempted(
                        &recipient.id,
                        &recipient.display_name,
                        FailureReason::Unexpected,
                    )
                }
            };
            results.push((index, result));
        }

        // Sort results by index to maintain order
        results.sort_by_key(|(index, _)| *index);
        let results: Vec<RecipientDispatchResult> =
            results.into_iter().map(|(_, result)| result).collect();

        let report = IntentDispatchReport::new(&intent.id, intent.kind(), results, started_at);

        self.persist(&intent, &report).await;
        self.set_state(&intent.id, IntentState::Completed);

        self.metrics.observe_dispatch(timer.elapsed().as_secs_f64());
        info!(
            intent_id = %intent.id,
            success_count = report.success_count,
            total_count = report.total_count,
            "Dispatch completed"
        );

        report
    }

    async fn dispatch_recipient(
        &self,
        intent: &NotificationIntent,
        recipient: Recipient,
        permits: Arc<Semaphore>,
    ) -> RecipientDispatchResult {
        let usable: Vec<(Channel, String)> = intent
            .channels
            .iter()
            .filter_map(|channel| {
                recipient
                    .address_for(channel)
                    .map(|address| (channel, address.to_string()))
            })
            .collect();

        if usable.is_empty() {
            info!(
                intent_id = %intent.id,
                recipient_id = %recipient.id,
                "Recipient has no usable channel"
            );
            return RecipientDispatchResult::unattempted(
                &recipient.id,
                &recipient.display_name,
                FailureReason::NoUsableChannel,
            );
        }

        let attempts = usable.into_iter().map(|(channel, address)| {
            let permits = permits.clone();
            let recipient = &recipient;
            let contact = mask_contact(channel, &address);
            let attempt = async move {
                let Some(sender) = self.senders.get(&channel) else {
                    return ChannelAttemptResult::failed(
                        &intent.id,
                        channel,
                        &recipient.id,
                        mask_contact(channel, &address),
                        FailureReason::ProviderUnavailable,
                        format!("no sender configured for {}", channel),
                    );
                };

                let content = self
                    .templates
                    .content_for(&intent.payload, channel, &recipient.display_name)
                    .await;

                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return ChannelAttemptResult::failed(
                            &intent.id,
                            channel,
                            &recipient.id,
                            mask_contact(channel, &address),
                            FailureReason::Unexpected,
                            format!("attempt limiter closed: {}", e),
                        )
                    }
                };

                sender
                    .send(DeliveryRequest {
                        intent_id: intent.id.clone(),
                        recipient_id: recipient.id.clone(),
                        address,
                        content,
                        priority: intent.payload.priority(),
                    })
                    .await
            };

            async move {
                match AssertUnwindSafe(attempt).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        error!(
                            intent_id = %intent.id,
                            recipient_id = %recipient.id,
                            channel = %channel,
                            contact = %contact,
                            "Channel attempt panicked"
                        );
                        ChannelAttemptResult::failed(
                            &intent.id,
                            channel,
                            &recipient.id,
                            contact,
                            FailureReason::Unexpected,
                            format!("{} sender panicked", channel),
                        )
                    }
                }
            }
        });

        let attempts = join_all(attempts).await;
        RecipientDispatchResult::from_attempts(&recipient.id, &recipient.display_name, attempts)
    }

    async fn persist(&self, intent: &NotificationIntent, report: &IntentDispatchReport) {
        for result in &report.results {
            for attempt in &result.attempts {
                self.metrics.record_attempt(attempt);
            }
            if let Err(e) = self.tracker.record(&result.recipient_id, &result.attempts).await {
                warn!(
                    intent_id = %intent.id,
                    recipient_id = %result.recipient_id,
                    "Failed to record delivery history: {}", e
                );
            }
        }

        let failures: Vec<serde_json::Value> = report
            .failures()
            .map(|result| {
                json!({
                    "recipientId": result.recipient_id,
                    "reasons": result.failure_reasons,
                    "contacts": result.attempts.iter().map(|a| &a.contact).collect::<Vec<_>>(),
                })
            })
            .collect();

        let details = json!({
            "intentId": intent.id,
            "kind": intent.kind(),
            "channels": intent.channels,
            "target": intent.target,
            "priority": intent.payload.priority(),
            "scheduledAt": intent.scheduled_at,
            "successCount": report.success_count,
            "totalCount": report.total_count,
            "failures": failures,
        });

        let entry = AuditEntry::new(
            &intent.initiated_by,
            AuditAction::for_intent(intent.kind()),
            details,
        );
        if let Err(e) = self.audit.append(entry).await {
            warn!(intent_id = %intent.id, "Failed to append audit entry: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditQuery, InMemoryAuditLog};
    use crate::channels::{ChannelInfo, ChannelSender};
    use crate::error::{NotificationError, Result};
    use crate::templates::InMemoryTemplateStore;
    use crate::tracker::InMemoryDeliveryTracker;
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Sender that fails for a fixed set of recipients and counts calls
    struct ScriptedSender {
        channel: Channel,
        failing: HashSet<String>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl ScriptedSender {
        fn new(channel: Channel, failing: &[&str]) -> Arc<Self> {
            Arc::new(Self {
                channel,
                failing: failing.iter().map(|s| s.to_string()).collect(),
                delay: Duration::from_millis(1),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChannelSender for ScriptedSender {
        fn channel(&self) -> Channel {
            self.channel
        }

        async fn send(&self, request: DeliveryRequest) -> ChannelAttemptResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.failing.contains(&request.recipient_id) {
                ChannelAttemptResult::failed(
                    request.intent_id,
                    self.channel,
                    request.recipient_id,
                    "masked",
                    FailureReason::ProviderUnavailable,
                    "forced failure",
                )
            } else {
                ChannelAttemptResult::delivered(
                    request.intent_id,
                    self.channel,
                    request.recipient_id,
                    "masked",
                    "t-1",
                    Utc::now(),
                )
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn info(&self) -> ChannelInfo {
            ChannelInfo {
                name: self.channel.to_string(),
                description: "scripted".to_string(),
                provider: "scripted".to_string(),
                enabled: true,
                rate_limit_per_minute: None,
                timeout_ms: 0,
            }
        }
    }

    struct PanickingSender;

    #[async_trait]
    impl ChannelSender for PanickingSender {
        fn channel(&self) -> Channel {
            Channel::Email
        }

        async fn send(&self, _request: DeliveryRequest) -> ChannelAttemptResult {
            panic!("sender state corrupted");
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn info(&self) -> ChannelInfo {
            ChannelInfo {
                name: "email".to_string(),
                description: "panicking".to_string(),
                provider: "panicking".to_string(),
                enabled: true,
                rate_limit_per_minute: None,
                timeout_ms: 0,
            }
        }
    }

    struct BrokenTracker;

    #[async_trait]
    impl DeliveryTracker for BrokenTracker {
        async fn record(&self, _: &str, _: &[ChannelAttemptResult]) -> Result<()> {
            Err(NotificationError::storage("tracker offline"))
        }

        async fn query_status(&self, _: &str, _: TimeRange) -> Result<DeliveryStatusSummary> {
            Err(NotificationError::storage("tracker offline"))
        }

        async fn stats(&self) -> Result<DeliveryStats> {
            Err(NotificationError::storage("tracker offline"))
        }
    }

    struct Fixture {
        dispatcher: Dispatcher,
        email: Arc<ScriptedSender>,
        dashboard: Arc<ScriptedSender>,
        audit: Arc<InMemoryAuditLog>,
    }

    fn fixture(failing_email: &[&str], tracker: Arc<dyn DeliveryTracker>) -> Fixture {
        let email = ScriptedSender::new(Channel::Email, failing_email);
        let dashboard = ScriptedSender::new(Channel::Dashboard, &[]);
        let audit = Arc::new(InMemoryAuditLog::new(100));

        let mut senders = SenderMap::new();
        senders.insert(Channel::Email, email.clone() as Arc<dyn ChannelSender>);
        senders.insert(Channel::Dashboard, dashboard.clone() as Arc<dyn ChannelSender>);

        let dispatcher = Dispatcher::new(
            senders,
            TemplateResolver::new(Arc::new(InMemoryTemplateStore::new())),
            tracker,
            audit.clone(),
            NotificationMetrics::new().unwrap(),
            4,
        );

        Fixture {
            dispatcher,
            email,
            dashboard,
            audit,
        }
    }

    fn intent(channels: Vec<Channel>) -> NotificationIntent {
        NotificationIntent::new(
            "admin-1",
            TargetSelector::Explicit { ids: vec![] },
            ChannelSet::new(channels),
            IntentPayload::BulkNotification {
                message: "Hall 4 opens at 8am".to_string(),
                priority: NotificationPriority::Normal,
            },
        )
    }

    #[tokio::test]
    async fn test_no_usable_channel_invokes_no_sender() {
        let f = fixture(&[], Arc::new(InMemoryDeliveryTracker::new()));
        let recipient =
            Recipient::new("b-1", "No Contacts").with_contact(Channel::Sms, "+15551234567");

        let report = f
            .dispatcher
            .dispatch(&intent(vec![Channel::Email, Channel::Dashboard]), vec![recipient])
            .await;

        assert_eq!(report.success_count, 0);
        assert_eq!(
            report.results[0].failure_reasons,
            vec![FailureReason::NoUsableChannel]
        );
        assert!(report.results[0].attempts.is_empty());
        assert_eq!(f.email.calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.dashboard.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_per_recipient() {
        let f = fixture(&["b-1"], Arc::new(InMemoryDeliveryTracker::new()));
        let recipients: Vec<Recipient> = (1..=5)
            .map(|n| {
                Recipient::new(format!("b-{}", n), format!("Builder {}", n))
                    .with_contact(Channel::Email, format!("b{}@example.com", n))
            })
            .collect();

        let report = f
            .dispatcher
            .dispatch(&intent(vec![Channel::Email]), recipients)
            .await;

        assert_eq!(report.total_count, 5);
        assert_eq!(report.success_count, 4);
        let ids: Vec<&str> = report.results.iter().map(|r| r.recipient_id.as_str()).collect();
        assert_eq!(ids, vec!["b-1", "b-2", "b-3", "b-4", "b-5"]);
        assert!(!report.results[0].overall_succeeded);
        assert!(report.results[1..].iter().all(|r| r.overall_succeeded));
        for result in &report.results {
            assert_eq!(
                result.overall_succeeded,
                result.attempts.iter().any(|a| a.succeeded)
            );
        }
    }

    #[tokio::test]
    async fn test_partial_channel_success_counts_as_success() {
        let f = fixture(&["b-1"], Arc::new(InMemoryDeliveryTracker::new()));
        let recipient = Recipient::new("b-1", "Mixed")
            .with_contact(Channel::Email, "mixed@example.com")
            .with_contact(Channel::Dashboard, "user-1");

        let report = f
            .dispatcher
            .dispatch(&intent(vec![Channel::Email, Channel::Dashboard]), vec![recipient])
            .await;

        let result = &report.results[0];
        assert!(result.overall_succeeded);
        assert_eq!(result.successful_channels, vec![Channel::Dashboard]);
        assert_eq!(result.failure_reasons, vec![FailureReason::ProviderUnavailable]);
    }

    #[tokio::test]
    async fn test_single_audit_entry_per_intent() {
        let f = fixture(&[], Arc::new(InMemoryDeliveryTracker::new()));
        let recipients = vec![
            Recipient::new("b-1", "One").with_contact(Channel::Email, "one@example.com"),
            Recipient::new("b-2", "Two").with_contact(Channel::Dashboard, "user-2"),
        ];

        f.dispatcher
            .dispatch(&intent(vec![Channel::Email, Channel::Dashboard]), recipients)
            .await;

        let entries = f.audit.query(&AuditQuery::default()).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, AuditAction::BulkNotify);
        assert_eq!(entries[0].admin_id, "admin-1");
        assert_eq!(entries[0].details["totalCount"], 2);
    }

    #[tokio::test]
    async fn test_tracker_failure_does_not_block_report() {
        let f = fixture(&[], Arc::new(BrokenTracker));
        let recipient =
            Recipient::new("b-1", "One").with_contact(Channel::Email, "one@example.com");

        let report = f
            .dispatcher
            .dispatch(&intent(vec![Channel::Email]), vec![recipient])
            .await;

        assert_eq!(report.success_count, 1);
        assert_eq!(f.audit.len().await, 1);
    }

    #[tokio::test]
    async fn test_intent_state_reaches_completed() {
        let f = fixture(&[], Arc::new(InMemoryDeliveryTracker::new()));
        let intent = intent(vec![Channel::Email]);
        f.dispatcher.set_state(&intent.id, IntentState::Resolving);

        f.dispatcher.dispatch(&intent, Vec::new()).await;

        assert_eq!(f.dispatcher.state(&intent.id), Some(IntentState::Completed));
        assert_eq!(f.dispatcher.state("unknown"), None);
    }

    #[tokio::test]
    async fn test_panicking_sender_only_fails_its_own_attempt() {
        let dashboard = ScriptedSender::new(Channel::Dashboard, &[]);
        let mut senders = SenderMap::new();
        senders.insert(Channel::Email, Arc::new(PanickingSender) as Arc<dyn ChannelSender>);
        senders.insert(Channel::Dashboard, dashboard.clone() as Arc<dyn ChannelSender>);
        let tracker = Arc::new(InMemoryDeliveryTracker::new());

        let dispatcher = Dispatcher::new(
            senders,
            TemplateResolver::new(Arc::new(InMemoryTemplateStore::new())),
            tracker.clone(),
            Arc::new(InMemoryAuditLog::new(10)),
            NotificationMetrics::new().unwrap(),
            4,
        );
        let recipient = Recipient::new("b-3", "Both")
            .with_contact(Channel::Email, "both@example.com")
            .with_contact(Channel::Dashboard, "user-3");

        let report = dispatcher
            .dispatch(&intent(vec![Channel::Email, Channel::Dashboard]), vec![recipient])
            .await;

        let result = &report.results[0];
        assert_eq!(result.attempts.len(), 2);
        assert!(result.overall_succeeded);
        assert_eq!(result.successful_channels, vec![Channel::Dashboard]);
        assert_eq!(result.failure_reasons, vec![FailureReason::Unexpected]);
        assert_eq!(result.attempts[0].contact, "bo***@example.com");
        assert_eq!(dashboard.calls.load(Ordering::SeqCst), 1);

        let status = tracker.query_status("b-3", TimeRange::All).await.unwrap();
        assert_eq!(status.total_attempts, 2);
    }

    #[tokio::test]
    async fn test_finished_intent_states_are_bounded() {
        let f = fixture(&[], Arc::new(InMemoryDeliveryTracker::new()));
        let dispatcher = f.dispatcher.with_state_retention(3);

        let live = intent(vec![Channel::Email]);
        dispatcher.set_state(&live.id, IntentState::Scheduled);

        let mut finished = Vec::new();
        for _ in 0..5 {
            let intent = intent(vec![Channel::Email]);
            dispatcher.dispatch(&intent, Vec::new()).await;
            finished.push(intent.id);
        }

        assert_eq!(dispatcher.tracked_states(), 4);
        assert_eq!(dispatcher.state(&finished[0]), None);
        assert_eq!(dispatcher.state(&finished[1]), None);
        assert_eq!(dispatcher.state(&finished[4]), Some(IntentState::Completed));
        assert_eq!(dispatcher.state(&live.id), Some(IntentState::Scheduled));
    }
}
