//! Notification Manager
//!
//! Entry point for every administrative action. The manager validates the
//! request, resolves recipients, and either hands the intent to the
//! dispatcher or parks it with the scheduler. Every state-changing action
//! leaves one audit entry.

use crate::audit::{AuditQuery, AuditStore, InMemoryAuditLog};
use crate::channels::{
    email, ChannelInfo, ChannelProvider, ChannelSender, DashboardChannel, DashboardInbox,
    EmailChannel, LoggingSmsProvider, SenderCore, SenderMap, SmsChannel,
};
use crate::config::NotificationConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{NotificationError, Result};
use crate::masking::mask_contact;
use crate::metrics::NotificationMetrics;
use crate::recipients::{
    BuilderDirectory, InMemoryDirectory, InMemoryPreferenceStore, LeadDirectory, PreferenceStore,
    RecipientResolver,
};
use crate::scheduler::DispatchScheduler;
use crate::templates::{InMemoryTemplateStore, TemplateResolver, TemplateStore};
use crate::tracker::{DeliveryTracker, InMemoryDeliveryTracker};

use expo_shared::types::*;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Stores, directories and senders the manager is assembled from
pub struct ServiceComponents {
    pub builders: Arc<dyn BuilderDirectory>,
    pub leads: Arc<dyn LeadDirectory>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub templates: Arc<dyn TemplateStore>,
    pub tracker: Arc<dyn DeliveryTracker>,
    pub audit: Arc<dyn AuditStore>,
    pub senders: SenderMap,
    pub dashboard_inbox: Option<Arc<DashboardInbox>>,
}

impl ServiceComponents {
    /// Everything in memory, with the configured (or simulated) providers.
    /// The directory is seeded from `directory.seed_file` when set.
    pub fn in_memory(config: &NotificationConfig) -> Result<Self> {
        let directory = match &config.directory.seed_file {
            Some(path) => InMemoryDirectory::from_seed_file(path)?,
            None => InMemoryDirectory::new(),
        };
        Self::with_directory(config, Arc::new(directory))
    }

    /// In-memory stores around an existing directory
    pub fn with_directory(
        config: &NotificationConfig,
        directory: Arc<InMemoryDirectory>,
    ) -> Result<Self> {
        let inbox = Arc::new(DashboardInbox::new(config.dashboard.inbox_capacity));
        let senders = build_senders(config, inbox.clone())?;

        Ok(Self {
            builders: directory.clone(),
            leads: directory,
            preferences: Arc::new(InMemoryPreferenceStore::new()),
            templates: Arc::new(InMemoryTemplateStore::new()),
            tracker: Arc::new(InMemoryDeliveryTracker::new()),
            audit: Arc::new(InMemoryAuditLog::new(config.audit.capacity)),
            senders,
            dashboard_inbox: Some(inbox),
        })
    }

    /// Replace the sender for one channel
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(sender.channel(), sender);
        self
    }
}

/// Build the three channel senders from configuration
pub fn build_senders(
    config: &NotificationConfig,
    dashboard_provider: Arc<dyn ChannelProvider>,
) -> Result<SenderMap> {
    let timeout = config.get_timeout("channel");
    let core = |channel: Channel, provider: Arc<dyn ChannelProvider>| {
        let core = SenderCore::new(channel, provider, timeout)
            .with_enabled(config.is_channel_enabled(channel));
        if config.rate_limit.enabled {
            core.with_rate_limit(config.rate_limit.per_minute(channel))
        } else {
            core
        }
    };

    let email_provider = email::default_provider(&config.email, timeout)?;
    let sms_provider: Arc<dyn ChannelProvider> = Arc::new(LoggingSmsProvider::new(&config.sms));

    let mut senders = SenderMap::new();
    senders.insert(
        Channel::Email,
        Arc::new(EmailChannel::new(core(Channel::Email, email_provider))),
    );
    senders.insert(
        Channel::Sms,
        Arc::new(SmsChannel::new(core(Channel::Sms, sms_provider))),
    );
    senders.insert(
        Channel::Dashboard,
        Arc::new(DashboardChannel::new(core(
            Channel::Dashboard,
            dashboard_provider,
        ))),
    );
    Ok(senders)
}

/// Main notification manager that coordinates all notification operations
pub struct NotificationManager {
    config: NotificationConfig,
    leads: Arc<dyn LeadDirectory>,
    builders: Arc<dyn BuilderDirectory>,
    resolver: RecipientResolver,
    templates: TemplateResolver,
    tracker: Arc<dyn DeliveryTracker>,
    audit: Arc<dyn AuditStore>,
    dispatcher: Dispatcher,
    scheduler: DispatchScheduler,
    metrics: NotificationMetrics,
    dashboard_inbox: Option<Arc<DashboardInbox>>,
}

impl NotificationManager {
    pub fn new(config: NotificationConfig, components: ServiceComponents) -> Result<Self> {
        info!("Initializing notification manager");

        config.validate().map_err(NotificationError::config)?;

        let metrics = NotificationMetrics::new()?;
        let templates = TemplateResolver::new(components.templates);
        let resolver = RecipientResolver::new(components.builders.clone(), components.preferences);

        let dispatcher = Dispatcher::new(
            components.senders,
            templates.clone(),
            components.tracker.clone(),
            components.audit.clone(),
            metrics.clone(),
            config.dispatch.max_concurrent_attempts,
        )
        .with_state_retention(config.dispatch.state_retention);
        let scheduler = DispatchScheduler::new(&config.scheduler, dispatcher.clone());

        info!(
            channels = ?dispatcher.senders().keys().collect::<Vec<_>>(),
            "Notification manager initialized successfully"
        );

        Ok(Self {
            config,
            leads: components.leads,
            builders: components.builders,
            resolver,
            templates,
            tracker: components.tracker,
            audit: components.audit,
            dispatcher,
            scheduler,
            metrics,
            dashboard_inbox: components.dashboard_inbox,
        })
    }

    /// Manager with in-memory stores and the configured providers
    pub fn in_memory(config: NotificationConfig) -> Result<Self> {
        let components = ServiceComponents::in_memory(&config)?;
        Self::new(config, components)
    }

    /// Run one admin action and render its response body
    pub async fn handle(&self, admin_id: &str, action: AdminAction) -> Result<serde_json::Value> {
        if admin_id.trim().is_empty() {
            return Err(NotificationError::validation(
                "adminId",
                "administrator identity is required",
            ));
        }

        info!(admin_id = %admin_id, action = action.name(), "Handling admin action");

        match action {
            AdminAction::SendLeadNotification(request) => {
                to_body(self.send_lead_notification(admin_id, request).await?)
            }
            AdminAction::BulkNotify(request) => to_body(self.bulk_notify(admin_id, request).await?),
            AdminAction::TestNotification(request) => {
                to_body(self.test_notification(admin_id, request).await?)
            }
            AdminAction::UpdateTemplates(request) => {
                to_body(self.update_templates(admin_id, request).await?)
            }
            AdminAction::UpdatePreferences(request) => {
                to_body(self.update_preferences(admin_id, request).await?)
            }
            AdminAction::GetDeliveryStatus(request) => {
                to_body(self.get_delivery_status(request).await?)
            }
            AdminAction::CancelScheduled(request) => {
                to_body(self.cancel_scheduled(admin_id, request).await?)
            }
        }
    }

    pub async fn send_lead_notification(
        &self,
        admin_id: &str,
        request: SendLeadNotificationRequest,
    ) -> Result<LeadNotificationResponse> {
        request.validate()?;

        let lead = self
            .leads
            .get_lead_by_id(&request.lead_id)
            .await?
            .ok_or_else(|| NotificationError::lead_not_found(&request.lead_id))?;

        let intent = NotificationIntent::new(
            admin_id,
            TargetSelector::Explicit {
                ids: request.builder_ids,
            },
            ChannelSet::new(request.methods),
            IntentPayload::LeadNotification {
                lead: LeadSummary::from(&lead),
                custom_message: request.custom_message,
                priority: request.priority.unwrap_or_default(),
            },
        );

        let recipients = self.resolve(&intent).await?;
        let report = self.dispatcher.dispatch(&intent, recipients).await;

        Ok(LeadNotificationResponse {
            success: true,
            lead_id: lead.id,
            intent_id: report.intent_id,
            success_count: report.success_count,
            total_count: report.total_count,
            results: report.results,
        })
    }

    /// Immediate when `schedule_at` is absent or not in the future; otherwise
    /// recipients are resolved now and the dispatch is parked.
    pub async fn bulk_notify(
        &self,
        admin_id: &str,
        request: BulkNotifyRequest,
    ) -> Result<BulkNotifyResponse> {
        request.validate()?;

        let intent = NotificationIntent::new(
            admin_id,
            TargetSelector::Filter {
                filter: request.filters,
            },
            ChannelSet::new(request.methods),
            IntentPayload::BulkNotification {
                message: request.message,
                priority: request.priority.unwrap_or_default(),
            },
        );

        let fire_at = request.schedule_at.filter(|at| *at > Utc::now());
        if fire_at.is_some() && !self.config.scheduler.enabled {
            return Err(NotificationError::validation(
                "scheduleAt",
                "scheduled dispatch is disabled",
            ));
        }

        let recipients = self.resolve(&intent).await?;

        let Some(at) = fire_at else {
            let report = self.dispatcher.dispatch(&intent, recipients).await;
            return Ok(BulkNotifyResponse::Immediate(BulkImmediateResponse {
                success: true,
                summary: BulkSummary {
                    total: report.total_count,
                    successful: report.success_count,
                    failed: report.failed_count(),
                },
                intent_id: report.intent_id,
                results: report.results,
            }));
        };

        let intent_id = intent.id.clone();
        let builder_count = recipients.len();
        let details = json!({
            "intentId": intent_id,
            "target": intent.target,
            "channels": intent.channels,
            "scheduledFor": at,
            "builderCount": builder_count,
        });
        let schedule_id = self.scheduler.schedule(intent, recipients, at)?;
        self.append_audit(
            admin_id,
            AuditAction::ScheduleDispatch,
            with_field(details, "scheduleId", json!(schedule_id)),
        )
        .await;

        Ok(BulkNotifyResponse::Scheduled(BulkScheduledResponse {
            success: true,
            intent_id,
            schedule_id,
            scheduled_for: at,
            builder_count,
        }))
    }

    /// Send to a raw address, ignoring builder preferences
    pub async fn test_notification(
        &self,
        admin_id: &str,
        request: TestNotificationRequest,
    ) -> Result<TestNotificationResponse> {
        request.validate()?;

        let masked = mask_contact(request.method, &request.recipient);
        let recipient = Recipient::new(format!("test:{}", masked), "Test Recipient")
            .with_contact(request.method, request.recipient.trim());

        let intent = NotificationIntent::new(
            admin_id,
            TargetSelector::Explicit {
                ids: vec![recipient.id.clone()],
            },
            ChannelSet::new([request.method]),
            IntentPayload::TestNotification {
                test_type: request.test_type,
                custom_message: request.custom_message,
            },
        );
        self.dispatcher.set_state(&intent.id, IntentState::Created);

        let report = self.dispatcher.dispatch(&intent, vec![recipient]).await;
        let test_result = report
            .results
            .into_iter()
            .next()
            .ok_or_else(|| NotificationError::internal("test dispatch produced no result"))?;

        Ok(TestNotificationResponse {
            success: test_result.overall_succeeded,
            test_result,
            sent_at: report.completed_at,
        })
    }

    pub async fn update_templates(
        &self,
        admin_id: &str,
        request: UpdateTemplatesRequest,
    ) -> Result<UpdateTemplatesResponse> {
        let updated_at = self
            .templates
            .update(request.template_type, &request.templates, admin_id)
            .await?;

        let channels: Vec<Channel> = request.templates.keys().copied().collect();
        let intent = NotificationIntent::new(
            admin_id,
            TargetSelector::Explicit { ids: Vec::new() },
            ChannelSet::new(channels.clone()),
            IntentPayload::TemplateUpdate {
                notification_type: request.template_type,
                templates: request.templates,
            },
        );
        self.complete_config_intent(&intent).await;

        Ok(UpdateTemplatesResponse {
            success: true,
            template_type: request.template_type,
            channels,
            updated_at,
        })
    }

    pub async fn update_preferences(
        &self,
        admin_id: &str,
        request: UpdatePreferencesRequest,
    ) -> Result<UpdatePreferencesResponse> {
        request.validate()?;

        let preferences = self
            .resolver
            .update_preferences(
                &request.builder_id,
                request.email,
                request.sms,
                request.dashboard,
                admin_id,
            )
            .await?;

        let intent = NotificationIntent::new(
            admin_id,
            TargetSelector::Explicit {
                ids: vec![request.builder_id.clone()],
            },
            ChannelSet::new(Channel::ALL),
            IntentPayload::PreferenceUpdate {
                builder_id: request.builder_id,
                preferences: preferences.channels.clone(),
            },
        );
        self.complete_config_intent(&intent).await;

        Ok(UpdatePreferencesResponse {
            success: true,
            builder_id: preferences.builder_id,
            preferences: preferences.channels,
            updated_at: preferences.updated_at,
        })
    }

    pub async fn get_delivery_status(
        &self,
        request: GetDeliveryStatusRequest,
    ) -> Result<DeliveryStatusResponse> {
        request.validate()?;

        if self
            .builders
            .get_builder_by_id(&request.builder_id)
            .await?
            .is_none()
        {
            return Err(NotificationError::recipient_not_found(format!(
                "builder {} does not exist",
                request.builder_id
            )));
        }

        let delivery_status = self
            .tracker
            .query_status(&request.builder_id, request.time_range)
            .await?;

        Ok(DeliveryStatusResponse {
            success: true,
            delivery_status,
        })
    }

    pub async fn cancel_scheduled(
        &self,
        admin_id: &str,
        request: CancelScheduledRequest,
    ) -> Result<CancelScheduledResponse> {
        request.validate()?;

        let cancelled = self.scheduler.cancel(&request.schedule_id)?;
        self.append_audit(
            admin_id,
            AuditAction::CancelScheduledDispatch,
            json!({
                "scheduleId": cancelled.id,
                "intentId": cancelled.intent.id,
                "scheduledFor": cancelled.scheduled_at,
                "builderCount": cancelled.recipients.len(),
            }),
        )
        .await;

        Ok(CancelScheduledResponse {
            success: true,
            schedule_id: cancelled.id,
            cancelled: true,
        })
    }

    pub async fn list_templates(&self) -> Result<TemplatesResponse> {
        Ok(TemplatesResponse {
            success: true,
            templates: self.templates.list().await?,
        })
    }

    pub async fn delivery_stats(&self) -> Result<DeliveryStatsResponse> {
        Ok(DeliveryStatsResponse {
            success: true,
            stats: self.tracker.stats().await?,
        })
    }

    pub fn list_scheduled(&self) -> ScheduledListResponse {
        ScheduledListResponse {
            success: true,
            scheduled: self
                .scheduler
                .list_pending()
                .iter()
                .map(ScheduledDispatchView::from)
                .collect(),
        }
    }

    pub async fn audit_log(&self, query: &AuditQuery) -> Result<AuditLogResponse> {
        Ok(AuditLogResponse {
            success: true,
            entries: self.audit.query(query).await?,
        })
    }

    pub fn intent_state(&self, intent_id: &str) -> Option<IntentState> {
        self.dispatcher.state(intent_id)
    }

    pub fn scheduler(&self) -> &DispatchScheduler {
        &self.scheduler
    }

    pub fn metrics(&self) -> &NotificationMetrics {
        &self.metrics
    }

    pub fn dashboard_inbox(&self) -> Option<&Arc<DashboardInbox>> {
        self.dashboard_inbox.as_ref()
    }

    pub fn channel_info(&self) -> Vec<ChannelInfo> {
        self.dispatcher
            .senders()
            .values()
            .map(|sender| sender.info())
            .collect()
    }

    /// Get service health status
    pub async fn health_check(&self) -> serde_json::Value {
        let mut channels = serde_json::Map::new();
        let mut degraded = false;
        for (channel, sender) in self.dispatcher.senders() {
            let info = sender.info();
            let healthy = sender.health_check().await;
            if info.enabled && !healthy {
                degraded = true;
            }
            channels.insert(
                channel.to_string(),
                json!({
                    "enabled": info.enabled,
                    "provider": info.provider,
                    "status": if healthy { "healthy" } else { "unhealthy" },
                }),
            );
        }

        json!({
            "service": "notification",
            "status": if degraded { "degraded" } else { "healthy" },
            "timestamp": Utc::now(),
            "components": {
                "channels": channels,
                "scheduler": {
                    "enabled": self.config.scheduler.enabled,
                    "running": self.scheduler.is_running(),
                    "pending": self.scheduler.pending_count(),
                },
                "audit": {
                    "entries": self.audit.len().await,
                },
            }
        })
    }

    // Private helper methods

    async fn resolve(&self, intent: &NotificationIntent) -> Result<Vec<Recipient>> {
        self.dispatcher.set_state(&intent.id, IntentState::Created);
        self.dispatcher.set_state(&intent.id, IntentState::Resolving);

        match self.resolver.resolve(&intent.target).await {
            Ok(recipients) => Ok(recipients),
            Err(e) => {
                warn!(intent_id = %intent.id, "Recipient resolution failed: {}", e);
                self.dispatcher.set_state(&intent.id, IntentState::Rejected);
                Err(e)
            }
        }
    }

    /// Template and preference updates never fan out; they only leave an
    /// audit trail and a completed intent.
    async fn complete_config_intent(&self, intent: &NotificationIntent) {
        self.metrics.record_intent(intent.kind());
        self.dispatcher.set_state(&intent.id, IntentState::Completed);
        self.append_audit(
            &intent.initiated_by,
            AuditAction::for_intent(intent.kind()),
            json!({
                "intentId": intent.id,
                "kind": intent.kind(),
                "payload": intent.payload,
            }),
        )
        .await;
    }

    async fn append_audit(&self, admin_id: &str, action: AuditAction, details: serde_json::Value) {
        if let Err(e) = self
            .audit
            .append(AuditEntry::new(admin_id, action, details))
            .await
        {
            warn!(admin_id = %admin_id, "Failed to append audit entry: {}", e);
        }
    }
}

fn to_body<T: Serialize>(response: T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(response)?)
}

fn with_field(
    mut details: serde_json::Value,
    key: &str,
    value: serde_json::Value,
) -> serde_json::Value {
    if let Some(object) = details.as_object_mut() {
        object.insert(key.to_string(), value);
    }
    details
}
