//! Core type definitions for the notification dispatch engine
//!
//! This module contains the data model shared between the notification service
//! and any consumer of its admin API: intents, recipients, per-channel attempt
//! outcomes, aggregated reports, audit entries and templates.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// CHANNELS
// ============================================================================

/// Delivery medium for a notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Email,
    Sms,
    Dashboard,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Email, Channel::Sms, Channel::Dashboard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Dashboard => "dashboard",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "dashboard" => Ok(Channel::Dashboard),
            _ => Err(format!("Invalid channel: {}", s)),
        }
    }
}

/// Ordered, duplicate-free set of requested channels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Channel>", into = "Vec<Channel>")]
pub struct ChannelSet(Vec<Channel>);

impl ChannelSet {
    pub fn new<I: IntoIterator<Item = Channel>>(channels: I) -> Self {
        let mut set = Vec::new();
        for channel in channels {
            if !set.contains(&channel) {
                set.push(channel);
            }
        }
        Self(set)
    }

    pub fn iter(&self) -> impl Iterator<Item = Channel> + '_ {
        self.0.iter().copied()
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0.contains(&channel)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[Channel] {
        &self.0
    }
}

impl From<Vec<Channel>> for ChannelSet {
    fn from(channels: Vec<Channel>) -> Self {
        Self::new(channels)
    }
}

impl From<ChannelSet> for Vec<Channel> {
    fn from(set: ChannelSet) -> Self {
        set.0
    }
}

// ============================================================================
// COLLABORATOR RECORDS (read-only lookups)
// ============================================================================

/// Builder verification state as maintained by the builder store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

impl Default for VerificationStatus {
    fn default() -> Self {
        VerificationStatus::Pending
    }
}

/// An exhibition builder listed on the marketplace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Builder {
    pub id: String,
    pub company_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Account used for in-app dashboard notifications
    #[serde(default)]
    pub dashboard_user_id: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub service_categories: Vec<String>,
}

/// A client enquiry routed to builders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lead {
    pub id: String,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    pub project_type: String,
    #[serde(default)]
    pub event_name: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub budget: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Lead data carried inside a lead notification. Client contact details are
/// deliberately left out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadSummary {
    pub lead_id: String,
    pub client_name: String,
    pub project_type: String,
    pub event_name: Option<String>,
    pub city: Option<String>,
    pub budget: Option<String>,
}

impl From<&Lead> for LeadSummary {
    fn from(lead: &Lead) -> Self {
        Self {
            lead_id: lead.id.clone(),
            client_name: lead.client_name.clone(),
            project_type: lead.project_type.clone(),
            event_name: lead.event_name.clone(),
            city: lead.city.clone(),
            budget: lead.budget.clone(),
        }
    }
}

/// AND-combined predicates over the builder store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderFilter {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub verification_status: Option<VerificationStatus>,
    #[serde(default)]
    pub service_category: Option<String>,
}

impl BuilderFilter {
    pub fn is_empty(&self) -> bool {
        self.country.is_none()
            && self.city.is_none()
            && self.verification_status.is_none()
            && self.service_category.is_none()
    }

    pub fn matches(&self, builder: &Builder) -> bool {
        fn same(expected: &Option<String>, actual: &Option<String>) -> bool {
            match expected {
                None => true,
                Some(expected) => actual
                    .as_deref()
                    .map(|actual| actual.trim().eq_ignore_ascii_case(expected.trim()))
                    .unwrap_or(false),
            }
        }

        let status_ok = self
            .verification_status
            .map(|status| status == builder.verification_status)
            .unwrap_or(true);

        let category_ok = match &self.service_category {
            None => true,
            Some(category) => builder
                .service_categories
                .iter()
                .any(|c| c.trim().eq_ignore_ascii_case(category.trim())),
        };

        same(&self.country, &builder.country)
            && same(&self.city, &builder.city)
            && status_ok
            && category_ok
    }
}

// ============================================================================
// PREFERENCES
// ============================================================================

/// Per-channel opt-in flags for a builder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPreferences {
    pub email: bool,
    pub sms: bool,
    pub dashboard: bool,
}

impl Default for ChannelPreferences {
    fn default() -> Self {
        Self {
            email: true,
            sms: true,
            dashboard: true,
        }
    }
}

impl ChannelPreferences {
    pub fn allows(&self, channel: Channel) -> bool {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Dashboard => self.dashboard,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuilderPreferences {
    pub builder_id: String,
    pub channels: ChannelPreferences,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

// ============================================================================
// INTENTS
// ============================================================================

/// Notification type used to key template overrides
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    LeadNotification,
    BulkNotification,
    TestNotification,
}

impl fmt::Display for NotificationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LeadNotification => write!(f, "lead_notification"),
            Self::BulkNotification => write!(f, "bulk_notification"),
            Self::TestNotification => write!(f, "test_notification"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    LeadNotification,
    BulkNotification,
    TestNotification,
    TemplateUpdate,
    PreferenceUpdate,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadNotification => "lead_notification",
            Self::BulkNotification => "bulk_notification",
            Self::TestNotification => "test_notification",
            Self::TemplateUpdate => "template_update",
            Self::PreferenceUpdate => "preference_update",
        }
    }

    /// Whether intents of this kind fan out to channel senders
    pub fn is_delivery(&self) -> bool {
        matches!(
            self,
            Self::LeadNotification | Self::BulkNotification | Self::TestNotification
        )
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    Normal,
    High,
    Urgent,
}

impl Default for NotificationPriority {
    fn default() -> Self {
        NotificationPriority::Normal
    }
}

impl fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Normal => write!(f, "normal"),
            Self::High => write!(f, "high"),
            Self::Urgent => write!(f, "urgent"),
        }
    }
}

/// Which builders an intent addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TargetSelector {
    Explicit { ids: Vec<String> },
    Filter { filter: BuilderFilter },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateContent {
    #[serde(default)]
    pub subject: Option<String>,
    pub content: String,
}

/// Kind-specific data of an intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntentPayload {
    LeadNotification {
        lead: LeadSummary,
        custom_message: Option<String>,
        priority: NotificationPriority,
    },
    BulkNotification {
        message: String,
        priority: NotificationPriority,
    },
    TestNotification {
        test_type: String,
        custom_message: Option<String>,
    },
    TemplateUpdate {
        notification_type: NotificationType,
        templates: BTreeMap<Channel, TemplateContent>,
    },
    PreferenceUpdate {
        builder_id: String,
        preferences: ChannelPreferences,
    },
}

impl IntentPayload {
    pub fn kind(&self) -> IntentKind {
        match self {
            Self::LeadNotification { .. } => IntentKind::LeadNotification,
            Self::BulkNotification { .. } => IntentKind::BulkNotification,
            Self::TestNotification { .. } => IntentKind::TestNotification,
            Self::TemplateUpdate { .. } => IntentKind::TemplateUpdate,
            Self::PreferenceUpdate { .. } => IntentKind::PreferenceUpdate,
        }
    }

    /// Template key for delivery payloads
    pub fn notification_type(&self) -> Option<NotificationType> {
        match self {
            Self::LeadNotification { .. } => Some(NotificationType::LeadNotification),
            Self::BulkNotification { .. } => Some(NotificationType::BulkNotification),
            Self::TestNotification { .. } => Some(NotificationType::TestNotification),
            Self::TemplateUpdate { .. } | Self::PreferenceUpdate { .. } => None,
        }
    }

    pub fn priority(&self) -> NotificationPriority {
        match self {
            Self::LeadNotification { priority, .. } | Self::BulkNotification { priority, .. } => {
                *priority
            }
            _ => NotificationPriority::Normal,
        }
    }
}

/// One administrative notification request before resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIntent {
    pub id: String,
    pub initiated_by: String,
    pub target: TargetSelector,
    pub channels: ChannelSet,
    pub payload: IntentPayload,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl NotificationIntent {
    pub fn new(
        initiated_by: impl Into<String>,
        target: TargetSelector,
        channels: ChannelSet,
        payload: IntentPayload,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            initiated_by: initiated_by.into(),
            target,
            channels,
            payload,
            scheduled_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn scheduled_for(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_at = Some(at);
        self
    }

    pub fn kind(&self) -> IntentKind {
        self.payload.kind()
    }
}

/// Lifecycle of an intent inside the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentState {
    Created,
    Scheduled,
    Resolving,
    Dispatching,
    Completed,
    /// Recipient resolution failed; nothing was dispatched
    Rejected,
}

impl IntentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentState::Completed | IntentState::Rejected)
    }
}

// ============================================================================
// RECIPIENTS
// ============================================================================

/// A builder resolved for one dispatch, with its reachable addresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    pub id: String,
    pub display_name: String,
    pub contact_channels: BTreeMap<Channel, String>,
}

impl Recipient {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            contact_channels: BTreeMap::new(),
        }
    }

    pub fn with_contact(mut self, channel: Channel, address: impl Into<String>) -> Self {
        self.contact_channels.insert(channel, address.into());
        self
    }

    /// Non-empty address for `channel`, if any
    pub fn address_for(&self, channel: Channel) -> Option<&str> {
        self.contact_channels
            .get(&channel)
            .map(|address| address.trim())
            .filter(|address| !address.is_empty())
    }

    pub fn from_builder(builder: &Builder) -> Self {
        let mut recipient = Recipient::new(&builder.id, &builder.company_name);
        let contacts = [
            (Channel::Email, &builder.email),
            (Channel::Sms, &builder.phone),
            (Channel::Dashboard, &builder.dashboard_user_id),
        ];
        for (channel, address) in contacts {
            if let Some(address) = address {
                recipient.contact_channels.insert(channel, address.clone());
            }
        }
        recipient
    }
}

// ============================================================================
// DISPATCH RESULTS
// ============================================================================

/// Why a channel attempt (or a whole recipient) failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    ProviderUnavailable,
    InvalidAddress,
    RateLimited,
    Timeout,
    NoUsableChannel,
    Unexpected,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable => write!(f, "provider_unavailable"),
            Self::InvalidAddress => write!(f, "invalid_address"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::Timeout => write!(f, "timeout"),
            Self::NoUsableChannel => write!(f, "no_usable_channel"),
            Self::Unexpected => write!(f, "unexpected"),
        }
    }
}

/// Outcome of one (recipient, channel) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAttemptResult {
    pub intent_id: String,
    pub channel: Channel,
    pub recipient_id: String,
    /// Masked form of the address the attempt targeted
    pub contact: String,
    pub succeeded: bool,
    pub tracking_id: Option<String>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_reason: Option<FailureReason>,
    pub error_message: Option<String>,
}

impl ChannelAttemptResult {
    pub fn delivered(
        intent_id: impl Into<String>,
        channel: Channel,
        recipient_id: impl Into<String>,
        contact: impl Into<String>,
        tracking_id: impl Into<String>,
        delivered_at: DateTime<Utc>,
    ) -> Self {
        Self {
            intent_id: intent_id.into(),
            channel,
            recipient_id: recipient_id.into(),
            contact: contact.into(),
            succeeded: true,
            tracking_id: Some(tracking_id.into()),
            delivered_at: Some(delivered_at),
            error_reason: None,
            error_message: None,
        }
    }

    pub fn failed(
        intent_id: impl Into<String>,
        channel: Channel,
        recipient_id: impl Into<String>,
        contact: impl Into<String>,
        reason: FailureReason,
        message: impl Into<String>,
    ) -> Self {
        Self {
            intent_id: intent_id.into(),
            channel,
            recipient_id: recipient_id.into(),
            contact: contact.into(),
            succeeded: false,
            tracking_id: None,
            delivered_at: None,
            error_reason: Some(reason),
            error_message: Some(message.into()),
        }
    }
}

/// All channel attempts for one recipient within one intent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientDispatchResult {
    pub recipient_id: String,
    pub recipient_name: String,
    pub attempts: Vec<ChannelAttemptResult>,
    pub overall_succeeded: bool,
    pub successful_channels: Vec<Channel>,
    pub failure_reasons: Vec<FailureReason>,
}

impl RecipientDispatchResult {
    pub fn from_attempts(
        recipient_id: impl Into<String>,
        recipient_name: impl Into<String>,
        attempts: Vec<ChannelAttemptResult>,
    ) -> Self {
        let successful_channels: Vec<Channel> = attempts
            .iter()
            .filter(|attempt| attempt.succeeded)
            .map(|attempt| attempt.channel)
            .collect();

        let mut failure_reasons = Vec::new();
        for reason in attempts.iter().filter_map(|attempt| attempt.error_reason) {
            if !failure_reasons.contains(&reason) {
                failure_reasons.push(reason);
            }
        }

        Self {
            recipient_id: recipient_id.into(),
            recipient_name: recipient_name.into(),
            overall_succeeded: !successful_channels.is_empty(),
            successful_channels,
            failure_reasons,
            attempts,
        }
    }

    /// A recipient that was never attempted, failing with `reason`
    pub fn unattempted(
        recipient_id: impl Into<String>,
        recipient_name: impl Into<String>,
        reason: FailureReason,
    ) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            recipient_name: recipient_name.into(),
            attempts: Vec::new(),
            overall_succeeded: false,
            successful_channels: Vec::new(),
            failure_reasons: vec![reason],
        }
    }
}

/// Aggregate of one intent execution; immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDispatchReport {
    pub intent_id: String,
    pub kind: IntentKind,
    pub results: Vec<RecipientDispatchResult>,
    pub success_count: usize,
    pub total_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl IntentDispatchReport {
    pub fn new(
        intent_id: impl Into<String>,
        kind: IntentKind,
        results: Vec<RecipientDispatchResult>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let success_count = results.iter().filter(|r| r.overall_succeeded).count();
        Self {
            intent_id: intent_id.into(),
            kind,
            total_count: results.len(),
            success_count,
            results,
            started_at,
            completed_at: Utc::now(),
        }
    }

    pub fn failed_count(&self) -> usize {
        self.total_count - self.success_count
    }

    pub fn failures(&self) -> impl Iterator<Item = &RecipientDispatchResult> {
        self.results.iter().filter(|r| !r.overall_succeeded)
    }
}

// ============================================================================
// AUDIT, TEMPLATES, SCHEDULING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    SendLeadNotification,
    BulkNotify,
    TestNotification,
    UpdateTemplates,
    UpdatePreferences,
    ScheduleDispatch,
    CancelScheduledDispatch,
}

impl AuditAction {
    pub fn for_intent(kind: IntentKind) -> Self {
        match kind {
            IntentKind::LeadNotification => Self::SendLeadNotification,
            IntentKind::BulkNotification => Self::BulkNotify,
            IntentKind::TestNotification => Self::TestNotification,
            IntentKind::TemplateUpdate => Self::UpdateTemplates,
            IntentKind::PreferenceUpdate => Self::UpdatePreferences,
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("Invalid audit action: {}", s))
    }
}

/// Immutable record of an administrative action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: String,
    pub admin_id: String,
    pub action: AuditAction,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(admin_id: impl Into<String>, action: AuditAction, details: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            admin_id: admin_id.into(),
            action,
            details,
            timestamp: Utc::now(),
        }
    }
}

/// Admin-configured override for one (notification type, channel) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub subject: Option<String>,
    pub content: String,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

/// An intent with its resolved recipients, waiting for its fire time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledDispatch {
    pub id: String,
    pub intent: NotificationIntent,
    pub recipients: Vec<Recipient>,
    pub scheduled_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// DELIVERY TRACKING
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
    #[serde(rename = "all")]
    All,
}

impl Default for TimeRange {
    fn default() -> Self {
        TimeRange::LastWeek
    }
}

impl TimeRange {
    /// Lower bound of the range relative to `now`; `None` means unbounded
    pub fn since(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::LastHour => Some(now - Duration::hours(1)),
            Self::LastDay => Some(now - Duration::days(1)),
            Self::LastWeek => Some(now - Duration::days(7)),
            Self::LastMonth => Some(now - Duration::days(30)),
            Self::All => None,
        }
    }
}

/// One persisted attempt in a recipient's delivery history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecord {
    pub attempt: ChannelAttemptResult,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelDeliveryStats {
    pub attempted: u64,
    pub delivered: u64,
    pub failed: u64,
    pub delivery_rate: f32,
}

impl ChannelDeliveryStats {
    pub fn record(&mut self, succeeded: bool) {
        self.attempted += 1;
        if succeeded {
            self.delivered += 1;
        } else {
            self.failed += 1;
        }
        self.delivery_rate = self.delivered as f32 / self.attempted as f32;
    }
}

/// Delivery history of one builder over a time range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusSummary {
    pub builder_id: String,
    pub time_range: TimeRange,
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    pub by_channel: BTreeMap<Channel, ChannelDeliveryStats>,
    pub last_delivered_at: Option<DateTime<Utc>>,
    pub history: Vec<DeliveryRecord>,
}

/// Platform-wide delivery figures
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStats {
    pub total_attempts: u64,
    pub successful: u64,
    pub failed: u64,
    pub success_rate: f32,
    pub recipients_tracked: usize,
    pub by_channel: BTreeMap<Channel, ChannelDeliveryStats>,
}
