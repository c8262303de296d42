//! Notification channels module
//!
//! Each channel has two halves:
//! - a [`ChannelProvider`], the thing that actually moves bytes (SMTP relay,
//!   SMS gateway, in-process dashboard inbox, or a test fake)
//! - a [`ChannelSender`], which validates the address, applies the channel's
//!   rate limit and timeout, and turns every provider outcome into a
//!   [`ChannelAttemptResult`]. Senders never return an error.

use crate::masking::mask_contact;
use crate::templates::RenderedContent;
use expo_shared::types::{Channel, ChannelAttemptResult, FailureReason, NotificationPriority};

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub mod dashboard;
pub mod email;
pub mod sms;

pub use dashboard::{DashboardChannel, DashboardInbox, DashboardMessage};
pub use email::{EmailChannel, LoggingEmailProvider};
pub use sms::{LoggingSmsProvider, SmsChannel};

#[cfg(feature = "smtp")]
pub use email::SmtpEmailProvider;

pub type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Senders keyed by the channel they serve
pub type SenderMap = BTreeMap<Channel, Arc<dyn ChannelSender>>;

/// A fully rendered message for one address on one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub intent_id: String,
    pub recipient_id: String,
    pub channel: Channel,
    pub address: String,
    pub subject: Option<String>,
    pub body: String,
    pub priority: NotificationPriority,
}

/// What a provider hands back on acceptance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReceipt {
    pub provider_message_id: Option<String>,
}

/// Provider-side failure, classified for the attempt result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}: {message}")]
pub struct ProviderError {
    pub reason: FailureReason,
    pub message: String,
}

impl ProviderError {
    pub fn new<S: Into<String>>(reason: FailureReason, message: S) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }

    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        Self::new(FailureReason::ProviderUnavailable, message)
    }

    pub fn invalid_address<S: Into<String>>(message: S) -> Self {
        Self::new(FailureReason::InvalidAddress, message)
    }
}

/// External delivery mechanism for one channel
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError>;

    async fn health_check(&self) -> bool;
}

/// Everything a sender needs to attempt one delivery
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub intent_id: String,
    pub recipient_id: String,
    /// Raw address; only its masked form leaves the sender
    pub address: String,
    pub content: RenderedContent,
    pub priority: NotificationPriority,
}

/// Trait that all channel senders implement
#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;

    /// Attempt delivery. Every failure mode is reported in the result.
    async fn send(&self, request: DeliveryRequest) -> ChannelAttemptResult;

    async fn health_check(&self) -> bool;

    fn info(&self) -> ChannelInfo;
}

/// Information about a notification channel
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelInfo {
    pub name: String,
    pub description: String,
    pub provider: String,
    pub enabled: bool,
    pub rate_limit_per_minute: Option<u32>,
    pub timeout_ms: u64,
}

/// Shared attempt pipeline used by every channel sender
pub struct SenderCore {
    channel: Channel,
    provider: Arc<dyn ChannelProvider>,
    limiter: Option<DirectRateLimiter>,
    rate_limit_per_minute: Option<u32>,
    timeout: Duration,
    enabled: bool,
}

impl SenderCore {
    pub fn new(channel: Channel, provider: Arc<dyn ChannelProvider>, timeout: Duration) -> Self {
        Self {
            channel,
            provider,
            limiter: None,
            rate_limit_per_minute: None,
            timeout,
            enabled: true,
        }
    }

    /// Cap provider calls per minute; a zero limit is treated as one.
    pub fn with_rate_limit(mut self, per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(per_minute).unwrap_or(NonZeroU32::MIN);
        self.limiter = Some(RateLimiter::direct(Quota::per_minute(per_minute)));
        self.rate_limit_per_minute = Some(per_minute.get());
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub async fn health_check(&self) -> bool {
        self.enabled && self.provider.health_check().await
    }

    pub fn info(&self, name: &str, description: &str) -> ChannelInfo {
        ChannelInfo {
            name: name.to_string(),
            description: description.to_string(),
            provider: self.provider.name().to_string(),
            enabled: self.enabled,
            rate_limit_per_minute: self.rate_limit_per_minute,
            timeout_ms: self.timeout.as_millis() as u64,
        }
    }

    /// Run one attempt. `address_check` is the channel's own address
    /// validation, already evaluated by the caller.
    pub async fn attempt(
        &self,
        request: DeliveryRequest,
        address_check: std::result::Result<(), String>,
    ) -> ChannelAttemptResult {
        let masked = mask_contact(self.channel, &request.address);
        let fail = |reason: FailureReason, message: String| {
            warn!(
                intent_id = %request.intent_id,
                recipient_id = %request.recipient_id,
                channel = %self.channel,
                contact = %masked,
                reason = %reason,
                "Channel attempt failed: {}", message
            );
            ChannelAttemptResult::failed(
                request.intent_id.clone(),
                self.channel,
                request.recipient_id.clone(),
                masked.clone(),
                reason,
                message,
            )
        };

        if !self.enabled {
            return fail(
                FailureReason::ProviderUnavailable,
                format!("{} channel is disabled", self.channel),
            );
        }

        if let Err(message) = address_check {
            return fail(FailureReason::InvalidAddress, message);
        }

        if let Some(limiter) = &self.limiter {
            if limiter.check().is_err() {
                return fail(
                    FailureReason::RateLimited,
                    format!("{} rate limit exceeded", self.channel),
                );
            }
        }

        let message = OutboundMessage {
            intent_id: request.intent_id.clone(),
            recipient_id: request.recipient_id.clone(),
            channel: self.channel,
            address: request.address.trim().to_string(),
            subject: request.content.subject.clone(),
            body: request.content.body.clone(),
            priority: request.priority,
        };

        let delivery =
            AssertUnwindSafe(async { self.provider.deliver(&message).await }).catch_unwind();

        match tokio::time::timeout(self.timeout, delivery).await {
            Err(_) => fail(
                FailureReason::Timeout,
                format!(
                    "{} provider did not answer within {}ms",
                    self.provider.name(),
                    self.timeout.as_millis()
                ),
            ),
            Ok(Err(_)) => fail(
                FailureReason::Unexpected,
                format!("{} provider panicked", self.provider.name()),
            ),
            Ok(Ok(Err(e))) => fail(e.reason, e.message),
            Ok(Ok(Ok(receipt))) => {
                let tracking_id = format!("{}-{}", self.channel, Uuid::new_v4());
                info!(
                    intent_id = %request.intent_id,
                    recipient_id = %request.recipient_id,
                    channel = %self.channel,
                    contact = %masked,
                    tracking_id = %tracking_id,
                    "Channel attempt delivered"
                );
                if let Some(provider_id) = receipt.provider_message_id {
                    debug!(
                        tracking_id = %tracking_id,
                        provider_message_id = %provider_id,
                        "Provider receipt"
                    );
                }
                ChannelAttemptResult::delivered(
                    request.intent_id,
                    self.channel,
                    request.recipient_id,
                    masked,
                    tracking_id,
                    Utc::now(),
                )
            }
        }
    }
}
