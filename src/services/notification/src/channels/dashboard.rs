//! In-app dashboard notifications
//!
//! The dashboard provider is an in-process inbox per builder, bounded so a
//! chatty platform cannot grow it without limit. The builder portal reads it
//! through [`DashboardInbox::messages_for`].

use crate::channels::{
    ChannelInfo, ChannelProvider, ChannelSender, DeliveryRequest, OutboundMessage, ProviderError,
    ProviderReceipt, SenderCore,
};
use expo_shared::types::{Channel, ChannelAttemptResult, NotificationPriority};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMessage {
    pub id: String,
    pub builder_id: String,
    pub account_id: String,
    pub intent_id: String,
    pub title: Option<String>,
    pub body: String,
    pub priority: NotificationPriority,
    pub created_at: DateTime<Utc>,
}

/// Per-builder bounded inbox
pub struct DashboardInbox {
    capacity: usize,
    inboxes: DashMap<String, VecDeque<DashboardMessage>>,
}

impl DashboardInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inboxes: DashMap::new(),
        }
    }

    /// Newest first
    pub fn messages_for(&self, builder_id: &str) -> Vec<DashboardMessage> {
        self.inboxes
            .get(builder_id)
            .map(|inbox| inbox.iter().rev().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, builder_id: &str) -> usize {
        self.inboxes.get(builder_id).map(|inbox| inbox.len()).unwrap_or(0)
    }
}

#[async_trait]
impl ChannelProvider for DashboardInbox {
    fn name(&self) -> &'static str {
        "dashboard-inbox"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        let entry = DashboardMessage {
            id: Uuid::new_v4().to_string(),
            builder_id: message.recipient_id.clone(),
            account_id: message.address.clone(),
            intent_id: message.intent_id.clone(),
            title: message.subject.clone(),
            body: message.body.clone(),
            priority: message.priority,
            created_at: Utc::now(),
        };
        let id = entry.id.clone();

        let mut inbox = self.inboxes.entry(message.recipient_id.clone()).or_default();
        while inbox.len() >= self.capacity {
            inbox.pop_front();
        }
        inbox.push_back(entry);

        debug!(
            builder_id = %message.recipient_id,
            inbox_size = inbox.len(),
            "Dashboard message stored"
        );

        Ok(ProviderReceipt {
            provider_message_id: Some(id),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn validate_account(address: &str) -> Result<(), String> {
    let address = address.trim();
    if address.is_empty() || address.chars().any(char::is_whitespace) {
        return Err("dashboard account id must be a single non-empty token".to_string());
    }
    Ok(())
}

/// Dashboard channel sender
pub struct DashboardChannel {
    core: SenderCore,
}

impl DashboardChannel {
    pub fn new(core: SenderCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ChannelSender for DashboardChannel {
    fn channel(&self) -> Channel {
        Channel::Dashboard
    }

    async fn send(&self, request: DeliveryRequest) -> ChannelAttemptResult {
        let check = validate_account(&request.address);
        self.core.attempt(request, check).await
    }

    async fn health_check(&self) -> bool {
        self.core.health_check().await
    }

    fn info(&self) -> ChannelInfo {
        self.core.info("Dashboard", "In-app notifications on the builder dashboard")
    }
}
