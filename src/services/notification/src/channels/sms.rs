//! SMS notification channel

use crate::channels::{
    ChannelInfo, ChannelProvider, ChannelSender, DeliveryRequest, OutboundMessage, ProviderError,
    ProviderReceipt, SenderCore,
};
use crate::config::SmsConfig;
use crate::masking::mask_phone;
use expo_shared::types::{Channel, ChannelAttemptResult};

use async_trait::async_trait;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

/// Accepts `+`, digits and common separators; 7 to 15 digits (E.164 range).
pub fn validate_phone(address: &str) -> Result<(), String> {
    let address = address.trim();
    let allowed = address
        .chars()
        .enumerate()
        .all(|(i, c)| {
            c.is_ascii_digit() || matches!(c, ' ' | '-' | '(' | ')' | '.') || (c == '+' && i == 0)
        });
    let digits = address.chars().filter(|c| c.is_ascii_digit()).count();

    if !allowed || !(7..=15).contains(&digits) {
        return Err(format!("malformed phone number {}", mask_phone(address)));
    }
    Ok(())
}

/// SMS channel sender
pub struct SmsChannel {
    core: SenderCore,
}

impl SmsChannel {
    pub fn new(core: SenderCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ChannelSender for SmsChannel {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, request: DeliveryRequest) -> ChannelAttemptResult {
        let check = validate_phone(&request.address);
        self.core.attempt(request, check).await
    }

    async fn health_check(&self) -> bool {
        self.core.health_check().await
    }

    fn info(&self) -> ChannelInfo {
        self.core.info("SMS", "Short text messages to builder phone numbers")
    }
}

/// Simulated SMS gateway; in production this is a Twilio or SNS client
pub struct LoggingSmsProvider {
    sender_id: String,
    latency: Duration,
}

impl LoggingSmsProvider {
    pub fn new(config: &SmsConfig) -> Self {
        Self {
            sender_id: config.sender_id.clone(),
            latency: Duration::from_millis(config.simulated_latency_ms),
        }
    }
}

#[async_trait]
impl ChannelProvider for LoggingSmsProvider {
    fn name(&self) -> &'static str {
        "logging-sms"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        // Simulate API call
        tokio::time::sleep(self.latency).await;

        info!(
            intent_id = %message.intent_id,
            sender_id = %self.sender_id,
            to = %mask_phone(&message.address),
            length = message.body.chars().count(),
            "SMS accepted by simulated gateway"
        );

        Ok(ProviderReceipt {
            provider_message_id: Some(format!("SM{}", Uuid::new_v4().simple())),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}
