//! Email notification channel

use crate::channels::{
    ChannelInfo, ChannelProvider, ChannelSender, DeliveryRequest, OutboundMessage, ProviderError,
    ProviderReceipt, SenderCore,
};
use crate::config::EmailConfig;
use crate::masking::mask_email;
use expo_shared::types::{Channel, ChannelAttemptResult};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("email pattern is valid")
});

pub fn validate_email(address: &str) -> Result<(), String> {
    let address = address.trim();
    if address.len() > 254 || !EMAIL_REGEX.is_match(address) {
        return Err(format!("malformed email address {}", mask_email(address)));
    }
    Ok(())
}

/// Email channel sender
pub struct EmailChannel {
    core: SenderCore,
}

impl EmailChannel {
    pub fn new(core: SenderCore) -> Self {
        Self { core }
    }
}

#[async_trait]
impl ChannelSender for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, request: DeliveryRequest) -> ChannelAttemptResult {
        let check = validate_email(&request.address);
        self.core.attempt(request, check).await
    }

    async fn health_check(&self) -> bool {
        self.core.health_check().await
    }

    fn info(&self) -> ChannelInfo {
        self.core.info("Email", "Transactional email to builder contact addresses")
    }
}

/// Simulated mail relay that logs instead of sending
pub struct LoggingEmailProvider {
    from: String,
    latency: Duration,
}

impl LoggingEmailProvider {
    pub fn new(config: &EmailConfig) -> Self {
        Self {
            from: format!("{} <{}>", config.from_name, config.from_email),
            latency: Duration::from_millis(20),
        }
    }
}

#[async_trait]
impl ChannelProvider for LoggingEmailProvider {
    fn name(&self) -> &'static str {
        "logging-email"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        tokio::time::sleep(self.latency).await;

        info!(
            intent_id = %message.intent_id,
            from = %self.from,
            to = %mask_email(&message.address),
            subject = message.subject.as_deref().unwrap_or(""),
            "Email accepted by simulated relay"
        );

        Ok(ProviderReceipt {
            provider_message_id: Some(format!("<{}@expobuild.local>", Uuid::new_v4())),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

#[cfg(feature = "smtp")]
pub use smtp::SmtpEmailProvider;

#[cfg(feature = "smtp")]
mod smtp {
    use super::*;
    use crate::error::{NotificationError, Result};
    use lettre::{
        message::{header::ContentType, Mailbox},
        transport::smtp::{authentication::Credentials, PoolConfig},
        AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    };
    use tracing::{error, warn};

    /// Email delivery through an SMTP relay
    pub struct SmtpEmailProvider {
        transport: AsyncSmtpTransport<Tokio1Executor>,
        from_mailbox: Mailbox,
    }

    impl SmtpEmailProvider {
        pub fn new(config: &EmailConfig, timeout: Duration) -> Result<Self> {
            info!("Initializing SMTP email provider");

            let from_mailbox = format!("{} <{}>", config.from_name, config.from_email)
                .parse::<Mailbox>()
                .map_err(|e| NotificationError::config(format!("Invalid from email address: {}", e)))?;

            let mut transport_builder = if config.smtp_use_starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host).map_err(
                    |e| NotificationError::config(format!("Failed to create SMTP relay: {}", e)),
                )?
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            };

            transport_builder = transport_builder.port(config.smtp_port);

            if !config.smtp_username.is_empty() && !config.smtp_password.is_empty() {
                let creds =
                    Credentials::new(config.smtp_username.clone(), config.smtp_password.clone());
                transport_builder = transport_builder.credentials(creds);
            }

            let transport = transport_builder
                .pool_config(PoolConfig::new().max_size(10).min_idle(2))
                .timeout(Some(timeout))
                .build();

            Ok(Self {
                transport,
                from_mailbox,
            })
        }

        fn build_message(&self, message: &OutboundMessage) -> std::result::Result<Message, ProviderError> {
            let to_mailbox = message
                .address
                .parse::<Mailbox>()
                .map_err(|e| ProviderError::invalid_address(format!("Invalid recipient email: {}", e)))?;

            Message::builder()
                .from(self.from_mailbox.clone())
                .to(to_mailbox)
                .subject(message.subject.clone().unwrap_or_default())
                .header(ContentType::TEXT_PLAIN)
                .body(message.body.clone())
                .map_err(|e| ProviderError::unavailable(format!("Failed to build email message: {}", e)))
        }
    }

    #[async_trait]
    impl ChannelProvider for SmtpEmailProvider {
        fn name(&self) -> &'static str {
            "smtp"
        }

        async fn deliver(&self, message: &OutboundMessage) -> std::result::Result<ProviderReceipt, ProviderError> {
            let email = self.build_message(message)?;

            match self.transport.send(email).await {
                Ok(response) => Ok(ProviderReceipt {
                    provider_message_id: response.message().next().map(|line| line.to_string()),
                }),
                Err(e) => {
                    error!(intent_id = %message.intent_id, "SMTP send failed: {}", e);
                    Err(ProviderError::unavailable(format!("SMTP error: {}", e)))
                }
            }
        }

        async fn health_check(&self) -> bool {
            match self.transport.test_connection().await {
                Ok(connected) => connected,
                Err(e) => {
                    warn!("SMTP health check error: {}", e);
                    false
                }
            }
        }
    }
}

/// Build the email provider for this build: SMTP when the `smtp` feature is
/// on and a relay host is configured, the logging relay otherwise.
#[cfg_attr(not(feature = "smtp"), allow(unused_variables))]
pub fn default_provider(
    config: &EmailConfig,
    timeout: Duration,
) -> crate::error::Result<Arc<dyn ChannelProvider>> {
    #[cfg(feature = "smtp")]
    {
        if !config.smtp_host.trim().is_empty() && config.smtp_host != "localhost" {
            return Ok(Arc::new(SmtpEmailProvider::new(config, timeout)?));
        }
    }
    Ok(Arc::new(LoggingEmailProvider::new(config)))
}
