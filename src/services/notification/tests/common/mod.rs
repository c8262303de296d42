//! Shared fixtures for the notification service integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use expo_shared::types::*;
use notification_service::channels::{
    ChannelProvider, EmailChannel, OutboundMessage, ProviderError, ProviderReceipt, SenderCore,
};
use notification_service::recipients::InMemoryDirectory;
use notification_service::{NotificationConfig, NotificationManager, ServiceComponents};

/// Email provider that refuses a fixed set of addresses and counts calls
#[derive(Default)]
pub struct ScriptedEmailProvider {
    refused: HashSet<String>,
    calls: AtomicUsize,
}

impl ScriptedEmailProvider {
    pub fn refusing(addresses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            refused: addresses.iter().map(|a| a.to_string()).collect(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChannelProvider for ScriptedEmailProvider {
    fn name(&self) -> &'static str {
        "scripted-email"
    }

    async fn deliver(&self, message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.refused.contains(&message.address) {
            return Err(ProviderError::unavailable("relay refused the connection"));
        }
        Ok(ProviderReceipt {
            provider_message_id: Some(format!("scripted-{}", message.recipient_id)),
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Email provider whose relay client panics on every call
pub struct PanickingEmailProvider;

#[async_trait]
impl ChannelProvider for PanickingEmailProvider {
    fn name(&self) -> &'static str {
        "panicking-email"
    }

    async fn deliver(&self, _message: &OutboundMessage) -> Result<ProviderReceipt, ProviderError> {
        panic!("smtp client state corrupted");
    }

    async fn health_check(&self) -> bool {
        true
    }
}

pub fn builder(id: &str, email: Option<&str>, dashboard: Option<&str>) -> Builder {
    Builder {
        id: id.to_string(),
        company_name: format!("Stand Builder {}", id),
        email: email.map(str::to_string),
        phone: None,
        dashboard_user_id: dashboard.map(str::to_string),
        country: Some("Germany".to_string()),
        city: Some("Berlin".to_string()),
        verification_status: VerificationStatus::Verified,
        service_categories: vec!["Custom Stands".to_string()],
    }
}

pub fn lead(id: &str) -> Lead {
    Lead {
        id: id.to_string(),
        client_name: "Nordlicht Events".to_string(),
        client_email: Some("events@nordlicht.test".to_string()),
        client_phone: None,
        project_type: "Island stand".to_string(),
        event_name: Some("ITB Berlin".to_string()),
        city: Some("Berlin".to_string()),
        budget: Some("80k EUR".to_string()),
        created_at: Utc::now(),
    }
}

/// Directory with three builders:
/// - `b-1` has neither email nor dashboard account
/// - `b-2` uses an address the email relay refuses
/// - `b-3` is reachable on email and dashboard
pub fn directory() -> Arc<InMemoryDirectory> {
    let directory = InMemoryDirectory::new();
    directory.insert_builder(builder("b-1", None, None));
    directory.insert_builder(builder("b-2", Some("refused@example.com"), Some("user-2")));
    directory.insert_builder(builder("b-3", Some("ok@example.com"), Some("user-3")));
    directory.insert_lead(lead("lead-1"));
    Arc::new(directory)
}

pub struct TestService {
    pub manager: NotificationManager,
    pub email: Arc<ScriptedEmailProvider>,
}

pub fn service_with(config: NotificationConfig) -> TestService {
    let email = ScriptedEmailProvider::refusing(&["refused@example.com"]);
    let core = SenderCore::new(Channel::Email, email.clone(), Duration::from_secs(2));

    let components = ServiceComponents::with_directory(&config, directory())
        .expect("components")
        .with_sender(Arc::new(EmailChannel::new(core)));

    TestService {
        manager: NotificationManager::new(config, components).expect("manager"),
        email,
    }
}

/// Manager over the standard directory with `provider` serving email
pub fn manager_with_email_provider(provider: Arc<dyn ChannelProvider>) -> NotificationManager {
    let config = NotificationConfig::default();
    let core = SenderCore::new(Channel::Email, provider, Duration::from_secs(2));
    let components = ServiceComponents::with_directory(&config, directory())
        .expect("components")
        .with_sender(Arc::new(EmailChannel::new(core)));
    NotificationManager::new(config, components).expect("manager")
}

pub fn service() -> TestService {
    service_with(NotificationConfig::default())
}
