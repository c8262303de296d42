//! Template resolution for notification content
//!
//! Admin overrides are keyed by (notification type, channel) and stored in an
//! injected [`TemplateStore`]. Overrides are Handlebars templates; when none
//! exists, or it fails to render, content comes from [`default_content`],
//! which depends only on its arguments.

use crate::error::{NotificationError, Result};
use expo_shared::types::*;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handlebars::Handlebars;
use parking_lot::RwLock;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Subject (email and dashboard only) and body ready for a channel sender
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedContent {
    pub subject: Option<String>,
    pub body: String,
}

/// Storage for template overrides
#[async_trait]
pub trait TemplateStore: Send + Sync {
    async fn get(
        &self,
        notification_type: NotificationType,
        channel: Channel,
    ) -> Result<Option<Template>>;

    /// Write one update's templates as a unit. A stored template newer than
    /// the incoming one is kept, so concurrent updates never interleave.
    async fn put_all(&self, templates: Vec<Template>) -> Result<()>;

    async fn list(&self) -> Result<Vec<Template>>;
}

#[derive(Default)]
pub struct InMemoryTemplateStore {
    templates: RwLock<BTreeMap<(NotificationType, Channel), Template>>,
}

impl InMemoryTemplateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TemplateStore for InMemoryTemplateStore {
    async fn get(
        &self,
        notification_type: NotificationType,
        channel: Channel,
    ) -> Result<Option<Template>> {
        Ok(self
            .templates
            .read()
            .get(&(notification_type, channel))
            .cloned())
    }

    async fn put_all(&self, templates: Vec<Template>) -> Result<()> {
        let mut stored = self.templates.write();
        for template in templates {
            let key = (template.notification_type, template.channel);
            let superseded = stored
                .get(&key)
                .map_or(false, |existing| existing.updated_at > template.updated_at);
            if superseded {
                debug!(
                    notification_type = %template.notification_type,
                    channel = %template.channel,
                    "Skipping template older than the stored one"
                );
            } else {
                stored.insert(key, template);
            }
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Template>> {
        Ok(self.templates.read().values().cloned().collect())
    }
}

/// Looks up overrides and turns an intent payload into channel content
#[derive(Clone)]
pub struct TemplateResolver {
    store: Arc<dyn TemplateStore>,
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateResolver {
    pub fn new(store: Arc<dyn TemplateStore>) -> Self {
        let mut handlebars = Handlebars::new();

        // Missing variables render as empty rather than failing the send
        handlebars.set_strict_mode(false);
        // Content is plain text for every channel
        handlebars.register_escape_fn(handlebars::no_escape);

        Self {
            store,
            handlebars: Arc::new(handlebars),
        }
    }

    /// Pure lookup of the override for `(notification_type, channel)`
    pub async fn resolve(
        &self,
        notification_type: NotificationType,
        channel: Channel,
    ) -> Result<Option<Template>> {
        self.store.get(notification_type, channel).await
    }

    /// Store overrides for every channel in `templates`. All syntax is checked
    /// before anything is written; every written template shares one
    /// `updated_at`.
    pub async fn update(
        &self,
        notification_type: NotificationType,
        templates: &BTreeMap<Channel, TemplateContent>,
        updated_by: &str,
    ) -> Result<DateTime<Utc>> {
        if templates.is_empty() {
            return Err(NotificationError::validation(
                "templates",
                "at least one channel template is required",
            ));
        }

        for (channel, content) in templates {
            if content.content.trim().is_empty() {
                return Err(NotificationError::validation(
                    format!("templates.{}", channel),
                    "content must not be empty",
                ));
            }
            validate_template_syntax(content.subject.as_deref().unwrap_or(""), &content.content)?;
        }

        let updated_at = Utc::now();
        let batch = templates
            .iter()
            .map(|(channel, content)| Template {
                notification_type,
                channel: *channel,
                subject: content.subject.clone(),
                content: content.content.clone(),
                updated_by: updated_by.to_string(),
                updated_at,
            })
            .collect();
        self.store.put_all(batch).await?;

        info!(
            notification_type = %notification_type,
            channels = templates.len(),
            updated_by = %updated_by,
            "Template overrides updated"
        );

        Ok(updated_at)
    }

    pub async fn list(&self) -> Result<Vec<Template>> {
        self.store.list().await
    }

    /// Content for one recipient on one channel. Store or render failures fall
    /// back to the built-in default; they never fail the attempt.
    pub async fn content_for(
        &self,
        payload: &IntentPayload,
        channel: Channel,
        recipient_name: &str,
    ) -> RenderedContent {
        let Some(notification_type) = payload.notification_type() else {
            return default_content(payload, channel, recipient_name);
        };

        let template = match self.resolve(notification_type, channel).await {
            Ok(Some(template)) => template,
            Ok(None) => return default_content(payload, channel, recipient_name),
            Err(e) => {
                warn!(
                    notification_type = %notification_type,
                    channel = %channel,
                    "Template lookup failed, using default: {}", e
                );
                return default_content(payload, channel, recipient_name);
            }
        };

        match self.render(&template, payload, channel, recipient_name) {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    notification_type = %notification_type,
                    channel = %channel,
                    "Template render failed, using default: {}", e
                );
                default_content(payload, channel, recipient_name)
            }
        }
    }

    fn render(
        &self,
        template: &Template,
        payload: &IntentPayload,
        channel: Channel,
        recipient_name: &str,
    ) -> Result<RenderedContent> {
        let context = render_context(payload, recipient_name);

        let subject = match (&template.subject, channel) {
            (_, Channel::Sms) => None,
            (Some(subject), _) => Some(self.handlebars.render_template(subject, &context)?),
            (None, _) => default_content(payload, channel, recipient_name).subject,
        };
        let body = self
            .handlebars
            .render_template(&template.content, &context)?;

        debug!(channel = %channel, "Rendered template override");
        Ok(RenderedContent { subject, body })
    }
}

/// Variables available to override templates
fn render_context(payload: &IntentPayload, recipient_name: &str) -> serde_json::Value {
    let mut context = json!({
        "builder_name": recipient_name,
        "priority": payload.priority().to_string(),
    });

    match payload {
        IntentPayload::LeadNotification {
            lead,
            custom_message,
            ..
        } => {
            context["lead_name"] = json!(lead.client_name);
            context["lead_project"] = json!(lead.project_type);
            context["lead_event"] = json!(lead.event_name);
            context["lead_city"] = json!(lead.city);
            context["lead_budget"] = json!(lead.budget);
            context["custom_message"] = json!(custom_message);
        }
        IntentPayload::BulkNotification { message, .. } => {
            context["message"] = json!(message);
        }
        IntentPayload::TestNotification {
            test_type,
            custom_message,
        } => {
            context["test_type"] = json!(test_type);
            context["custom_message"] = json!(custom_message);
        }
        IntentPayload::TemplateUpdate { .. } | IntentPayload::PreferenceUpdate { .. } => {}
    }

    context
}

/// Built-in content when no override applies. Output depends only on the
/// arguments.
pub fn default_content(
    payload: &IntentPayload,
    channel: Channel,
    recipient_name: &str,
) -> RenderedContent {
    match payload {
        IntentPayload::LeadNotification {
            lead,
            custom_message,
            priority,
        } => {
            let location = lead.city.as_deref().unwrap_or("an unspecified city");
            match channel {
                Channel::Email => {
                    let mut body = format!(
                        "Hello {},\n\nA new lead matching your services is available on ExpoBuild.\n\n\
                         Client: {}\nProject: {}\n",
                        recipient_name, lead.client_name, lead.project_type
                    );
                    if let Some(event) = &lead.event_name {
                        body.push_str(&format!("Event: {}\n", event));
                    }
                    body.push_str(&format!("City: {}\n", location));
                    if let Some(budget) = &lead.budget {
                        body.push_str(&format!("Budget: {}\n", budget));
                    }
                    if let Some(note) = custom_message {
                        body.push_str(&format!("\nNote from the ExpoBuild team: {}\n", note));
                    }
                    body.push_str("\nLog in to your dashboard to respond to this lead.");

                    RenderedContent {
                        subject: Some(with_priority(
                            *priority,
                            format!("New lead: {} for {}", lead.project_type, lead.client_name),
                        )),
                        body,
                    }
                }
                Channel::Sms => RenderedContent {
                    subject: None,
                    body: format!(
                        "ExpoBuild: new {} lead from {} in {}. Check your dashboard.",
                        lead.project_type, lead.client_name, location
                    ),
                },
                Channel::Dashboard => RenderedContent {
                    subject: Some(with_priority(*priority, "New lead available".to_string())),
                    body: match custom_message {
                        Some(note) => format!(
                            "{} is looking for {} in {}. {}",
                            lead.client_name, lead.project_type, location, note
                        ),
                        None => format!(
                            "{} is looking for {} in {}.",
                            lead.client_name, lead.project_type, location
                        ),
                    },
                },
            }
        }
        IntentPayload::BulkNotification { message, priority } => match channel {
            Channel::Email => RenderedContent {
                subject: Some(with_priority(
                    *priority,
                    "Update from ExpoBuild".to_string(),
                )),
                body: format!("Hello {},\n\n{}\n\nThe ExpoBuild team", recipient_name, message),
            },
            Channel::Sms => RenderedContent {
                subject: None,
                body: format!("ExpoBuild: {}", message),
            },
            Channel::Dashboard => RenderedContent {
                subject: Some(with_priority(*priority, "Platform announcement".to_string())),
                body: message.clone(),
            },
        },
        IntentPayload::TestNotification {
            test_type,
            custom_message,
        } => {
            let mut body = format!(
                "This is a {} test notification from ExpoBuild sent over {}.",
                test_type, channel
            );
            if let Some(note) = custom_message {
                body.push(' ');
                body.push_str(note);
            }
            RenderedContent {
                subject: match channel {
                    Channel::Sms => None,
                    _ => Some(format!("ExpoBuild test notification ({})", test_type)),
                },
                body,
            }
        }
        IntentPayload::TemplateUpdate { .. } | IntentPayload::PreferenceUpdate { .. } => {
            RenderedContent {
                subject: None,
                body: String::new(),
            }
        }
    }
}

fn with_priority(priority: NotificationPriority, subject: String) -> String {
    match priority {
        NotificationPriority::High | NotificationPriority::Urgent => {
            format!("[{}] {}", priority.to_string().to_uppercase(), subject)
        }
        NotificationPriority::Low | NotificationPriority::Normal => subject,
    }
}

/// Compile-check a subject/content pair without registering it
pub fn validate_template_syntax(subject: &str, content: &str) -> Result<()> {
    let mut temp_handlebars = Handlebars::new();

    temp_handlebars
        .register_template_string("test_subject", subject)
        .map_err(|e| NotificationError::template(format!("Subject template syntax error: {}", e)))?;

    temp_handlebars
        .register_template_string("test_content", content)
        .map_err(|e| NotificationError::template(format!("Content template syntax error: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lead_payload() -> IntentPayload {
        IntentPayload::LeadNotification {
            lead: LeadSummary {
                lead_id: "lead-1".to_string(),
                client_name: "Acme Robotics".to_string(),
                project_type: "Double-deck stand".to_string(),
                event_name: Some("Hannover Messe".to_string()),
                city: Some("Hannover".to_string()),
                budget: Some("EUR 80k".to_string()),
            },
            custom_message: Some("Client prefers sustainable materials".to_string()),
            priority: NotificationPriority::High,
        }
    }

    fn resolver() -> TemplateResolver {
        TemplateResolver::new(Arc::new(InMemoryTemplateStore::new()))
    }

    #[tokio::test]
    async fn test_default_content_is_deterministic() {
        let resolver = resolver();
        let payload = lead_payload();

        for channel in Channel::ALL {
            let first = resolver.content_for(&payload, channel, "Stand Masters").await;
            let second = resolver.content_for(&payload, channel, "Stand Masters").await;
            assert_eq!(first, second);
            assert!(!first.body.is_empty());
        }

        let email = default_content(&payload, Channel::Email, "Stand Masters");
        assert_eq!(
            email.subject.as_deref(),
            Some("[HIGH] New lead: Double-deck stand for Acme Robotics")
        );
        assert!(default_content(&payload, Channel::Sms, "x").subject.is_none());
    }

    #[tokio::test]
    async fn test_override_is_rendered_with_context() {
        let resolver = resolver();
        let mut templates = BTreeMap::new();
        templates.insert(
            Channel::Email,
            TemplateContent {
                subject: Some("Lead for {{builder_name}}".to_string()),
                content: "{{lead_name}} needs a {{lead_project}} in {{lead_city}}".to_string(),
            },
        );
        resolver
            .update(NotificationType::LeadNotification, &templates, "admin-1")
            .await
            .unwrap();

        let content = resolver
            .content_for(&lead_payload(), Channel::Email, "Stand Masters")
            .await;
        assert_eq!(content.subject.as_deref(), Some("Lead for Stand Masters"));
        assert_eq!(
            content.body,
            "Acme Robotics needs a Double-deck stand in Hannover"
        );

        // Other channels keep the default
        let sms = resolver
            .content_for(&lead_payload(), Channel::Sms, "Stand Masters")
            .await;
        assert_eq!(sms, default_content(&lead_payload(), Channel::Sms, "Stand Masters"));
    }

    #[tokio::test]
    async fn test_update_rejects_bad_syntax_without_writing() {
        let resolver = resolver();
        let mut templates = BTreeMap::new();
        templates.insert(
            Channel::Email,
            TemplateContent {
                subject: None,
                content: "fine".to_string(),
            },
        );
        templates.insert(
            Channel::Sms,
            TemplateContent {
                subject: None,
                content: "broken {{message".to_string(),
            },
        );

        let result = resolver
            .update(NotificationType::BulkNotification, &templates, "admin-1")
            .await;
        assert!(matches!(result, Err(NotificationError::Template { .. })));
        assert!(resolver.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let resolver = resolver();
        for (admin, text) in [("admin-1", "first"), ("admin-2", "second")] {
            let mut templates = BTreeMap::new();
            templates.insert(
                Channel::Dashboard,
                TemplateContent {
                    subject: None,
                    content: text.to_string(),
                },
            );
            resolver
                .update(NotificationType::BulkNotification, &templates, admin)
                .await
                .unwrap();
        }

        let stored = resolver
            .resolve(NotificationType::BulkNotification, Channel::Dashboard)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.content, "second");
        assert_eq!(stored.updated_by, "admin-2");
        assert_eq!(resolver.list().await.unwrap().len(), 1);
    }

    fn template(channel: Channel, text: &str, by: &str, at: DateTime<Utc>) -> Template {
        Template {
            notification_type: NotificationType::BulkNotification,
            channel,
            subject: None,
            content: text.to_string(),
            updated_by: by.to_string(),
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_older_batch_never_overwrites_newer_one() {
        let store = InMemoryTemplateStore::new();
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(1);

        store
            .put_all(vec![
                template(Channel::Email, "newer email", "admin-2", later),
                template(Channel::Sms, "newer sms", "admin-2", later),
            ])
            .await
            .unwrap();
        store
            .put_all(vec![
                template(Channel::Email, "older email", "admin-1", earlier),
                template(Channel::Sms, "older sms", "admin-1", earlier),
            ])
            .await
            .unwrap();

        let stored = store.list().await.unwrap();
        assert_eq!(stored.len(), 2);
        assert!(stored.iter().all(|t| t.updated_by == "admin-2"));
    }

    #[tokio::test]
    async fn test_concurrent_updates_leave_one_writers_full_set() {
        let resolver = resolver();
        let mut handles = Vec::new();
        for admin in ["admin-1", "admin-2", "admin-3", "admin-4"] {
            let resolver = resolver.clone();
            handles.push(tokio::spawn(async move {
                let templates: BTreeMap<Channel, TemplateContent> = Channel::ALL
                    .into_iter()
                    .map(|channel| {
                        (
                            channel,
                            TemplateContent {
                                subject: None,
                                content: format!("{} on {}", admin, channel),
                            },
                        )
                    })
                    .collect();
                resolver
                    .update(NotificationType::BulkNotification, &templates, admin)
                    .await
                    .unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = resolver.list().await.unwrap();
        assert_eq!(stored.len(), Channel::ALL.len());
        let winner = &stored[0].updated_by;
        assert!(stored.iter().all(|t| &t.updated_by == winner));
        assert!(stored.iter().all(|t| t.updated_at == stored[0].updated_at));
    }

    #[test]
    fn test_template_syntax_validation() {
        assert!(validate_template_syntax("Hello {{name}}", "Content: {{message}}").is_ok());
        assert!(validate_template_syntax("Hello {{name", "Content: {{message}}").is_err());
    }
}
