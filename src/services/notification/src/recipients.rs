//! Recipient resolution
//!
//! Turns a [`TargetSelector`] into concrete recipients, looking builders up
//! fresh on every call. Explicit id lists are resolved leniently: unknown ids
//! are skipped and only an entirely unknown list is an error.

use crate::error::{NotificationError, Result};
use expo_shared::types::*;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only builder lookup
#[async_trait]
pub trait BuilderDirectory: Send + Sync {
    async fn get_builder_by_id(&self, id: &str) -> Result<Option<Builder>>;

    async fn query_builders(&self, filter: &BuilderFilter) -> Result<Vec<Builder>>;
}

/// Read-only lead lookup
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    async fn get_lead_by_id(&self, id: &str) -> Result<Option<Lead>>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get(&self, builder_id: &str) -> Result<Option<BuilderPreferences>>;

    async fn put(&self, preferences: BuilderPreferences) -> Result<()>;
}

/// Seed file layout for [`InMemoryDirectory`]
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DirectorySeed {
    #[serde(default)]
    pub builders: Vec<Builder>,
    #[serde(default)]
    pub leads: Vec<Lead>,
}

/// Builder and lead directory held in memory, optionally seeded from JSON
#[derive(Default)]
pub struct InMemoryDirectory {
    builders: DashMap<String, Builder>,
    leads: DashMap<String, Lead>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_seed(seed: DirectorySeed) -> Self {
        let directory = Self::new();
        for builder in seed.builders {
            directory.insert_builder(builder);
        }
        for lead in seed.leads {
            directory.insert_lead(lead);
        }
        directory
    }

    pub fn from_seed_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let seed: DirectorySeed = serde_json::from_str(&raw)?;
        info!(
            path = %path.display(),
            builders = seed.builders.len(),
            leads = seed.leads.len(),
            "Loaded directory seed"
        );
        Ok(Self::from_seed(seed))
    }

    pub fn insert_builder(&self, builder: Builder) {
        self.builders.insert(builder.id.clone(), builder);
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.leads.insert(lead.id.clone(), lead);
    }
}

#[async_trait]
impl BuilderDirectory for InMemoryDirectory {
    async fn get_builder_by_id(&self, id: &str) -> Result<Option<Builder>> {
        Ok(self.builders.get(id).map(|entry| entry.value().clone()))
    }

    async fn query_builders(&self, filter: &BuilderFilter) -> Result<Vec<Builder>> {
        let mut matched: Vec<Builder> = self
            .builders
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matched)
    }
}

#[async_trait]
impl LeadDirectory for InMemoryDirectory {
    async fn get_lead_by_id(&self, id: &str) -> Result<Option<Lead>> {
        Ok(self.leads.get(id).map(|entry| entry.value().clone()))
    }
}

#[derive(Default)]
pub struct InMemoryPreferenceStore {
    preferences: DashMap<String, BuilderPreferences>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn get(&self, builder_id: &str) -> Result<Option<BuilderPreferences>> {
        Ok(self
            .preferences
            .get(builder_id)
            .map(|entry| entry.value().clone()))
    }

    async fn put(&self, preferences: BuilderPreferences) -> Result<()> {
        self.preferences
            .insert(preferences.builder_id.clone(), preferences);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RecipientResolver {
    builders: Arc<dyn BuilderDirectory>,
    preferences: Arc<dyn PreferenceStore>,
}

impl RecipientResolver {
    pub fn new(builders: Arc<dyn BuilderDirectory>, preferences: Arc<dyn PreferenceStore>) -> Self {
        Self {
            builders,
            preferences,
        }
    }

    /// Resolve a selector into deduplicated recipients, in request order for
    /// explicit ids and id order for filters. Channels a builder opted out
    /// of are removed from its contacts.
    pub async fn resolve(&self, target: &TargetSelector) -> Result<Vec<Recipient>> {
        let builders = match target {
            TargetSelector::Explicit { ids } => self.resolve_explicit(ids).await?,
            TargetSelector::Filter { filter } => self.resolve_filter(filter).await?,
        };

        let mut recipients = Vec::with_capacity(builders.len());
        for builder in &builders {
            recipients.push(self.apply_preferences(Recipient::from_builder(builder)).await?);
        }
        Ok(recipients)
    }

    async fn resolve_explicit(&self, ids: &[String]) -> Result<Vec<Builder>> {
        let mut seen = HashSet::new();
        let mut builders = Vec::new();

        for id in ids {
            let id = id.trim();
            if id.is_empty() || !seen.insert(id.to_string()) {
                continue;
            }
            match self.builders.get_builder_by_id(id).await? {
                Some(builder) => builders.push(builder),
                None => debug!(builder_id = %id, "Skipping unknown builder id"),
            }
        }

        if builders.is_empty() {
            return Err(NotificationError::recipient_not_found(format!(
                "none of the {} requested builders exist",
                seen.len()
            )));
        }

        if builders.len() < seen.len() {
            info!(
                requested = seen.len(),
                resolved = builders.len(),
                "Some requested builders were not found and will be skipped"
            );
        }

        Ok(builders)
    }

    async fn resolve_filter(&self, filter: &BuilderFilter) -> Result<Vec<Builder>> {
        let mut seen = HashSet::new();
        let builders: Vec<Builder> = self
            .builders
            .query_builders(filter)
            .await?
            .into_iter()
            .filter(|builder| seen.insert(builder.id.clone()))
            .collect();

        if builders.is_empty() {
            return Err(NotificationError::FilterMatchedNone);
        }
        Ok(builders)
    }

    async fn apply_preferences(&self, mut recipient: Recipient) -> Result<Recipient> {
        if let Some(preferences) = self.preferences.get(&recipient.id).await? {
            recipient
                .contact_channels
                .retain(|channel, _| preferences.channels.allows(*channel));
        }
        Ok(recipient)
    }

    pub async fn preferences_for(&self, builder_id: &str) -> Result<ChannelPreferences> {
        Ok(self
            .preferences
            .get(builder_id)
            .await?
            .map(|p| p.channels)
            .unwrap_or_default())
    }

    /// Merge the given flags into a builder's stored preferences
    pub async fn update_preferences(
        &self,
        builder_id: &str,
        email: Option<bool>,
        sms: Option<bool>,
        dashboard: Option<bool>,
        updated_by: &str,
    ) -> Result<BuilderPreferences> {
        if self.builders.get_builder_by_id(builder_id).await?.is_none() {
            return Err(NotificationError::recipient_not_found(format!(
                "builder {} does not exist",
                builder_id
            )));
        }

        let mut channels = self.preferences_for(builder_id).await?;
        if let Some(email) = email {
            channels.email = email;
        }
        if let Some(sms) = sms {
            channels.sms = sms;
        }
        if let Some(dashboard) = dashboard {
            channels.dashboard = dashboard;
        }

        let preferences = BuilderPreferences {
            builder_id: builder_id.to_string(),
            channels,
            updated_by: updated_by.to_string(),
            updated_at: Utc::now(),
        };
        self.preferences.put(preferences.clone()).await?;
        Ok(preferences)
    }
}
