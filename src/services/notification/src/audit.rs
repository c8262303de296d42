//! Audit log of administrative notification actions
//!
//! Retention is bounded: once the configured capacity is reached the oldest
//! entry is evicted for every new append.

use crate::error::Result;
use expo_shared::types::{AuditAction, AuditEntry};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Filter for audit queries; every set field must match
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub admin_id: Option<String>,
    pub action: Option<AuditAction>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.admin_id.as_deref().map_or(true, |admin| entry.admin_id == admin)
            && self.action.map_or(true, |action| entry.action == action)
            && self.since.map_or(true, |since| entry.timestamp >= since)
            && self.until.map_or(true, |until| entry.timestamp <= until)
    }
}

#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// Matching entries, newest first
    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>>;

    async fn len(&self) -> usize;
}

pub struct InMemoryAuditLog {
    capacity: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        let mut entries = self.entries.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
        Ok(())
    }

    async fn query(&self, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.lock();
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| query.matches(entry))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
