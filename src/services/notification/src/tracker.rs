//! Delivery tracking
//!
//! Append-only history of channel attempts per recipient. There is no update
//! or delete operation.

use crate::error::Result;
use expo_shared::types::*;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;

#[async_trait]
pub trait DeliveryTracker: Send + Sync {
    /// Append `attempts` to the history of `recipient_id`
    async fn record(&self, recipient_id: &str, attempts: &[ChannelAttemptResult]) -> Result<()>;

    /// History of one recipient within `range`, newest first
    async fn query_status(
        &self,
        recipient_id: &str,
        range: TimeRange,
    ) -> Result<DeliveryStatusSummary>;

    /// Totals across every tracked recipient
    async fn stats(&self) -> Result<DeliveryStats>;
}

#[derive(Default)]
pub struct InMemoryDeliveryTracker {
    history: DashMap<String, Vec<DeliveryRecord>>,
}

impl InMemoryDeliveryTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeliveryTracker for InMemoryDeliveryTracker {
    async fn record(&self, recipient_id: &str, attempts: &[ChannelAttemptResult]) -> Result<()> {
        if attempts.is_empty() {
            return Ok(());
        }

        let recorded_at = Utc::now();
        self.history
            .entry(recipient_id.to_string())
            .or_default()
            .extend(attempts.iter().cloned().map(|attempt| DeliveryRecord {
                attempt,
                recorded_at,
            }));
        Ok(())
    }

    async fn query_status(
        &self,
        recipient_id: &str,
        range: TimeRange,
    ) -> Result<DeliveryStatusSummary> {
        let since = range.since(Utc::now());

        let mut history: Vec<DeliveryRecord> = self
            .history
            .get(recipient_id)
            .map(|records| {
                records
                    .iter()
                    .filter(|record| since.map_or(true, |since| record.recorded_at >= since))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        history.reverse();

        let mut by_channel: BTreeMap<Channel, ChannelDeliveryStats> = BTreeMap::new();
        for record in &history {
            by_channel
                .entry(record.attempt.channel)
                .or_default()
                .record(record.attempt.succeeded);
        }

        let successful = history.iter().filter(|r| r.attempt.succeeded).count() as u64;
        let total_attempts = history.len() as u64;

        Ok(DeliveryStatusSummary {
            builder_id: recipient_id.to_string(),
            time_range: range,
            total_attempts,
            successful,
            failed: total_attempts - successful,
            by_channel,
            last_delivered_at: history.iter().filter_map(|r| r.attempt.delivered_at).max(),
            history,
        })
    }

    async fn stats(&self) -> Result<DeliveryStats> {
        let mut stats = DeliveryStats {
            recipients_tracked: self.history.len(),
            ..Default::default()
        };

        for entry in self.history.iter() {
            for record in entry.value() {
                stats.total_attempts += 1;
                if record.attempt.succeeded {
                    stats.successful += 1;
                } else {
                    stats.failed += 1;
                }
                stats
                    .by_channel
                    .entry(record.attempt.channel)
                    .or_default()
                    .record(record.attempt.succeeded);
            }
        }

        if stats.total_attempts > 0 {
            stats.success_rate = stats.successful as f32 / stats.total_attempts as f32;
        }

        Ok(stats)
    }
}
