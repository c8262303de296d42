//! Prometheus metrics for the notification service

use crate::error::{NotificationError, Result};
use expo_shared::types::{ChannelAttemptResult, IntentKind};

use prometheus::{Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;
use tracing::info;

const NAMESPACE: &str = "notification_service";

/// Metrics collector for the notification service
#[derive(Clone)]
pub struct NotificationMetrics {
    registry: Arc<Registry>,

    channel_attempts: IntCounterVec,
    intents: IntCounterVec,
    dispatch_duration: Histogram,
    scheduled_pending: IntGauge,
}

impl NotificationMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self> {
        info!("Initializing notification metrics");

        let registry = Registry::new();

        let channel_attempts = IntCounterVec::new(
            Opts::new(
                "channel_attempts_total",
                "Channel delivery attempts by outcome",
            )
            .namespace(NAMESPACE),
            &["channel", "outcome"],
        )
        .map_err(|e| metric_error("channel_attempts_total", e))?;

        let intents = IntCounterVec::new(
            Opts::new("intents_total", "Notification intents handled by kind").namespace(NAMESPACE),
            &["kind"],
        )
        .map_err(|e| metric_error("intents_total", e))?;

        let dispatch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "dispatch_duration_seconds",
                "Wall time of one intent dispatch across all recipients",
            )
            .namespace(NAMESPACE)
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        )
        .map_err(|e| metric_error("dispatch_duration_seconds", e))?;

        let scheduled_pending = IntGauge::with_opts(
            Opts::new(
                "scheduled_dispatches_pending",
                "Scheduled dispatches waiting for their fire time",
            )
            .namespace(NAMESPACE),
        )
        .map_err(|e| metric_error("scheduled_dispatches_pending", e))?;

        registry
            .register(Box::new(channel_attempts.clone()))
            .map_err(|e| metric_error("channel_attempts_total", e))?;
        registry
            .register(Box::new(intents.clone()))
            .map_err(|e| metric_error("intents_total", e))?;
        registry
            .register(Box::new(dispatch_duration.clone()))
            .map_err(|e| metric_error("dispatch_duration_seconds", e))?;
        registry
            .register(Box::new(scheduled_pending.clone()))
            .map_err(|e| metric_error("scheduled_dispatches_pending", e))?;

        Ok(Self {
            registry: Arc::new(registry),
            channel_attempts,
            intents,
            dispatch_duration,
            scheduled_pending,
        })
    }

    pub fn record_intent(&self, kind: IntentKind) {
        self.intents.with_label_values(&[kind.as_str()]).inc();
    }

    /// Outcome label is `delivered` or the failure reason
    pub fn record_attempt(&self, attempt: &ChannelAttemptResult) {
        let outcome = match attempt.error_reason {
            None => "delivered".to_string(),
            Some(reason) => reason.to_string(),
        };
        self.channel_attempts
            .with_label_values(&[attempt.channel.as_str(), &outcome])
            .inc();
    }

    pub fn observe_dispatch(&self, seconds: f64) {
        self.dispatch_duration.observe(seconds);
    }

    pub fn set_scheduled_pending(&self, pending: usize) {
        self.scheduled_pending.set(pending as i64);
    }

    pub fn attempts_with(&self, channel: &str, outcome: &str) -> u64 {
        self.channel_attempts
            .with_label_values(&[channel, outcome])
            .get()
    }

    /// Get Prometheus registry for metrics endpoint
    pub fn get_registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Export metrics in Prometheus text format
    pub fn export_metrics(&self) -> Result<String> {
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();

        encoder
            .encode_to_string(&metric_families)
            .map_err(|e| NotificationError::internal(format!("Failed to encode metrics: {}", e)))
    }
}

fn metric_error(name: &str, e: prometheus::Error) -> NotificationError {
    NotificationError::internal(format!("Failed to set up metric {}: {}", name, e))
}
