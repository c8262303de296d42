//! Deferred dispatch of resolved intents
//!
//! A scheduled dispatch is removed from the pending set before it executes,
//! so overlapping ticks can never fire the same entry twice. Fired ids are
//! remembered for a while so that a late cancel is answered with a conflict
//! instead of a not-found.

use crate::config::SchedulerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::{NotificationError, Result};
use expo_shared::types::*;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Default)]
struct FiredIds {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl FiredIds {
    fn remember(&mut self, id: String, retention: usize) {
        if self.ids.insert(id.clone()) {
            self.order.push_back(id);
        }
        while self.order.len() > retention {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
    }
}

/// In-memory scheduler for bulk dispatches with a future fire time
#[derive(Clone)]
pub struct DispatchScheduler {
    config: SchedulerConfig,
    dispatcher: Dispatcher,
    pending: Arc<Mutex<HashMap<String, ScheduledDispatch>>>,
    fired: Arc<Mutex<FiredIds>>,
    shutdown: Arc<Mutex<Option<CancellationToken>>>,
}

impl DispatchScheduler {
    pub fn new(config: &SchedulerConfig, dispatcher: Dispatcher) -> Self {
        info!(
            "Initializing dispatch scheduler (interval {}s, batch {})",
            config.check_interval_seconds, config.batch_size
        );

        Self {
            config: config.clone(),
            dispatcher,
            pending: Arc::new(Mutex::new(HashMap::new())),
            fired: Arc::new(Mutex::new(FiredIds::default())),
            shutdown: Arc::new(Mutex::new(None)),
        }
    }

    /// Park `intent` with its already-resolved recipients until `at`
    pub fn schedule(
        &self,
        intent: NotificationIntent,
        recipients: Vec<Recipient>,
        at: DateTime<Utc>,
    ) -> Result<String> {
        let now = Utc::now();
        if at <= now {
            return Err(NotificationError::validation(
                "scheduleAt",
                "Must be in the future",
            ));
        }

        let id = format!("sched-{}", Uuid::new_v4());
        let intent = intent.scheduled_for(at);
        self.dispatcher.set_state(&intent.id, IntentState::Scheduled);

        let dispatch = ScheduledDispatch {
            id: id.clone(),
            intent,
            recipients,
            scheduled_at: at,
            created_at: now,
        };

        let pending_count = {
            let mut pending = self.pending.lock();
            pending.insert(id.clone(), dispatch);
            pending.len()
        };
        self.dispatcher.metrics().set_scheduled_pending(pending_count);

        info!(schedule_id = %id, scheduled_for = %at, "Dispatch scheduled");
        Ok(id)
    }

    /// Remove a pending dispatch before it fires
    pub fn cancel(&self, schedule_id: &str) -> Result<ScheduledDispatch> {
        self.cancel_at(schedule_id, Utc::now())
    }

    /// A dispatch whose fire time is at or before `now` counts as executed
    /// even if no tick has picked it up yet; it stays pending and will fire.
    pub fn cancel_at(&self, schedule_id: &str, now: DateTime<Utc>) -> Result<ScheduledDispatch> {
        let (removed, pending_count) = {
            let mut pending = self.pending.lock();
            match pending.get(schedule_id) {
                Some(dispatch) if dispatch.scheduled_at <= now => {
                    return Err(NotificationError::already_executed(schedule_id));
                }
                _ => {}
            }
            (pending.remove(schedule_id), pending.len())
        };

        match removed {
            Some(dispatch) => {
                self.dispatcher.metrics().set_scheduled_pending(pending_count);
                info!(schedule_id = %schedule_id, "Cancelled scheduled dispatch");
                Ok(dispatch)
            }
            None if self.fired.lock().ids.contains(schedule_id) => {
                Err(NotificationError::already_executed(schedule_id))
            }
            None => Err(NotificationError::schedule_not_found(schedule_id)),
        }
    }

    /// Pending dispatches ordered by fire time
    pub fn list_pending(&self) -> Vec<ScheduledDispatch> {
        let mut pending: Vec<ScheduledDispatch> = self.pending.lock().values().cloned().collect();
        pending.sort_by(|a, b| {
            a.scheduled_at
                .cmp(&b.scheduled_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        pending
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Fire every dispatch due at `now`, oldest first, up to the batch size
    pub async fn tick(&self, now: DateTime<Utc>) -> Vec<IntentDispatchReport> {
        let (due, pending_count) = {
            let mut pending = self.pending.lock();
            let mut due_ids: Vec<(DateTime<Utc>, String)> = pending
                .values()
                .filter(|dispatch| dispatch.scheduled_at <= now)
                .map(|dispatch| (dispatch.scheduled_at, dispatch.id.clone()))
                .collect();
            due_ids.sort();
            due_ids.truncate(self.config.batch_size.max(1));

            let mut fired = self.fired.lock();
            let due: Vec<ScheduledDispatch> = due_ids
                .into_iter()
                .filter_map(|(_, id)| {
                    let dispatch = pending.remove(&id)?;
                    fired.remember(id, self.config.executed_retention);
                    Some(dispatch)
                })
                .collect();
            (due, pending.len())
        };

        if due.is_empty() {
            return Vec::new();
        }

        self.dispatcher.metrics().set_scheduled_pending(pending_count);
        info!("Firing {} scheduled dispatches", due.len());

        let executions = due.into_iter().map(|dispatch| async move {
            info!(
                schedule_id = %dispatch.id,
                intent_id = %dispatch.intent.id,
                "Executing scheduled dispatch"
            );
            self.dispatcher
                .dispatch(&dispatch.intent, dispatch.recipients)
                .await
        });

        join_all(executions).await
    }

    /// Start the background tick loop; a second call is a no-op
    pub fn start(&self) {
        if !self.config.enabled {
            warn!("Dispatch scheduler is disabled");
            return;
        }

        let token = {
            let mut shutdown = self.shutdown.lock();
            if shutdown.is_some() {
                return;
            }
            let token = CancellationToken::new();
            *shutdown = Some(token.clone());
            token
        };

        let scheduler = self.clone();
        let period = Duration::from_secs(self.config.check_interval_seconds.max(1));

        tokio::spawn(async move {
            let mut ticker = interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let reports = scheduler.tick(Utc::now()).await;
                        for report in reports.iter().filter(|r| r.failed_count() > 0) {
                            error!(
                                intent_id = %report.intent_id,
                                failed = report.failed_count(),
                                "Scheduled dispatch finished with failures"
                            );
                        }
                    }
                    _ = token.cancelled() => {
                        info!("Dispatch scheduler shutting down");
                        break;
                    }
                }
            }
        });

        info!("Dispatch scheduler started");
    }

    pub fn stop(&self) {
        if let Some(token) = self.shutdown.lock().take() {
            token.cancel();
            info!("Dispatch scheduler stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.lock().is_some()
    }
}
