use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::modules::monitor::model::MonitorDefinition;
use crate::services::checker::{CheckOutcome, PageChecker};
use crate::services::ledger::LogLevel;
use crate::services::monitor::registry::MonitorRegistry;
use crate::services::notifier::Notifier;

pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(300);

pub const ALERT_SUBJECT: &str = "Page monitor alert";
pub const READY_SUBJECT: &str = "Your page monitor is ready";

const EMAIL_SKIPPED: &str = "email skipped: missing SMTP_USER/SMTP_PASS/EMAIL_FROM";
const HEARTBEAT_MESSAGE: &str = "heartbeat: monitor is alive";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStart {
    /// A new loop was spawned and its first tick has completed
    Started,
    /// A loop for this monitor id already exists; nothing was spawned
    AlreadyRunning,
    /// The engine is shutting down and accepts no new loops
    ShuttingDown,
}

/// Owns one recurring check loop per monitor plus the global heartbeat.
///
/// Each loop runs a tick immediately, then sleeps for the monitor's interval
/// and repeats until [`MonitorEngine::shutdown`] is called. A tick checks the
/// page, records the outcome in the monitor's ledger and sends a notification
/// on match. Faults inside a tick are logged and never end the loop.
pub struct MonitorEngine {
    checker: PageChecker,
    notifier: Arc<dyn Notifier>,
    registry: MonitorRegistry,
    loops: Mutex<HashMap<String, JoinHandle<()>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    last_beat: Mutex<Option<Instant>>,
    shutdown: watch::Sender<bool>,
}

impl MonitorEngine {
    pub fn new(checker: PageChecker, notifier: Arc<dyn Notifier>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            checker,
            notifier,
            registry: MonitorRegistry::new(),
            loops: Mutex::new(HashMap::new()),
            heartbeat: Mutex::new(None),
            last_beat: Mutex::new(None),
            shutdown,
        }
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub async fn is_running(&self, monitor_id: &str) -> bool {
        self.loops.lock().await.contains_key(monitor_id)
    }

    /// Spawn the recurring loop for `definition` unless one already exists.
    ///
    /// When a loop is spawned this waits for its immediate first tick, so the
    /// caller observes the first check in the ledger on return.
    pub async fn start(self: &Arc<Self>, definition: MonitorDefinition) -> LoopStart {
        let first_tick = {
            let mut loops = self.loops.lock().await;
            if loops.contains_key(&definition.id) {
                return LoopStart::AlreadyRunning;
            }
            // Subscribe before reading the flag so a concurrent shutdown is
            // either seen here or delivered to the loop as a change.
            let shutdown = self.shutdown.subscribe();
            let stopping = *shutdown.borrow();
            if stopping {
                return LoopStart::ShuttingDown;
            }

            self.registry.register(&definition.id).await;

            let (tx, rx) = oneshot::channel();
            let monitor_id = definition.id.clone();
            let handle = tokio::spawn(Arc::clone(self).run_loop(definition, tx, shutdown));
            loops.insert(monitor_id, handle);
            rx
        };

        // Only fails if the loop task died before finishing its first tick
        let _ = first_tick.await;
        LoopStart::Started
    }

    async fn run_loop(
        self: Arc<Self>,
        definition: MonitorDefinition,
        first_tick: oneshot::Sender<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = definition.interval.duration();
        tracing::info!(
            monitor_id = %definition.id,
            url = %definition.url,
            hours = definition.interval.hours(),
            "monitor loop started"
        );
        self.registry
            .append(
                &definition.id,
                LogLevel::Info,
                format!(
                    "schedule started for {} every {}h",
                    definition.url,
                    definition.interval.hours()
                ),
            )
            .await;

        let mut first_tick = Some(first_tick);
        loop {
            let tick_started = Instant::now();
            self.run_tick(&definition).await;

            if let Some(tx) = first_tick.take() {
                let _ = tx.send(());
            }

            tokio::select! {
                _ = tokio::time::sleep_until(tick_started + period) => {}
                _ = shutdown.changed() => break,
            }
        }

        tracing::info!(monitor_id = %definition.id, "monitor loop stopped");
    }

    /// One scheduled check-and-notify cycle.
    pub async fn run_tick(&self, definition: &MonitorDefinition) {
        let now = Utc::now();
        self.registry
            .record_check(
                &definition.id,
                now,
                now + definition.interval.chrono_duration(),
            )
            .await;

        self.check_and_report(definition).await;
    }

    /// Check a monitor outside its schedule, e.g. when its URL is submitted
    /// again while the loop is already running. The loop's `next_check`
    /// stays as it is.
    pub async fn check_now(&self, definition: &MonitorDefinition) {
        let now = Utc::now();
        self.registry
            .touch_last_check(
                &definition.id,
                now,
                now + definition.interval.chrono_duration(),
            )
            .await;

        self.check_and_report(definition).await;
    }

    async fn check_and_report(&self, definition: &MonitorDefinition) {
        let result = self
            .checker
            .check(
                &definition.url,
                definition.pattern.selector(),
                definition.pattern.text(),
            )
            .await;

        match result {
            Ok(outcome) if outcome.matched => {
                tracing::info!(monitor_id = %definition.id, detail = %outcome.description, "match found");
                self.registry
                    .append(
                        &definition.id,
                        LogLevel::Match,
                        format!("match found for {} ({})", definition.url, outcome.description),
                    )
                    .await;
                self.notify_match(definition, &outcome).await;
            }
            Ok(outcome) => {
                tracing::debug!(monitor_id = %definition.id, detail = %outcome.description, "no match");
                self.registry
                    .append(
                        &definition.id,
                        LogLevel::Info,
                        format!("no match for {} ({})", definition.url, outcome.description),
                    )
                    .await;
            }
            Err(e) => {
                tracing::warn!(monitor_id = %definition.id, error = %e, "check failed");
                self.registry
                    .append(
                        &definition.id,
                        LogLevel::Error,
                        format!("check failed for {}: {}", definition.url, e),
                    )
                    .await;
            }
        }
    }

    async fn notify_match(&self, definition: &MonitorDefinition, outcome: &CheckOutcome) {
        if !self.notifier.is_configured() {
            tracing::warn!(monitor_id = %definition.id, "notification skipped, transport not configured");
            self.registry
                .append(&definition.id, LogLevel::Error, EMAIL_SKIPPED)
                .await;
            return;
        }

        let body = match definition.email_message.as_deref() {
            Some(custom) if !custom.trim().is_empty() => custom.to_string(),
            _ => format!("Match found on {}: {}", definition.url, outcome.description),
        };

        self.deliver(definition, ALERT_SUBJECT, &body).await;
    }

    /// Tell the recipient their new monitor is active.
    pub async fn send_ready_notice(&self, definition: &MonitorDefinition) {
        if !self.notifier.is_configured() {
            self.registry
                .append(
                    &definition.id,
                    LogLevel::Info,
                    "ready notice skipped: transport not configured",
                )
                .await;
            return;
        }

        let body = format!(
            "Your monitor for {} is active. It looks for {} '{}' every {}h.",
            definition.url,
            definition.pattern.kind(),
            definition.pattern.value(),
            definition.interval.hours()
        );
        self.deliver(definition, READY_SUBJECT, &body).await;
    }

    async fn deliver(&self, definition: &MonitorDefinition, subject: &str, body: &str) {
        match self
            .notifier
            .notify(&definition.email_to, subject, body)
            .await
        {
            Ok(()) => {
                tracing::info!(monitor_id = %definition.id, to = %definition.email_to, "email sent");
                self.registry
                    .append(
                        &definition.id,
                        LogLevel::Email,
                        format!("email sent to {}", definition.email_to),
                    )
                    .await;
            }
            Err(e) => {
                tracing::error!(monitor_id = %definition.id, error = %e, "email failed");
                self.registry
                    .append(&definition.id, LogLevel::Error, format!("email failed: {}", e))
                    .await;
            }
        }
    }

    // =========================================================================
    // HEARTBEAT
    // =========================================================================

    /// Start (or restart) the heartbeat task.
    pub async fn start_heartbeat(self: &Arc<Self>) {
        let mut slot = self.heartbeat.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
        }

        let shutdown = self.shutdown.subscribe();
        let stopping = *shutdown.borrow();
        if stopping {
            return;
        }
        *slot = Some(tokio::spawn(Arc::clone(self).heartbeat_loop(shutdown)));
    }

    async fn heartbeat_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(HEARTBEAT_PERIOD);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                scheduled = ticker.tick() => self.beat(scheduled).await,
                _ = shutdown.changed() => break,
            }
        }
    }

    /// Append a heartbeat to every known monitor, at most once per period.
    async fn beat(&self, scheduled: Instant) {
        {
            let mut last = self.last_beat.lock().await;
            if let Some(previous) = *last {
                if scheduled.saturating_duration_since(previous) < HEARTBEAT_PERIOD {
                    return;
                }
            }
            *last = Some(scheduled);
        }

        let ids = self.registry.known_ids().await;
        tracing::debug!(monitors = ids.len(), "heartbeat");
        for id in ids {
            self.registry
                .append(&id, LogLevel::Heartbeat, HEARTBEAT_MESSAGE)
                .await;
        }
    }

    // =========================================================================
    // SHUTDOWN
    // =========================================================================

    /// Stop every loop at its next suspension point and wait up to `grace`.
    ///
    /// Ticks already in progress, including notifier sessions, run to
    /// completion or to their own timeouts.
    pub async fn shutdown(&self, grace: Duration) {
        self.shutdown.send_replace(true);

        let mut handles: Vec<JoinHandle<()>> =
            self.loops.lock().await.drain().map(|(_, h)| h).collect();
        if let Some(heartbeat) = self.heartbeat.lock().await.take() {
            handles.push(heartbeat);
        }

        let count = handles.len();
        let drained = tokio::time::timeout(grace, async {
            for handle in handles {
                let _ = handle.await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::info!(tasks = count, "monitor engine stopped"),
            Err(_) => tracing::warn!(tasks = count, "monitor engine shutdown timed out"),
        }
    }
}
