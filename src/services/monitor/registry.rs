use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::services::ledger::{LogEntry, LogLedger, LogLevel};

/// Timestamps of the last and next scheduled check for one monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeState {
    pub last_check: DateTime<Utc>,
    pub next_check: DateTime<Utc>,
}

/// Everything the engine keeps per monitor id, each part behind its own lock.
#[derive(Default)]
struct MonitorSlot {
    ledger: Mutex<LogLedger>,
    runtime: RwLock<Option<RuntimeState>>,
}

/// Per-monitor ledgers and runtime state, indexed by monitor id.
///
/// The outer map is only locked long enough to look up or insert a slot, so
/// work on different monitors never waits on each other.
#[derive(Default)]
pub struct MonitorRegistry {
    slots: RwLock<HashMap<String, Arc<MonitorSlot>>>,
}

impl MonitorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn slot(&self, monitor_id: &str) -> Option<Arc<MonitorSlot>> {
        self.slots.read().await.get(monitor_id).cloned()
    }

    async fn slot_or_insert(&self, monitor_id: &str) -> Arc<MonitorSlot> {
        if let Some(slot) = self.slot(monitor_id).await {
            return slot;
        }

        self.slots
            .write()
            .await
            .entry(monitor_id.to_string())
            .or_default()
            .clone()
    }

    /// Register a monitor id so it shows up in [`MonitorRegistry::known_ids`].
    pub async fn register(&self, monitor_id: &str) {
        self.slot_or_insert(monitor_id).await;
    }

    pub async fn append(&self, monitor_id: &str, level: LogLevel, message: impl Into<String>) {
        let slot = self.slot_or_insert(monitor_id).await;
        slot.ledger.lock().await.push(level, message);
    }

    /// Up to `limit` most recent entries, oldest first. Empty for unknown ids.
    pub async fn recent(&self, monitor_id: &str, limit: usize) -> Vec<LogEntry> {
        match self.slot(monitor_id).await {
            Some(slot) => slot.ledger.lock().await.recent(limit),
            None => Vec::new(),
        }
    }

    pub async fn record_check(
        &self,
        monitor_id: &str,
        last_check: DateTime<Utc>,
        next_check: DateTime<Utc>,
    ) {
        let slot = self.slot_or_insert(monitor_id).await;
        *slot.runtime.write().await = Some(RuntimeState {
            last_check,
            next_check,
        });
    }

    /// Move `last_check` only. The running loop keeps owning `next_check`;
    /// `next_if_unset` is used when no tick has recorded state yet.
    pub async fn touch_last_check(
        &self,
        monitor_id: &str,
        last_check: DateTime<Utc>,
        next_if_unset: DateTime<Utc>,
    ) {
        let slot = self.slot_or_insert(monitor_id).await;
        let mut runtime = slot.runtime.write().await;
        let next_check = (*runtime).map_or(next_if_unset, |state| state.next_check);
        *runtime = Some(RuntimeState {
            last_check,
            next_check,
        });
    }

    pub async fn runtime(&self, monitor_id: &str) -> Option<RuntimeState> {
        let slot = self.slot(monitor_id).await?;
        let state = *slot.runtime.read().await;
        state
    }

    pub async fn known_ids(&self) -> Vec<String> {
        self.slots.read().await.keys().cloned().collect()
    }
}
