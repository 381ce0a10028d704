use chrono::Utc;
use std::future::Future;
use tokio::time::Instant;
use uuid::Uuid;

use crate::modules::monitor::model::{CheckInterval, MatchPattern, MonitorDefinition};
use crate::services::checker::{self, CheckError};
use crate::services::ledger::{LogEntry, LEDGER_CAPACITY};
use crate::services::monitor::engine::MonitorEngine;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("{0}")]
    InvalidInterval(String),
    #[error("provide --selector or --text")]
    EmptyPattern,
    #[error(transparent)]
    InvalidSelector(#[from] CheckError),
}

/// Definition for a page watched from the command line rather than the API.
pub fn foreground_definition(
    url: &str,
    selector: Option<&str>,
    text: Option<&str>,
    interval_hours: u32,
    email_to: Option<String>,
) -> Result<MonitorDefinition, WatchError> {
    let interval = CheckInterval::try_from(interval_hours).map_err(WatchError::InvalidInterval)?;
    let pattern =
        MatchPattern::from_request(selector, text.unwrap_or("")).ok_or(WatchError::EmptyPattern)?;
    if let Some(selector) = pattern.selector() {
        checker::parse_selector(selector)?;
    }

    Ok(MonitorDefinition {
        id: Uuid::new_v4().to_string(),
        url: url.to_string(),
        pattern,
        interval,
        email_to: email_to.unwrap_or_default(),
        email_message: None,
    })
}

/// Run ticks for `definition` in the current task until `stop` resolves.
///
/// Each tick goes through [`MonitorEngine::run_tick`], so matches are
/// notified exactly as for monitors created over HTTP. The entries a tick
/// appended are handed to `report`. With `once` a single tick runs.
pub async fn watch_foreground<S, R>(
    engine: &MonitorEngine,
    definition: &MonitorDefinition,
    once: bool,
    stop: S,
    mut report: R,
) where
    S: Future<Output = ()>,
    R: FnMut(&LogEntry),
{
    tokio::pin!(stop);
    let period = definition.interval.duration();

    loop {
        let tick_started = Instant::now();
        let since = Utc::now();
        engine.run_tick(definition).await;

        let entries = engine
            .registry()
            .recent(&definition.id, LEDGER_CAPACITY)
            .await;
        entries.iter().filter(|e| e.ts >= since).for_each(&mut report);

        if once {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep_until(tick_started + period) => {}
            _ = &mut stop => break,
        }
    }
}
