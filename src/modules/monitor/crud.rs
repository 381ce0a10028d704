use async_trait::async_trait;
use sqlx::{MySql, Pool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::modules::monitor::model::{MonitorDefinition, MonitorRow, NewMonitor};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Corrupt monitor row {id}: {reason}")]
    CorruptRow { id: String, reason: String },
}

/// Durable mapping from URL to monitor definition.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Persist a new definition unless one already exists for the URL.
    ///
    /// Returns the stored definition and whether it was created by this
    /// call. An existing definition is returned untouched.
    async fn create_or_reuse(
        &self,
        monitor: NewMonitor,
    ) -> Result<(MonitorDefinition, bool), StoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<MonitorDefinition>, StoreError>;
}

// =============================================================================
// MYSQL
// =============================================================================

/// Extra attempts when InnoDB picks the insert as a deadlock victim.
const DEADLOCK_RETRIES: usize = 3;

const SELECT_COLUMNS: &str =
    "SELECT id, url, match_kind, match_value, interval_hours, email_to, email_message FROM monitors";

pub struct MySqlMonitorStore {
    pool: Pool<MySql>,
}

impl MySqlMonitorStore {
    pub fn new(pool: Pool<MySql>) -> Self {
        Self { pool }
    }

    async fn insert_if_absent(&self, id: &str, monitor: &NewMonitor) -> Result<(), sqlx::Error> {
        // The unique key on url decides the race; `id = id` leaves an
        // existing row as it was.
        sqlx::query(
            r#"
            INSERT INTO monitors (id, url, match_kind, match_value, interval_hours, email_to, email_message)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON DUPLICATE KEY UPDATE id = id
            "#,
        )
        .bind(id)
        .bind(&monitor.url)
        .bind(monitor.pattern.kind())
        .bind(monitor.pattern.value())
        .bind(monitor.interval.hours() as i32)
        .bind(&monitor.email_to)
        .bind(&monitor.email_message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<MonitorDefinition>, StoreError> {
        let row = sqlx::query_as::<_, MonitorRow>(&format!("{} WHERE url = ?", SELECT_COLUMNS))
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_definition).transpose()
    }
}

fn is_deadlock(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("40001"),
        _ => false,
    }
}

fn into_definition(row: MonitorRow) -> Result<MonitorDefinition, StoreError> {
    let id = row.id.clone();
    MonitorDefinition::try_from(row).map_err(|reason| StoreError::CorruptRow { id, reason })
}

#[async_trait]
impl MonitorStore for MySqlMonitorStore {
    async fn create_or_reuse(
        &self,
        monitor: NewMonitor,
    ) -> Result<(MonitorDefinition, bool), StoreError> {
        let id = Uuid::new_v4().to_string();

        let mut attempt = 0;
        loop {
            match self.insert_if_absent(&id, &monitor).await {
                Ok(()) => break,
                Err(e) if is_deadlock(&e) && attempt < DEADLOCK_RETRIES => {
                    attempt += 1;
                    tracing::warn!(url = %monitor.url, attempt, "monitor insert deadlocked, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Whoever's id is stored afterwards won the race
        let stored = self
            .find_by_url(&monitor.url)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        let created = stored.id == id;

        Ok((stored, created))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<MonitorDefinition>, StoreError> {
        let row = sqlx::query_as::<_, MonitorRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(into_definition).transpose()
    }
}

// =============================================================================
// IN-MEMORY
// =============================================================================

#[derive(Default)]
struct MemoryTables {
    by_url: HashMap<String, String>,
    by_id: HashMap<String, MonitorDefinition>,
}

/// Ephemeral store for deployments without a database.
#[derive(Default)]
pub struct MemoryMonitorStore {
    tables: RwLock<MemoryTables>,
}

impl MemoryMonitorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MonitorStore for MemoryMonitorStore {
    async fn create_or_reuse(
        &self,
        monitor: NewMonitor,
    ) -> Result<(MonitorDefinition, bool), StoreError> {
        let mut tables = self.tables.write().await;

        if let Some(existing) = tables
            .by_url
            .get(&monitor.url)
            .and_then(|id| tables.by_id.get(id))
        {
            return Ok((existing.clone(), false));
        }

        let definition = monitor.into_definition(Uuid::new_v4().to_string());
        tables
            .by_url
            .insert(definition.url.clone(), definition.id.clone());
        tables
            .by_id
            .insert(definition.id.clone(), definition.clone());

        Ok((definition, true))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<MonitorDefinition>, StoreError> {
        Ok(self.tables.read().await.by_id.get(id).cloned())
    }
}
