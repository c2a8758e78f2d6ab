//! PostgreSQL store.
//!
//! The fold is a conditional UPDATE followed, when no row matched, by an
//! `INSERT .. ON CONFLICT (cluster_key) DO NOTHING`. A concurrent transaction
//! that wins the insert makes ours return no row, and the next UPDATE sees the
//! committed group. The UPDATE's row lock serializes increments on one key.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgPoolOptions, PgRow};

use super::{Folded, Store};
use crate::error::StoreError;
use crate::types::{ErrorEvent, ErrorGroup, GroupId, GroupStatus};

const SCHEMA: &[&str] = &[
  r#"
  CREATE TABLE IF NOT EXISTS errors (
    id BIGSERIAL PRIMARY KEY,
    service TEXT NOT NULL,
    error_type TEXT NOT NULL,
    message TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL,
    env TEXT NOT NULL,
    path TEXT NOT NULL DEFAULT '',
    trace_id TEXT NOT NULL
  )
  "#,
  "CREATE INDEX IF NOT EXISTS errors_group_recent ON errors (service, error_type, timestamp DESC)",
  r#"
  CREATE TABLE IF NOT EXISTS error_groups (
    id BIGSERIAL PRIMARY KEY,
    cluster_key TEXT NOT NULL UNIQUE,
    service TEXT NOT NULL,
    error_type TEXT NOT NULL,
    title TEXT,
    summary TEXT,
    status TEXT NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'RESOLVED')),
    count BIGINT NOT NULL DEFAULT 0,
    first_seen TIMESTAMPTZ NOT NULL,
    last_seen TIMESTAMPTZ NOT NULL,
    resolved_at TIMESTAMPTZ,
    resolution_reason TEXT,
    CHECK ((status = 'RESOLVED') = (resolved_at IS NOT NULL))
  )
  "#,
  "CREATE INDEX IF NOT EXISTS error_groups_last_seen ON error_groups (last_seen DESC)",
];

const GROUP_COLUMNS: &str = "id, cluster_key, service, error_type, title, summary, status, count, \
   first_seen, last_seen, resolved_at, resolution_reason";

const EVENT_COLUMNS: &str = "id, service, error_type, message, timestamp, env, path, trace_id";

pub struct PgStore {
  pool: PgPool,
  upsert_attempts: u32,
}

impl PgStore {
  pub fn new(pool: PgPool, upsert_attempts: u32) -> Self {
    Self {
      pool,
      upsert_attempts: upsert_attempts.max(1),
    }
  }

  pub async fn connect(
    url: &str,
    max_connections: u32,
    acquire_timeout: Duration,
    upsert_attempts: u32,
  ) -> Result<Self, StoreError> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .acquire_timeout(acquire_timeout)
      .connect(url)
      .await?;
    Ok(Self::new(pool, upsert_attempts))
  }

  /// Create tables and indexes if they do not exist yet.
  pub async fn migrate(&self) -> Result<(), StoreError> {
    for statement in SCHEMA {
      query(statement).execute(&self.pool).await?;
    }
    Ok(())
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

#[async_trait]
impl Store for PgStore {
  async fn record(
    &self,
    event: &ErrorEvent,
    cluster_key: &str,
    now: DateTime<Utc>,
  ) -> Result<Folded, StoreError> {
    let mut tx = self.pool.begin().await?;

    let event_id: i64 = query(
      r#"
      INSERT INTO errors (service, error_type, message, timestamp, env, path, trace_id)
      VALUES ($1, $2, $3, $4, $5, $6, $7)
      RETURNING id
      "#,
    )
    .bind(&event.service)
    .bind(&event.error_type)
    .bind(&event.message)
    .bind(event.timestamp)
    .bind(&event.env)
    .bind(&event.path)
    .bind(&event.trace_id)
    .fetch_one(&mut *tx)
    .await?
    .try_get("id")?;

    for attempt in 1..=self.upsert_attempts {
      let updated = query(
        r#"
        UPDATE error_groups SET
          count = count + 1,
          last_seen = GREATEST(last_seen, $2),
          status = 'OPEN',
          resolved_at = NULL,
          resolution_reason = NULL
        WHERE cluster_key = $1
        RETURNING id
        "#,
      )
      .bind(cluster_key)
      .bind(now)
      .fetch_optional(&mut *tx)
      .await?;

      if let Some(row) = updated {
        let group_id: GroupId = row.try_get("id")?;
        tx.commit().await?;
        return Ok(Folded {
          group_id,
          event_id,
          created: false,
        });
      }

      let inserted = query(
        r#"
        INSERT INTO error_groups (cluster_key, service, error_type, status, count, first_seen, last_seen)
        VALUES ($1, $2, $3, 'OPEN', 1, $4, $4)
        ON CONFLICT (cluster_key) DO NOTHING
        RETURNING id
        "#,
      )
      .bind(cluster_key)
      .bind(&event.service)
      .bind(&event.error_type)
      .bind(now)
      .fetch_optional(&mut *tx)
      .await?;

      if let Some(row) = inserted {
        let group_id: GroupId = row.try_get("id")?;
        tx.commit().await?;
        return Ok(Folded {
          group_id,
          event_id,
          created: true,
        });
      }

      tracing::debug!(cluster_key, attempt, "lost group insert race, retrying update");
    }

    // Dropping `tx` rolls back the event append.
    Err(StoreError::Conflict(format!(
      "{}: group neither updated nor inserted after {} attempts",
      cluster_key, self.upsert_attempts
    )))
  }

  async fn group_by_key(&self, cluster_key: &str) -> Result<Option<ErrorGroup>, StoreError> {
    let sql = format!("SELECT {} FROM error_groups WHERE cluster_key = $1", GROUP_COLUMNS);
    let row = query(&sql).bind(cluster_key).fetch_optional(&self.pool).await?;
    row.as_ref().map(group_from_row).transpose()
  }

  async fn group_by_id(&self, group_id: GroupId) -> Result<Option<ErrorGroup>, StoreError> {
    let sql = format!("SELECT {} FROM error_groups WHERE id = $1", GROUP_COLUMNS);
    let row = query(&sql).bind(group_id).fetch_optional(&self.pool).await?;
    row.as_ref().map(group_from_row).transpose()
  }

  async fn apply_summary(
    &self,
    cluster_key: &str,
    title: &str,
    summary: &str,
  ) -> Result<Option<GroupId>, StoreError> {
    let row = query("UPDATE error_groups SET title = $2, summary = $3 WHERE cluster_key = $1 RETURNING id")
      .bind(cluster_key)
      .bind(title)
      .bind(summary)
      .fetch_optional(&self.pool)
      .await?;
    match row {
      Some(row) => Ok(Some(row.try_get("id")?)),
      None => Ok(None),
    }
  }

  async fn resolve(
    &self,
    group_id: GroupId,
    reason: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<ErrorGroup>, StoreError> {
    let sql = format!(
      r#"
      UPDATE error_groups SET
        status = 'RESOLVED',
        resolved_at = COALESCE(resolved_at, $3),
        resolution_reason = $2
      WHERE id = $1
      RETURNING {}
      "#,
      GROUP_COLUMNS
    );
    let row = query(&sql)
      .bind(group_id)
      .bind(reason)
      .bind(now)
      .fetch_optional(&self.pool)
      .await?;
    row.as_ref().map(group_from_row).transpose()
  }

  async fn recent_events(
    &self,
    service: &str,
    error_type: &str,
    limit: usize,
  ) -> Result<Vec<ErrorEvent>, StoreError> {
    let sql = format!(
      "SELECT {} FROM errors WHERE service = $1 AND error_type = $2 \
       ORDER BY timestamp DESC, id DESC LIMIT $3",
      EVENT_COLUMNS
    );
    let rows = query(&sql)
      .bind(service)
      .bind(error_type)
      .bind(limit_param(limit))
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(event_from_row).collect()
  }

  async fn list_groups(&self, limit: usize) -> Result<Vec<ErrorGroup>, StoreError> {
    let sql = format!(
      "SELECT {} FROM error_groups ORDER BY last_seen DESC, id DESC LIMIT $1",
      GROUP_COLUMNS
    );
    let rows = query(&sql).bind(limit_param(limit)).fetch_all(&self.pool).await?;
    rows.iter().map(group_from_row).collect()
  }

  async fn list_events(&self, limit: usize) -> Result<Vec<ErrorEvent>, StoreError> {
    let sql = format!(
      "SELECT {} FROM errors ORDER BY timestamp DESC, id DESC LIMIT $1",
      EVENT_COLUMNS
    );
    let rows = query(&sql).bind(limit_param(limit)).fetch_all(&self.pool).await?;
    rows.iter().map(event_from_row).collect()
  }
}

fn limit_param(limit: usize) -> i64 {
  i64::try_from(limit).unwrap_or(i64::MAX)
}

fn group_from_row(row: &PgRow) -> Result<ErrorGroup, StoreError> {
  let status: String = row.try_get("status")?;
  Ok(ErrorGroup {
    id: row.try_get("id")?,
    cluster_key: row.try_get("cluster_key")?,
    service: row.try_get("service")?,
    error_type: row.try_get("error_type")?,
    title: row.try_get("title")?,
    summary: row.try_get("summary")?,
    status: status.parse::<GroupStatus>().map_err(StoreError::Corrupt)?,
    count: row.try_get("count")?,
    first_seen: row.try_get("first_seen")?,
    last_seen: row.try_get("last_seen")?,
    resolved_at: row.try_get("resolved_at")?,
    resolution_reason: row.try_get("resolution_reason")?,
  })
}

fn event_from_row(row: &PgRow) -> Result<ErrorEvent, StoreError> {
  Ok(ErrorEvent {
    id: row.try_get("id")?,
    service: row.try_get("service")?,
    error_type: row.try_get("error_type")?,
    message: row.try_get("message")?,
    timestamp: row.try_get("timestamp")?,
    env: row.try_get("env")?,
    path: row.try_get("path")?,
    trace_id: row.try_get("trace_id")?,
  })
}
