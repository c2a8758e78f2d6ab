//! Persistence for raw events and error groups.
//!
//! Two tables back every implementation:
//! - `errors`: append-only event log.
//! - `error_groups`: one row per cluster_key (UNIQUE), owned exclusively by the store.
//!
//! Callers never assign group fields directly. Each mutation touches only the
//! columns it owns, so ingestion, summarization and resolution can race on the
//! same group without losing each other's updates.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::types::{ErrorEvent, ErrorGroup, GroupId};

/// Result of folding one event into its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Folded {
  pub group_id: GroupId,
  pub event_id: i64,
  /// True when the fold inserted the group row.
  pub created: bool,
}

#[async_trait]
pub trait Store: Send + Sync {
  /// Append `event` and fold it into the group for `cluster_key` as one unit.
  ///
  /// Existing group: count + 1, last_seen = max(last_seen, now), status OPEN,
  /// resolution cleared. Missing group: inserted with count 1 and
  /// first_seen = last_seen = now. Returns `StoreError::Conflict` when the
  /// uniqueness race is still unresolved after the configured attempts.
  async fn record(
    &self,
    event: &ErrorEvent,
    cluster_key: &str,
    now: DateTime<Utc>,
  ) -> Result<Folded, StoreError>;

  async fn group_by_key(&self, cluster_key: &str) -> Result<Option<ErrorGroup>, StoreError>;

  async fn group_by_id(&self, group_id: GroupId) -> Result<Option<ErrorGroup>, StoreError>;

  /// Set title and summary only. `None` when no group has this key.
  async fn apply_summary(
    &self,
    cluster_key: &str,
    title: &str,
    summary: &str,
  ) -> Result<Option<GroupId>, StoreError>;

  /// Mark the group RESOLVED. A group that is already resolved keeps its
  /// resolved_at. `None` when the group does not exist.
  async fn resolve(
    &self,
    group_id: GroupId,
    reason: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<ErrorGroup>, StoreError>;

  /// Most recent events for one (service, error_type), newest first.
  async fn recent_events(
    &self,
    service: &str,
    error_type: &str,
    limit: usize,
  ) -> Result<Vec<ErrorEvent>, StoreError>;

  /// Groups ordered by last_seen, newest first.
  async fn list_groups(&self, limit: usize) -> Result<Vec<ErrorGroup>, StoreError>;

  /// Events ordered by timestamp, newest first.
  async fn list_events(&self, limit: usize) -> Result<Vec<ErrorEvent>, StoreError>;
}
