//! In-process store with the same fold semantics as the PostgreSQL store.
//!
//! A single mutex guards both tables, so every operation is atomic with respect
//! to every other. Used by tests and when no DATABASE_URL is configured.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Folded, Store};
use crate::error::StoreError;
use crate::types::{ErrorEvent, ErrorGroup, GroupId, GroupStatus};

#[derive(Default)]
struct Tables {
  errors: Vec<ErrorEvent>,
  groups: Vec<ErrorGroup>,
  /// cluster_key -> index into `groups` (the uniqueness constraint).
  by_key: HashMap<String, usize>,
}

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
    self
      .tables
      .lock()
      .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn record(
    &self,
    event: &ErrorEvent,
    cluster_key: &str,
    now: DateTime<Utc>,
  ) -> Result<Folded, StoreError> {
    let mut tables = self.lock()?;

    let event_id = tables.errors.len() as i64 + 1;
    let mut stored = event.clone();
    stored.id = event_id;

    let (group_id, created) = match tables.by_key.get(cluster_key).copied() {
      Some(idx) => {
        let group = &mut tables.groups[idx];
        group.count += 1;
        group.last_seen = group.last_seen.max(now);
        group.status = GroupStatus::Open;
        group.resolved_at = None;
        group.resolution_reason = None;
        (group.id, false)
      }
      None => {
        let id = tables.groups.len() as GroupId + 1;
        tables.groups.push(ErrorGroup {
          id,
          cluster_key: cluster_key.to_string(),
          service: event.service.clone(),
          error_type: event.error_type.clone(),
          title: None,
          summary: None,
          status: GroupStatus::Open,
          count: 1,
          first_seen: now,
          last_seen: now,
          resolved_at: None,
          resolution_reason: None,
        });
        let idx = tables.groups.len() - 1;
        tables.by_key.insert(cluster_key.to_string(), idx);
        (id, true)
      }
    };

    tables.errors.push(stored);

    Ok(Folded {
      group_id,
      event_id,
      created,
    })
  }

  async fn group_by_key(&self, cluster_key: &str) -> Result<Option<ErrorGroup>, StoreError> {
    let tables = self.lock()?;
    Ok(tables.by_key.get(cluster_key).map(|&idx| tables.groups[idx].clone()))
  }

  async fn group_by_id(&self, group_id: GroupId) -> Result<Option<ErrorGroup>, StoreError> {
    let tables = self.lock()?;
    Ok(tables.groups.iter().find(|g| g.id == group_id).cloned())
  }

  async fn apply_summary(
    &self,
    cluster_key: &str,
    title: &str,
    summary: &str,
  ) -> Result<Option<GroupId>, StoreError> {
    let mut tables = self.lock()?;
    let idx = match tables.by_key.get(cluster_key).copied() {
      Some(idx) => idx,
      None => return Ok(None),
    };
    let group = &mut tables.groups[idx];
    group.title = Some(title.to_string());
    group.summary = Some(summary.to_string());
    Ok(Some(group.id))
  }

  async fn resolve(
    &self,
    group_id: GroupId,
    reason: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<ErrorGroup>, StoreError> {
    let mut tables = self.lock()?;
    let group = match tables.groups.iter_mut().find(|g| g.id == group_id) {
      Some(g) => g,
      None => return Ok(None),
    };
    group.status = GroupStatus::Resolved;
    group.resolved_at = Some(group.resolved_at.unwrap_or(now));
    group.resolution_reason = Some(reason.to_string());
    Ok(Some(group.clone()))
  }

  async fn recent_events(
    &self,
    service: &str,
    error_type: &str,
    limit: usize,
  ) -> Result<Vec<ErrorEvent>, StoreError> {
    let tables = self.lock()?;
    let mut events: Vec<ErrorEvent> = tables
      .errors
      .iter()
      .filter(|e| e.service == service && e.error_type == error_type)
      .cloned()
      .collect();
    newest_first(&mut events);
    events.truncate(limit);
    Ok(events)
  }

  async fn list_groups(&self, limit: usize) -> Result<Vec<ErrorGroup>, StoreError> {
    let tables = self.lock()?;
    let mut groups = tables.groups.clone();
    groups.sort_by(|a, b| b.last_seen.cmp(&a.last_seen).then(b.id.cmp(&a.id)));
    groups.truncate(limit);
    Ok(groups)
  }

  async fn list_events(&self, limit: usize) -> Result<Vec<ErrorEvent>, StoreError> {
    let tables = self.lock()?;
    let mut events = tables.errors.clone();
    newest_first(&mut events);
    events.truncate(limit);
    Ok(events)
  }
}

fn newest_first(events: &mut [ErrorEvent]) {
  events.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
}
