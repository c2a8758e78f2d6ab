//! Core engine: validates events, folds them into groups, fires the workflow trigger.

use std::sync::Arc;

use crate::cluster;
use crate::config::Config;
use crate::error::{EngineError, StoreError};
use crate::normalize;
use crate::providers::{Clock, WorkflowTrigger};
use crate::store::{Folded, Store};
use crate::types::*;

/// The clustering engine. Holds no group state of its own; every call reads and
/// writes through the store.
pub struct ClusteringEngine {
  config: Config,
  store: Arc<dyn Store>,
  trigger: Option<Arc<dyn WorkflowTrigger>>,
  clock: Clock,
}

impl ClusteringEngine {
  pub fn new(
    config: Config,
    store: Arc<dyn Store>,
    trigger: Option<Arc<dyn WorkflowTrigger>>,
    clock: Clock,
  ) -> Self {
    Self {
      config,
      store,
      trigger,
      clock,
    }
  }

  /// Ingest a single inbound error report.
  ///
  /// The event append and the group fold commit together. The workflow trigger
  /// runs afterwards and its failure is reported in `Ingested::workflow`, never
  /// as an error.
  pub async fn ingest(&self, raw: &InboundError) -> Result<Ingested, EngineError> {
    let now = (self.clock)();
    let mut event = normalize::normalize(raw, now, &self.config.default_env)?;
    let cluster_key = cluster::compute(&event);

    let folded = self.fold(&event, &cluster_key, now).await?;
    event.id = folded.event_id;

    if folded.created {
      tracing::info!(cluster_key = %cluster_key, group_id = folded.group_id, trace_id = %event.trace_id, "new error group");
    } else {
      tracing::debug!(cluster_key = %cluster_key, group_id = folded.group_id, trace_id = %event.trace_id, "event folded");
    }

    let workflow = self.notify(&event).await;

    Ok(Ingested {
      group_id: folded.group_id,
      cluster_key,
      trace_id: event.trace_id,
      created: folded.created,
      workflow,
    })
  }

  /// Run the store's fold, re-running the whole unit on an unresolved uniqueness race.
  async fn fold(
    &self,
    event: &ErrorEvent,
    cluster_key: &str,
    now: chrono::DateTime<chrono::Utc>,
  ) -> Result<Folded, EngineError> {
    let mut retries_left = self.config.ingest_retries;
    loop {
      match self.store.record(event, cluster_key, now).await {
        Ok(folded) => return Ok(folded),
        Err(StoreError::Conflict(msg)) if retries_left > 0 => {
          retries_left -= 1;
          tracing::warn!(cluster_key, reason = %msg, "group fold conflicted, retrying");
        }
        Err(e) => {
          tracing::error!(cluster_key, error = %e, "group fold failed");
          return Err(e.into());
        }
      }
    }
  }

  async fn notify(&self, event: &ErrorEvent) -> WorkflowOutcome {
    let trigger = match &self.trigger {
      Some(t) => t,
      None => return WorkflowOutcome::Skipped,
    };
    let message = match tokio::time::timeout(self.config.trigger_timeout, trigger.trigger(event)).await {
      Ok(Ok(status)) => return WorkflowOutcome::Delivered { status },
      Ok(Err(e)) => e.to_string(),
      Err(_) => "timed out".to_string(),
    };
    tracing::warn!(trace_id = %event.trace_id, error = %message, "workflow trigger failed");
    WorkflowOutcome::Failed { message }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::TriggerError;
  use crate::store::MemoryStore;
  use async_trait::async_trait;
  use chrono::{DateTime, TimeZone, Utc};
  use std::sync::atomic::{AtomicU32, Ordering};

  fn fixed_clock() -> Clock {
    Arc::new(|| Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap())
  }

  fn inbound(service: &str, error_type: &str) -> InboundError {
    InboundError {
      service: Some(service.into()),
      error_type: Some(error_type.into()),
      message: Some("pool exhausted".into()),
      ..Default::default()
    }
  }

  /// Reports a conflict for the first `failures` calls, then delegates.
  struct ConflictingStore {
    inner: MemoryStore,
    failures: AtomicU32,
  }

  #[async_trait]
  impl Store for ConflictingStore {
    async fn record(
      &self,
      event: &ErrorEvent,
      cluster_key: &str,
      now: DateTime<Utc>,
    ) -> Result<Folded, StoreError> {
      if self
        .failures
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
      {
        return Err(StoreError::Conflict(cluster_key.to_string()));
      }
      self.inner.record(event, cluster_key, now).await
    }

    async fn group_by_key(&self, key: &str) -> Result<Option<ErrorGroup>, StoreError> {
      self.inner.group_by_key(key).await
    }

    async fn group_by_id(&self, id: GroupId) -> Result<Option<ErrorGroup>, StoreError> {
      self.inner.group_by_id(id).await
    }

    async fn apply_summary(&self, key: &str, t: &str, s: &str) -> Result<Option<GroupId>, StoreError> {
      self.inner.apply_summary(key, t, s).await
    }

    async fn resolve(
      &self,
      id: GroupId,
      reason: &str,
      now: DateTime<Utc>,
    ) -> Result<Option<ErrorGroup>, StoreError> {
      self.inner.resolve(id, reason, now).await
    }

    async fn recent_events(&self, s: &str, e: &str, limit: usize) -> Result<Vec<ErrorEvent>, StoreError> {
      self.inner.recent_events(s, e, limit).await
    }

    async fn list_groups(&self, limit: usize) -> Result<Vec<ErrorGroup>, StoreError> {
      self.inner.list_groups(limit).await
    }

    async fn list_events(&self, limit: usize) -> Result<Vec<ErrorEvent>, StoreError> {
      self.inner.list_events(limit).await
    }
  }

  struct FailingTrigger;

  #[async_trait]
  impl WorkflowTrigger for FailingTrigger {
    async fn trigger(&self, _event: &ErrorEvent) -> Result<u16, TriggerError> {
      Err(TriggerError::Status(500))
    }
  }

  /// Never answers within the engine's trigger timeout.
  struct StalledTrigger;

  #[async_trait]
  impl WorkflowTrigger for StalledTrigger {
    async fn trigger(&self, _event: &ErrorEvent) -> Result<u16, TriggerError> {
      tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
      Ok(200)
    }
  }

  fn engine(store: Arc<dyn Store>, trigger: Option<Arc<dyn WorkflowTrigger>>) -> ClusteringEngine {
    ClusteringEngine::new(Config::default(), store, trigger, fixed_clock())
  }

  #[tokio::test]
  async fn first_event_creates_open_group() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), None);

    let out = engine.ingest(&inbound("order-api", "DBError")).await.unwrap();
    assert!(out.created);
    assert_eq!(out.cluster_key, "order-api:DBError");
    assert_eq!(out.workflow, WorkflowOutcome::Skipped);

    let group = store.group_by_key("order-api:DBError").await.unwrap().unwrap();
    assert_eq!(group.id, out.group_id);
    assert_eq!(group.status, GroupStatus::Open);
    assert_eq!(group.count, 1);
  }

  #[tokio::test]
  async fn returned_trace_id_matches_stored_event() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), None);

    let out = engine.ingest(&inbound("order-api", "DBError")).await.unwrap();
    let events = store.list_events(1).await.unwrap();
    assert_eq!(events[0].trace_id, out.trace_id);
  }

  #[tokio::test]
  async fn invalid_event_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), None);

    let err = engine.ingest(&inbound("order-api", "")).await.unwrap_err();
    assert!(matches!(err, EngineError::Validation { .. }));
    assert!(store.list_events(10).await.unwrap().is_empty());
    assert!(store.list_groups(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn conflict_is_retried_once() {
    let store = Arc::new(ConflictingStore {
      inner: MemoryStore::new(),
      failures: AtomicU32::new(1),
    });
    let engine = engine(store.clone(), None);

    let out = engine.ingest(&inbound("order-api", "DBError")).await.unwrap();
    assert!(out.created);
    let group = store.group_by_key("order-api:DBError").await.unwrap().unwrap();
    assert_eq!(group.count, 1);
  }

  #[tokio::test]
  async fn persistent_conflict_surfaces_as_storage_error() {
    let store = Arc::new(ConflictingStore {
      inner: MemoryStore::new(),
      failures: AtomicU32::new(5),
    });
    let engine = engine(store.clone(), None);

    let err = engine.ingest(&inbound("order-api", "DBError")).await.unwrap_err();
    assert!(matches!(err, EngineError::Storage(StoreError::Conflict(_))), "{:?}", err);
    assert!(store.list_events(10).await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn trigger_failure_keeps_ingestion() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(store.clone(), Some(Arc::new(FailingTrigger) as Arc<dyn WorkflowTrigger>));

    let out = engine.ingest(&inbound("order-api", "DBError")).await.unwrap();
    assert!(matches!(out.workflow, WorkflowOutcome::Failed { .. }));
    let group = store.group_by_key("order-api:DBError").await.unwrap().unwrap();
    assert_eq!(group.count, 1);
  }

  #[tokio::test]
  async fn stalled_trigger_times_out_after_commit() {
    let store = Arc::new(MemoryStore::new());
    let config = Config {
      trigger_timeout: std::time::Duration::from_millis(50),
      ..Config::default()
    };
    let trigger = Arc::new(StalledTrigger) as Arc<dyn WorkflowTrigger>;
    let engine = ClusteringEngine::new(config, store.clone(), Some(trigger), fixed_clock());

    let out = tokio::time::timeout(std::time::Duration::from_secs(5), engine.ingest(&inbound("order-api", "DBError")))
      .await
      .expect("ingest returned")
      .unwrap();
    assert_eq!(
      out.workflow,
      WorkflowOutcome::Failed {
        message: "timed out".into()
      }
    );
    assert_eq!(out.cluster_key, "order-api:DBError");
    let group = store.group_by_key("order-api:DBError").await.unwrap().unwrap();
    assert_eq!(group.id, out.group_id);
    assert_eq!(group.count, 1);
  }
}
