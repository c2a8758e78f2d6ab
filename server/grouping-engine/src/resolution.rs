//! Manual resolution of error groups.

use std::sync::Arc;

use crate::error::EngineError;
use crate::providers::Clock;
use crate::store::Store;
use crate::types::{GroupId, Resolved};

pub const DEFAULT_REASON: &str = "manual";

pub struct ResolutionManager {
  store: Arc<dyn Store>,
  clock: Clock,
}

impl ResolutionManager {
  pub fn new(store: Arc<dyn Store>, clock: Clock) -> Self {
    Self { store, clock }
  }

  /// Mark a group RESOLVED. Resolving an already-resolved group succeeds and
  /// keeps its original resolved_at. A later ingestion for the same key reopens it.
  pub async fn resolve(&self, group_id: GroupId, reason: Option<&str>) -> Result<Resolved, EngineError> {
    let reason = reason
      .map(str::trim)
      .filter(|r| !r.is_empty())
      .unwrap_or(DEFAULT_REASON);

    let group = self
      .store
      .resolve(group_id, reason, (self.clock)())
      .await?
      .ok_or_else(|| EngineError::not_found(format!("group {}", group_id)))?;

    tracing::info!(group_id, cluster_key = %group.cluster_key, reason, "group resolved");

    Ok(Resolved {
      group_id: group.id,
      status: group.status,
      resolved_at: group.resolved_at,
    })
  }
}
