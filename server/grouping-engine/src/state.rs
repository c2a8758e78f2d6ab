//! Shared application state for the HTTP handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::ClusteringEngine;
use crate::providers::{Clock, TextGenerator, WorkflowTrigger};
use crate::resolution::ResolutionManager;
use crate::store::Store;
use crate::summary::SummaryAttacher;

/// Used when no text generator is configured.
const FALLBACK_TEXTGEN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct AppState {
  pub engine: ClusteringEngine,
  pub summaries: SummaryAttacher,
  pub resolutions: ResolutionManager,
  /// Read-only listing access for the dashboard routes.
  pub store: Arc<dyn Store>,
}

impl AppState {
  /// Wire every component to the same store and clock.
  pub fn new(
    config: Config,
    store: Arc<dyn Store>,
    generator: Arc<dyn TextGenerator>,
    trigger: Option<Arc<dyn WorkflowTrigger>>,
    clock: Clock,
  ) -> Self {
    let timeout = config
      .textgen
      .as_ref()
      .map(|t| t.timeout)
      .unwrap_or(FALLBACK_TEXTGEN_TIMEOUT);
    let summaries = SummaryAttacher::new(
      store.clone(),
      generator,
      config.summary_event_limit,
      config.title_max_chars,
      timeout,
    );
    let resolutions = ResolutionManager::new(store.clone(), clock.clone());
    let engine = ClusteringEngine::new(config, store.clone(), trigger, clock);
    Self {
      engine,
      summaries,
      resolutions,
      store,
    }
  }
}
