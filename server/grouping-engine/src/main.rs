//! Binary entrypoint for the grouping engine HTTP service.

use std::sync::Arc;

use grouping_engine::providers::{
  system_clock, HttpTextGenerator, HttpWorkflowTrigger, TextGenerator, UnconfiguredGenerator,
  WorkflowTrigger,
};
use grouping_engine::{AppState, Config, MemoryStore, PgStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("grouping_engine=info,tower_http=info")),
    )
    .init();

  let config = Config::from_env()?;

  let store: Arc<dyn Store> = match &config.database_url {
    Some(url) => {
      let store = PgStore::connect(
        url,
        config.db_max_connections,
        config.db_acquire_timeout,
        config.upsert_attempts,
      )
      .await?;
      store.migrate().await?;
      tracing::info!("using PostgreSQL store");
      Arc::new(store)
    }
    None => {
      tracing::warn!("DATABASE_URL not set, groups are kept in memory only");
      Arc::new(MemoryStore::new())
    }
  };

  let generator: Arc<dyn TextGenerator> = match &config.textgen {
    Some(textgen) => Arc::new(HttpTextGenerator::new(textgen)),
    None => {
      tracing::warn!("TEXTGEN_URL not set, summarize requests will fail");
      Arc::new(UnconfiguredGenerator)
    }
  };

  let trigger: Option<Arc<dyn WorkflowTrigger>> = config
    .workflow
    .clone()
    .map(|w| Arc::new(HttpWorkflowTrigger::new(w)) as Arc<dyn WorkflowTrigger>);

  let addr = config.bind;
  let state = Arc::new(AppState::new(config, store, generator, trigger, system_clock()));
  let app = grouping_engine::router(state);

  tracing::info!(%addr, "grouping-engine listening");
  let listener = tokio::net::TcpListener::bind(addr).await?;
  axum::serve(listener, app).await?;

  Ok(())
}
