//! Engine configuration with sane defaults, loadable from environment variables.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("{var} is not a valid {expected}: {value}")]
  Invalid {
    var: &'static str,
    expected: &'static str,
    value: String,
  },
}

/// Outbound workflow endpoint (execution trigger per ingested event).
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
  pub base_url: String,
  pub tenant: String,
  pub namespace: String,
  pub flow_id: String,
  pub username: Option<String>,
  pub password: Option<String>,
  pub timeout: Duration,
}

impl WorkflowConfig {
  /// `{base}/api/v1/{tenant}/executions/{namespace}/{flow_id}`
  pub fn execution_url(&self) -> String {
    format!(
      "{}/api/v1/{}/executions/{}/{}",
      self.base_url.trim_end_matches('/'),
      self.tenant,
      self.namespace,
      self.flow_id
    )
  }
}

/// Outbound text-generation endpoint used for group summaries.
#[derive(Debug, Clone)]
pub struct TextGenConfig {
  pub url: String,
  pub timeout: Duration,
}

/// Tunables for ingestion, summarization and the HTTP surface.
#[derive(Debug, Clone)]
pub struct Config {
  pub bind: SocketAddr,
  /// When unset the service runs on the in-memory store.
  pub database_url: Option<String>,
  pub db_max_connections: u32,
  pub db_acquire_timeout: Duration,
  /// Environment tag stamped on events that arrive without one.
  pub default_env: String,
  /// Max recent events fed into a summary prompt.
  pub summary_event_limit: usize,
  /// Max characters kept from the generated title line.
  pub title_max_chars: usize,
  /// Update/insert rounds the store tries inside one fold before reporting a conflict.
  pub upsert_attempts: u32,
  /// Times the engine re-runs a whole fold after a store conflict.
  pub ingest_retries: u32,
  /// Upper bound on one workflow trigger call, whatever the trigger implementation.
  pub trigger_timeout: Duration,
  pub textgen: Option<TextGenConfig>,
  pub workflow: Option<WorkflowConfig>,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      bind: SocketAddr::from(([127, 0, 0, 1], 5005)),
      database_url: None,
      db_max_connections: 10,
      db_acquire_timeout: Duration::from_secs(5),
      default_env: "prod".into(),
      summary_event_limit: 20,
      title_max_chars: 190,
      upsert_attempts: 3,
      ingest_retries: 1,
      trigger_timeout: Duration::from_secs(10),
      textgen: None,
      workflow: None,
    }
  }
}

impl Config {
  /// Load configuration from environment variables, falling back to defaults.
  ///
  /// Environment variables:
  /// - BIND_ADDR, PORT: listen address (default 127.0.0.1:5005)
  /// - DATABASE_URL: PostgreSQL URL (unset = in-memory store)
  /// - DB_MAX_CONNECTIONS, DB_ACQUIRE_TIMEOUT_SECS
  /// - DEFAULT_ENV, SUMMARY_EVENT_LIMIT, TITLE_MAX_CHARS
  /// - UPSERT_ATTEMPTS, INGEST_RETRIES
  /// - TEXTGEN_URL, TEXTGEN_TIMEOUT_SECS
  /// - WORKFLOW_URL, WORKFLOW_TENANT, WORKFLOW_NAMESPACE, WORKFLOW_FLOW_ID,
  ///   WORKFLOW_USERNAME, WORKFLOW_PASSWORD, WORKFLOW_TIMEOUT_SECS
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|key| std::env::var(key).ok())
  }

  /// Same as [`Config::from_env`] but reads values through `lookup`.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
    let defaults = Config::default();

    let host: IpAddr = parse_or(get("BIND_ADDR"), "BIND_ADDR", "IP address", defaults.bind.ip())?;
    let port: u16 = parse_or(get("PORT"), "PORT", "u16", defaults.bind.port())?;

    let textgen = match get("TEXTGEN_URL") {
      Some(url) => Some(TextGenConfig {
        url,
        timeout: secs(get("TEXTGEN_TIMEOUT_SECS"), "TEXTGEN_TIMEOUT_SECS", 30)?,
      }),
      None => None,
    };

    let trigger_timeout = secs(get("WORKFLOW_TIMEOUT_SECS"), "WORKFLOW_TIMEOUT_SECS", 10)?;
    let workflow = match get("WORKFLOW_URL") {
      Some(base_url) => Some(WorkflowConfig {
        base_url,
        tenant: get("WORKFLOW_TENANT").unwrap_or_else(|| "main".into()),
        namespace: get("WORKFLOW_NAMESPACE").unwrap_or_else(|| "main".into()),
        flow_id: get("WORKFLOW_FLOW_ID").unwrap_or_else(|| "error-intake".into()),
        username: get("WORKFLOW_USERNAME"),
        password: get("WORKFLOW_PASSWORD"),
        timeout: trigger_timeout,
      }),
      None => None,
    };

    Ok(Self {
      bind: SocketAddr::new(host, port),
      database_url: get("DATABASE_URL"),
      db_max_connections: parse_or(
        get("DB_MAX_CONNECTIONS"),
        "DB_MAX_CONNECTIONS",
        "u32",
        defaults.db_max_connections,
      )?,
      db_acquire_timeout: secs(get("DB_ACQUIRE_TIMEOUT_SECS"), "DB_ACQUIRE_TIMEOUT_SECS", 5)?,
      default_env: get("DEFAULT_ENV").unwrap_or(defaults.default_env),
      summary_event_limit: parse_or(
        get("SUMMARY_EVENT_LIMIT"),
        "SUMMARY_EVENT_LIMIT",
        "usize",
        defaults.summary_event_limit,
      )?
      .max(1),
      title_max_chars: parse_or(
        get("TITLE_MAX_CHARS"),
        "TITLE_MAX_CHARS",
        "usize",
        defaults.title_max_chars,
      )?,
      upsert_attempts: parse_or(
        get("UPSERT_ATTEMPTS"),
        "UPSERT_ATTEMPTS",
        "u32",
        defaults.upsert_attempts,
      )?
      .max(1),
      ingest_retries: parse_or(
        get("INGEST_RETRIES"),
        "INGEST_RETRIES",
        "u32",
        defaults.ingest_retries,
      )?,
      trigger_timeout,
      textgen,
      workflow,
    })
  }
}

fn parse_or<T: std::str::FromStr>(
  value: Option<String>,
  var: &'static str,
  expected: &'static str,
  default: T,
) -> Result<T, ConfigError> {
  match value {
    Some(v) => v.parse().map_err(|_| ConfigError::Invalid { var, expected, value: v }),
    None => Ok(default),
  }
}

fn secs(value: Option<String>, var: &'static str, default: u64) -> Result<Duration, ConfigError> {
  parse_or(value, var, "number of seconds", default).map(Duration::from_secs)
}
