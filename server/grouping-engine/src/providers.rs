//! Outbound capabilities: text generation, workflow trigger, and the clock.
//!
//! Components receive these as trait objects at construction so tests can
//! substitute deterministic fakes for the network collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use crate::config::{TextGenConfig, WorkflowConfig};
use crate::error::{GenerateError, TriggerError};
use crate::types::ErrorEvent;

/// Source of "now" for group timestamps and default event timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
  Arc::new(Utc::now)
}

/// Opaque `text -> text` summarization capability.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerateError>;
}

/// Fire-and-forget notification sent after an ingestion commits.
#[async_trait]
pub trait WorkflowTrigger: Send + Sync {
  /// Returns the HTTP status of the accepted call.
  async fn trigger(&self, event: &ErrorEvent) -> Result<u16, TriggerError>;
}

/// Generator used when no TEXTGEN_URL is configured; always fails.
pub struct UnconfiguredGenerator;

#[async_trait]
impl TextGenerator for UnconfiguredGenerator {
  async fn generate(&self, _prompt: &str, _timeout: Duration) -> Result<String, GenerateError> {
    Err(GenerateError::NotConfigured)
  }
}

// ---------------------------------------------------------------------------
// HTTP text generation
// ---------------------------------------------------------------------------

/// POSTs `{"prompt": ...}` and reads `{"text": ...}` back.
pub struct HttpTextGenerator {
  client: reqwest::Client,
  url: String,
}

impl HttpTextGenerator {
  pub fn new(config: &TextGenConfig) -> Self {
    Self {
      client: reqwest::Client::new(),
      url: config.url.clone(),
    }
  }
}

#[async_trait]
impl TextGenerator for HttpTextGenerator {
  async fn generate(&self, prompt: &str, timeout: Duration) -> Result<String, GenerateError> {
    let resp = self
      .client
      .post(&self.url)
      .timeout(timeout)
      .json(&json!({ "prompt": prompt }))
      .send()
      .await
      .map_err(transport_error)?;

    let status = resp.status();
    if !status.is_success() {
      return Err(GenerateError::Status(status.as_u16()));
    }

    let body: Value = resp.json().await.map_err(|e| {
      if e.is_timeout() {
        GenerateError::Timeout
      } else {
        GenerateError::Malformed(e.to_string())
      }
    })?;

    body
      .get("text")
      .and_then(Value::as_str)
      .map(str::to_string)
      .ok_or_else(|| GenerateError::Malformed("missing string field \"text\"".into()))
  }
}

fn transport_error(e: reqwest::Error) -> GenerateError {
  if e.is_timeout() {
    GenerateError::Timeout
  } else {
    GenerateError::Transport(e.to_string())
  }
}

// ---------------------------------------------------------------------------
// HTTP workflow trigger
// ---------------------------------------------------------------------------

/// Starts one workflow execution per event, sending the event as the
/// multipart input `error_event`.
pub struct HttpWorkflowTrigger {
  client: reqwest::Client,
  config: WorkflowConfig,
}

impl HttpWorkflowTrigger {
  pub fn new(config: WorkflowConfig) -> Self {
    Self {
      client: reqwest::Client::new(),
      config,
    }
  }
}

#[async_trait]
impl WorkflowTrigger for HttpWorkflowTrigger {
  async fn trigger(&self, event: &ErrorEvent) -> Result<u16, TriggerError> {
    let payload = serde_json::to_string(event).map_err(|e| TriggerError::Encode(e.to_string()))?;
    let part = reqwest::multipart::Part::text(payload)
      .mime_str("application/json")
      .map_err(|e| TriggerError::Encode(e.to_string()))?;
    let form = reqwest::multipart::Form::new().part("error_event", part);

    let mut req = self
      .client
      .post(self.config.execution_url())
      .timeout(self.config.timeout)
      .multipart(form);
    if let Some(user) = &self.config.username {
      req = req.basic_auth(user, self.config.password.as_ref());
    }

    let resp = req
      .send()
      .await
      .map_err(|e| TriggerError::Transport(e.to_string()))?;
    let status = resp.status().as_u16();
    if !resp.status().is_success() {
      return Err(TriggerError::Status(status));
    }
    Ok(status)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
  use std::sync::Mutex;

  async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
  }

  fn textgen(url: String) -> HttpTextGenerator {
    HttpTextGenerator::new(&TextGenConfig {
      url,
      timeout: Duration::from_secs(5),
    })
  }

  #[tokio::test]
  async fn generator_returns_text_field() {
    let seen = Arc::new(Mutex::new(String::new()));
    let app = Router::new()
      .route(
        "/infer",
        post(|State(seen): State<Arc<Mutex<String>>>, Json(body): Json<Value>| async move {
          *seen.lock().unwrap() = body["prompt"].as_str().unwrap_or_default().to_string();
          Json(json!({ "text": "Pool exhausted\nThe orders pool ran dry." }))
        }),
      )
      .with_state(seen.clone());
    let base = serve(app).await;

    let text = textgen(format!("{}/infer", base))
      .generate("hello", Duration::from_secs(5))
      .await
      .unwrap();
    assert_eq!(text, "Pool exhausted\nThe orders pool ran dry.");
    assert_eq!(*seen.lock().unwrap(), "hello");
  }

  #[tokio::test]
  async fn generator_maps_non_success_status() {
    let app = Router::new().route("/infer", post(|| async { StatusCode::BAD_GATEWAY }));
    let base = serve(app).await;

    let err = textgen(format!("{}/infer", base))
      .generate("hello", Duration::from_secs(5))
      .await
      .unwrap_err();
    assert!(matches!(err, GenerateError::Status(502)), "{:?}", err);
  }

  #[tokio::test]
  async fn generator_rejects_missing_text() {
    let app = Router::new().route("/infer", post(|| async { Json(json!({ "output": "x" })) }));
    let base = serve(app).await;

    let err = textgen(format!("{}/infer", base))
      .generate("hello", Duration::from_secs(5))
      .await
      .unwrap_err();
    assert!(matches!(err, GenerateError::Malformed(_)), "{:?}", err);
  }

  #[tokio::test]
  async fn generator_times_out() {
    let app = Router::new().route(
      "/infer",
      post(|| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Json(json!({ "text": "late" }))
      }),
    );
    let base = serve(app).await;

    let err = textgen(format!("{}/infer", base))
      .generate("hello", Duration::from_millis(100))
      .await
      .unwrap_err();
    assert!(matches!(err, GenerateError::Timeout), "{:?}", err);
  }

  fn workflow(base: String) -> WorkflowConfig {
    WorkflowConfig {
      base_url: base,
      tenant: "main".into(),
      namespace: "main".into(),
      flow_id: "error-intake".into(),
      username: None,
      password: None,
      timeout: Duration::from_secs(5),
    }
  }

  fn sample_event() -> ErrorEvent {
    ErrorEvent {
      id: 7,
      service: "order-api".into(),
      error_type: "DBError".into(),
      message: "pool exhausted".into(),
      timestamp: Utc::now(),
      env: "prod".into(),
      path: "/v1/orders/checkout".into(),
      trace_id: "abc".into(),
    }
  }

  #[tokio::test]
  async fn trigger_posts_to_execution_url() {
    let app = Router::new().route(
      "/api/v1/main/executions/main/error-intake",
      post(|| async { StatusCode::OK }),
    );
    let base = serve(app).await;

    let status = HttpWorkflowTrigger::new(workflow(base))
      .trigger(&sample_event())
      .await
      .unwrap();
    assert_eq!(status, 200);
  }

  #[tokio::test]
  async fn trigger_reports_failed_status() {
    let base = serve(Router::new()).await;

    let err = HttpWorkflowTrigger::new(workflow(base))
      .trigger(&sample_event())
      .await
      .unwrap_err();
    assert!(matches!(err, TriggerError::Status(404)), "{:?}", err);
  }

  #[tokio::test]
  async fn unconfigured_generator_always_fails() {
    let err = UnconfiguredGenerator
      .generate("x", Duration::from_secs(1))
      .await
      .unwrap_err();
    assert!(matches!(err, GenerateError::NotConfigured));
  }
}
