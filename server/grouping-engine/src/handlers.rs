//! HTTP handlers and router for the grouping engine.

use axum::{
  body::Bytes,
  extract::{
    rejection::{JsonRejection, QueryRejection},
    Path, Query, State,
  },
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::EngineError;
use crate::sample;
use crate::state::AppState;
use crate::types::{ErrorEvent, ErrorGroup, ErrorOutput, GroupId, InboundError, Ingested, Resolved, Summarized};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub fn router(state: Arc<AppState>) -> Router {
  Router::new()
    .route("/health", get(health))
    .route("/errors", get(list_errors).post(ingest))
    .route("/errors/random", post(ingest_random))
    .route("/groups", get(list_groups))
    .route("/groups/:group", get(get_group))
    .route("/groups/:group/summarize", post(summarize))
    .route("/groups/:group/resolve", post(resolve))
    .layer(TraceLayer::new_for_http())
    .layer(CorsLayer::permissive())
    .with_state(state)
}

/// Error response: `{"error": code, "message": text}` with a status per failure kind.
pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
  fn from(e: EngineError) -> Self {
    Self(e)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      EngineError::Validation { .. } => StatusCode::BAD_REQUEST,
      EngineError::NotFound(_) => StatusCode::NOT_FOUND,
      EngineError::NoData(_) => StatusCode::CONFLICT,
      EngineError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
      EngineError::Summarization(_) => StatusCode::BAD_GATEWAY,
    };
    let body = match &self.0 {
      EngineError::Validation { field, reason } => {
        ErrorOutput::new(self.0.code(), reason.clone()).with_field(field.clone())
      }
      other => ErrorOutput::new(other.code(), other.to_string()),
    };
    (status, Json(body)).into_response()
  }
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub limit: Option<usize>,
}

impl ListParams {
  fn limit(&self) -> usize {
    self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
  }
}

fn list_limit(params: Result<Query<ListParams>, QueryRejection>) -> Result<usize, EngineError> {
  let Query(params) = params.map_err(|e| EngineError::validation("limit", &e.body_text()))?;
  Ok(params.limit())
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
  #[serde(default)]
  pub reason: Option<String>,
}

pub async fn health() -> &'static str {
  "ok"
}

pub async fn ingest(
  State(state): State<Arc<AppState>>,
  payload: Result<Json<InboundError>, JsonRejection>,
) -> Result<Json<Ingested>, ApiError> {
  let Json(raw) = payload.map_err(|e| EngineError::validation("body", &e.body_text()))?;
  Ok(Json(state.engine.ingest(&raw).await?))
}

pub async fn ingest_random(State(state): State<Arc<AppState>>) -> Result<Json<Ingested>, ApiError> {
  Ok(Json(state.engine.ingest(&sample::random_error()).await?))
}

pub async fn list_errors(
  State(state): State<Arc<AppState>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<ErrorEvent>>, ApiError> {
  let events = state.store.list_events(list_limit(params)?).await.map_err(EngineError::from)?;
  Ok(Json(events))
}

pub async fn list_groups(
  State(state): State<Arc<AppState>>,
  params: Result<Query<ListParams>, QueryRejection>,
) -> Result<Json<Vec<ErrorGroup>>, ApiError> {
  let groups = state.store.list_groups(list_limit(params)?).await.map_err(EngineError::from)?;
  Ok(Json(groups))
}

pub async fn get_group(
  State(state): State<Arc<AppState>>,
  Path(cluster_key): Path<String>,
) -> Result<Json<ErrorGroup>, ApiError> {
  let group = state
    .store
    .group_by_key(&cluster_key)
    .await
    .map_err(EngineError::from)?
    .ok_or_else(|| EngineError::not_found(format!("group {}", cluster_key)))?;
  Ok(Json(group))
}

pub async fn summarize(
  State(state): State<Arc<AppState>>,
  Path(cluster_key): Path<String>,
) -> Result<Json<Summarized>, ApiError> {
  Ok(Json(state.summaries.summarize(&cluster_key).await?))
}

pub async fn resolve(
  State(state): State<Arc<AppState>>,
  Path(group): Path<String>,
  body: Bytes,
) -> Result<Json<Resolved>, ApiError> {
  let group_id: GroupId = group
    .parse()
    .map_err(|_| EngineError::validation("group_id", "must be an integer"))?;
  // An empty body means "no reason"; anything else must be a valid ResolveBody.
  let reason = if body.iter().all(u8::is_ascii_whitespace) {
    None
  } else {
    serde_json::from_slice::<ResolveBody>(&body)
      .map_err(|e| EngineError::validation("body", &e.to_string()))?
      .reason
  };
  Ok(Json(state.resolutions.resolve(group_id, reason.as_deref()).await?))
}
