//! Core types for the grouping engine (JSON contracts + persisted models).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Inbound types (JSON the caller sends)
// ---------------------------------------------------------------------------

/// One inbound error report. Unknown fields are silently ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundError {
  #[serde(default)]
  pub service: Option<String>,
  #[serde(default)]
  pub error_type: Option<String>,
  #[serde(default)]
  pub message: Option<String>,
  #[serde(default)]
  pub path: Option<String>,
  #[serde(default)]
  pub env: Option<String>,
  /// RFC3339; stamped with the ingestion time when absent.
  #[serde(default)]
  pub timestamp: Option<String>,
  #[serde(default)]
  pub trace_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Persisted models
// ---------------------------------------------------------------------------

/// Surrogate identifier of an error group.
pub type GroupId = i64;

/// One observed failure occurrence, after validation and defaulting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
  /// Assigned by the store; zero until the event has been appended.
  #[serde(default)]
  pub id: i64,
  pub service: String,
  pub error_type: String,
  pub message: String,
  pub timestamp: DateTime<Utc>,
  pub env: String,
  pub path: String,
  pub trace_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupStatus {
  Open,
  Resolved,
}

impl GroupStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Open => "OPEN",
      Self::Resolved => "RESOLVED",
    }
  }
}

impl fmt::Display for GroupStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for GroupStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "OPEN" => Ok(Self::Open),
      "RESOLVED" => Ok(Self::Resolved),
      other => Err(format!("unknown group status {:?}", other)),
    }
  }
}

/// The clustering unit for one (service, error_type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorGroup {
  pub id: GroupId,
  pub cluster_key: String,
  pub service: String,
  pub error_type: String,
  pub title: Option<String>,
  pub summary: Option<String>,
  pub status: GroupStatus,
  pub count: i64,
  pub first_seen: DateTime<Utc>,
  pub last_seen: DateTime<Utc>,
  pub resolved_at: Option<DateTime<Utc>>,
  pub resolution_reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Operation results (JSON we return)
// ---------------------------------------------------------------------------

/// Outcome of the post-commit workflow trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WorkflowOutcome {
  /// No workflow endpoint configured.
  Skipped,
  Delivered { status: u16 },
  Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Ingested {
  pub group_id: GroupId,
  pub cluster_key: String,
  pub trace_id: String,
  /// True when this event created the group.
  pub created: bool,
  pub workflow: WorkflowOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summarized {
  pub group_id: GroupId,
  pub cluster_key: String,
  pub title: String,
  pub summary: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Resolved {
  pub group_id: GroupId,
  pub status: GroupStatus,
  pub resolved_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// HTTP error wrapper
// ---------------------------------------------------------------------------

/// Structured error body for failed requests.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: String,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
}

impl ErrorOutput {
  pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      error: code.into(),
      message: message.into(),
      field: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn status_round_trips_through_column_text() {
    for status in [GroupStatus::Open, GroupStatus::Resolved] {
      assert_eq!(status.as_str().parse::<GroupStatus>().unwrap(), status);
    }
    assert!("QUIET".parse::<GroupStatus>().is_err());
  }

  #[test]
  fn status_serializes_upper_case() {
    assert_eq!(serde_json::to_string(&GroupStatus::Resolved).unwrap(), "\"RESOLVED\"");
  }

  #[test]
  fn workflow_outcome_is_tagged() {
    let json = serde_json::to_value(WorkflowOutcome::Delivered { status: 200 }).unwrap();
    assert_eq!(json["state"], "delivered");
    assert_eq!(json["status"], 200);
  }

  #[test]
  fn inbound_error_ignores_unknown_fields() {
    let raw: InboundError =
      serde_json::from_str(r#"{"service":"user-api","error_type":"NullPointer","extra":1}"#).unwrap();
    assert_eq!(raw.service.as_deref(), Some("user-api"));
    assert!(raw.message.is_none());
  }
}
