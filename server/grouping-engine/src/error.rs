//! Structured error types for the grouping engine.

use thiserror::Error;

/// Failures surfaced by the engine, the summary attacher and the resolution manager.
#[derive(Debug, Error)]
pub enum EngineError {
  #[error("validation: {field}: {reason}")]
  Validation { field: String, reason: String },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("no data: {0}")]
  NoData(String),

  #[error("storage: {0}")]
  Storage(#[from] StoreError),

  #[error("summarization: {0}")]
  Summarization(String),
}

impl EngineError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn not_found(what: impl Into<String>) -> Self {
    Self::NotFound(what.into())
  }

  /// Stable machine-readable code, used in HTTP error bodies.
  pub fn code(&self) -> &'static str {
    match self {
      Self::Validation { .. } => "validation_error",
      Self::NotFound(_) => "not_found",
      Self::NoData(_) => "no_data",
      Self::Storage(_) => "storage_error",
      Self::Summarization(_) => "summarization_error",
    }
  }
}

/// Failures of the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
  /// The cluster_key uniqueness race could not be resolved within the configured attempts.
  #[error("conflict: {0}")]
  Conflict(String),

  #[error("unavailable: {0}")]
  Unavailable(String),

  /// A persisted row could not be decoded into a domain value.
  #[error("corrupt row: {0}")]
  Corrupt(String),
}

impl From<sqlx_core::error::Error> for StoreError {
  fn from(e: sqlx_core::error::Error) -> Self {
    if e
      .as_database_error()
      .map(|db| db.is_unique_violation())
      .unwrap_or(false)
    {
      return Self::Conflict(e.to_string());
    }
    match &e {
      sqlx_core::error::Error::ColumnDecode { .. }
      | sqlx_core::error::Error::ColumnNotFound(_)
      | sqlx_core::error::Error::Decode(_) => Self::Corrupt(e.to_string()),
      _ => Self::Unavailable(e.to_string()),
    }
  }
}

/// Failures of the outbound text-generation call.
#[derive(Debug, Error)]
pub enum GenerateError {
  #[error("timed out")]
  Timeout,

  #[error("endpoint returned HTTP {0}")]
  Status(u16),

  #[error("transport: {0}")]
  Transport(String),

  #[error("malformed response: {0}")]
  Malformed(String),

  #[error("no text generator configured")]
  NotConfigured,
}

/// Failures of the outbound workflow trigger.
#[derive(Debug, Error)]
pub enum TriggerError {
  #[error("workflow endpoint returned HTTP {0}")]
  Status(u16),

  #[error("transport: {0}")]
  Transport(String),

  #[error("encode: {0}")]
  Encode(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validation_error_mentions_field() {
    let err = EngineError::validation("service", "must not be empty");
    assert_eq!(err.to_string(), "validation: service: must not be empty");
    assert_eq!(err.code(), "validation_error");
  }

  #[test]
  fn store_errors_wrap_into_storage() {
    let err: EngineError = StoreError::Conflict("order-api:DBError".into()).into();
    assert_eq!(err.code(), "storage_error");
    assert!(err.to_string().contains("order-api:DBError"));
  }
}
