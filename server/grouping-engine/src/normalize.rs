//! Validate inbound error reports and fill defaults, producing a canonical ErrorEvent.

use chrono::{DateTime, Utc};

use crate::cluster::SEPARATOR;
use crate::error::EngineError;
use crate::types::{ErrorEvent, InboundError};

/// Length of generated trace ids (hex chars).
const TRACE_ID_LEN: usize = 16;

/// Parse and normalize an InboundError into an ErrorEvent ready to be appended.
///
/// `now` stamps events without a timestamp; `default_env` fills a missing env.
pub fn normalize(
  raw: &InboundError,
  now: DateTime<Utc>,
  default_env: &str,
) -> Result<ErrorEvent, EngineError> {
  let service = key_part(raw.service.as_deref(), "service")?;
  let error_type = key_part(raw.error_type.as_deref(), "error_type")?;

  let message = raw
    .message
    .clone()
    .ok_or_else(|| EngineError::validation("message", "is required"))?;

  let timestamp = match raw.timestamp.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
    Some(t) => DateTime::parse_from_rfc3339(t)
      .map_err(|e| EngineError::validation("timestamp", &format!("invalid RFC3339: {}", e)))?
      .with_timezone(&Utc),
    None => now,
  };

  let env = non_blank(raw.env.as_deref()).unwrap_or_else(|| default_env.to_string());
  let path = raw.path.as_deref().map(str::trim).unwrap_or_default().to_string();
  let trace_id = non_blank(raw.trace_id.as_deref()).unwrap_or_else(new_trace_id);

  Ok(ErrorEvent {
    id: 0,
    service,
    error_type,
    message,
    timestamp,
    env,
    path,
    trace_id,
  })
}

/// A short opaque correlation id: the first 16 hex chars of a random UUID.
pub fn new_trace_id() -> String {
  let mut id = uuid::Uuid::new_v4().simple().to_string();
  id.truncate(TRACE_ID_LEN);
  id
}

/// Validate one component of the cluster key: trimmed, non-empty, separator-free.
fn key_part(value: Option<&str>, field: &str) -> Result<String, EngineError> {
  let value = value.map(str::trim).unwrap_or_default();
  if value.is_empty() {
    return Err(EngineError::validation(field, "must not be empty"));
  }
  if value.contains(SEPARATOR) {
    return Err(EngineError::validation(
      field,
      &format!("must not contain {:?}", SEPARATOR),
    ));
  }
  Ok(value.to_string())
}

fn non_blank(value: Option<&str>) -> Option<String> {
  value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap()
  }

  fn raw() -> InboundError {
    InboundError {
      service: Some("order-api".into()),
      error_type: Some("DBError".into()),
      message: Some("pool exhausted".into()),
      ..Default::default()
    }
  }

  #[test]
  fn fills_defaults() {
    let event = normalize(&raw(), now(), "prod").unwrap();
    assert_eq!(event.env, "prod");
    assert_eq!(event.path, "");
    assert_eq!(event.timestamp, now());
    assert_eq!(event.trace_id.len(), 16);
    assert!(event.trace_id.chars().all(|c| c.is_ascii_hexdigit()));
  }

  #[test]
  fn keeps_caller_values() {
    let mut input = raw();
    input.env = Some("staging".into());
    input.path = Some("/v1/orders/checkout".into());
    input.trace_id = Some("abc123".into());
    input.timestamp = Some("2025-01-15T09:00:00Z".into());
    let event = normalize(&input, now(), "prod").unwrap();
    assert_eq!(event.env, "staging");
    assert_eq!(event.path, "/v1/orders/checkout");
    assert_eq!(event.trace_id, "abc123");
    assert_eq!(event.timestamp, Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap());
  }

  #[test]
  fn trims_key_parts() {
    let mut input = raw();
    input.service = Some("  order-api ".into());
    let event = normalize(&input, now(), "prod").unwrap();
    assert_eq!(event.service, "order-api");
  }

  #[test]
  fn rejects_missing_or_blank_service() {
    let mut input = raw();
    input.service = None;
    assert!(normalize(&input, now(), "prod").unwrap_err().to_string().contains("service"));
    input.service = Some("   ".into());
    assert!(normalize(&input, now(), "prod").unwrap_err().to_string().contains("service"));
  }

  #[test]
  fn rejects_separator_in_error_type() {
    let mut input = raw();
    input.error_type = Some("DB:Error".into());
    let err = normalize(&input, now(), "prod").unwrap_err();
    assert!(matches!(err, EngineError::Validation { ref field, .. } if field == "error_type"));
  }

  #[test]
  fn rejects_missing_message_but_allows_empty_text() {
    let mut input = raw();
    input.message = None;
    assert!(normalize(&input, now(), "prod").unwrap_err().to_string().contains("message"));
    input.message = Some(String::new());
    assert!(normalize(&input, now(), "prod").is_ok());
  }

  #[test]
  fn rejects_bad_timestamp() {
    let mut input = raw();
    input.timestamp = Some("yesterday".into());
    assert!(normalize(&input, now(), "prod").unwrap_err().to_string().contains("timestamp"));
  }
}
