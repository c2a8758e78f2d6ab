//! Cluster key derivation for grouping events into error groups.

use crate::types::ErrorEvent;

/// Joins service and error_type. Both parts are rejected by normalization if they contain it,
/// so distinct pairs never share a key.
pub const SEPARATOR: char = ':';

/// `service ++ ":" ++ error_type`.
pub fn key_for(service: &str, error_type: &str) -> String {
  let mut key = String::with_capacity(service.len() + error_type.len() + 1);
  key.push_str(service);
  key.push(SEPARATOR);
  key.push_str(error_type);
  key
}

/// Cluster key of a normalized event.
pub fn compute(event: &ErrorEvent) -> String {
  key_for(&event.service, &event.error_type)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn key_is_plain_concatenation() {
    assert_eq!(key_for("order-api", "DBError"), "order-api:DBError");
  }

  #[test]
  fn different_service_different_key() {
    assert_ne!(key_for("order-api", "Timeout"), key_for("payment-api", "Timeout"));
  }
}
