//! Built-in catalogue of realistic errors for exercising the pipeline.

use rand::seq::SliceRandom;

use crate::types::InboundError;

struct SampleError {
  service: &'static str,
  error_type: &'static str,
  message: &'static str,
  path: &'static str,
}

const CATALOGUE: &[SampleError] = &[
  SampleError {
    service: "user-api",
    error_type: "NullPointer",
    message: "Cannot read property 'x' of null at UserController.java:42",
    path: "/v1/users/123",
  },
  SampleError {
    service: "payment-api",
    error_type: "Timeout",
    message: "HTTP 504 while calling /charge on stripe-gateway, attempt=3",
    path: "/v1/payments/charge",
  },
  SampleError {
    service: "order-api",
    error_type: "DBError",
    message: "org.postgresql.util.PSQLException: connection pool exhausted on orders_db",
    path: "/v1/orders/checkout",
  },
  SampleError {
    service: "auth-service",
    error_type: "ValidationError",
    message: "JWT validation failed: token expired for user=42",
    path: "/v1/auth/refresh",
  },
  SampleError {
    service: "api-gateway",
    error_type: "RateLimitExceeded",
    message: "429 Too Many Requests from client IP 192.168.1.1",
    path: "/v1/resource",
  },
  SampleError {
    service: "payment-api",
    error_type: "UpstreamError",
    message: "HTTP 503 from stripe-gateway",
    path: "/v1/payments/process",
  },
  SampleError {
    service: "order-api",
    error_type: "ValidationError",
    message: "JSONDecodeError: Missing required field 'order_id'",
    path: "/v1/orders/create",
  },
  SampleError {
    service: "user-profile",
    error_type: "Timeout",
    message: "gRPC deadline exceeded calling profile-service",
    path: "/v1/profiles/lookup",
  },
];

/// Pick one catalogue entry at random as an inbound report (env left to the default).
pub fn random_error() -> InboundError {
  let pick = CATALOGUE
    .choose(&mut rand::thread_rng())
    .unwrap_or(&CATALOGUE[0]);
  InboundError {
    service: Some(pick.service.into()),
    error_type: Some(pick.error_type.into()),
    message: Some(pick.message.into()),
    path: Some(pick.path.into()),
    ..Default::default()
  }
}
