//! Error taxonomy and the caller-facing error envelope.
//!
//! Every non-2xx JSON body has the shape `{"error": {"message", "type",
//! "code"}}`. Auth and validation failures are resolved at the gateway
//! boundary and never reach the backend; upstream failures map to 503 with
//! the backend status preserved only in logs.

use actix_web::http::{header, StatusCode};
use actix_web::HttpResponse;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Credential verification failures. `NotFound` and `Disabled` share one
/// caller-facing message so responses leak nothing about which keys exist.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Authorization header required")]
    Missing,
    #[error("Invalid API key")]
    NotFound,
    #[error("Invalid API key")]
    Disabled,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("Model '{model}' is not configured. Available models: [{}]", .known.join(", "))]
    NotFound { model: String, known: Vec<String> },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid request body: {0}")]
    MalformedBody(String),
    #[error("messages must contain at least one entry")]
    EmptyMessages,
    #[error("{field} must be {allowed}")]
    OutOfRange {
        field: &'static str,
        allowed: &'static str,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("timed out waiting for the backend to respond")]
    Timeout,
    #[error("failed to connect to the backend")]
    ConnectFailed,
    #[error("backend returned status {0}")]
    BadStatus(u16),
    #[error("backend protocol error: {0}")]
    Protocol(String),
}

/// Top-level failure of one gateway request.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Route(#[from] RouteError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("Internal server error")]
    Internal,
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Route(_) => StatusCode::NOT_FOUND,
            GatewayError::Validation(_) => StatusCode::BAD_REQUEST,
            GatewayError::Upstream(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope `type` field, one of the three published classes.
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::Auth(_) | GatewayError::Route(_) | GatewayError::Validation(_) => {
                "validation_error"
            }
            GatewayError::Upstream(_) => "service_unavailable",
            GatewayError::Internal => "internal_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Auth(AuthError::Missing) => "authorization_required",
            GatewayError::Auth(_) => "invalid_api_key",
            GatewayError::Route(_) => "model_not_found",
            GatewayError::Validation(_) => "invalid_request",
            GatewayError::Upstream(_) => "backend_error",
            GatewayError::Internal => "server_error",
        }
    }

    /// Build the caller-facing response for this failure.
    pub fn to_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status());
        if matches!(self, GatewayError::Auth(_)) {
            builder.insert_header((header::WWW_AUTHENTICATE, "Bearer"));
        }
        builder.json(ErrorEnvelope::new(self.to_string(), self.kind(), self.code()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: ErrorDetail,
}

impl ErrorEnvelope {
    pub fn new(message: impl Into<String>, kind: &str, code: &str) -> Self {
        Self {
            error: ErrorDetail {
                message: message.into(),
                kind: kind.to_string(),
                code: code.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_and_disabled_keys_share_a_message() {
        assert_eq!(AuthError::NotFound.to_string(), AuthError::Disabled.to_string());
    }

    #[test]
    fn route_miss_lists_known_models() {
        let err = RouteError::NotFound {
            model: "nope".into(),
            known: vec!["llama3".into(), "mistral".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("llama3"));
        assert!(msg.contains("mistral"));
        assert!(msg.contains("'nope'"));
    }

    #[test]
    fn status_and_kind_mapping() {
        let cases: Vec<(GatewayError, StatusCode, &str)> = vec![
            (AuthError::Missing.into(), StatusCode::UNAUTHORIZED, "validation_error"),
            (
                ValidationError::EmptyMessages.into(),
                StatusCode::BAD_REQUEST,
                "validation_error",
            ),
            (
                UpstreamError::BadStatus(500).into(),
                StatusCode::SERVICE_UNAVAILABLE,
                "service_unavailable",
            ),
            (GatewayError::Internal, StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        ];
        for (err, status, kind) in cases {
            assert_eq!(err.status(), status);
            assert_eq!(err.kind(), kind);
        }
    }

    #[test]
    fn envelope_serializes_with_type_field() {
        let value =
            serde_json::to_value(ErrorEnvelope::new("boom", "internal_error", "server_error"))
                .expect("serialize");
        assert_eq!(value["error"]["message"], "boom");
        assert_eq!(value["error"]["type"], "internal_error");
        assert_eq!(value["error"]["code"], "server_error");
    }
}
