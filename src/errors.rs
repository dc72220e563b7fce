use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// The token endpoint rejected the client credentials.
    Authentication {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Response body returned by the token endpoint.
        body: String,
    },
    /// Any HTTP failure (status, timeout, connection, undecodable body).
    Transport {
        /// Page offset at which the failure happened, `None` for the token endpoint.
        offset: Option<u64>,
        /// Human readable description of the failure.
        message: String,
    },
    /// A record field had an unexpected shape. Absorbed during assembly.
    MalformedRecord {
        /// Identifier of the offending record, if it had one.
        record_id: Option<String>,
        /// Field path, e.g. `step.name`.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
    /// Invalid startup configuration (settings or alias table).
    Configuration(String),
    /// No dataset can be served right now.
    Unavailable(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Returns the innermost error, skipping any context wrappers.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error aborts a pipeline run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self.root(), AppError::MalformedRecord { .. })
    }
}

impl fmt::Display for AppError {
    /// Formats the error for display.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Authentication { status, body } => {
                write!(f, "Authentication failed ({}): {}", status, body)
            }
            AppError::Transport {
                offset: Some(offset),
                message,
            } => write!(f, "Transport error at offset {}: {}", offset, message),
            AppError::Transport {
                offset: None,
                message,
            } => write!(f, "Transport error: {}", message),
            AppError::MalformedRecord {
                record_id,
                field,
                reason,
            } => write!(
                f,
                "Malformed field '{}' in record {}: {}",
                field,
                record_id.as_deref().unwrap_or("<no id>"),
                reason
            ),
            AppError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Unavailable: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Converts the error into an HTTP response.
    ///
    /// Upstream authentication and transport failures map to distinct error codes
    /// so that an operator can tell which leg of the pipeline to retry.
    fn into_response(self) -> Response {
        let (status, code, error_message) = match &self {
            AppError::Authentication { status, .. } => {
                tracing::error!("Upstream authentication error: {}", self);
                (
                    StatusCode::BAD_GATEWAY,
                    "upstream_authentication_failed",
                    format!("CRM token exchange rejected with status {}", status),
                )
            }
            AppError::Transport { offset, .. } => {
                tracing::error!("Upstream transport error: {}", self);
                let message = match offset {
                    Some(offset) => format!("CRM request failed at offset {}", offset),
                    None => "CRM token endpoint unreachable".to_string(),
                };
                (StatusCode::BAD_GATEWAY, "upstream_transport_failed", message)
            }
            AppError::MalformedRecord { .. } => {
                tracing::warn!("Malformed record reached the API layer: {}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "malformed_record",
                    "Internal server error".to_string(),
                )
            }
            AppError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "configuration_error",
                    "Internal server error".to_string(),
                )
            }
            AppError::Unavailable(msg) => {
                tracing::warn!("Dataset unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg.clone())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::WithContext { source, context } => {
                // Log full context chain for debugging
                tracing::error!("Error with context: {} -> {}", context, source);
                // Delegate to underlying error's response
                return source.as_ref().clone().into_response();
            }
        };

        let body = Json(json!({
            "error": code,
            "message": error_message,
        }));

        (status, body).into_response()
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_preserves_root() {
        let err: Result<(), AppError> = Err(AppError::Transport {
            offset: Some(200),
            message: "503 Service Unavailable".to_string(),
        });
        let wrapped = err.context("fetching opportunities").unwrap_err();

        assert!(matches!(
            wrapped.root(),
            AppError::Transport {
                offset: Some(200),
                ..
            }
        ));
        assert_eq!(
            wrapped.to_string(),
            "fetching opportunities: Transport error at offset 200: 503 Service Unavailable"
        );
    }

    #[test]
    fn test_malformed_record_is_not_fatal() {
        let err = AppError::MalformedRecord {
            record_id: Some("42".to_string()),
            field: "step.name".to_string(),
            reason: "expected a string".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(AppError::Authentication {
            status: 401,
            body: "invalid_client".to_string()
        }
        .is_fatal());
    }

    #[test]
    fn test_upstream_errors_map_to_bad_gateway() {
        let auth = AppError::Authentication {
            status: 401,
            body: "nope".to_string(),
        }
        .into_response();
        assert_eq!(auth.status(), StatusCode::BAD_GATEWAY);

        let unavailable = AppError::Unavailable("circuit open".to_string()).into_response();
        assert_eq!(unavailable.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
