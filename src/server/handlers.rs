//! HTTP request handling for the webhook endpoint.
//!
//! The server runtime knows nothing about executors or encodings. It drives
//! a [`WebhookHandler`] through two hooks:
//!
//! 1. `validate` with the method, headers and raw body. Any error rejects the
//!    request immediately.
//! 2. `process` with the raw body, only after `validate` succeeded.
//!
//! Multipart results are streamed: the parts are written on a blocking
//! thread into an in-process pipe whose read half is the response body.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use serde::Serialize;
use tokio_util::io::{ReaderStream, SyncIoBridge};
use tracing::{debug, error, warn};

use super::auth::AuthError;
use crate::error::{PayloadError, PipelineError};
use crate::response::{EncodedResponse, MultipartBody, ResponseBody};

/// Capacity of the pipe between the multipart writer and the response body.
const STREAM_BUFFER_SIZE: usize = 64 * 1024;

// =============================================================================
// Handler Capability
// =============================================================================

/// The pair of hooks the server runtime invokes for every request.
#[async_trait]
pub trait WebhookHandler: Send + Sync + 'static {
    /// Decide whether the request may be processed.
    fn validate(&self, method: &Method, headers: &HeaderMap, body: &[u8])
        -> Result<(), AuthError>;

    /// Produce the response for an accepted request.
    async fn process(&self, body: Bytes) -> Response;
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the webhook handler.
///
/// This is passed to the handler via Axum's State extractor.
pub struct AppState<H> {
    /// Hooks for validating and processing requests
    pub handler: Arc<H>,
}

impl<H: WebhookHandler> AppState<H> {
    /// Create a new application state with the given handler.
    pub fn new(handler: H) -> Self {
        Self {
            handler: Arc::new(handler),
        }
    }
}

impl<H> Clone for AppState<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
        }
    }
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "unauthorized", "invalid_payload")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    /// Create a new error response.
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    /// Create a new error response with status code.
    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

impl IntoResponse for EncodedResponse {
    /// Must be called from within the tokio runtime when the body is
    /// multipart.
    fn into_response(self) -> Response {
        let body = match self.body {
            ResponseBody::Full(bytes) => Body::from(bytes),
            ResponseBody::Multipart(multipart) => stream_multipart(multipart),
        };
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, self.content_type)],
            body,
        )
            .into_response()
    }
}

/// Write `multipart` on a blocking thread and stream it as a response body.
///
/// At most one attachment is held open at a time and memory stays bounded
/// by the pipe capacity. If the client goes away the writer fails with a
/// broken pipe and stops.
fn stream_multipart(multipart: MultipartBody) -> Body {
    let (reader, writer) = tokio::io::duplex(STREAM_BUFFER_SIZE);
    let bridge = SyncIoBridge::new(writer);

    tokio::task::spawn_blocking(move || match multipart.write_to(bridge) {
        // Dropping the bridge closes the pipe and ends the body
        Ok(_) => debug!(boundary = multipart.boundary(), "Multipart response written"),
        Err(e) => error!(error = %e, "Write multipart response error"),
    });

    Body::from_stream(ReaderStream::new(reader))
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert PipelineError to HTTP response.
///
/// Payload errors are safe to describe in detail because the request has
/// already been authenticated.
impl IntoResponse for PipelineError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            PipelineError::Payload(PayloadError::InvalidJson(_)) => {
                (StatusCode::BAD_REQUEST, "invalid_payload")
            }
            PipelineError::ExecutorTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, "executor_timeout"),
            PipelineError::Task(_) => (StatusCode::INTERNAL_SERVER_ERROR, "execution_failed"),
        };
        let message = self.to_string();

        if status.is_server_error() {
            error!(
                error_type = error_type,
                status = status.as_u16(),
                "Server error: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle a webhook request.
///
/// # Endpoint
///
/// Any path. Only `POST` passes validation.
///
/// # Headers
///
/// - `X-Herald-Signature`: hex HMAC-SHA256 of the raw body
///
/// # Response
///
/// - `200 OK`: `application/json` result or `multipart/form-data` with files
/// - `400 Bad Request`: body is not a JSON object
/// - `401 Unauthorized`: missing, malformed or wrong signature
/// - `405 Method Not Allowed`: method is not POST
/// - `413 Payload Too Large`: body exceeds the configured limit
pub async fn webhook_handler<H: WebhookHandler>(
    State(state): State<AppState<H>>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.handler.validate(&method, &headers, &body) {
        return e.into_response();
    }

    state.handler.process(body).await
}

// =============================================================================
// Tests
// =============================================================================
