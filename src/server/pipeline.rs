//! Request pipeline: authenticate, parse, execute, encode.
//!
//! ```text
//! raw body ──► validate (method + X-Herald-Signature)
//!                │
//!                ▼
//!          parse JSON object ──► 400 on failure, executor untouched
//!                │
//!                ▼
//!          Executor::execute   (blocking thread, no shared locks)
//!                │
//!                ▼
//!          encode_result       (single JSON | multipart streamed on send)
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    http::{HeaderMap, Method},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tracing::{debug, info};

use super::auth::{AuthError, SignatureAuth};
use super::handlers::WebhookHandler;
use crate::error::{PayloadError, PipelineError};
use crate::executor::{Executor, Payload};
use crate::response::{encode_result, EncodedResponse};

/// Webhook handler that runs authenticated payloads through an executor.
pub struct WebhookPipeline<E: Executor> {
    auth: SignatureAuth,
    executor: Arc<E>,
    executor_timeout: Option<Duration>,
}

impl<E: Executor> WebhookPipeline<E> {
    /// Create a pipeline verifying requests with `auth` and running them on
    /// `executor`.
    pub fn new(auth: SignatureAuth, executor: E) -> Self {
        Self {
            auth,
            executor: Arc::new(executor),
            executor_timeout: None,
        }
    }

    /// Stop waiting for the executor after `timeout`.
    ///
    /// The executor itself is never interrupted; only the response gives up
    /// waiting and reports a timeout.
    pub fn with_executor_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.executor_timeout = timeout;
        self
    }

    /// The executor requests are handed to.
    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Parse, execute and encode an authenticated request body.
    pub async fn run(&self, body: &[u8]) -> Result<EncodedResponse, PipelineError> {
        info!("Start to execute...");

        let payload = parse_payload(body)?;

        let executor = Arc::clone(&self.executor);
        let task = tokio::task::spawn_blocking(move || {
            let result = executor.execute(payload);
            debug!(result = ?result, "Execute result");
            encode_result(result, executor.run_dir())
        });

        let joined = match self.executor_timeout {
            Some(limit) => tokio::time::timeout(limit, task)
                .await
                .map_err(|_| PipelineError::ExecutorTimeout(limit))?,
            None => task.await,
        };

        let encoded = joined.map_err(|e| PipelineError::Task(e.to_string()))?;
        info!(mode = ?encoded.mode, "Execution finished");
        Ok(encoded)
    }
}

#[async_trait]
impl<E: Executor> WebhookHandler for WebhookPipeline<E> {
    fn validate(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), AuthError> {
        self.auth.validate(method, headers, body)
    }

    async fn process(&self, body: Bytes) -> Response {
        match self.run(&body).await {
            Ok(encoded) => encoded.into_response(),
            Err(e) => e.into_response(),
        }
    }
}

/// Decode a request body into an executor payload.
///
/// The body must be a JSON object.
pub fn parse_payload(body: &[u8]) -> Result<Payload, PayloadError> {
    Ok(serde_json::from_slice(body)?)
}
