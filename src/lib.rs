//! # Herald Runner
//!
//! A webhook runner that executes signed requests on the local machine.
//!
//! A caller POSTs a JSON payload signed with a shared secret. The runner
//! verifies the signature over the raw body, hands the payload to an
//! executor (typically a script from a git repository) and returns the
//! executor's result. When the result names output files they are returned
//! alongside the JSON result in a `multipart/form-data` response, each
//! annotated with its SHA-256 digest.
//!
//! ## Features
//!
//! - **Body signatures**: HMAC-SHA256 over the raw request body, compared in constant time
//! - **File attachments**: output files streamed back as multipart parts with checksums,
//!   one file at a time
//! - **Partial failure tolerance**: unreadable files are skipped, the response is still sent
//! - **Graceful shutdown**: in-flight executions finish before the process exits
//! - **TCP or Unix socket** listeners
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`executor`] - Executor contract and the command/git executor
//! - [`response`] - Result encoding (single JSON or multipart) and checksums
//! - [`server`] - Axum-based endpoint, authentication and listener lifecycle
//! - [`config`] - CLI and configuration file types
//!
//! ## Example
//!
//! ```rust,no_run
//! use herald_runner::{
//!     create_router, BindTarget, CommandExecutor, RouterConfig, Server, SignatureAuth,
//!     WebhookPipeline,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let pipeline = WebhookPipeline::new(
//!         SignatureAuth::new("my-secret"),
//!         CommandExecutor::new("/var/lib/herald-runner"),
//!     );
//!     let router = create_router(pipeline, RouterConfig::default());
//!
//!     let target = BindTarget::Tcp {
//!         host: "127.0.0.1".to_string(),
//!         port: 8124,
//!     };
//!     let cancel = CancellationToken::new();
//!     Server::new(target, router).run(cancel).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod executor;
pub mod response;
pub mod server;

// Re-export commonly used types
pub use config::{Cli, Config};
pub use error::{AttachmentError, ConfigError, ExecutorError, PayloadError, PipelineError, ServerError};
pub use executor::{CommandExecutor, CommandRequest, Executor, Payload, ResultMap, FILE_KEY};
pub use response::{
    encode_result, sha256_file, sha256_file_hex, EncodedResponse, MultipartBody, MultipartWriter,
    ResponseBody, ResponseMode,
};
pub use server::{
    create_router, parse_payload, webhook_handler, AppState, AuthError, BindTarget, BoundAddress,
    ErrorResponse, LifecycleState, RouterConfig, RunningServer, Server, SignatureAuth,
    WebhookHandler, WebhookPipeline, SERVER_HEADER, SIGNATURE_HEADER,
};
