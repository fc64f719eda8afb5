//! HTTP server layer for Herald Runner.
//!
//! This module provides the single signed webhook endpoint and the listener
//! lifecycle around it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │            POST <any path>  X-Herald-Signature: <hex>           │
//! │                                                                 │
//! │  ┌─────────────┐  ┌─────────────┐  ┌─────────────────────────┐  │
//! │  │  handlers   │  │    auth     │  │        routes           │  │
//! │  │  (hooks)    │  │ (body HMAC) │  │  (router config)        │  │
//! │  └─────────────┘  └─────────────┘  └─────────────────────────┘  │
//! │  ┌─────────────────────────────┐  ┌─────────────────────────┐   │
//! │  │  pipeline                   │  │  lifecycle              │   │
//! │  │  (parse → execute → encode) │  │  (bind, drain, stop)    │   │
//! │  └─────────────────────────────┘  └─────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod auth;
pub mod handlers;
pub mod lifecycle;
pub mod pipeline;
pub mod routes;

pub use auth::{AuthError, SignatureAuth, SIGNATURE_HEADER};
pub use handlers::{webhook_handler, AppState, ErrorResponse, WebhookHandler};
pub use lifecycle::{BindTarget, BoundAddress, LifecycleState, RunningServer, Server};
pub use pipeline::{parse_payload, WebhookPipeline};
pub use routes::{create_router, RouterConfig, SERVER_HEADER};
