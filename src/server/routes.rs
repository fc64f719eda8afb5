//! Router configuration for Herald Runner.
//!
//! The runner exposes a single endpoint: every method and path reaches the
//! webhook handler, which rejects anything but a signed POST.
//!
//! # Example
//!
//! ```ignore
//! use herald_runner::server::{create_router, RouterConfig, SignatureAuth, WebhookPipeline};
//! use herald_runner::executor::CommandExecutor;
//!
//! let pipeline = WebhookPipeline::new(
//!     SignatureAuth::new("my-secret-key"),
//!     CommandExecutor::new("/var/lib/herald-runner"),
//! );
//! let router = create_router(pipeline, RouterConfig::default());
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8124").await?;
//! axum::serve(listener, router).await?;
//! ```

use axum::{extract::DefaultBodyLimit, Router};
use http::header::SERVER;
use http::HeaderValue;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{webhook_handler, AppState, WebhookHandler};
use crate::config::{Config, DEFAULT_MAX_BODY_SIZE};

/// Value of the `Server` response header.
pub const SERVER_HEADER: &str = "herald-runner";

// =============================================================================
// Router Configuration
// =============================================================================

/// Configuration for the HTTP router.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Largest accepted request body in bytes
    pub max_body_size: usize,

    /// Whether to enable request tracing
    pub enable_tracing: bool,
}

impl Default for RouterConfig {
    /// By default:
    /// - Request bodies are limited to 10 MiB
    /// - Tracing is enabled
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            enable_tracing: true,
        }
    }
}

impl RouterConfig {
    /// Set the maximum request body size.
    pub fn with_max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }

    /// Enable or disable request tracing.
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.enable_tracing = enabled;
        self
    }
}

impl From<&Config> for RouterConfig {
    fn from(config: &Config) -> Self {
        RouterConfig::default().with_max_body_size(config.max_body_size)
    }
}

// =============================================================================
// Router Builder
// =============================================================================

/// Create the application router.
///
/// # Arguments
///
/// * `handler` - Hooks validating and processing every request
/// * `config` - Router configuration
///
/// # Returns
///
/// A configured Axum router ready to be served.
pub fn create_router<H: WebhookHandler>(handler: H, config: RouterConfig) -> Router {
    let app_state = AppState::new(handler);

    let router = Router::new()
        .fallback(webhook_handler::<H>)
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(config.max_body_size))
        .layer(SetResponseHeaderLayer::overriding(
            SERVER,
            HeaderValue::from_static(SERVER_HEADER),
        ));

    if config.enable_tracing {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

// =============================================================================
// Tests
// =============================================================================
