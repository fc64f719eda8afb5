//! Request signature authentication for Herald Runner.
//!
//! Every webhook request must carry an HMAC-SHA256 of its raw body, keyed by
//! the shared secret and hex encoded, in the `X-Herald-Signature` header:
//!
//! ```text
//! X-Herald-Signature: hex(HMAC-SHA256(secret, body))
//! ```
//!
//! # Security Properties
//!
//! - **Raw body binding**: the MAC covers the exact bytes received, before any
//!   JSON parsing
//! - **Constant-time comparison**: signature verification uses constant-time
//!   comparison to prevent timing attacks
//! - **No side effects**: a rejected request never reaches the executor
//!
//! # Example
//!
//! ```rust
//! use herald_runner::server::auth::SignatureAuth;
//!
//! let auth = SignatureAuth::new("my-secret-key");
//! let body = br#"{"action":"build"}"#;
//!
//! let signature = auth.sign(body);
//! assert!(auth.verify(body, &signature).is_ok());
//! ```

use axum::{
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use tracing::warn;

use super::handlers::ErrorResponse;

/// Header carrying the request signature.
pub const SIGNATURE_HEADER: &str = "X-Herald-Signature";

// =============================================================================
// Types
// =============================================================================

/// HMAC-SHA256 type alias
type HmacSha256 = Hmac<Sha256>;

/// Authentication error types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Request method is not POST
    MethodNotAllowed(Method),

    /// Signature header is missing from the request
    MissingSignature,

    /// Signature header is not valid hex
    InvalidSignatureEncoding,

    /// Signature does not match the body
    SignatureMismatch,
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::MethodNotAllowed(method) => {
                write!(f, "Only POST request allowed, got {}", method)
            }
            AuthError::MissingSignature => write!(f, "Missing {} header", SIGNATURE_HEADER),
            AuthError::InvalidSignatureEncoding => {
                write!(f, "Invalid {} encoding", SIGNATURE_HEADER)
            }
            AuthError::SignatureMismatch => write!(f, "Signature validation error"),
        }
    }
}

impl std::error::Error for AuthError {}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // The reason is logged, never returned: callers only learn that the
        // request was rejected.
        let (status, error_type, message) = match &self {
            AuthError::MethodNotAllowed(_) => (
                StatusCode::METHOD_NOT_ALLOWED,
                "method_not_allowed",
                "Only POST requests are accepted",
            ),
            _ => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Request signature rejected",
            ),
        };

        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Authentication failed: {}",
            self
        );

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Signature Authentication
// =============================================================================

/// Body signature authenticator using HMAC-SHA256.
///
/// The secret is set once at startup and only read afterwards, so clones can
/// be shared freely between requests.
#[derive(Clone)]
pub struct SignatureAuth {
    /// Secret key for HMAC computation
    secret_key: Vec<u8>,
}

impl SignatureAuth {
    /// Create a new authenticator with the given secret key.
    pub fn new(secret_key: impl AsRef<[u8]>) -> Self {
        Self {
            secret_key: secret_key.as_ref().to_vec(),
        }
    }

    /// Compute the hex-encoded signature for a body.
    pub fn sign(&self, body: &[u8]) -> String {
        hex::encode(self.compute_mac(body))
    }

    /// Verify a hex-encoded signature against a body.
    ///
    /// # Returns
    ///
    /// `Ok(())` if the signature matches, `Err(AuthError)` otherwise.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), AuthError> {
        let provided_sig =
            hex::decode(signature).map_err(|_| AuthError::InvalidSignatureEncoding)?;

        let expected_sig = self.compute_mac(body);

        // Constant-time comparison
        if provided_sig.ct_eq(&expected_sig).into() {
            Ok(())
        } else {
            Err(AuthError::SignatureMismatch)
        }
    }

    /// Validate an incoming request.
    ///
    /// The method is checked first, so a non-POST request is rejected even
    /// when its signature is valid.
    pub fn validate(
        &self,
        method: &Method,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<(), AuthError> {
        if method != Method::POST {
            return Err(AuthError::MethodNotAllowed(method.clone()));
        }

        let header = headers
            .get(SIGNATURE_HEADER)
            .ok_or(AuthError::MissingSignature)?;
        let signature = header
            .to_str()
            .map_err(|_| AuthError::InvalidSignatureEncoding)?;

        self.verify(body, signature.trim())
    }

    /// Compute the raw HMAC-SHA256 of a body.
    fn compute_mac(&self, body: &[u8]) -> Vec<u8> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret_key).expect("HMAC can take key of any size");
        mac.update(body);
        mac.finalize().into_bytes().to_vec()
    }
}

impl std::fmt::Debug for SignatureAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureAuth")
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
