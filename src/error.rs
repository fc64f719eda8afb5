use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the runner configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Read config file \"{path}\" error: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid YAML for the expected schema
    #[error("Parse config file \"{path}\" error: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A configuration value is missing or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// The log output file could not be prepared
    #[error("Create log file \"{path}\" error: {source}")]
    LogOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors for a request body that cannot be handed to the executor
#[derive(Debug, Error)]
pub enum PayloadError {
    /// Body is not a JSON object (should map to HTTP 400)
    #[error("Request body error: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Errors that end the processing of an authenticated request
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The payload could not be decoded (should map to HTTP 400)
    #[error(transparent)]
    Payload(#[from] PayloadError),

    /// The executor did not finish within the configured limit
    #[error("Executor did not finish within {0:?}")]
    ExecutorTimeout(std::time::Duration),

    /// The execution task panicked
    #[error("Execution task failed: {0}")]
    Task(String),
}

/// Errors for a single output file attached to a multipart response.
///
/// These never fail the response: the offending part is skipped.
#[derive(Debug, Error)]
pub enum AttachmentError {
    /// The manifest value is not a string path
    #[error("File value must be string of file path: {0}")]
    InvalidReference(serde_json::Value),

    /// The file could not be opened, read or hashed
    #[error("Read output file \"{path}\" error: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The local spool copy of the file could not be created or rewound
    #[error("Spool output file error: {0}")]
    Spool(#[source] std::io::Error),
}

/// Errors raised inside the command executor.
///
/// The executor reports these to the caller as an `error` entry in the
/// result map rather than failing the request.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The payload is missing required fields or has the wrong shape
    #[error("Invalid execution request: {0}")]
    InvalidRequest(String),

    /// A process could not be spawned or a directory could not be created
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A git command exited unsuccessfully
    #[error("Git {operation} error: {message}")]
    Git {
        operation: &'static str,
        message: String,
    },
}

/// Errors raised by the listener lifecycle
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound
    #[error("Failed to bind to {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The server loop exited with an error
    #[error("Server error: {0}")]
    Serve(#[source] std::io::Error),

    /// The server task panicked or was aborted
    #[error("Server task failed: {0}")]
    Join(String),
}
