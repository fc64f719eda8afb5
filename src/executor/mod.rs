//! Task execution behind the webhook.
//!
//! The webhook pipeline does not know what work a request triggers. It hands
//! the decoded JSON payload to an [`Executor`] and encodes whatever result map
//! comes back. A result map may carry a `file` manifest naming output files;
//! relative paths in that manifest are resolved against [`Executor::run_dir`].
//!
//! [`CommandExecutor`] is the executor used by the binary: it syncs an
//! optional git repository and runs a command in the run directory.

mod command;

use std::path::Path;

use serde_json::{Map, Value};

pub use command::{repo_dir_name, CommandExecutor, CommandRequest};

/// Decoded request body handed to the executor.
pub type Payload = Map<String, Value>;

/// Result produced by the executor.
pub type ResultMap = Map<String, Value>;

/// Reserved result key holding the output file manifest.
pub const FILE_KEY: &str = "file";

/// Performs the work requested by an authenticated webhook call.
///
/// `execute` is synchronous and may block for a long time (it runs real
/// commands), so callers must run it on a blocking thread.
pub trait Executor: Send + Sync + 'static {
    /// Run the task described by `payload` and return its result.
    fn execute(&self, payload: Payload) -> ResultMap;

    /// Base directory for relative paths in the result's `file` manifest.
    fn run_dir(&self) -> &Path;
}

/// Build a result map carrying only an error message.
pub fn error_result(message: impl Into<String>) -> ResultMap {
    let mut result = ResultMap::new();
    result.insert("error".to_string(), Value::String(message.into()));
    result
}
