//! Command executor with optional git checkout.
//!
//! # Directory Layout
//!
//! ```text
//! <work_dir>/
//! ├── repo/<sha256(url)[..16]>/   shallow checkouts of requested repositories
//! └── run/                        working directory of every command
//! ```
//!
//! # Payload
//!
//! ```json
//! {
//!   "git_repo": "https://example.com/ops/scripts.git",
//!   "git_branch": "main",
//!   "command": "deploy.sh",
//!   "args": ["production"],
//!   "env": {"DRY_RUN": "0"},
//!   "output_json": true
//! }
//! ```
//!
//! With `output_json` the command's stdout must be a JSON object; its keys are
//! merged into the result, which is how a command reports a `file` manifest.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use super::{error_result, Executor, Payload, ResultMap};
use crate::error::ExecutorError;

/// Number of hex characters of the URL digest used for checkout directories.
const REPO_DIR_NAME_LEN: usize = 16;

// =============================================================================
// Request
// =============================================================================

/// Execution parameters decoded from the webhook payload.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    /// Program to run. Relative paths are resolved inside the git checkout
    /// when `git_repo` is given.
    pub command: String,

    /// Arguments passed to the program.
    #[serde(default, alias = "arg", deserialize_with = "deserialize_args")]
    pub args: Vec<String>,

    /// Extra environment variables.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Repository to check out before running the command.
    #[serde(default)]
    pub git_repo: Option<String>,

    /// Branch to check out (remote default branch if unset).
    #[serde(default)]
    pub git_branch: Option<String>,

    /// Parse stdout as a JSON object and merge it into the result.
    #[serde(default)]
    pub output_json: bool,
}

impl CommandRequest {
    /// Decode a request from a webhook payload.
    pub fn from_payload(payload: &Payload) -> Result<Self, ExecutorError> {
        serde_json::from_value(Value::Object(payload.clone()))
            .map_err(|e| ExecutorError::InvalidRequest(e.to_string()))
    }
}

/// Accept either a single string or a list of strings.
fn deserialize_args<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Args {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Args::deserialize(deserializer)? {
        Args::One(arg) => vec![arg],
        Args::Many(args) => args,
    })
}

// =============================================================================
// Executor
// =============================================================================

/// Runs commands under a working directory root.
#[derive(Debug, Clone)]
pub struct CommandExecutor {
    run_dir: PathBuf,
    repo_dir: PathBuf,
}

impl CommandExecutor {
    /// Create an executor rooted at `work_dir`.
    pub fn new(work_dir: impl AsRef<Path>) -> Self {
        let work_dir = work_dir.as_ref();
        Self {
            run_dir: work_dir.join("run"),
            repo_dir: work_dir.join("repo"),
        }
    }

    /// Directory holding repository checkouts.
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn try_execute(&self, payload: &Payload) -> Result<ResultMap, ExecutorError> {
        let request = CommandRequest::from_payload(payload)?;
        if request.command.is_empty() {
            return Err(ExecutorError::InvalidRequest(
                "command must not be empty".to_string(),
            ));
        }

        std::fs::create_dir_all(&self.run_dir)?;

        let program = match request.git_repo {
            Some(ref url) => {
                let checkout = self.sync_repo(url, request.git_branch.as_deref())?;
                let command = Path::new(&request.command);
                if command.is_absolute() {
                    command.to_path_buf()
                } else {
                    checkout.join(command)
                }
            }
            None => PathBuf::from(&request.command),
        };

        info!(command = %program.display(), args = ?request.args, "Running command");

        let output = Command::new(&program)
            .args(&request.args)
            .envs(&request.env)
            .current_dir(&self.run_dir)
            .output()?;

        Ok(build_result(output, request.output_json))
    }

    /// Clone `url` or bring an existing checkout up to date.
    fn sync_repo(&self, url: &str, branch: Option<&str>) -> Result<PathBuf, ExecutorError> {
        let checkout = self.repo_dir.join(repo_dir_name(url));

        if checkout.join(".git").is_dir() {
            debug!(repo = url, dir = %checkout.display(), "Updating repository");
            run_git(git_fetch(&checkout, branch), "fetch")?;

            let mut reset = Command::new("git");
            reset
                .arg("-C")
                .arg(&checkout)
                .args(["reset", "--hard", "FETCH_HEAD"]);
            run_git(reset, "reset")?;
        } else {
            debug!(repo = url, dir = %checkout.display(), "Cloning repository");
            std::fs::create_dir_all(&self.repo_dir)?;
            run_git(git_clone(url, branch, &checkout), "clone")?;
        }

        Ok(checkout)
    }
}

impl Executor for CommandExecutor {
    fn execute(&self, payload: Payload) -> ResultMap {
        match self.try_execute(&payload) {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Execution failed");
                error_result(e.to_string())
            }
        }
    }

    fn run_dir(&self) -> &Path {
        &self.run_dir
    }
}

/// Directory name for the checkout of `url`.
pub fn repo_dir_name(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    let mut name = hex::encode(digest);
    name.truncate(REPO_DIR_NAME_LEN);
    name
}

/// `git fetch` of `branch` into an existing checkout.
///
/// Payload values follow `--` so they are never parsed as options.
fn git_fetch(checkout: &Path, branch: Option<&str>) -> Command {
    let mut fetch = Command::new("git");
    fetch
        .arg("-C")
        .arg(checkout)
        .args(["fetch", "--depth", "1", "--", "origin"])
        .arg(branch.unwrap_or("HEAD"));
    fetch
}

/// Shallow `git clone` of `url` into `checkout`.
fn git_clone(url: &str, branch: Option<&str>, checkout: &Path) -> Command {
    let mut clone = Command::new("git");
    clone.args(["clone", "--depth", "1"]);
    if let Some(branch) = branch {
        clone.args(["--branch", branch]);
    }
    clone.arg("--").arg(url).arg(checkout);
    clone
}

fn run_git(mut command: Command, operation: &'static str) -> Result<(), ExecutorError> {
    let output = command.output()?;
    if output.status.success() {
        Ok(())
    } else {
        Err(ExecutorError::Git {
            operation,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn build_result(output: Output, output_json: bool) -> ResultMap {
    let mut result = ResultMap::new();

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if output_json {
        match serde_json::from_str::<ResultMap>(&stdout) {
            Ok(parsed) => result.extend(parsed),
            Err(e) => {
                result.insert(
                    "error".to_string(),
                    Value::String(format!("Parse JSON output error: {}", e)),
                );
                result.insert("output".to_string(), Value::String(stdout));
            }
        }
    } else {
        result.insert("output".to_string(), Value::String(stdout));
    }

    if !stderr.is_empty() {
        result.insert("error_output".to_string(), Value::String(stderr));
    }

    let exit_code = output.status.code().map(Value::from).unwrap_or(Value::Null);
    result.insert("exit_code".to_string(), exit_code);

    result
}

// =============================================================================
// Tests
// =============================================================================
