//! Listener lifecycle for Herald Runner.
//!
//! ## Lifecycle States
//!
//! ```text
//! Created → Running → Stopping → Stopped
//! ```
//!
//! - **Created**: router built, nothing bound yet
//! - **Running**: listener bound, accepting connections
//! - **Stopping**: no new connections, waiting for in-flight requests
//! - **Stopped**: every request finished, listener closed
//!
//! Stopping never interrupts a running executor. A request that is still
//! executing keeps the server in `Stopping` until it completes.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ServerError;

// =============================================================================
// Types
// =============================================================================

/// Lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Router built, listener not bound
    Created,
    /// Accepting connections
    Running,
    /// Draining in-flight requests
    Stopping,
    /// Shutdown complete
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Where the listener binds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindTarget {
    /// TCP host and port
    Tcp { host: String, port: u16 },
    /// Unix domain socket path
    Unix(PathBuf),
}

impl fmt::Display for BindTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

/// The address a running server actually bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundAddress {
    /// Bound TCP socket address (resolves port 0)
    Tcp(SocketAddr),
    /// Bound Unix socket path
    Unix(PathBuf),
}

impl fmt::Display for BoundAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "http://{}", addr),
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
        }
    }
}

type ServeTask = JoinHandle<io::Result<()>>;

// =============================================================================
// Server
// =============================================================================

/// A router waiting to be bound.
pub struct Server {
    target: BindTarget,
    router: Router,
    state: watch::Sender<LifecycleState>,
}

impl Server {
    /// Create a server for `router` that will bind `target`.
    pub fn new(target: BindTarget, router: Router) -> Self {
        let (state, _) = watch::channel(LifecycleState::Created);
        Self {
            target,
            router,
            state,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Bind the listener and start accepting connections.
    ///
    /// Bind failures are returned before any state transition.
    pub async fn start(self) -> Result<RunningServer, ServerError> {
        let shutdown = CancellationToken::new();

        let (task, local_addr, socket_path) = match self.target {
            BindTarget::Tcp { ref host, port } => {
                let address = format!("{}:{}", host, port);
                let listener = TcpListener::bind(&address)
                    .await
                    .map_err(|source| ServerError::Bind {
                        address: address.clone(),
                        source,
                    })?;
                let local = listener
                    .local_addr()
                    .map_err(|source| ServerError::Bind { address, source })?;

                let signal = shutdown.clone().cancelled_owned();
                let router = self.router;
                let task: ServeTask = tokio::spawn(async move {
                    axum::serve(listener, router)
                        .with_graceful_shutdown(signal)
                        .await
                });
                (task, BoundAddress::Tcp(local), None)
            }
            BindTarget::Unix(ref path) => {
                let task = spawn_unix(path, self.router, shutdown.clone())?;
                (task, BoundAddress::Unix(path.clone()), Some(path.clone()))
            }
        };

        self.state.send_replace(LifecycleState::Running);
        info!(address = %local_addr, "Server listening");

        Ok(RunningServer {
            local_addr,
            shutdown,
            task,
            state: self.state,
            socket_path,
        })
    }

    /// Serve until `cancel` fires, then stop and wait for in-flight requests.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), ServerError> {
        let mut running = self.start().await?;

        let exited_early = tokio::select! {
            _ = cancel.cancelled() => None,
            joined = &mut running.task => Some(joined),
        };

        match exited_early {
            None => running.stop().await,
            Some(joined) => {
                let RunningServer {
                    state, socket_path, ..
                } = running;
                finish(joined, &state, socket_path.as_deref())
            }
        }
    }
}

#[cfg(unix)]
fn spawn_unix(
    path: &Path,
    router: Router,
    shutdown: CancellationToken,
) -> Result<ServeTask, ServerError> {
    let address = format!("unix:{}", path.display());

    remove_stale_socket(path).map_err(|source| ServerError::Bind {
        address: address.clone(),
        source,
    })?;

    let listener = tokio::net::UnixListener::bind(path)
        .map_err(|source| ServerError::Bind { address, source })?;

    let signal = shutdown.cancelled_owned();
    Ok(tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(signal)
            .await
    }))
}

/// Remove a leftover socket file at `path`.
///
/// Anything other than a socket is left alone and reported as
/// `AlreadyExists`.
#[cfg(unix)]
fn remove_stale_socket(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::FileTypeExt;

    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };

    if !metadata.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "path exists and is not a socket",
        ));
    }

    std::fs::remove_file(path)?;
    warn!(path = %path.display(), "Removed stale socket file");
    Ok(())
}

#[cfg(not(unix))]
fn spawn_unix(
    path: &Path,
    _router: Router,
    _shutdown: CancellationToken,
) -> Result<ServeTask, ServerError> {
    Err(ServerError::Bind {
        address: format!("unix:{}", path.display()),
        source: io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        ),
    })
}

// =============================================================================
// Running Server
// =============================================================================

/// A bound server accepting connections.
pub struct RunningServer {
    local_addr: BoundAddress,
    shutdown: CancellationToken,
    task: ServeTask,
    state: watch::Sender<LifecycleState>,
    socket_path: Option<PathBuf>,
}

impl RunningServer {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> &BoundAddress {
        &self.local_addr
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn stop(self) -> Result<(), ServerError> {
        let RunningServer {
            shutdown,
            task,
            state,
            socket_path,
            ..
        } = self;

        info!("Stopping server, waiting for in-flight requests");
        state.send_replace(LifecycleState::Stopping);
        shutdown.cancel();

        let joined = task.await;
        finish(joined, &state, socket_path.as_deref())
    }
}

fn finish(
    joined: Result<io::Result<()>, tokio::task::JoinError>,
    state: &watch::Sender<LifecycleState>,
    socket_path: Option<&Path>,
) -> Result<(), ServerError> {
    if let Some(path) = socket_path {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to remove socket file");
            }
        }
    }

    state.send_replace(LifecycleState::Stopped);
    info!("Server stopped");

    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ServerError::Serve(e)),
        Err(e) => Err(ServerError::Join(e.to_string())),
    }
}

// =============================================================================
// Tests
// =============================================================================
