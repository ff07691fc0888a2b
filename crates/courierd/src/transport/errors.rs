//! Error types for socket listener operations.

use std::io;

use thiserror::Error;

/// Errors surfaced while binding or running the socket listener.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Another daemon answered on the socket.
    #[error("a daemon is already listening on {path}")]
    AlreadyRunning {
        /// Socket path.
        path: String,
    },
    /// The path exists but is not a socket.
    #[error("{path} exists and is not a socket")]
    NotSocket {
        /// Offending path.
        path: String,
    },
    /// Inspecting the existing path failed.
    #[error("failed to read metadata for {path}: {source}")]
    Metadata {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Probing the existing socket failed for a reason other than staleness.
    #[error("failed to test existing socket {path}: {source}")]
    StaleCheck {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale socket failed.
    #[error("failed to remove stale socket {path}: {source}")]
    Cleanup {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Binding failed.
    #[error("failed to bind {path}: {source}")]
    Bind {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Restricting the socket's permissions failed.
    #[error("failed to restrict permissions on {path}: {source}")]
    Permissions {
        /// Socket path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept thread could not be spawned.
    #[error("failed to spawn listener thread: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The accept thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}
