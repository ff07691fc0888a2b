//! Listener implementation for the daemon socket.

use std::fs::{self, Permissions};
use std::io;
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use courier_config::SocketPath;
use tracing::{info, warn};

use crate::health::HealthReporter;
use crate::shutdown::ShutdownFlag;

use super::{ConnectionHandler, ConnectionTracker, ListenerError, TRANSPORT_TARGET};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const SOCKET_MODE: u32 = 0o600;

/// Listener bound to the daemon socket.
#[derive(Debug)]
pub(crate) struct SocketListener {
    socket: SocketPath,
    listener: UnixListener,
}

impl SocketListener {
    /// Binds `socket`, replacing a stale socket file left by a dead daemon.
    pub(crate) fn bind(
        socket: &SocketPath,
        reporter: &dyn HealthReporter,
    ) -> Result<Self, ListenerError> {
        let path = socket.path().as_std_path();
        if clear_stale_socket(path)? {
            reporter.stale_socket_removed(socket);
        }
        let listener = UnixListener::bind(path).map_err(|source| ListenerError::Bind {
            path: socket.path().to_string(),
            source,
        })?;
        if let Err(source) = fs::set_permissions(path, Permissions::from_mode(SOCKET_MODE)) {
            remove_socket_file(socket);
            return Err(ListenerError::Permissions {
                path: socket.path().to_string(),
                source,
            });
        }
        Ok(Self {
            socket: socket.clone(),
            listener,
        })
    }

    /// Spawns the accept loop.
    ///
    /// The loop polls `shutdown` between accepts and removes the socket file
    /// when it stops.
    pub(crate) fn start(
        self,
        handler: Arc<dyn ConnectionHandler>,
        shutdown: ShutdownFlag,
        tracker: ConnectionTracker,
    ) -> Result<ListenerHandle, ListenerError> {
        if let Err(source) = self.listener.set_nonblocking(true) {
            remove_socket_file(&self.socket);
            return Err(ListenerError::NonBlocking { source });
        }
        let flag = shutdown.clone();
        let spawned = thread::Builder::new()
            .name("courierd-accept".to_owned())
            .spawn(move || run_accept_loop(&self, &flag, &handler, &tracker));
        match spawned {
            Ok(handle) => Ok(ListenerHandle {
                shutdown,
                handle: Some(handle),
            }),
            Err(source) => Err(ListenerError::Spawn { source }),
        }
    }
}

/// Handle to the background accept thread.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    shutdown: ShutdownFlag,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Waits for the accept loop to exit.
    pub(crate) fn join(mut self) -> Result<(), ListenerError> {
        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| ListenerError::ThreadPanic),
            None => Ok(()),
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.shutdown.request();
        }
    }
}

fn run_accept_loop(
    listener: &SocketListener,
    shutdown: &ShutdownFlag,
    handler: &Arc<dyn ConnectionHandler>,
    tracker: &ConnectionTracker,
) {
    info!(
        target: TRANSPORT_TARGET,
        socket = %listener.socket,
        "socket listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.is_requested() {
        match accept_connection(&listener.listener) {
            Ok(Some(stream)) => {
                last_error = None;
                spawn_connection(stream, handler, tracker);
            }
            Ok(None) => thread::sleep(ACCEPT_BACKOFF),
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: TRANSPORT_TARGET,
                        error = %error,
                        "socket accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    remove_socket_file(&listener.socket);
    info!(target: TRANSPORT_TARGET, "socket listener stopped");
}

fn spawn_connection(
    stream: UnixStream,
    handler: &Arc<dyn ConnectionHandler>,
    tracker: &ConnectionTracker,
) {
    let guard = match tracker.register(&stream) {
        Ok(guard) => guard,
        Err(error) => {
            warn!(
                target: TRANSPORT_TARGET,
                error = %error,
                "failed to track connection; dropping it"
            );
            return;
        }
    };
    let handler = Arc::clone(handler);
    let spawned = thread::Builder::new()
        .name("courierd-conn".to_owned())
        .spawn(move || {
            let _guard = guard;
            handler.handle(stream);
        });
    if let Err(error) = spawned {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            "failed to spawn connection thread"
        );
    }
}

fn accept_connection(listener: &UnixListener) -> io::Result<Option<UnixStream>> {
    match listener.accept() {
        Ok((stream, _)) => {
            stream.set_nonblocking(false)?;
            Ok(Some(stream))
        }
        Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
        Err(error) => Err(error),
    }
}

/// Removes a socket file nobody answers on. Returns `true` if one was removed.
fn clear_stale_socket(path: &Path) -> Result<bool, ListenerError> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(source) => {
            return Err(ListenerError::Metadata {
                path: path.display().to_string(),
                source,
            });
        }
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::NotSocket {
            path: path.display().to_string(),
        });
    }
    match UnixStream::connect(path) {
        Ok(_stream) => Err(ListenerError::AlreadyRunning {
            path: path.display().to_string(),
        }),
        Err(error)
            if error.kind() == io::ErrorKind::ConnectionRefused
                || error.kind() == io::ErrorKind::NotFound =>
        {
            match fs::remove_file(path) {
                Ok(()) => Ok(true),
                Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(false),
                Err(source) => Err(ListenerError::Cleanup {
                    path: path.display().to_string(),
                    source,
                }),
            }
        }
        Err(source) => Err(ListenerError::StaleCheck {
            path: path.display().to_string(),
            source,
        }),
    }
}

fn remove_socket_file(socket: &SocketPath) {
    if let Err(error) = fs::remove_file(socket.path().as_std_path())
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            error = %error,
            socket = %socket,
            "failed to remove socket file"
        );
    }
}
