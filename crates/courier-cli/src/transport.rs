//! Socket connection helper for client mode.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use camino::Utf8Path;
use socket2::{Domain, SockAddr, Socket, Type};

use crate::errors::ClientError;

pub(crate) const CONNECTION_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) fn connect(path: &Utf8Path) -> Result<UnixStream, ClientError> {
    connect_unix(path).map_err(|source| ClientError::Connect {
        socket: path.to_path_buf(),
        source,
    })
}

fn connect_unix(path: &Utf8Path) -> io::Result<UnixStream> {
    let socket = Socket::new(Domain::UNIX, Type::STREAM, None)?;
    let address = SockAddr::unix(path.as_std_path())?;
    socket.connect_timeout(&address, CONNECTION_TIMEOUT)?;
    Ok(UnixStream::from(OwnedFd::from(socket)))
}
