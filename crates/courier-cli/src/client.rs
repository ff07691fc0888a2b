//! Client mode: relay envelopes to a running daemon.
//!
//! Every connection opens with `Syscall.Authenticate`. The session id sent as
//! the handshake's correlation is carried by one-shot requests; raw stdin
//! lines are forwarded untouched.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::panic;
use std::process::ExitCode;
use std::thread;

use courier_config::{Config, SocketPath};
use courier_protocol::{Envelope, Kind, decode, encode, new_message_id, write_envelope};
use courierd::Registry;
use courierd::capabilities::AUTHENTICATE;
use serde_json::json;
use tracing::{debug, info};

use crate::cli::OneShot;
use crate::errors::{AppError, ClientError};
use crate::transport;

const CLIENT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::client");

/// Runs client mode against the configured daemon socket.
pub(crate) fn run<R, W>(
    config: &Config,
    registry: &Registry,
    request: Option<OneShot<'_>>,
    input: R,
    stdout: &mut W,
) -> Result<ExitCode, AppError>
where
    R: Read + Send + 'static,
    W: Write,
{
    let socket = config.daemon_socket().map_err(ClientError::from)?;
    let mut connection = DaemonConnection::open(&socket)?;
    let handshake = connection.authenticate(config.auth_token())?;
    if handshake.kind != Kind::Reply {
        write_envelope(stdout, &handshake)?;
        return Ok(ExitCode::FAILURE);
    }
    info!(
        target: CLIENT_TARGET,
        socket = %socket.path(),
        session = %connection.session,
        "authenticated with daemon"
    );
    match request {
        Some(request) => {
            let envelope = registry
                .envelope_from_args(request.type_name, request.arguments)?
                .with_correlation(connection.session.clone());
            connection.one_shot(&envelope, stdout)
        }
        None => connection.stream(input, stdout),
    }
    .map_err(AppError::from)
}

/// Counters for the lines copied from the daemon to stdout.
#[derive(Debug, Default, Clone, Copy)]
struct RelaySummary {
    relayed: usize,
    errors: usize,
}

struct DaemonConnection {
    stream: UnixStream,
    reader: BufReader<UnixStream>,
    session: String,
}

impl DaemonConnection {
    fn open(socket: &SocketPath) -> Result<Self, ClientError> {
        let stream = transport::connect(socket.path())?;
        let reader = BufReader::new(stream.try_clone().map_err(ClientError::Receive)?);
        Ok(Self {
            stream,
            reader,
            session: new_message_id(),
        })
    }

    /// Sends the handshake and returns the daemon's answer.
    fn authenticate(&mut self, token: Option<&str>) -> Result<Envelope, ClientError> {
        let credentials = match token {
            Some(token) => json!({ "token": token, "client": env!("CARGO_PKG_NAME") }),
            None => json!({ "client": env!("CARGO_PKG_NAME") }),
        };
        let request =
            Envelope::command(AUTHENTICATE, credentials).with_correlation(self.session.clone());
        self.send(&request)?;
        self.receive()?.ok_or(ClientError::Closed)
    }

    fn one_shot<W: Write>(
        &mut self,
        envelope: &Envelope,
        stdout: &mut W,
    ) -> Result<ExitCode, ClientError> {
        self.send(envelope)?;
        self.stream
            .shutdown(Shutdown::Write)
            .map_err(ClientError::Send)?;
        let summary = relay(&mut self.reader, stdout)?;
        Ok(if summary.errors > 0 {
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        })
    }

    /// Forwards `input` on a detached thread while relaying replies.
    ///
    /// Returns as soon as the daemon closes its side. A forwarder still
    /// blocked on `input` is left behind and dies with the process.
    fn stream<R, W>(self, input: R, stdout: &mut W) -> Result<ExitCode, ClientError>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let Self {
            stream,
            mut reader,
            ..
        } = self;
        let writer = stream.try_clone().map_err(ClientError::Send)?;
        let forwarder = thread::Builder::new()
            .name("courier-forward".to_owned())
            .spawn(move || forward(input, &writer))
            .map_err(ClientError::Spawn)?;
        let summary = relay(&mut reader, stdout)?;
        if let Err(error) = stream.shutdown(Shutdown::Both)
            && error.kind() != io::ErrorKind::NotConnected
        {
            debug!(target: CLIENT_TARGET, error = %error, "socket shutdown failed");
        }
        if forwarder.is_finished() {
            forwarder
                .join()
                .unwrap_or_else(|payload| panic::resume_unwind(payload))?;
        } else {
            debug!(target: CLIENT_TARGET, "input still open; forwarder abandoned");
        }
        debug!(
            target: CLIENT_TARGET,
            relayed = summary.relayed,
            errors = summary.errors,
            "daemon closed the stream"
        );
        Ok(ExitCode::SUCCESS)
    }

    fn send(&mut self, envelope: &Envelope) -> Result<(), ClientError> {
        let line = encode(envelope)?;
        self.stream.write_all(&line).map_err(ClientError::Send)
    }

    fn receive(&mut self) -> Result<Option<Envelope>, ClientError> {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .map_err(ClientError::Receive)?;
            if read == 0 {
                return Ok(None);
            }
            if let Some(envelope) = decode(&line).map_err(ClientError::Reply)? {
                return Ok(Some(envelope));
            }
        }
    }
}

fn forward<R: Read>(mut input: R, stream: &UnixStream) -> Result<(), ClientError> {
    let mut writer = stream;
    match io::copy(&mut input, &mut writer) {
        Ok(bytes) => debug!(target: CLIENT_TARGET, bytes, "input forwarded"),
        Err(error) if error.kind() == io::ErrorKind::BrokenPipe => {
            debug!(target: CLIENT_TARGET, "daemon stopped reading before input ended");
        }
        Err(error) => return Err(ClientError::Send(error)),
    }
    match stream.shutdown(Shutdown::Write) {
        Err(error) if error.kind() != io::ErrorKind::NotConnected => {
            Err(ClientError::Send(error))
        }
        _ => Ok(()),
    }
}

fn relay<R: BufRead, W: Write>(
    reader: &mut R,
    stdout: &mut W,
) -> Result<RelaySummary, ClientError> {
    let mut summary = RelaySummary::default();
    let mut line = Vec::new();
    loop {
        line.clear();
        let read = reader
            .read_until(b'\n', &mut line)
            .map_err(ClientError::Receive)?;
        if read == 0 {
            return Ok(summary);
        }
        if matches!(decode(&line), Ok(Some(envelope)) if envelope.kind == Kind::Error) {
            summary.errors += 1;
        }
        summary.relayed += 1;
        stdout
            .write_all(&line)
            .and_then(|()| stdout.flush())
            .map_err(ClientError::Forward)?;
    }
}
