//! Runtime tests for mode selection, inline dispatch and client relay.

use std::ffi::OsString;
use std::io::{Cursor, Read, Write};
use std::os::unix::net::UnixStream;
use std::process::ExitCode;
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use camino::Utf8PathBuf;
use clap::Parser;
use courier_config::Config;
use courier_protocol::{Envelope, ErrorCode, Kind, decode, encode};
use courierd::capabilities::SHUTDOWN;
use courierd::{Daemon, ShutdownFlag, StructuredHealthReporter};
use rstest::{fixture, rstest};
use serde_json::json;
use tempfile::TempDir;

use crate::cli::{Cli, Mode};
use crate::run_with_input;

struct Outcome {
    exit: ExitCode,
    stdout: Vec<u8>,
    stderr: String,
}

impl Outcome {
    fn envelopes(&self) -> Vec<Envelope> {
        self.stdout
            .split(|byte| *byte == b'\n')
            .filter_map(|line| decode(line).expect("valid output line"))
            .collect()
    }

    fn only_envelope(&self) -> Envelope {
        let envelopes = self.envelopes();
        assert_eq!(envelopes.len(), 1, "expected one envelope: {envelopes:?}");
        envelopes.into_iter().next().expect("one envelope")
    }
}

fn invoke(args: &[&str], input: &[u8], stdin_is_terminal: bool) -> Outcome {
    invoke_with(args, Cursor::new(input.to_vec()), stdin_is_terminal)
}

fn invoke_with<R>(args: &[&str], input: R, stdin_is_terminal: bool) -> Outcome
where
    R: Read + Send + 'static,
{
    let argv = std::iter::once("courier")
        .chain(args.iter().copied())
        .map(OsString::from);
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit = run_with_input(argv, input, stdin_is_terminal, &mut stdout, &mut stderr);
    Outcome {
        exit,
        stdout,
        stderr: String::from_utf8(stderr).expect("utf8 stderr"),
    }
}

fn lines(envelopes: &[Envelope]) -> Vec<u8> {
    envelopes
        .iter()
        .flat_map(|envelope| encode(envelope).expect("encode"))
        .collect()
}

#[rstest]
#[case::terminal_without_arguments(&[], true, Mode::Inline)]
#[case::piped_without_arguments(&[], false, Mode::Daemon)]
#[case::positional_type(&["Ping", "hi"], false, Mode::Inline)]
#[case::explicit_client(&["--mode", "client"], true, Mode::Client)]
#[case::explicit_mode_wins(&["--mode", "daemon", "Ping"], true, Mode::Daemon)]
fn resolves_runtime_mode(
    #[case] args: &[&str],
    #[case] stdin_is_terminal: bool,
    #[case] expected: Mode,
) {
    let cli = Cli::try_parse_from(std::iter::once("courier").chain(args.iter().copied()))
        .expect("parse arguments");
    assert_eq!(cli.resolve_mode(stdin_is_terminal), expected);
}

#[test]
fn inline_ping_echoes_joined_arguments() {
    let outcome = invoke(&["Ping", "hello", "there"], b"", true);

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    let reply = outcome.only_envelope();
    assert_eq!(reply.kind, Kind::Reply);
    assert_eq!(reply.data, json!({"payload": "hello there"}));
}

#[test]
fn inline_unknown_type_fails() {
    let outcome = invoke(&["Nope.Missing"], b"", true);

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    let error = outcome.only_envelope();
    assert_eq!(
        error.error_body().map(|body| body.code),
        Some(ErrorCode::UnknownCapability)
    );
}

#[test]
fn inline_rejects_unparseable_arguments() {
    let outcome = invoke(&["Syscall.Describe", "{not json"], b"", true);

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(outcome.stdout.is_empty());
    assert!(outcome.stderr.contains("argument is not JSON"), "{}", outcome.stderr);
}

#[test]
fn inline_stream_skips_malformed_lines() {
    let ping = Envelope::query("Ping", json!({"payload": 7}));
    let mut input = b"{\"not\":\"an envelope\"}\n".to_vec();
    input.extend(lines(std::slice::from_ref(&ping)));

    let outcome = invoke(&["--mode", "inline"], &input, false);

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    let reply = outcome.only_envelope();
    assert_eq!(reply.causation(), Some(ping.id()));
}

#[test]
fn terminal_stdin_defaults_to_inline_stream() {
    let ping = Envelope::query("Ping", json!({"payload": "typed"}));

    let outcome = invoke(&[], &lines(std::slice::from_ref(&ping)), true);

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert_eq!(outcome.only_envelope().data, json!({"payload": "typed"}));
}

#[test]
fn unknown_mode_is_a_usage_error() {
    let outcome = invoke(&["--mode", "bogus"], b"", true);

    assert_eq!(outcome.exit, ExitCode::from(2));
    assert!(outcome.stderr.contains("invalid value"), "{}", outcome.stderr);
}

#[test]
fn help_goes_to_stdout() {
    let outcome = invoke(&["--help"], b"", true);

    assert_eq!(outcome.exit, ExitCode::SUCCESS);
    assert!(String::from_utf8_lossy(&outcome.stdout).contains("Usage"));
}

struct RunningDaemon {
    _dir: TempDir,
    socket: Utf8PathBuf,
    daemon: Daemon,
}

impl RunningDaemon {
    fn start(auth_token: Option<&str>) -> Self {
        let dir = tempfile::tempdir().expect("temp dir");
        let socket =
            Utf8PathBuf::from_path_buf(dir.path().join("kernel.sock")).expect("utf8 socket path");
        let config = Config {
            daemon_socket: Some(socket.clone()),
            auth_token: auth_token.map(str::to_owned),
            ..Config::default()
        };
        let daemon = Daemon::start(
            &config,
            ShutdownFlag::new(),
            Arc::new(StructuredHealthReporter::new()),
        )
        .expect("start daemon");
        Self {
            _dir: dir,
            socket,
            daemon,
        }
    }

    fn client_args<'a>(&'a self, rest: &[&'a str]) -> Vec<&'a str> {
        let mut args = vec!["--mode", "client", "--socket", self.socket.as_str()];
        args.extend_from_slice(rest);
        args
    }

    fn stop(self) {
        self.daemon.shutdown_flag().request();
        let report = self.daemon.wait().expect("daemon drains");
        assert_eq!(report.abandoned, 0);
    }
}

#[fixture]
fn daemon() -> RunningDaemon {
    RunningDaemon::start(None)
}

#[rstest]
fn client_one_shot_carries_the_session(daemon: RunningDaemon) {
    let outcome = invoke(&daemon.client_args(&["Ping", "over", "socket"]), b"", true);

    assert_eq!(outcome.exit, ExitCode::SUCCESS, "{}", outcome.stderr);
    let reply = outcome.only_envelope();
    assert_eq!(reply.data, json!({"payload": "over socket"}));
    assert!(reply.correlation().is_some());
    daemon.stop();
}

#[rstest]
fn client_stream_preserves_order(daemon: RunningDaemon) {
    let requests: Vec<Envelope> = (0..5)
        .map(|index| Envelope::query("Ping", json!({ "payload": index })))
        .collect();

    let outcome = invoke(&daemon.client_args(&[]), &lines(&requests), false);

    assert_eq!(outcome.exit, ExitCode::SUCCESS, "{}", outcome.stderr);
    let replies = outcome.envelopes();
    assert_eq!(replies.len(), requests.len());
    for (request, reply) in requests.iter().zip(&replies) {
        assert_eq!(reply.causation(), Some(request.id()));
    }
    daemon.stop();
}

#[rstest]
fn client_stream_returns_when_daemon_closes_with_stdin_open(daemon: RunningDaemon) {
    let (mut feeder, stdin) = UnixStream::pair().expect("stdin pair");
    let shutdown = Envelope::command(SHUTDOWN, json!({}));
    feeder
        .write_all(&lines(std::slice::from_ref(&shutdown)))
        .expect("write request");
    let args: Vec<String> = daemon
        .client_args(&[])
        .into_iter()
        .map(str::to_owned)
        .collect();
    let (done, finished) = mpsc::channel();
    thread::spawn(move || {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        done.send(invoke_with(&args, stdin, false))
            .expect("report outcome");
    });

    let deadline = Instant::now() + Duration::from_secs(5);
    while !daemon.daemon.shutdown_flag().is_requested() {
        assert!(Instant::now() < deadline, "shutdown never reached the daemon");
        thread::sleep(Duration::from_millis(10));
    }
    daemon.stop();

    let outcome = finished
        .recv_timeout(Duration::from_secs(5))
        .expect("client returns while stdin is still open");
    assert_eq!(outcome.exit, ExitCode::SUCCESS, "{}", outcome.stderr);
    assert_eq!(outcome.only_envelope().causation(), Some(shutdown.id()));
    drop(feeder);
}

#[rstest]
fn client_error_reply_fails(daemon: RunningDaemon) {
    let outcome = invoke(&daemon.client_args(&["Nope.Missing"]), b"", true);

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert_eq!(outcome.only_envelope().kind, Kind::Error);
    daemon.stop();
}

#[test]
fn client_with_wrong_token_is_rejected() {
    let daemon = RunningDaemon::start(Some("s3cret"));

    let outcome = invoke(
        &daemon.client_args(&["--auth-token", "guess", "Ping", "hi"]),
        b"",
        true,
    );

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    let error = outcome.only_envelope();
    assert_eq!(
        error.error_body().map(|body| body.message),
        Some("invalid credentials".to_owned())
    );
    daemon.stop();
}

#[test]
fn client_reports_missing_daemon() {
    let dir = tempfile::tempdir().expect("temp dir");
    let socket = dir.path().join("absent.sock");
    let socket = socket.to_str().expect("utf8 socket path");

    let outcome = invoke(&["--mode", "client", "--socket", socket, "Ping"], b"", true);

    assert_eq!(outcome.exit, ExitCode::FAILURE);
    assert!(
        outcome.stderr.contains("failed to connect to daemon"),
        "{}",
        outcome.stderr
    );
    assert!(outcome.stderr.contains("courier --mode daemon"));
}
