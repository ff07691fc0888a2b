//! Capabilities and helpers shared by the daemon's unit suites.

use std::io::{BufRead, BufReader, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use courier_config::SocketPath;
use courier_protocol::Envelope;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::capabilities::{KernelOptions, builtin_capabilities};
use crate::capability::{Capability, CapabilityError, CapabilityKind, Schema};
use crate::daemon::{DaemonError, DrainReport};
use crate::health::HealthReporter;
use crate::registry::Registry;
use crate::shutdown::ShutdownFlag;

/// Body used by the test capabilities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct Note {
    pub(crate) text: String,
}

fn note_schema() -> Schema {
    Schema::object().required("text", Schema::String).into()
}

/// Command that appends each note to a shared journal and echoes it.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    pub(crate) entries: Arc<Mutex<Vec<String>>>,
}

impl Capability for Journal {
    type Input = Note;
    type Output = Note;

    fn name(&self) -> &'static str {
        "Test.Journal"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Command
    }

    fn input_schema(&self) -> Schema {
        note_schema()
    }

    fn output_schema(&self) -> Schema {
        note_schema()
    }

    fn process(&self, input: Note, _envelope: &Envelope) -> Result<Note, CapabilityError> {
        self.entries
            .lock()
            .map_err(|_| CapabilityError::failed("journal lock poisoned"))?
            .push(input.text.clone());
        Ok(input)
    }
}

/// Query that counts its invocations and always fails.
#[derive(Debug, Clone, Default)]
pub(crate) struct Refuse {
    pub(crate) calls: Arc<AtomicUsize>,
}

impl Capability for Refuse {
    type Input = Note;
    type Output = Note;

    fn name(&self) -> &'static str {
        "Test.Refuse"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Query
    }

    fn input_schema(&self) -> Schema {
        note_schema()
    }

    fn output_schema(&self) -> Schema {
        note_schema()
    }

    fn process(&self, input: Note, _envelope: &Envelope) -> Result<Note, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CapabilityError::failed(format!("refused: {}", input.text)))
    }
}

/// Query that panics.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Explode;

impl Capability for Explode {
    type Input = Note;
    type Output = Note;

    fn name(&self) -> &'static str {
        "Test.Explode"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Query
    }

    fn input_schema(&self) -> Schema {
        note_schema()
    }

    fn output_schema(&self) -> Schema {
        note_schema()
    }

    #[expect(
        clippy::panic_in_result_fn,
        reason = "exercises the dispatcher's panic boundary"
    )]
    fn process(&self, input: Note, _envelope: &Envelope) -> Result<Note, CapabilityError> {
        panic!("kaboom: {}", input.text);
    }
}

/// Query whose output does not match its declared schema.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Liar;

impl Capability for Liar {
    type Input = Note;
    type Output = Value;

    fn name(&self) -> &'static str {
        "Test.Liar"
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::Query
    }

    fn input_schema(&self) -> Schema {
        note_schema()
    }

    fn output_schema(&self) -> Schema {
        note_schema()
    }

    fn process(&self, _input: Note, _envelope: &Envelope) -> Result<Value, CapabilityError> {
        Ok(serde_json::json!({"text": 42}))
    }
}

/// Handles onto the state of the test capabilities.
#[derive(Debug, Default, Clone)]
pub(crate) struct Fixtures {
    pub(crate) journal: Journal,
    pub(crate) refuse: Refuse,
    pub(crate) shutdown: ShutdownFlag,
}

impl Fixtures {
    /// Builds the built-in registry plus every test capability.
    pub(crate) fn registry(&self, auth_token: Option<&str>) -> Registry {
        let options = KernelOptions {
            auth_token: auth_token.map(str::to_owned),
            shutdown: self.shutdown.clone(),
        };
        builtin_capabilities(&options)
            .register(self.journal.clone())
            .register(self.refuse.clone())
            .register(Explode)
            .register(Liar)
            .build()
            .expect("test registry")
    }
}

/// Decodes every non-blank line of `output`.
pub(crate) fn decode_lines(output: &[u8]) -> Vec<Envelope> {
    output
        .split(|byte| *byte == b'\n')
        .filter_map(|line| courier_protocol::decode(line).expect("valid output line"))
        .collect()
}

/// Reads envelopes from `stream` until EOF.
pub(crate) fn read_envelopes<R: Read>(stream: R) -> Vec<Envelope> {
    BufReader::new(stream)
        .lines()
        .map(|line| line.expect("read line"))
        .filter_map(|line| courier_protocol::decode(line.as_bytes()).expect("decode"))
        .collect()
}

/// Structured health events tracked during daemon tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HealthEvent {
    Starting,
    StaleSocketRemoved,
    Listening,
    ShutdownRequested,
    Drained,
    Failed(String),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub(crate) struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    pub(crate) fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn daemon_starting(&self, _socket: &SocketPath) {
        self.record(HealthEvent::Starting);
    }

    fn stale_socket_removed(&self, _socket: &SocketPath) {
        self.record(HealthEvent::StaleSocketRemoved);
    }

    fn daemon_listening(&self, _socket: &SocketPath) {
        self.record(HealthEvent::Listening);
    }

    fn shutdown_requested(&self) {
        self.record(HealthEvent::ShutdownRequested);
    }

    fn daemon_drained(&self, _report: &DrainReport) {
        self.record(HealthEvent::Drained);
    }

    fn daemon_failed(&self, error: &DaemonError) {
        self.record(HealthEvent::Failed(error.to_string()));
    }
}
