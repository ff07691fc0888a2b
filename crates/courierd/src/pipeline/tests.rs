//! Stream-level pipeline behaviour.

use std::io::Cursor;

use courier_protocol::{Envelope, ErrorCode, Kind, encode};
use rstest::{fixture, rstest};
use serde_json::json;

use super::{Pipeline, PipelineSummary};
use crate::capabilities::{AUTHENTICATE, PING};
use crate::registry::Registry;
use crate::tests::support::{Fixtures, decode_lines};

#[fixture]
fn registry() -> Registry {
    Fixtures::default().registry(None)
}

fn stream(envelopes: &[Envelope]) -> Vec<u8> {
    envelopes
        .iter()
        .flat_map(|envelope| encode(envelope).expect("encode"))
        .collect()
}

fn run(pipeline: Pipeline<'_>, input: &[u8]) -> (PipelineSummary, Vec<Envelope>) {
    let mut output = Vec::new();
    let summary = pipeline
        .run(Cursor::new(input.to_vec()), &mut output)
        .expect("pipeline run");
    (summary, decode_lines(&output))
}

#[rstest]
fn malformed_lines_are_skipped(registry: Registry) {
    let mut input = b"{\"not\":\"an envelope\"}\n".to_vec();
    input.extend(stream(&[Envelope::query(PING, json!({"payload": "after"}))]));

    let (summary, outputs) = run(Pipeline::new(&registry), &input);

    assert_eq!(outputs.len(), 1);
    let reply = outputs.first().expect("reply");
    assert_eq!(reply.kind, Kind::Reply);
    assert_eq!(reply.data, json!({"payload": "after"}));
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 1);
}

#[rstest]
#[case::not_json(b"garbage\n".as_slice())]
#[case::missing_type(br#"{"kind":"query","data":{}}"#.as_slice())]
#[case::unknown_kind(br#"{"kind":"shout","type":"Ping"}"#.as_slice())]
#[case::empty_type(br#"{"kind":"query","type":"  "}"#.as_slice())]
fn each_violation_produces_no_output(registry: Registry, #[case] line: &[u8]) {
    let (summary, outputs) = run(Pipeline::new(&registry), line);
    assert!(outputs.is_empty());
    assert_eq!(summary.skipped, 1);
}

#[rstest]
fn blank_lines_are_ignored(registry: Registry) {
    let mut input = b"\n   \n".to_vec();
    input.extend(stream(&[Envelope::query(PING, json!({"payload": 1}))]));
    let (summary, outputs) = run(Pipeline::new(&registry), &input);
    assert_eq!(outputs.len(), 1);
    assert_eq!(summary.skipped, 0);
}

#[rstest]
fn replies_follow_request_order(registry: Registry) {
    let requests: Vec<Envelope> = (0..20)
        .map(|index| Envelope::query(PING, json!({ "payload": index })))
        .collect();

    let (summary, outputs) = run(Pipeline::new(&registry), &stream(&requests));

    assert_eq!(summary.written, requests.len());
    for (request, reply) in requests.iter().zip(&outputs) {
        assert_eq!(reply.causation(), Some(request.id()));
        assert_eq!(reply.data, request.data);
    }
}

#[rstest]
fn events_produce_no_output(registry: Registry) {
    let input = stream(&[
        Envelope::event("Test.Happened", json!({"at": 1})),
        Envelope::query(PING, json!({"payload": "x"})),
    ]);
    let (summary, outputs) = run(Pipeline::new(&registry), &input);
    assert_eq!(summary.processed, 2);
    assert_eq!(outputs.len(), 1);
}

#[rstest]
fn missing_metadata_is_filled(registry: Registry) {
    let input = br#"{"kind":"query","type":"Ping","data":{"payload":"bare"}}"#;
    let (_, outputs) = run(Pipeline::new(&registry), input);
    let reply = outputs.first().expect("reply");
    assert!(reply.causation().is_some_and(|cause| !cause.is_empty()));
}

#[rstest]
fn gate_rejects_wrong_first_envelope(registry: Registry) {
    let input = stream(&[
        Envelope::query(PING, json!({"payload": 1})),
        Envelope::query(PING, json!({"payload": 2})),
    ]);

    let (summary, outputs) = run(Pipeline::new(&registry).with_authentication(), &input);

    assert!(summary.rejected);
    assert_eq!(outputs.len(), 1);
    let error = outputs.first().expect("error");
    assert_eq!(
        error.error_body().map(|body| body.code),
        Some(ErrorCode::Unauthenticated)
    );
}

#[rstest]
fn gate_admits_after_handshake(registry: Registry) {
    let handshake = Envelope::command(AUTHENTICATE, json!({"token": "anything"}))
        .with_correlation("session-1");
    let ping = Envelope::query(PING, json!({"payload": "hi"})).with_correlation("session-1");

    let (summary, outputs) = run(
        Pipeline::new(&registry).with_authentication(),
        &stream(&[handshake, ping]),
    );

    assert!(!summary.rejected);
    let kinds: Vec<Kind> = outputs.iter().map(|outcome| outcome.kind).collect();
    assert_eq!(kinds, vec![Kind::Reply, Kind::Reply]);
    let session = outputs.first().expect("handshake reply");
    assert_eq!(session.data, json!({"authenticated": true, "session": "session-1"}));
}

#[rstest]
#[case::wrong_token(json!({"token": "guess"}))]
#[case::no_token(json!({}))]
fn gate_closes_on_failed_handshake(#[case] credentials: serde_json::Value) {
    let registry = Fixtures::default().registry(Some("s3cret"));
    let input = stream(&[
        Envelope::command(AUTHENTICATE, credentials),
        Envelope::query(PING, json!({"payload": 1})),
    ]);

    let (summary, outputs) = run(Pipeline::new(&registry).with_authentication(), &input);

    assert!(summary.rejected);
    assert_eq!(outputs.len(), 1);
    let body = outputs.first().and_then(Envelope::error_body).expect("error");
    assert_eq!(body.message, "invalid credentials");
}

#[rstest]
fn oversized_lines_are_skipped(registry: Registry) {
    let mut input = vec![b'x'; courier_protocol::MAX_LINE_BYTES + 10];
    input.push(b'\n');
    input.extend(stream(&[Envelope::query(PING, json!({"payload": "small"}))]));

    let (summary, outputs) = run(Pipeline::new(&registry), &input);

    assert_eq!(summary.skipped, 1);
    assert_eq!(outputs.len(), 1);
}
