//! Registry assembly and argument adaptation.

use courier_protocol::Kind;
use rstest::rstest;
use serde_json::json;

use super::{RegistryBuilder, RegistryError};
use crate::capabilities::{AUTHENTICATE, DESCRIBE, PING, Ping, SHUTDOWN};
use crate::capability::CapabilityError;
use crate::tests::support::{Journal, Fixtures};

#[test]
fn describe_is_always_registered() {
    let registry = RegistryBuilder::new().build().expect("empty registry");
    assert_eq!(registry.len(), 1);
    assert!(registry.contains(DESCRIBE));
}

#[test]
fn rejects_duplicate_names() {
    let error = RegistryBuilder::new()
        .register(Ping)
        .register(Ping)
        .build()
        .expect_err("duplicate Ping");
    assert!(matches!(error, RegistryError::Duplicate { name } if name == PING));
}

#[test]
fn descriptors_are_sorted_by_name() {
    let registry = Fixtures::default().registry(None);
    let names: Vec<&str> = registry.descriptors().map(|descriptor| descriptor.name).collect();
    let mut sorted = names.clone();
    sorted.sort_unstable();
    assert_eq!(names, sorted);
    for name in [PING, AUTHENTICATE, SHUTDOWN, DESCRIBE, "Test.Journal"] {
        assert!(names.contains(&name), "missing {name}");
    }
}

#[test]
fn ping_arguments_become_a_query() {
    let registry = Fixtures::default().registry(None);
    let args = vec!["hello".to_owned(), "there".to_owned()];
    let envelope = registry.envelope_from_args(PING, &args).expect("ping envelope");
    assert_eq!(envelope.kind, Kind::Query);
    assert_eq!(envelope.data, json!({"payload": "hello there"}));
}

#[test]
fn json_argument_feeds_default_adapter() {
    let registry = RegistryBuilder::new()
        .register(Journal::default())
        .build()
        .expect("registry");
    let args = vec![r#"{"text":"from argv"}"#.to_owned()];
    let envelope = registry
        .envelope_from_args("Test.Journal", &args)
        .expect("journal envelope");
    assert_eq!(envelope.kind, Kind::Command);
    assert_eq!(envelope.data, json!({"text": "from argv"}));
}

#[rstest]
#[case::not_json(&["not json"])]
#[case::wrong_shape(&[r#"{"other":1}"#])]
fn invalid_arguments_are_reported(#[case] args: &[&str]) {
    let registry = Fixtures::default().registry(None);
    let args: Vec<String> = args.iter().map(|arg| (*arg).to_owned()).collect();
    let error = registry
        .envelope_from_args("Test.Journal", &args)
        .expect_err("bad arguments");
    assert!(matches!(error, CapabilityError::InvalidArguments { .. }));
}

#[test]
fn unknown_types_become_commands() {
    let registry = Fixtures::default().registry(None);
    let envelope = registry
        .envelope_from_args("Nope.Missing", &[])
        .expect("unknown envelope");
    assert_eq!(envelope.kind, Kind::Command);
    assert_eq!(envelope.type_name, "Nope.Missing");
    assert_eq!(envelope.data, json!({}));
}
