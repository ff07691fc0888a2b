//! Per-connection authentication state.

use courier_protocol::{Envelope, ErrorBody, ErrorCode, Kind};

use crate::capabilities::AUTHENTICATE;

/// What the gate decided for one inbound envelope.
#[derive(Debug)]
pub(super) enum Admission {
    /// Dispatch normally.
    Pass,
    /// Dispatch, then settle the gate with the outcome.
    Handshake,
    /// Answer with this error and close the connection.
    Reject(Envelope),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    AwaitingHandshake,
    Authenticated,
}

/// Tracks whether a connection has completed `Syscall.Authenticate`.
#[derive(Debug)]
pub(super) struct Gate {
    state: State,
}

impl Gate {
    /// A gate that admits everything.
    pub(super) const fn open() -> Self {
        Self { state: State::Open }
    }

    /// A gate that requires the handshake first.
    pub(super) const fn guarded() -> Self {
        Self {
            state: State::AwaitingHandshake,
        }
    }

    pub(super) fn admit(&self, envelope: &Envelope) -> Admission {
        match self.state {
            State::Open | State::Authenticated => Admission::Pass,
            State::AwaitingHandshake if envelope.type_name == AUTHENTICATE => Admission::Handshake,
            State::AwaitingHandshake => {
                let body = ErrorBody::new(
                    ErrorCode::Unauthenticated,
                    format!(
                        "connection is not authenticated; send {AUTHENTICATE} before {}",
                        envelope.type_name
                    ),
                );
                Admission::Reject(Envelope::error_to(envelope, &body))
            }
        }
    }

    /// Records the handshake outcome. Returns `false` when the connection
    /// must close.
    pub(super) fn settle(&mut self, outcome: &Envelope) -> bool {
        if outcome.kind == Kind::Reply {
            self.state = State::Authenticated;
            true
        } else {
            false
        }
    }

    #[cfg(test)]
    fn is_authenticated(&self) -> bool {
        self.state == State::Authenticated
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn open_gate_passes_everything() {
        let gate = Gate::open();
        let envelope = Envelope::query("Ping", json!({"payload": 1}));
        assert!(matches!(gate.admit(&envelope), Admission::Pass));
    }

    #[test]
    fn guarded_gate_rejects_other_types() {
        let gate = Gate::guarded();
        let envelope = Envelope::query("Ping", json!({"payload": 1}));
        let Admission::Reject(error) = gate.admit(&envelope) else {
            panic!("expected rejection");
        };
        assert_eq!(error.causation(), Some(envelope.id()));
        assert_eq!(
            error.error_body().map(|body| body.code),
            Some(ErrorCode::Unauthenticated)
        );
    }

    #[test]
    fn successful_handshake_opens_gate() {
        let mut gate = Gate::guarded();
        let handshake = Envelope::command(AUTHENTICATE, json!({}));
        assert!(matches!(gate.admit(&handshake), Admission::Handshake));
        assert!(gate.settle(&Envelope::reply_to(&handshake, json!({}))));
        assert!(gate.is_authenticated());
        let next = Envelope::query("Ping", json!({"payload": 1}));
        assert!(matches!(gate.admit(&next), Admission::Pass));
    }

    #[test]
    fn failed_handshake_closes() {
        let mut gate = Gate::guarded();
        let handshake = Envelope::command(AUTHENTICATE, json!({}));
        let failure = Envelope::error_to(
            &handshake,
            &ErrorBody::new(ErrorCode::ExecutionFailed, "invalid credentials"),
        );
        assert!(!gate.settle(&failure));
        assert!(!gate.is_authenticated());
    }
}
