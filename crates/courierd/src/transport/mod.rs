//! Unix socket listener for the daemon.
//!
//! The transport binds the daemon socket, accepts connections in a background
//! thread and hands each one to a [`ConnectionHandler`] on its own thread.

mod errors;
mod handler;
mod listener;
mod tracker;

pub use self::errors::ListenerError;
pub(crate) use self::handler::{ConnectionHandler, PipelineConnectionHandler};
pub(crate) use self::listener::{ListenerHandle, SocketListener};
pub(crate) use self::tracker::{ConnectionTracker, DrainOutcome};

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
