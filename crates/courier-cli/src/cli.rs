//! Command-line definitions for the `courier` binary.

use clap::{Parser, ValueEnum};
use courier_config::Config;

/// How the invocation talks to the kernel.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub(crate) enum Mode {
    /// Dispatch in-process against a local registry; no socket.
    Inline,
    /// Relay envelopes to a running daemon.
    Client,
    /// Serve the Unix socket in the foreground.
    Daemon,
}

/// Command-line interface for the courier message kernel.
#[derive(Parser, Debug)]
#[command(name = "courier", version)]
pub(crate) struct Cli {
    /// Runtime mode. Inferred from the arguments and stdin when omitted.
    #[arg(long, value_enum)]
    pub(crate) mode: Option<Mode>,
    #[command(flatten)]
    pub(crate) config: Config,
    /// Envelope type for a one-shot request (for example `Ping`).
    #[arg(value_name = "TYPE")]
    pub(crate) type_name: Option<String>,
    /// Arguments converted into the request payload.
    #[arg(
        value_name = "ARG",
        num_args = 0..,
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub(crate) arguments: Vec<String>,
}

impl Cli {
    /// Picks the runtime mode.
    ///
    /// An explicit `--mode` wins. Otherwise a positional type selects inline,
    /// piped stdin selects the daemon and a terminal selects an interactive
    /// inline stream.
    pub(crate) fn resolve_mode(&self, stdin_is_terminal: bool) -> Mode {
        match (self.mode, self.type_name.is_some()) {
            (Some(mode), _) => mode,
            (None, true) => Mode::Inline,
            (None, false) if stdin_is_terminal => Mode::Inline,
            (None, false) => Mode::Daemon,
        }
    }

    /// Returns the one-shot request, if positional arguments were given.
    pub(crate) fn one_shot(&self) -> Option<OneShot<'_>> {
        self.type_name.as_deref().map(|type_name| OneShot {
            type_name,
            arguments: &self.arguments,
        })
    }
}

/// A request named on the command line.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OneShot<'a> {
    pub(crate) type_name: &'a str,
    pub(crate) arguments: &'a [String],
}
