//! Runs the courier daemon in the foreground.
//!
//! Configuration comes from the same flags and environment variables as the
//! `courier` binary; this entry point always selects daemon mode.

use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use clap::Parser;
use courier_config::Config;
use courierd::{panic_message, run_daemon, telemetry};

/// Foreground courier daemon.
#[derive(Debug, Parser)]
#[command(name = "courierd", version)]
struct Args {
    #[command(flatten)]
    config: Config,
}

const PANIC_EXIT: u8 = 101;

fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(error) = telemetry::initialise(&args.config) {
        let _ = writeln!(io::stderr(), "courierd: {error}");
        return ExitCode::FAILURE;
    }
    match panic::catch_unwind(AssertUnwindSafe(|| run_daemon(&args.config))) {
        Ok(Ok(_report)) => ExitCode::SUCCESS,
        Ok(Err(error)) => {
            let _ = writeln!(io::stderr(), "courierd: {error}");
            ExitCode::FAILURE
        }
        Err(payload) => {
            tracing::error!(
                target: "courierd",
                fatal = true,
                panic = %panic_message(payload.as_ref()),
                "daemon panicked"
            );
            ExitCode::from(PANIC_EXIT)
        }
    }
}
