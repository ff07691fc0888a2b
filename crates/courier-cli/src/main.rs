//! Entry point for the `courier` binary.
//!
//! Delegates to [`courier_cli::run`] behind a panic boundary: a panic that
//! escapes every mode is logged as fatal and exits with status 101.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::process::ExitCode;

use courierd::panic_message;

const PANIC_EXIT: u8 = 101;

fn main() -> ExitCode {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        courier_cli::run(std::env::args_os(), &mut stdout, &mut stderr)
    }));
    outcome.unwrap_or_else(|payload| {
        tracing::error!(
            target: "courier",
            fatal = true,
            panic = %panic_message(payload.as_ref()),
            "courier panicked"
        );
        ExitCode::from(PANIC_EXIT)
    })
}
