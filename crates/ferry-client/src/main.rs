//! CLI entrypoint for the Ferry daemon client.
//!
//! Delegates to [`ferry_client::run`]. Standard error stays unlocked because
//! the transport thread logs to it while a command runs.

use std::io::{self, StdoutLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stdout: StdoutLock<'_> = io::stdout().lock();
    let mut stderr = io::stderr();
    ferry_client::run(std::env::args_os(), &mut stdout, &mut stderr)
}
