//! Runtime of the `ferry` command-line client.
//!
//! Configuration flags are peeled off ahead of the subcommand and resolved
//! through `ortho_config`; the rest is parsed by `clap`. Query commands open a
//! transport session, wait for the daemon, print the answer as JSON and exit
//! non-zero when the daemon reports a failure.

mod args;
mod commands;
mod config;
mod errors;
mod session;
#[cfg(test)]
mod tests;

use std::ffi::OsString;
use std::io::{self, IsTerminal, Write};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ferry_config::{Config, LogFormat};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

use self::args::Cli;
use self::config::{ConfigLoader, OrthoConfigLoader, prepare_cli_arguments, split_config_arguments};
pub(crate) use self::errors::CliError;
use crate::transport::{Connector, WebSocketConnector};

const CLI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::cli");

/// Flags consumed by the configuration loader rather than `clap`.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--config-dir",
    "--log-filter",
    "--log-format",
    "--reconnect-backoff-ms",
    "--request-timeout-ms",
    "--shell-socket",
];

pub(crate) struct IoStreams<'a, W: Write, E: Write> {
    stdout: &'a mut W,
    stderr: &'a mut E,
}

impl<'a, W: Write, E: Write> IoStreams<'a, W, E> {
    pub(crate) const fn new(stdout: &'a mut W, stderr: &'a mut E) -> Self {
        Self { stdout, stderr }
    }
}

struct CliRunner<'a, L: ConfigLoader> {
    loader: &'a L,
    connector: Arc<dyn Connector>,
}

impl<'a, L: ConfigLoader> CliRunner<'a, L> {
    const fn new(loader: &'a L, connector: Arc<dyn Connector>) -> Self {
        Self { loader, connector }
    }

    fn run<I, W, E>(&self, args: I, io: &mut IoStreams<'_, W, E>) -> ExitCode
    where
        I: IntoIterator<Item = OsString>,
        W: Write,
        E: Write,
    {
        match self.execute(args, io.stdout) {
            Ok(exit_code) => exit_code,
            Err(error) => {
                let _ = writeln!(io.stderr, "{error}");
                ExitCode::FAILURE
            }
        }
    }

    fn execute<I, W>(&self, args: I, stdout: &mut W) -> Result<ExitCode, CliError>
    where
        I: IntoIterator<Item = OsString>,
        W: Write,
    {
        let args: Vec<OsString> = args.into_iter().collect();
        let split = split_config_arguments(&args);
        let cli = Cli::try_parse_from(prepare_cli_arguments(&args, &split))
            .map_err(CliError::Usage)?;
        let config = self.loader.load(&split.config_arguments)?;
        install_logging(&config)?;
        commands::execute(cli.command, &config, Arc::clone(&self.connector), stdout)
    }
}

/// Runs the CLI using the provided arguments and IO handles.
#[must_use]
pub fn run<I, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
    W: Write,
    E: Write,
{
    let mut io = IoStreams::new(stdout, stderr);
    CliRunner::new(&OrthoConfigLoader, Arc::new(WebSocketConnector::new())).run(args, &mut io)
}

/// Installs a stderr subscriber; a subscriber installed earlier wins.
fn install_logging(config: &Config) -> Result<(), CliError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| CliError::LogFilter(error.to_string()))?;
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_timer(UtcTime::rfc_3339());
    let installed = match config.log_format() {
        LogFormat::Json => builder.json().flatten_event(true).try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    if installed.is_err() {
        tracing::debug!(target: CLI_TARGET, "tracing subscriber already installed");
    }
    Ok(())
}
