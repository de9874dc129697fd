//! Execution of `ferry` subcommands.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use camino::Utf8Path;
use ferry_bus::Subscriber;
use ferry_config::Config;
use ferry_messages::model::{FileHistoryId, LogOptions, LsOptions};
use ferry_messages::{Request, Response};
use serde::Serialize;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use tracing::info;

use super::args::Command;
use super::session::ClientSession;
use super::{CLI_TARGET, CliError};
use crate::history::{DetailController, LogController, RootSelector, TreeController};
use crate::recent::RecentChanges;
use crate::shell::{ShellListener, ShellRouter};
use crate::transport::Connector;

pub(crate) fn execute<W: Write>(
    command: Command,
    config: &Config,
    connector: Arc<dyn Connector>,
    stdout: &mut W,
) -> Result<ExitCode, CliError> {
    if matches!(command, Command::Serve) {
        return serve(config, connector);
    }
    let session = ClientSession::connect(config, connector)?;
    let outcome = run_query(command, &session, stdout);
    session.close()?;
    outcome
}

fn run_query<W: Write>(
    command: Command,
    session: &ClientSession,
    stdout: &mut W,
) -> Result<ExitCode, CliError> {
    match command {
        Command::Watches => respond(session, Request::list_watches(), stdout),
        Command::Ls { root, path, date } => {
            respond(session, Request::ls_folder(root, LsOptions::children_of(path, date)), stdout)
        }
        Command::Log { root, start, count } => {
            let options = LogOptions {
                max_database_version_count: count,
                ..LogOptions::page(start)
            };
            respond(session, Request::log_folder(root, options), stdout)
        }
        Command::Headers { root } => {
            respond(session, Request::database_version_headers(root), stdout)
        }
        Command::Status { file } => respond(session, Request::file_status(file), stdout),
        Command::History { root } => history(session, &root, stdout),
        Command::Detail { root, id } => detail(session, &root, &id, stdout),
        Command::Tree { root, expand } => tree(session, &root, &expand, stdout),
        // Dispatched before a session is opened.
        Command::Serve => Ok(ExitCode::SUCCESS),
    }
}

/// Prints the response; failures exit non-zero after printing.
fn respond<W: Write>(
    session: &ClientSession,
    request: Request,
    stdout: &mut W,
) -> Result<ExitCode, CliError> {
    let response = session.call(request)?;
    print_json(stdout, &response)?;
    Ok(exit_code(&response))
}

fn history<W: Write>(
    session: &ClientSession,
    root: &Utf8Path,
    stdout: &mut W,
) -> Result<ExitCode, CliError> {
    let log = attach(session, LogController::new(Arc::clone(session.bus())));
    log.browse(root);
    session.wait_for("the change log", || log.is_settled())?;
    print_json(stdout, &log.versions())?;
    Ok(ExitCode::SUCCESS)
}

fn detail<W: Write>(
    session: &ClientSession,
    root: &Utf8Path,
    id: &FileHistoryId,
    stdout: &mut W,
) -> Result<ExitCode, CliError> {
    let detail = attach(session, DetailController::new(Arc::clone(session.bus())));
    detail.show(root, id);
    session.wait_for("the file history", || detail.is_settled())?;
    print_json(stdout, &detail.versions())?;
    Ok(ExitCode::SUCCESS)
}

fn tree<W: Write>(
    session: &ClientSession,
    root: &Utf8Path,
    expand: &[String],
    stdout: &mut W,
) -> Result<ExitCode, CliError> {
    let selector = attach(session, RootSelector::new(Arc::clone(session.bus())));
    selector.request_watches();
    session.wait_for("the watch list", || !selector.roots().is_empty())?;
    selector.select(root)?;
    session.wait_for("the database version headers", || selector.is_settled())?;

    let tree = attach(session, TreeController::new(Arc::clone(session.bus())));
    tree.set_root(root, selector.browse_date());
    for path in expand {
        tree.expand(path)?;
    }
    session.wait_for("the folder listings", || tree.is_settled())?;
    for line in tree.render() {
        writeln!(stdout, "{line}").map_err(CliError::Write)?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Runs the shell extension endpoint and recent-change tracking until a
/// termination signal arrives.
fn serve(config: &Config, connector: Arc<dyn Connector>) -> Result<ExitCode, CliError> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
        .map_err(|source| CliError::Signals { source })?;
    let session = ClientSession::start(config, connector)?;
    let _recent = attach(&session, RecentChanges::new(Arc::clone(session.bus())));
    let router = attach(&session, ShellRouter::new(Arc::clone(session.bus())));
    let listener = ShellListener::bind(config.shell_socket())?;
    let handle = router.serve(listener)?;
    info!(target: CLI_TARGET, endpoint = %config.shell_socket(), "serving shell extensions");

    let signal = signals.forever().next();
    info!(target: CLI_TARGET, ?signal, "shutting down");
    handle.shutdown();
    handle.join()?;
    session.close()?;
    Ok(ExitCode::SUCCESS)
}


fn attach<S: Subscriber + 'static>(session: &ClientSession, subscriber: S) -> Arc<S> {
    let subscriber = Arc::new(subscriber);
    session.bus().register(subscriber.clone());
    subscriber
}

fn print_json<W: Write, T: Serialize + ?Sized>(stdout: &mut W, value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value).map_err(CliError::Render)?;
    writeln!(stdout, "{rendered}").map_err(CliError::Write)
}

fn exit_code(response: &Response) -> ExitCode {
    if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
