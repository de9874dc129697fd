//! Command-line arguments of `ferry`.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use ferry_messages::model::{FileHistoryId, LogOptions};

#[derive(Parser, Debug)]
#[command(name = "ferry", about = "Query the Ferry sync daemon", disable_help_subcommand = true)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub(crate) enum Command {
    /// Lists the daemon's watched roots.
    Watches,
    /// Lists the immediate children of a folder.
    Ls {
        /// Watched root.
        root: Utf8PathBuf,
        /// Folder relative to the root; the root itself when omitted.
        #[arg(default_value = "")]
        path: String,
        /// Lists the folder as it was at this RFC 3339 time.
        #[arg(long, value_parser = parse_date)]
        date: Option<OffsetDateTime>,
    },
    /// Fetches one page of a root's change log.
    Log {
        /// Watched root.
        root: Utf8PathBuf,
        /// Index of the first database version, newest first.
        #[arg(long, default_value_t = 0)]
        start: usize,
        /// Number of database versions to fetch.
        #[arg(long, default_value_t = LogOptions::PAGE_SIZE)]
        count: usize,
    },
    /// Fetches a root's whole change log page by page.
    History {
        /// Watched root.
        root: Utf8PathBuf,
    },
    /// Lists a root's database version headers.
    Headers {
        /// Watched root.
        root: Utf8PathBuf,
    },
    /// Prints the sync status of a file.
    Status {
        /// Absolute path of the file.
        file: Utf8PathBuf,
    },
    /// Prints every version of one file history.
    Detail {
        /// Watched root.
        root: Utf8PathBuf,
        /// File history id.
        #[arg(value_parser = parse_history_id)]
        id: FileHistoryId,
    },
    /// Prints a root's folder tree as of its newest database version.
    Tree {
        /// Watched root.
        root: Utf8PathBuf,
        /// Folders to expand, relative to the root.
        #[arg(long = "expand", value_name = "PATH")]
        expand: Vec<String>,
    },
    /// Serves the shell extension socket and tracks recent changes until
    /// interrupted.
    Serve,
}

fn parse_date(value: &str) -> Result<OffsetDateTime, String> {
    OffsetDateTime::parse(value, &Rfc3339).map_err(|error| error.to_string())
}

fn parse_history_id(value: &str) -> Result<FileHistoryId, String> {
    if value.is_empty() {
        return Err("file history id must not be empty".to_owned());
    }
    Ok(FileHistoryId::new(value))
}
