//! Shell extension line grammar.

use camino::{Utf8Path, Utf8PathBuf};
use ferry_messages::model::FileStatus;

const RETRIEVE_FILE_STATUS: &str = "RETRIEVE_FILE_STATUS:";
const RETRIEVE_FOLDER_STATUS: &str = "RETRIEVE_FOLDER_STATUS:";
const STATUS: &str = "STATUS";
const REGISTER_PATH: &str = "REGISTER_PATH";

/// Reply to any line the endpoint cannot serve.
pub(crate) const ERROR_LINE: &str = "ERR";

/// A line sent by an extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ShellCommand {
    /// Sync status of one file or folder.
    RetrieveStatus(Utf8PathBuf),
}

pub(crate) fn parse_line(line: &str) -> Option<ShellCommand> {
    let line = line.trim_end_matches(['\r', '\n']);
    let path = line
        .strip_prefix(RETRIEVE_FILE_STATUS)
        .or_else(|| line.strip_prefix(RETRIEVE_FOLDER_STATUS))?;
    if path.is_empty() {
        return None;
    }
    Some(ShellCommand::RetrieveStatus(Utf8PathBuf::from(path)))
}

pub(crate) fn status_line(status: FileStatus, path: &Utf8Path) -> String {
    format!("{STATUS}:{status}:{path}")
}

pub(crate) fn register_line(root: &Utf8Path) -> String {
    format!("{REGISTER_PATH}:{root}")
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("RETRIEVE_FILE_STATUS:/sync/a.txt\n", Some("/sync/a.txt"))]
    #[case("RETRIEVE_FOLDER_STATUS:/sync/docs\r\n", Some("/sync/docs"))]
    #[case("RETRIEVE_FILE_STATUS:/sync/with:colon.txt", Some("/sync/with:colon.txt"))]
    #[case("RETRIEVE_FILE_STATUS:", None)]
    #[case("REGISTER_PATH:/sync", None)]
    #[case("hello", None)]
    fn lines_parse_into_status_queries(#[case] line: &str, #[case] path: Option<&str>) {
        assert_eq!(
            parse_line(line),
            path.map(|path| ShellCommand::RetrieveStatus(Utf8PathBuf::from(path)))
        );
    }

    #[test]
    fn replies_use_upper_case_statuses() {
        assert_eq!(
            status_line(FileStatus::Sync, Utf8Path::new("/sync/a.txt")),
            "STATUS:SYNC:/sync/a.txt"
        );
        assert_eq!(register_line(Utf8Path::new("/sync")), "REGISTER_PATH:/sync");
    }
}
