//! Parser for tablediff's "columns not included" diagnostics.
//!
//! When tablediff meets a column it cannot compare, the fix script carries a
//! comment pair like:
//!
//! ```text
//! -- Table: [dbo].[Orders]
//! -- Column(s) Notes,Attachment are not included in this script because they are of type(s) ...
//! ```
//!
//! Grammar (version [`DIAGNOSTIC_GRAMMAR_VERSION`]), per line after trimming:
//!
//! - table line: `-- Table: <name>` where `<name>` is non-empty
//! - column line: `-- Column(s) <list> are not included in <anything>` where
//!   `<list>` is a comma-separated list of column names, optionally bracketed
//!
//! Markers match ASCII case-insensitively. The table name is taken from the
//! line directly above the column line. Column lines with an empty list or
//! without a table line above them are skipped.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Version of the diagnostic grammar this parser understands.
pub const DIAGNOSTIC_GRAMMAR_VERSION: u32 = 1;

const TABLE_MARKER: &str = "-- Table:";
const COLUMN_MARKER: &str = "-- Column(s)";
const COLUMN_TERMINATOR: &str = " are not included in";

/// Columns tablediff skipped for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedEntry {
    /// Table name as printed by tablediff, e.g. `[dbo].[Orders]`.
    pub table_name: String,

    /// Skipped column names, in first-seen order, without duplicates.
    pub column_names: Vec<String>,
}

/// Scan an aggregate script for unsupported-column diagnostics.
///
/// Diagnostics for the same table (compared case-insensitively) are merged
/// into a single entry.
pub fn scan(script: &str) -> Vec<UnsupportedEntry> {
    let mut entries: Vec<UnsupportedEntry> = Vec::new();
    let mut previous: Option<&str> = None;

    for (line_no, raw) in script.lines().enumerate() {
        let line = raw.trim();

        if let Some(columns) = parse_column_line(line) {
            let table = previous.and_then(parse_table_line);

            match (table, columns.is_empty()) {
                (Some(table), false) => merge(&mut entries, table, columns),
                (None, _) => warn!(
                    "Line {}: column diagnostic without a preceding table line, skipping",
                    line_no + 1
                ),
                (Some(table), true) => debug!(
                    "Line {}: empty column list for {}, skipping",
                    line_no + 1,
                    table
                ),
            }
        }

        previous = Some(line);
    }

    entries
}

fn merge(entries: &mut Vec<UnsupportedEntry>, table: &str, columns: Vec<String>) {
    match entries
        .iter_mut()
        .find(|e| e.table_name.eq_ignore_ascii_case(table))
    {
        Some(entry) => {
            for column in columns {
                if !entry.column_names.contains(&column) {
                    entry.column_names.push(column);
                }
            }
        }
        None => {
            let mut unique: Vec<String> = Vec::with_capacity(columns.len());
            for column in columns {
                if !unique.contains(&column) {
                    unique.push(column);
                }
            }
            entries.push(UnsupportedEntry {
                table_name: table.to_string(),
                column_names: unique,
            });
        }
    }
}

/// Strip a marker prefix, ignoring ASCII case.
fn strip_marker<'a>(line: &'a str, marker: &str) -> Option<&'a str> {
    let head = line.get(..marker.len())?;
    if head.eq_ignore_ascii_case(marker) {
        line.get(marker.len()..)
    } else {
        None
    }
}

/// Table name from a `-- Table: <name>` line.
fn parse_table_line(line: &str) -> Option<&str> {
    let name = strip_marker(line.trim(), TABLE_MARKER)?.trim();
    (!name.is_empty()).then_some(name)
}

/// Column list from a `-- Column(s) <list> are not included in ...` line.
///
/// Returns `None` when the line is not a column diagnostic and an empty list
/// when the diagnostic names no columns.
fn parse_column_line(line: &str) -> Option<Vec<String>> {
    let rest = strip_marker(line, COLUMN_MARKER)?;
    let end = rest
        .to_ascii_lowercase()
        .find(COLUMN_TERMINATOR)?;
    let list = &rest[..end];

    Some(
        list.split(',')
            .map(clean_column_name)
            .filter(|c| !c.is_empty())
            .collect(),
    )
}

fn clean_column_name(raw: &str) -> String {
    let name = raw.trim();
    match name.strip_prefix('[').and_then(|n| n.strip_suffix(']')) {
        Some(inner) => inner.replace("]]", "]"),
        None => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_and_column_pair() {
        let script = "-- Table: [dbo].[Orders]\r\n\
                      -- Column(s) Notes, Attachment are not included in the script.\r\n";
        assert_eq!(
            scan(script),
            vec![UnsupportedEntry {
                table_name: "[dbo].[Orders]".into(),
                column_names: vec!["Notes".into(), "Attachment".into()],
            }]
        );
    }

    #[test]
    fn test_real_tablediff_header() {
        let script = "-- Host: db01\r\n\
                      -- Database: [Staging]\r\n\
                      -- Table: [sales].[Invoice]\r\n\
                      -- Column(s) Body,Scan are not included in this script because they are of type(s) text, ntext, varchar(max), nvarchar(max), varbinary(max), image, timestamp, or xml. Columns of these types cannot be updated by tablediff utility scripts; therefore non-convergence of data can still occur after this script has been applied.\r\n\
                      SET IDENTITY_INSERT [sales].[Invoice] ON\r\n\
                      UPDATE [sales].[Invoice] SET [Total]=10 WHERE [Id] = 4\r\n";
        let entries = scan(script);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].table_name, "[sales].[Invoice]");
        assert_eq!(entries[0].column_names, vec!["Body", "Scan"]);
    }

    #[test]
    fn test_empty_column_list_yields_no_entry() {
        let script = "-- Table: [dbo].[Orders]\n-- Column(s)  are not included in the script.\n";
        assert!(scan(script).is_empty());
    }

    #[test]
    fn test_missing_table_line_is_skipped_and_scan_continues() {
        let script = "UPDATE [dbo].[A] SET [X]=1\n\
                      -- Column(s) Orphan are not included in the script.\n\
                      GO\n\
                      -- Table: [dbo].[B]\n\
                      -- Column(s) Payload are not included in the script.\n";
        let entries = scan(script);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].table_name, "[dbo].[B]");
        assert_eq!(entries[0].column_names, vec!["Payload"]);
    }

    #[test]
    fn test_table_line_must_be_directly_above() {
        let script = "-- Table: [dbo].[A]\n\
                      -- Database: [X]\n\
                      -- Column(s) Notes are not included in the script.\n";
        assert!(scan(script).is_empty());
    }

    #[test]
    fn test_column_line_without_terminator_is_ignored() {
        let script = "-- Table: [dbo].[A]\n-- Column(s) Notes were skipped\n";
        assert!(scan(script).is_empty());
    }

    #[test]
    fn test_repeated_table_diagnostics_merge() {
        let script = "-- Table: [dbo].[Orders]\n\
                      -- Column(s) Notes are not included in the script.\n\
                      GO\n\
                      -- Table: [DBO].[orders]\n\
                      -- Column(s) Notes, Attachment are not included in the script.\n";
        assert_eq!(
            scan(script),
            vec![UnsupportedEntry {
                table_name: "[dbo].[Orders]".into(),
                column_names: vec!["Notes".into(), "Attachment".into()],
            }]
        );
    }

    #[test]
    fn test_bracketed_column_names_and_case_insensitive_markers() {
        let script = "-- TABLE: [dbo].[Docs]\n\
                      -- column(s) [Body], [Odd]]Name] ARE NOT INCLUDED IN the script.\n";
        let entries = scan(script);
        assert_eq!(entries[0].table_name, "[dbo].[Docs]");
        assert_eq!(entries[0].column_names, vec!["Body", "Odd]Name"]);
    }

    #[test]
    fn test_multiple_tables_keep_order() {
        let script = "-- Table: [dbo].[B]\n\
                      -- Column(s) X are not included in the script.\n\
                      -- Table: [dbo].[A]\n\
                      -- Column(s) Y are not included in the script.\n";
        let names: Vec<String> = scan(script).into_iter().map(|e| e.table_name).collect();
        assert_eq!(names, vec!["[dbo].[B]", "[dbo].[A]"]);
    }

    #[test]
    fn test_script_without_diagnostics() {
        assert!(scan("").is_empty());
        assert!(scan("UPDATE [dbo].[A] SET [X]=1\r\nGO\r\n\r\n").is_empty());
    }
}
