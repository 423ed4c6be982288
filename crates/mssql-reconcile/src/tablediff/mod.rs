//! Row-diff driver around the `tablediff` utility.
//!
//! Each invocation compares one table between the source and destination
//! databases and writes a T-SQL fix script to a temporary file, which is read
//! back and deleted. tablediff exit codes:
//!
//! - `0`: tables are identical
//! - `1`: critical error
//! - `2`: table differences found
//!
//! Anything other than 0 or 2 is reported as a tool failure. A successful exit
//! that leaves no file means "no differences".

mod locate;

pub use locate::{locate_in, locate_tablediff, DEFAULT_INSTALL_ROOTS, KNOWN_VERSIONS};

use crate::config::RunParameters;
use crate::error::{ReconcileError, Result};
use crate::source::TableName;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Exit codes tablediff uses for a completed comparison.
const SUCCESS_EXIT_CODES: &[i32] = &[0, 2];

/// Characters of tool output kept per stream in a failure message.
const MAX_DETAIL_CHARS: usize = 2000;

/// Handle to a tablediff executable.
#[derive(Debug, Clone)]
pub struct DiffTool {
    executable: PathBuf,
    timeout: Duration,
    temp_dir: PathBuf,
}

impl DiffTool {
    /// Create a driver for the given executable with a per-table time limit.
    pub fn new(executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            executable: executable.into(),
            timeout,
            temp_dir: std::env::temp_dir(),
        }
    }

    /// Write fix scripts under `dir` instead of the OS temp directory.
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    /// Build the argument list for one table.
    ///
    /// Source and destination share the server and table name; `output_stem`
    /// is the fix-script path without its `.sql` extension.
    pub fn arguments(params: &RunParameters, table: &TableName, output_stem: &Path) -> Vec<String> {
        vec![
            "-sourceserver".into(),
            params.server.clone(),
            "-sourcedatabase".into(),
            params.source_database.clone(),
            "-sourceschema".into(),
            table.schema.clone(),
            "-sourcetable".into(),
            table.name.clone(),
            "-destinationserver".into(),
            params.server.clone(),
            "-destinationdatabase".into(),
            params.destination_database.clone(),
            "-destinationschema".into(),
            table.schema.clone(),
            "-destinationtable".into(),
            table.name.clone(),
            "-f".into(),
            output_stem.to_string_lossy().into_owned(),
        ]
    }

    /// Diff one table and return its change-script fragment (empty when identical).
    pub async fn diff_table(
        &self,
        params: &RunParameters,
        table: &TableName,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let stem = self.temp_dir.join(uuid::Uuid::new_v4().simple().to_string());
        let output_file = stem.with_extension("sql");

        let child = Command::new(&self.executable)
            .args(Self::arguments(params, table, &stem))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ReconcileError::diff_tool(
                    table.quoted(),
                    format!("failed to start {}: {}", self.executable.display(), e),
                )
            })?;

        // Both pipes drain while waiting. Dropping the future on timeout or
        // cancellation drops the child, which kills the process.
        let output = tokio::select! {
            output = tokio::time::timeout(self.timeout, child.wait_with_output()) => match output {
                Ok(output) => output?,
                Err(_) => {
                    remove_if_exists(&output_file).await;
                    return Err(ReconcileError::DiffTimeout {
                        table: table.quoted(),
                        seconds: self.timeout.as_secs(),
                    });
                }
            },
            _ = cancel.cancelled() => {
                remove_if_exists(&output_file).await;
                return Err(ReconcileError::Cancelled);
            }
        };

        let fragment = match tokio::fs::read_to_string(&output_file).await {
            Ok(contents) => {
                tokio::fs::remove_file(&output_file).await?;
                contents
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };

        match output.status.code() {
            Some(code) if SUCCESS_EXIT_CODES.contains(&code) => {
                debug!(
                    "{}: tablediff exited with {} ({} bytes of script)",
                    table,
                    code,
                    fragment.len()
                );
                Ok(fragment)
            }
            code => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                Err(ReconcileError::diff_tool(
                    table.quoted(),
                    format!(
                        "exit code {}: {}",
                        code,
                        failure_detail(&output.stdout, &output.stderr)
                    ),
                ))
            }
        }
    }
}

/// tablediff reports most errors on stdout; keep the tail of both streams.
fn failure_detail(stdout: &[u8], stderr: &[u8]) -> String {
    let parts: Vec<String> = [stderr, stdout]
        .iter()
        .map(|bytes| String::from_utf8_lossy(bytes).trim().to_string())
        .filter(|text| !text.is_empty())
        .map(|text| tail(&text, MAX_DETAIL_CHARS))
        .collect();
    parts.join(" | ")
}

fn tail(text: &str, max_chars: usize) -> String {
    let count = text.chars().count();
    if count <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().skip(count - max_chars).collect();
    format!("...{}", kept)
}

async fn remove_if_exists(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}
