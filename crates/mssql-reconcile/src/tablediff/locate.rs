//! Discovery of the tablediff executable.

use crate::error::{ReconcileError, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// SQL Server installation roots probed for `tablediff.exe`.
pub const DEFAULT_INSTALL_ROOTS: &[&str] = &[
    r"C:\Program Files\Microsoft SQL Server",
    r"C:\Program Files (x86)\Microsoft SQL Server",
];

/// Version folders, newest first.
pub const KNOWN_VERSIONS: &[&str] = &["160", "150", "140", "130", "120", "110", "100", "90", "80"];

/// Resolve the tablediff executable: an explicit path wins, otherwise the
/// newest install under the default roots.
pub fn locate_tablediff(explicit: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        return Err(ReconcileError::ToolNotFound {
            searched: path.display().to_string(),
        });
    }

    let roots: Vec<PathBuf> = DEFAULT_INSTALL_ROOTS.iter().map(PathBuf::from).collect();
    locate_in(&roots, KNOWN_VERSIONS)
}

/// Return the first `<root>/<version>/COM/tablediff.exe` that exists,
/// trying every version under a root before moving to the next root.
pub fn locate_in(roots: &[PathBuf], versions: &[&str]) -> Result<PathBuf> {
    let candidates: Vec<PathBuf> = roots
        .iter()
        .flat_map(|root| {
            versions
                .iter()
                .map(move |v| root.join(v).join("COM").join("tablediff.exe"))
        })
        .collect();

    match candidates.iter().find(|p| p.is_file()) {
        Some(found) => {
            info!("Using tablediff at {}", found.display());
            Ok(found.clone())
        }
        None => Err(ReconcileError::ToolNotFound {
            searched: roots
                .iter()
                .map(|r| r.display().to_string())
                .collect::<Vec<_>>()
                .join("; "),
        }),
    }
}
