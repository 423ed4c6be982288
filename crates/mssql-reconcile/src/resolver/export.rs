//! On-disk layout for exported values.
//!
//! `<root>/<schema.table>_<pk>/<column>_<Kind>/<keyValue>.data`

use crate::classifier::DataKind;
use crate::error::{ReconcileError, Result};
use crate::source::TableName;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

const EXPORT_EXTENSION: &str = "data";

/// Bytes of the key digest appended to a key that sanitizing altered.
const KEY_DIGEST_BYTES: usize = 4;

/// Make one path segment safe for the filesystem.
///
/// Brackets are dropped, characters Windows rejects in file names become `_`,
/// and segments made only of dots are prefixed so they cannot walk the tree.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        format!("_{cleaned}")
    } else {
        cleaned
    }
}

/// File stem for a key. A key that sanitizing changed gets a digest of the raw
/// text appended, so `A/B` and `A_B` land in different files.
pub fn key_file_stem(key: &str) -> String {
    let cleaned = sanitize_segment(key);
    if cleaned == key {
        return cleaned;
    }
    let digest = Sha256::digest(key.as_bytes());
    format!("{}_{}", cleaned, hex::encode(&digest[..KEY_DIGEST_BYTES]))
}

/// Path of the export file for one differing (row, column) pair.
pub fn export_path(
    root: &Path,
    table: &TableName,
    primary_key_column: &str,
    column: &str,
    kind: DataKind,
    key: &str,
) -> PathBuf {
    let table_dir = format!(
        "{}_{}",
        sanitize_segment(&format!("{}.{}", table.schema, table.name)),
        sanitize_segment(primary_key_column)
    );
    let column_dir = format!("{}_{}", sanitize_segment(column), kind);
    let file = format!("{}.{}", key_file_stem(key), EXPORT_EXTENSION);

    root.join(table_dir).join(column_dir).join(file)
}

/// Write a value as UTF-8 text, creating parent directories. NULL writes an empty file.
pub async fn write_text(path: &Path, value: Option<&str>) -> Result<()> {
    let export_err = |e: std::io::Error| ReconcileError::Export {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(export_err)?;
    }
    tokio::fs::write(path, value.unwrap_or_default().as_bytes())
        .await
        .map_err(export_err)
}
