//! Divergence resolver and exporter.
//!
//! For every classified column, finds the primary keys whose value differs
//! between source and destination and writes the source value of each to its
//! own file for review. Runs in three passes so that an unsupported kind
//! aborts before anything is written:
//!
//! 1. check every column has a comparison
//! 2. query differing keys, then check every column with differences can export
//! 3. fetch and write each value

mod export;
mod query;

pub use export::{export_path, key_file_stem, sanitize_segment, write_text};
pub use query::{differing_keys_query, key_text, source_value_query, KEY_TEXT_WIDTH};

use crate::classifier::{Comparison, DataKind, ExportEncoding, ReconciliationTable};
use crate::error::{ReconcileError, Result};
use crate::source::MssqlPool;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Row-level reads the resolver needs. Keys travel as text.
#[async_trait]
pub trait DivergenceSource: Send + Sync {
    /// Keys of source rows whose `column` differs from the destination,
    /// including rows the destination lacks.
    async fn differing_keys(
        &self,
        comparison: Comparison,
        table: &ReconciliationTable,
        column: &str,
    ) -> Result<Vec<String>>;

    /// Source value of `column` for one key. `None` for NULL or a vanished row.
    async fn source_value(
        &self,
        table: &ReconciliationTable,
        column: &str,
        key: &str,
    ) -> Result<Option<String>>;
}

/// [`DivergenceSource`] over a source pool, reaching the destination by
/// three-part names on the same server.
pub struct SqlDivergenceSource {
    pool: Arc<MssqlPool>,
    source_database: String,
    destination_database: String,
}

impl SqlDivergenceSource {
    pub fn new(
        pool: Arc<MssqlPool>,
        source_database: impl Into<String>,
        destination_database: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            source_database: source_database.into(),
            destination_database: destination_database.into(),
        }
    }
}

#[async_trait]
impl DivergenceSource for SqlDivergenceSource {
    async fn differing_keys(
        &self,
        comparison: Comparison,
        table: &ReconciliationTable,
        column: &str,
    ) -> Result<Vec<String>> {
        let sql = differing_keys_query(
            comparison,
            &self.source_database,
            &self.destination_database,
            &table.name,
            &table.primary_key_column,
            &table.primary_key_type,
            column,
        );
        debug!("{}.{}: differing keys query:\n{}", table.name, column, sql);

        let rows = self.pool.query_text(&sql, &[]).await?;
        Ok(rows.into_iter().flatten().collect())
    }

    async fn source_value(
        &self,
        table: &ReconciliationTable,
        column: &str,
        key: &str,
    ) -> Result<Option<String>> {
        let sql = source_value_query(
            &self.source_database,
            &table.name,
            &table.primary_key_column,
            &table.primary_key_type,
            column,
        );
        let rows = self.pool.query_text(&sql, &[key]).await?;
        Ok(rows.into_iter().next().flatten())
    }
}

/// One column with differences, ready to export.
struct Divergence<'a> {
    table: &'a ReconciliationTable,
    column: &'a str,
    kind: DataKind,
    keys: Vec<String>,
}

/// Resolve every classified column and export the differing source values.
///
/// Returns the written file paths in export order.
pub async fn resolve_and_export(
    source: &dyn DivergenceSource,
    tables: &[ReconciliationTable],
    export_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let mut planned = Vec::new();
    for table in tables {
        for column in &table.columns {
            planned.push((table, column, column.data_kind.comparison()?));
        }
    }

    let mut divergences = Vec::new();
    for (table, column, comparison) in planned {
        if cancel.is_cancelled() {
            return Err(ReconcileError::Cancelled);
        }

        let keys = source
            .differing_keys(comparison, table, &column.name)
            .await?;

        if keys.is_empty() {
            debug!("{}.{}: no differences", table.name, column.name);
            continue;
        }

        info!(
            "{}.{}: {} differing row(s)",
            table.name,
            column.name,
            keys.len()
        );
        divergences.push(Divergence {
            table,
            column: &column.name,
            kind: column.data_kind,
            keys,
        });
    }

    let encodings = divergences
        .iter()
        .map(|d| d.kind.encoding())
        .collect::<Result<Vec<_>>>()?;

    let mut written = Vec::new();
    let mut seen = HashSet::new();
    for (divergence, encoding) in divergences.iter().zip(encodings) {
        let table = divergence.table;
        for key in &divergence.keys {
            if cancel.is_cancelled() {
                return Err(ReconcileError::Cancelled);
            }

            let value = source
                .source_value(table, divergence.column, key)
                .await?;

            let path = export_path(
                export_dir,
                &table.name,
                &table.primary_key_column,
                divergence.column,
                divergence.kind,
                key,
            );
            if !seen.insert(path.clone()) {
                return Err(ReconcileError::Export {
                    path: path.display().to_string(),
                    message: format!(
                        "key '{}' maps to a file already exported for {}.{}",
                        key, table.name, divergence.column
                    ),
                });
            }

            match encoding {
                ExportEncoding::PlainText => write_text(&path, value.as_deref()).await?,
            }
            debug!("Exported {}", path.display());
            written.push(path);
        }
    }

    info!("Exported {} value file(s)", written.len());
    Ok(written)
}
