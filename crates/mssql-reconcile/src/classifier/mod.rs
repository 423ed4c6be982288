//! Schema classifier: turns scanner output into typed reconciliation work.
//!
//! Each [`UnsupportedEntry`] is matched against catalog metadata for the
//! columns tablediff cannot compare. Table names match case-insensitively,
//! column names exactly. Anything unmatched (a computed column, a table
//! without a primary key, a name the catalog does not know) is dropped.

mod kind;

pub use kind::{Comparison, DataKind, ExportEncoding, KindHandler};

use crate::error::{ReconcileError, Result};
use crate::scanner::UnsupportedEntry;
use crate::source::{CatalogSource, ColumnMetadata, TableName};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// One column to reconcile outside tablediff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationColumn {
    pub name: String,
    pub data_kind: DataKind,
}

/// A table with at least one column to reconcile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationTable {
    pub name: TableName,
    pub primary_key_column: String,
    /// Declared type of the key column; decides how keys are rendered as text.
    pub primary_key_type: String,
    pub columns: Vec<ReconciliationColumn>,
}

/// Catalog row with its declared type already mapped to a kind.
struct TypedColumn<'a> {
    meta: &'a ColumnMetadata,
    kind: DataKind,
}

/// Resolve scanner entries against catalog metadata.
///
/// Fails if any metadata row carries a declared type outside [`DataKind`]:
/// the catalog query and the kind table are out of sync.
pub fn classify(
    entries: &[UnsupportedEntry],
    metadata: &[ColumnMetadata],
) -> Result<Vec<ReconciliationTable>> {
    let typed = metadata
        .iter()
        .map(|meta| match DataKind::from_declared_type(&meta.declared_type) {
            Some(kind) => Ok(TypedColumn { meta, kind }),
            None => Err(ReconcileError::UnknownDeclaredType {
                table: meta.table.quoted(),
                column: meta.column_name.clone(),
                declared_type: meta.declared_type.clone(),
            }),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut tables: Vec<ReconciliationTable> = Vec::new();

    for entry in entries {
        let table_columns: Vec<&TypedColumn> = typed
            .iter()
            .filter(|c| c.meta.table.matches_quoted(&entry.table_name))
            .collect();

        let Some(first) = table_columns.first() else {
            debug!(
                "{}: no unsupported-column metadata, dropping",
                entry.table_name
            );
            continue;
        };

        let Some(primary_key_column) = first.meta.primary_key_column.clone() else {
            warn!(
                "{}: table has no primary key, cannot reconcile columns {:?}",
                entry.table_name, entry.column_names
            );
            continue;
        };

        let mut columns = Vec::new();
        for column_name in &entry.column_names {
            match table_columns
                .iter()
                .find(|c| &c.meta.column_name == column_name)
            {
                Some(c) => columns.push(ReconciliationColumn {
                    name: column_name.clone(),
                    data_kind: c.kind,
                }),
                None => debug!(
                    "{}.{}: not in unsupported-column metadata (computed or unknown), dropping",
                    entry.table_name, column_name
                ),
            }
        }

        if columns.is_empty() {
            debug!("{}: no columns left to reconcile", entry.table_name);
            continue;
        }

        let name = first.meta.table.clone();
        match tables.iter_mut().find(|t| t.name == name) {
            Some(existing) => {
                for column in columns {
                    if !existing.columns.iter().any(|c| c.name == column.name) {
                        existing.columns.push(column);
                    }
                }
            }
            None => tables.push(ReconciliationTable {
                name,
                primary_key_column,
                primary_key_type: first.meta.primary_key_type.clone().unwrap_or_default(),
                columns,
            }),
        }
    }

    info!(
        "Classified {} table(s) with {} column(s) to reconcile",
        tables.len(),
        tables.iter().map(|t| t.columns.len()).sum::<usize>()
    );

    Ok(tables)
}

/// Load unsupported-column metadata from the catalog and classify `entries`.
///
/// Skips the catalog query when there is nothing to classify.
pub async fn classify_from(
    catalog: &dyn CatalogSource,
    entries: &[UnsupportedEntry],
) -> Result<Vec<ReconciliationTable>> {
    if entries.is_empty() {
        debug!("No unsupported-column diagnostics, nothing to classify");
        return Ok(Vec::new());
    }

    let metadata = catalog.load_unsupported_columns().await?;
    classify(entries, &metadata)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(schema: &str, table: &str, column: &str, ty: &str, pk: Option<&str>) -> ColumnMetadata {
        ColumnMetadata {
            table: TableName::new(schema, table),
            column_name: column.to_string(),
            declared_type: ty.to_string(),
            primary_key_column: pk.map(str::to_string),
            primary_key_type: pk.map(|_| "int".to_string()),
        }
    }

    fn entry(table: &str, columns: &[&str]) -> UnsupportedEntry {
        UnsupportedEntry {
            table_name: table.to_string(),
            column_names: columns.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_resolves_columns_with_kinds() {
        let metadata = vec![
            meta("dbo", "Orders", "Notes", "nvarchar", Some("OrderId")),
            meta("dbo", "Orders", "Attachment", "varbinary", Some("OrderId")),
            meta("dbo", "Orders", "Spec", "xml", Some("OrderId")),
        ];

        let tables = classify(&[entry("[dbo].[Orders]", &["Notes", "Spec"])], &metadata).unwrap();

        assert_eq!(
            tables,
            vec![ReconciliationTable {
                name: TableName::new("dbo", "Orders"),
                primary_key_column: "OrderId".into(),
                primary_key_type: "int".into(),
                columns: vec![
                    ReconciliationColumn {
                        name: "Notes".into(),
                        data_kind: DataKind::NVarChar
                    },
                    ReconciliationColumn {
                        name: "Spec".into(),
                        data_kind: DataKind::Xml
                    },
                ],
            }]
        );
    }

    #[test]
    fn test_primary_key_type_carried_from_metadata() {
        let mut column = meta("dbo", "Readings", "Payload", "xml", Some("TakenAt"));
        column.primary_key_type = Some("datetime".into());

        let tables = classify(&[entry("[dbo].[Readings]", &["Payload"])], &[column]).unwrap();
        assert_eq!(tables[0].primary_key_column, "TakenAt");
        assert_eq!(tables[0].primary_key_type, "datetime");
    }

    #[test]
    fn test_table_match_is_case_insensitive_column_match_is_not() {
        let metadata = vec![meta("dbo", "Orders", "Notes", "text", Some("Id"))];

        let tables = classify(&[entry("[DBO].[orders]", &["Notes", "notes"])], &metadata).unwrap();

        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].columns.len(), 1);
        assert_eq!(tables[0].columns[0].name, "Notes");
    }

    #[test]
    fn test_computed_column_excluded_and_empty_table_dropped() {
        // The catalog query filters computed columns, so "Total" never appears.
        let metadata = vec![meta("dbo", "Invoices", "Body", "ntext", Some("Id"))];

        let tables = classify(&[entry("[dbo].[Invoices]", &["Total"])], &metadata).unwrap();
        assert!(tables.is_empty());

        let tables =
            classify(&[entry("[dbo].[Invoices]", &["Total", "Body"])], &metadata).unwrap();
        assert_eq!(tables[0].columns.len(), 1);
        assert_eq!(tables[0].columns[0].name, "Body");
    }

    #[test]
    fn test_unknown_table_dropped() {
        let metadata = vec![meta("dbo", "Orders", "Notes", "text", Some("Id"))];
        let tables = classify(&[entry("[dbo].[Ghost]", &["Notes"])], &metadata).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_table_without_primary_key_dropped() {
        let metadata = vec![meta("dbo", "Heap", "Notes", "text", None)];
        let tables = classify(&[entry("[dbo].[Heap]", &["Notes"])], &metadata).unwrap();
        assert!(tables.is_empty());
    }

    #[test]
    fn test_unknown_declared_type_is_fatal() {
        let metadata = vec![
            meta("dbo", "Orders", "Notes", "text", Some("Id")),
            meta("dbo", "Orders", "Blob", "sql_variant", Some("Id")),
        ];

        let err = classify(&[entry("[dbo].[Orders]", &["Notes"])], &metadata).unwrap_err();
        match err {
            ReconcileError::UnknownDeclaredType {
                table,
                column,
                declared_type,
            } => {
                assert_eq!(table, "[dbo].[Orders]");
                assert_eq!(column, "Blob");
                assert_eq!(declared_type, "sql_variant");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct MetadataCatalog {
        columns: Vec<ColumnMetadata>,
        loads: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl CatalogSource for MetadataCatalog {
        async fn list_base_tables(&self) -> Result<Vec<TableName>> {
            Ok(Vec::new())
        }

        async fn load_unsupported_columns(&self) -> Result<Vec<ColumnMetadata>> {
            self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(self.columns.clone())
        }
    }

    #[tokio::test]
    async fn test_classify_from_catalog() {
        let catalog = MetadataCatalog {
            columns: vec![meta("dbo", "Orders", "Notes", "varchar", Some("Id"))],
            loads: Default::default(),
        };

        let none = classify_from(&catalog, &[]).await.unwrap();
        assert!(none.is_empty());
        assert_eq!(catalog.loads.load(std::sync::atomic::Ordering::SeqCst), 0);

        let tables = classify_from(&catalog, &[entry("[dbo].[Orders]", &["Notes"])])
            .await
            .unwrap();
        assert_eq!(tables[0].columns[0].data_kind, DataKind::VarChar);
        assert_eq!(catalog.loads.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[test]
    fn test_duplicate_entries_merge_into_one_table() {
        let metadata = vec![
            meta("dbo", "Orders", "Notes", "text", Some("Id")),
            meta("dbo", "Orders", "Spec", "xml", Some("Id")),
        ];

        let tables = classify(
            &[
                entry("[dbo].[Orders]", &["Notes"]),
                entry("[dbo].[Orders]", &["Notes", "Spec"]),
            ],
            &metadata,
        )
        .unwrap();

        assert_eq!(tables.len(), 1);
        let names: Vec<&str> = tables[0].columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Notes", "Spec"]);
    }
}
