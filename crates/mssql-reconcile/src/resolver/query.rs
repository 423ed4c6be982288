//! SQL generation for divergence detection and value fetch.
//!
//! Both databases live on the same server, so queries address tables with
//! three-part names and run on a single connection to the source.

use crate::classifier::Comparison;
use crate::source::{quote_ident, TableName};

/// Width keys are converted to before crossing the wire.
pub const KEY_TEXT_WIDTH: u32 = 450;

/// Text form of a primary-key expression that keeps distinct keys distinct.
///
/// Default conversions of `datetime`, `float` and `money` round, and binary
/// keys would be read as characters, so those get an explicit style.
pub fn key_text(expr: &str, declared_type: &str) -> String {
    let style = match declared_type.to_ascii_lowercase().as_str() {
        "datetime" | "smalldatetime" => Some(126),
        "float" | "real" => Some(3),
        "money" | "smallmoney" => Some(2),
        "binary" | "varbinary" => Some(1),
        _ => None,
    };

    match style {
        Some(style) => format!("CONVERT(NVARCHAR({}), {}, {})", KEY_TEXT_WIDTH, expr, style),
        None => format!("CAST({} AS NVARCHAR({}))", expr, KEY_TEXT_WIDTH),
    }
}

/// Keys of source rows whose `column` differs from the destination.
///
/// A source row with no destination row counts as differing when its value
/// is non-NULL: tablediff inserts the row without this column. Rows only in
/// the destination are deleted by the script and are not reported.
pub fn differing_keys_query(
    comparison: Comparison,
    source_database: &str,
    destination_database: &str,
    table: &TableName,
    primary_key_column: &str,
    primary_key_type: &str,
    column: &str,
) -> String {
    let pk = quote_ident(primary_key_column);
    let col = quote_ident(column);

    let predicate = match comparison {
        Comparison::BinaryCast => format!(
            "(CAST(s.{col} AS VARBINARY(MAX)) <> CAST(d.{col} AS VARBINARY(MAX))
    OR (s.{col} IS NULL AND d.{col} IS NOT NULL)
    OR (s.{col} IS NOT NULL AND d.{col} IS NULL))"
        ),
    };

    format!(
        r#"SELECT {key} AS key_value
FROM {source} s
LEFT JOIN {destination} d ON d.{pk} = s.{pk}
WHERE {predicate}
ORDER BY s.{pk}"#,
        key = key_text(&format!("s.{pk}"), primary_key_type),
        source = table.in_database(source_database),
        destination = table.in_database(destination_database),
    )
}

/// Source value of `column` for the row whose key text equals `@P1`.
pub fn source_value_query(
    source_database: &str,
    table: &TableName,
    primary_key_column: &str,
    primary_key_type: &str,
    column: &str,
) -> String {
    let pk = quote_ident(primary_key_column);
    format!(
        r#"SELECT CAST(s.{col} AS NVARCHAR(MAX)) AS value
FROM {source} s
WHERE {key} = @P1"#,
        col = quote_ident(column),
        key = key_text(&format!("s.{pk}"), primary_key_type),
        source = table.in_database(source_database),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_differing_keys_query() {
        let table = TableName::new("dbo", "Orders");
        let sql = differing_keys_query(
            Comparison::BinaryCast,
            "Prod",
            "Staging",
            &table,
            "OrderId",
            "int",
            "Notes",
        );

        assert!(sql.starts_with("SELECT CAST(s.[OrderId] AS NVARCHAR(450)) AS key_value"));
        assert!(sql.contains("FROM [Prod].[dbo].[Orders] s"));
        assert!(sql.contains("CAST(s.[Notes] AS VARBINARY(MAX)) <> CAST(d.[Notes] AS VARBINARY(MAX))"));
        assert!(sql.contains("(s.[Notes] IS NULL AND d.[Notes] IS NOT NULL)"));
        assert!(sql.contains("(s.[Notes] IS NOT NULL AND d.[Notes] IS NULL)"));
        assert!(sql.ends_with("ORDER BY s.[OrderId]"));
    }

    #[test]
    fn test_source_only_rows_are_included() {
        let table = TableName::new("dbo", "Docs");
        let sql = differing_keys_query(
            Comparison::BinaryCast,
            "Prod",
            "Staging",
            &table,
            "Id",
            "int",
            "Spec",
        );

        assert!(sql.contains("LEFT JOIN [Staging].[dbo].[Docs] d ON d.[Id] = s.[Id]"));
        assert!(!sql.contains("INNER JOIN"));
        // A missing destination row leaves d.[Spec] NULL, which this branch matches.
        assert!(sql.contains("(s.[Spec] IS NOT NULL AND d.[Spec] IS NULL)"));
    }

    #[test]
    fn test_source_value_query() {
        let table = TableName::new("sales", "Docs");
        let sql = source_value_query("Prod", &table, "Id", "bigint", "Body");

        assert!(sql.starts_with("SELECT CAST(s.[Body] AS NVARCHAR(MAX)) AS value"));
        assert!(sql.contains("FROM [Prod].[sales].[Docs] s"));
        assert!(sql.contains("WHERE CAST(s.[Id] AS NVARCHAR(450)) = @P1"));
    }

    #[test]
    fn test_key_text_uses_lossless_styles() {
        assert_eq!(key_text("s.[At]", "datetime"), "CONVERT(NVARCHAR(450), s.[At], 126)");
        assert_eq!(key_text("s.[At]", "SmallDateTime"), "CONVERT(NVARCHAR(450), s.[At], 126)");
        assert_eq!(key_text("s.[X]", "float"), "CONVERT(NVARCHAR(450), s.[X], 3)");
        assert_eq!(key_text("s.[X]", "real"), "CONVERT(NVARCHAR(450), s.[X], 3)");
        assert_eq!(key_text("s.[M]", "money"), "CONVERT(NVARCHAR(450), s.[M], 2)");
        assert_eq!(key_text("s.[B]", "varbinary"), "CONVERT(NVARCHAR(450), s.[B], 1)");
        assert_eq!(key_text("s.[Id]", "int"), "CAST(s.[Id] AS NVARCHAR(450))");
        assert_eq!(key_text("s.[G]", "uniqueidentifier"), "CAST(s.[G] AS NVARCHAR(450))");
    }

    #[test]
    fn test_datetime_key_round_trips_through_both_queries() {
        let table = TableName::new("dbo", "Readings");
        let keys = differing_keys_query(
            Comparison::BinaryCast,
            "Prod",
            "Staging",
            &table,
            "TakenAt",
            "datetime",
            "Payload",
        );
        let value = source_value_query("Prod", &table, "TakenAt", "datetime", "Payload");

        let expr = "CONVERT(NVARCHAR(450), s.[TakenAt], 126)";
        assert!(keys.starts_with(&format!("SELECT {expr} AS key_value")));
        assert!(value.contains(&format!("WHERE {expr} = @P1")));
        assert!(!value.contains("CAST(s.[TakenAt]"));
    }

    #[test]
    fn test_identifiers_are_escaped() {
        let table = TableName::new("dbo", "Odd]Table");
        let sql = source_value_query("Prod", &table, "Key]", "int", "Col]");

        assert!(sql.contains("[Odd]]Table]"));
        assert!(sql.contains("s.[Key]]]"));
        assert!(sql.contains("s.[Col]]]"));
    }
}
