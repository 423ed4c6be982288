//! Catalog metadata types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName {
    /// Schema name.
    pub schema: String,

    /// Table name.
    pub name: String,
}

impl TableName {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Bracket-quoted form, as tablediff prints it: `[dbo].[Orders]`.
    pub fn quoted(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    /// Three-part name in another database on the same server.
    pub fn in_database(&self, database: &str) -> String {
        format!("{}.{}", quote_ident(database), self.quoted())
    }

    /// Case-insensitive match against a bracket-quoted name.
    pub fn matches_quoted(&self, quoted: &str) -> bool {
        self.quoted().eq_ignore_ascii_case(quoted.trim())
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.quoted())
    }
}

/// One column the row-diff tool cannot compare, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    /// Owning table.
    pub table: TableName,

    /// Column name.
    pub column_name: String,

    /// Declared base type (e.g. "nvarchar", "xml", "timestamp").
    pub declared_type: String,

    /// First primary-key column of the owning table, by key ordinal.
    pub primary_key_column: Option<String>,

    /// Declared type of that key column.
    pub primary_key_type: Option<String>,
}

/// Quote an identifier with square brackets, doubling any closing bracket.
pub fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}
