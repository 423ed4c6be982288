//! Data kinds for columns tablediff cannot compare, and what we can do with each.

use crate::error::{ReconcileError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed classification of declared types handled outside tablediff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataKind {
    Image,
    Text,
    NText,
    VarChar,
    NVarChar,
    VarBinary,
    Xml,
    Timestamp,
}

/// How differing rows are detected for a kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Cast both sides to `VARBINARY(MAX)`; a NULL on one side only also differs.
    BinaryCast,
}

/// How a differing value is written to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportEncoding {
    /// Value fetched as `NVARCHAR(MAX)` and written as UTF-8 text.
    PlainText,
}

/// Dispatch entry for one kind. `None` means deliberately not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindHandler {
    pub comparison: Option<Comparison>,
    pub encoding: Option<ExportEncoding>,
}

impl DataKind {
    pub const ALL: [DataKind; 8] = [
        DataKind::Image,
        DataKind::Text,
        DataKind::NText,
        DataKind::VarChar,
        DataKind::NVarChar,
        DataKind::VarBinary,
        DataKind::Xml,
        DataKind::Timestamp,
    ];

    /// Map a catalog type name to a kind. Returns `None` for types outside the
    /// unsupported predicate.
    pub fn from_declared_type(declared_type: &str) -> Option<DataKind> {
        match declared_type.trim().to_ascii_lowercase().as_str() {
            "image" => Some(DataKind::Image),
            "text" => Some(DataKind::Text),
            "ntext" => Some(DataKind::NText),
            "varchar" => Some(DataKind::VarChar),
            "nvarchar" => Some(DataKind::NVarChar),
            "varbinary" => Some(DataKind::VarBinary),
            "xml" => Some(DataKind::Xml),
            "timestamp" | "rowversion" => Some(DataKind::Timestamp),
            _ => None,
        }
    }

    /// Dispatch table. Every kind must appear here.
    pub fn handler(self) -> KindHandler {
        use Comparison::BinaryCast;
        use ExportEncoding::PlainText;

        let (comparison, encoding) = match self {
            DataKind::Text => (Some(BinaryCast), Some(PlainText)),
            DataKind::NText => (Some(BinaryCast), Some(PlainText)),
            DataKind::VarChar => (Some(BinaryCast), Some(PlainText)),
            DataKind::NVarChar => (Some(BinaryCast), Some(PlainText)),
            DataKind::Xml => (Some(BinaryCast), Some(PlainText)),
            DataKind::Image => (Some(BinaryCast), None),
            DataKind::VarBinary => (Some(BinaryCast), None),
            // Row versions are database-local and always differ.
            DataKind::Timestamp => (None, None),
        };

        KindHandler {
            comparison,
            encoding,
        }
    }

    /// Comparison strategy, or a fatal error if the kind has none.
    pub fn comparison(self) -> Result<Comparison> {
        self.handler()
            .comparison
            .ok_or_else(|| ReconcileError::kind_not_implemented(self, "comparison"))
    }

    /// Export encoding, or a fatal error if the kind has none.
    pub fn encoding(self) -> Result<ExportEncoding> {
        self.handler()
            .encoding
            .ok_or_else(|| ReconcileError::kind_not_implemented(self, "export"))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Image => "Image",
            DataKind::Text => "Text",
            DataKind::NText => "NText",
            DataKind::VarChar => "VarChar",
            DataKind::NVarChar => "NVarChar",
            DataKind::VarBinary => "VarBinary",
            DataKind::Xml => "Xml",
            DataKind::Timestamp => "Timestamp",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_types() {
        assert_eq!(DataKind::from_declared_type("xml"), Some(DataKind::Xml));
        assert_eq!(DataKind::from_declared_type("NVARCHAR"), Some(DataKind::NVarChar));
        assert_eq!(DataKind::from_declared_type("rowversion"), Some(DataKind::Timestamp));
        assert_eq!(DataKind::from_declared_type("int"), None);
        assert_eq!(DataKind::from_declared_type("geography"), None);
    }

    #[test]
    fn test_every_kind_round_trips_through_its_name() {
        for kind in DataKind::ALL {
            assert_eq!(DataKind::from_declared_type(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn test_character_kinds_are_exportable() {
        for kind in [
            DataKind::Text,
            DataKind::NText,
            DataKind::VarChar,
            DataKind::NVarChar,
            DataKind::Xml,
        ] {
            assert_eq!(kind.comparison().unwrap(), Comparison::BinaryCast);
            assert_eq!(kind.encoding().unwrap(), ExportEncoding::PlainText);
        }
    }

    #[test]
    fn test_binary_kinds_compare_but_do_not_export() {
        for kind in [DataKind::Image, DataKind::VarBinary] {
            assert!(kind.comparison().is_ok());
            let err = kind.encoding().unwrap_err();
            assert!(err.to_string().contains("not implemented for export"));
        }
    }

    #[test]
    fn test_timestamp_not_implemented() {
        let err = DataKind::Timestamp.comparison().unwrap_err();
        assert!(matches!(err, ReconcileError::KindNotImplemented { .. }));
        assert!(err.to_string().contains("Timestamp"));
    }
}
