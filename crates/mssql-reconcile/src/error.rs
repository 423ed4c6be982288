//! Error types for the reconciliation library.

use thiserror::Error;

/// Main error type for reconciliation operations.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Configuration error (bad arguments, invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The tablediff utility could not be found in any known location
    #[error("tablediff utility not found (searched: {searched})")]
    ToolNotFound { searched: String },

    /// Source database connection or query error
    #[error("Database error: {0}")]
    Source(#[from] tiberius::error::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// A single tablediff invocation failed
    #[error("tablediff failed for table {table}: {message}")]
    DiffTool { table: String, message: String },

    /// A single tablediff invocation exceeded its time limit
    #[error("tablediff timed out for table {table} after {seconds}s")]
    DiffTimeout { table: String, seconds: u64 },

    /// One or more tables failed during the parallel diff phase
    #[error("Diff phase failed for {} table(s): {}", tables.len(), tables.join(", "))]
    DiffFailed { tables: Vec<String> },

    /// Catalog reported a declared type the classifier does not model
    #[error("Unknown declared type '{declared_type}' for column {table}.{column}")]
    UnknownDeclaredType {
        table: String,
        column: String,
        declared_type: String,
    },

    /// A data kind has no implementation for the requested operation
    #[error("Data kind {kind} is not implemented for {operation}")]
    KindNotImplemented { kind: String, operation: String },

    /// Export of a differing value failed
    #[error("Export failed for {path}: {message}")]
    Export { path: String, message: String },

    /// IO error (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl Into<String>, context: impl Into<String>) -> Self {
        ReconcileError::Pool {
            message: message.into(),
            context: context.into(),
        }
    }

    /// Create a DiffTool error
    pub fn diff_tool(table: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::DiffTool {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a KindNotImplemented error
    pub fn kind_not_implemented(kind: impl ToString, operation: impl Into<String>) -> Self {
        ReconcileError::KindNotImplemented {
            kind: kind.to_string(),
            operation: operation.into(),
        }
    }

    /// Process exit code for this error.
    ///
    /// Configuration problems exit with 2, a missing diff tool with 3,
    /// cancellation with 130 and everything else with 1.
    pub fn exit_code(&self) -> u8 {
        match self {
            ReconcileError::Config(_) | ReconcileError::Yaml(_) => 2,
            ReconcileError::ToolNotFound { .. } => 3,
            ReconcileError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, ReconcileError>;
