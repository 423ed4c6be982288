//! # mssql-reconcile
//!
//! Data reconciliation between two SQL Server databases on the same server.
//!
//! This library drives the `tablediff` utility across every table and adds
//! what tablediff leaves out:
//!
//! - **Parallel diffing** with a bounded worker pool, one process per table
//! - **Script aggregation** into a single change script with `GO` batches
//! - **Skipped-column discovery** by parsing tablediff's own diagnostics
//! - **Divergence export** of the source values tablediff could not compare
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_reconcile::{Config, Reconciler};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mssql_reconcile::Result<()> {
//!     let config = Config::load("reconcile.yaml")?.with_auto_tuning();
//!     config.validate()?;
//!     let script_path = config.export.script_path.clone();
//!
//!     let reconciler = Reconciler::new(config).await?;
//!     let result = reconciler.run(CancellationToken::new()).await?;
//!     std::fs::write(script_path, &result.script)?;
//!     println!("{} value file(s) exported", result.exported_files);
//!     Ok(())
//! }
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod resolver;
pub mod scanner;
pub mod script;
pub mod source;
pub mod tablediff;

// Re-exports for convenient access
pub use classifier::{DataKind, ReconciliationColumn, ReconciliationTable};
pub use config::{AuthConfig, Config, DiffSettings, ExportSettings, RunParameters};
pub use error::{ReconcileError, Result};
pub use orchestrator::{ReconcileResult, Reconciler};
pub use scanner::UnsupportedEntry;
pub use script::ScriptAccumulator;
pub use source::{MssqlPool, TableName};
pub use tablediff::DiffTool;
