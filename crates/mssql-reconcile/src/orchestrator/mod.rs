//! Reconciliation orchestrator - main workflow coordinator.
//!
//! Phases:
//!
//! 1. enumerate base tables minus the denylist
//! 2. diff every table with tablediff in parallel, aggregating fix scripts
//! 3. scan the aggregate script for skipped-column diagnostics
//! 4. classify the skipped columns against catalog metadata
//! 5. resolve and export differing values for those columns
//!
//! Phase 2 is the only concurrent one; everything after it waits for every
//! diff task to finish.

use crate::classifier::classify_from;
use crate::config::{Config, RunParameters};
use crate::error::{ReconcileError, Result};
use crate::resolver::{resolve_and_export, SqlDivergenceSource};
use crate::scanner::scan;
use crate::script::ScriptAccumulator;
use crate::source::{enumerate_tables, MssqlPool, TableName};
use crate::tablediff::{locate_tablediff, DiffTool};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Connections in the source pool. Queries after the diff phase are sequential.
const SOURCE_POOL_SIZE: u32 = 2;

/// Reconciliation orchestrator.
pub struct Reconciler {
    config: Config,
    source: Arc<MssqlPool>,
    tool: Arc<DiffTool>,
}

/// Result of a reconciliation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Tables diffed.
    pub tables_total: usize,

    /// Tables whose diff produced a non-empty fix script.
    pub tables_with_changes: usize,

    /// Tables with columns reconciled outside tablediff.
    pub unsupported_tables: usize,

    /// Value files written.
    pub exported_files: usize,

    /// Size of the aggregate change script.
    pub script_bytes: usize,

    /// The aggregate change script, persisted by the caller.
    #[serde(skip)]
    pub script: String,
}

/// Output of the parallel diff phase.
#[derive(Debug, Clone, Default)]
pub struct DiffPhaseOutput {
    /// Aggregate change script.
    pub script: String,

    /// Tables that produced a non-empty fragment.
    pub tables_with_changes: usize,
}

impl Reconciler {
    /// Locate tablediff and connect to the source database.
    pub async fn new(config: Config) -> Result<Self> {
        let executable = locate_tablediff(config.diff.tablediff_path.as_deref())?;
        let tool = DiffTool::new(executable, Duration::from_secs(config.diff.timeout_seconds));

        let source = MssqlPool::connect(
            &config.params,
            &config.params.source_database,
            SOURCE_POOL_SIZE,
        )
        .await?;

        Ok(Self {
            config,
            source: Arc::new(source),
            tool: Arc::new(tool),
        })
    }

    /// Run every phase. Nothing is returned unless all phases succeed.
    pub async fn run(self, cancel: CancellationToken) -> Result<ReconcileResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        let params = &self.config.params;

        info!(
            "Starting reconciliation run {}: [{}] -> [{}] on {}",
            run_id, params.source_database, params.destination_database, params.server
        );

        info!("Phase 1: Enumerating tables");
        let tables = enumerate_tables(self.source.as_ref(), &self.config.diff.excluded_tables).await?;

        info!("Phase 2: Diffing {} table(s)", tables.len());
        let diff = diff_tables(
            self.tool.clone(),
            Arc::new(params.clone()),
            &tables,
            self.config.diff.get_workers(),
            &cancel,
        )
        .await?;

        info!("Phase 3: Scanning change script for skipped columns");
        let entries = scan(&diff.script);

        info!("Phase 4: Classifying {} table(s) with skipped columns", entries.len());
        let reconcile_tables = classify_from(self.source.as_ref(), &entries).await?;

        info!("Phase 5: Resolving divergent values");
        let divergence = SqlDivergenceSource::new(
            self.source.clone(),
            &params.source_database,
            &params.destination_database,
        );
        let exported = resolve_and_export(
            &divergence,
            &reconcile_tables,
            &self.config.export.export_dir,
            &cancel,
        )
        .await?;

        let completed_at = Utc::now();
        let duration = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;

        let result = ReconcileResult {
            run_id,
            started_at,
            completed_at,
            duration_seconds: duration,
            tables_total: tables.len(),
            tables_with_changes: diff.tables_with_changes,
            unsupported_tables: reconcile_tables.len(),
            exported_files: exported.len(),
            script_bytes: diff.script.len(),
            script: diff.script,
        };

        info!(
            "Reconciliation completed: {} tables ({} with changes), {} exported value(s) in {:.1}s",
            result.tables_total,
            result.tables_with_changes,
            result.exported_files,
            result.duration_seconds
        );

        Ok(result)
    }
}

/// Diff `tables` with at most `workers` concurrent tablediff processes.
///
/// Every task is awaited before returning. Failed tables are collected and
/// reported together; the partial script is discarded.
pub async fn diff_tables(
    tool: Arc<DiffTool>,
    params: Arc<RunParameters>,
    tables: &[TableName],
    workers: usize,
    cancel: &CancellationToken,
) -> Result<DiffPhaseOutput> {
    let accumulator = Arc::new(ScriptAccumulator::new(tables.len()));
    let semaphore = Arc::new(Semaphore::new(workers.max(1)));
    let changed = Arc::new(AtomicUsize::new(0));

    info!("Diffing {} tables with {} workers", tables.len(), workers.max(1));

    let mut handles = Vec::with_capacity(tables.len());

    for table in tables {
        if cancel.is_cancelled() {
            info!("Cancellation requested, stopping new diffs");
            break;
        }

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ReconcileError::diff_tool(table.quoted(), e.to_string()))?;

        let tool = tool.clone();
        let params = params.clone();
        let table = table.clone();
        let accumulator = accumulator.clone();
        let changed = changed.clone();
        let cancel = cancel.clone();
        let name = table.quoted();

        let handle = tokio::spawn(async move {
            let result = tool.diff_table(&params, &table, &cancel).await;
            if let Ok(fragment) = &result {
                if !fragment.trim().is_empty() {
                    changed.fetch_add(1, Ordering::SeqCst);
                }
                accumulator.append(fragment);
                accumulator.increment_and_report();
            }
            drop(permit);
            result.map(|_| ())
        });

        handles.push((name, handle));
    }

    let mut failed = Vec::new();
    let mut cancelled = cancel.is_cancelled();

    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(ReconcileError::Cancelled)) => cancelled = true,
            Ok(Err(e)) => {
                error!("{}: failed - {}", name, e);
                failed.push(name);
            }
            Err(e) => {
                error!("{}: task panicked - {}", name, e);
                failed.push(name);
            }
        }
    }

    if cancelled {
        return Err(ReconcileError::Cancelled);
    }
    if !failed.is_empty() {
        return Err(ReconcileError::DiffFailed { tables: failed });
    }

    let script = match Arc::try_unwrap(accumulator) {
        Ok(accumulator) => accumulator.into_script(),
        Err(shared) => shared.snapshot(),
    };

    Ok(DiffPhaseOutput {
        script,
        tables_with_changes: changed.load(Ordering::SeqCst),
    })
}

impl ReconcileResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
