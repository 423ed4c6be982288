//! Configuration type definitions with auto-tuning based on system resources.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use sysinfo::System;
use tracing::info;

/// Tables skipped by default: operational logs and history with no business data.
pub const DEFAULT_EXCLUDED_TABLES: &[&str] = &["CheckDBLog", "EventLog", "ChangeHistory"];

/// System resource information for auto-tuning.
#[derive(Debug, Clone)]
pub struct SystemResources {
    /// Number of CPU cores.
    pub cpu_cores: usize,
}

impl SystemResources {
    /// Detect system resources.
    pub fn detect() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu();

        Self {
            cpu_cores: sys.cpus().len().max(1),
        }
    }
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server and databases to reconcile.
    #[serde(default)]
    pub params: RunParameters,

    /// tablediff invocation settings.
    #[serde(default)]
    pub diff: DiffSettings,

    /// Output locations.
    #[serde(default)]
    pub export: ExportSettings,
}

impl Config {
    /// Apply auto-tuned defaults based on system resources.
    /// Only fills in values that weren't explicitly set in the config file.
    pub fn with_auto_tuning(mut self) -> Self {
        let resources = SystemResources::detect();
        self.diff = self.diff.with_auto_tuning(&resources);
        self
    }
}

/// Server and database pair being reconciled.
///
/// Source and destination live on the same server: the divergence resolver
/// joins them with three-part names.
#[derive(Clone, Serialize, Deserialize)]
pub struct RunParameters {
    /// SQL Server host, optionally `host,port`.
    #[serde(default)]
    pub server: String,

    /// TCP port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database whose data is authoritative.
    #[serde(default)]
    pub source_database: String,

    /// Database that the change script will be applied to.
    #[serde(default)]
    pub destination_database: String,

    /// Authentication mode (default: integrated).
    #[serde(default)]
    pub auth: AuthConfig,

    /// Trust server certificate (default: true).
    #[serde(default = "default_true")]
    pub trust_server_cert: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: default_mssql_port(),
            source_database: String::new(),
            destination_database: String::new(),
            auth: AuthConfig::default(),
            trust_server_cert: default_true(),
        }
    }
}

impl fmt::Debug for RunParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunParameters")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("source_database", &self.source_database)
            .field("destination_database", &self.destination_database)
            .field("auth", &self.auth)
            .field("trust_server_cert", &self.trust_server_cert)
            .finish()
    }
}

/// How to authenticate against SQL Server.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Windows integrated (trusted) authentication.
    #[default]
    Integrated,

    /// SQL Server login.
    SqlServer { user: String, password: String },
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthConfig::Integrated => f.write_str("Integrated"),
            AuthConfig::SqlServer { user, .. } => f
                .debug_struct("SqlServer")
                .field("user", user)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// tablediff invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffSettings {
    /// Explicit path to tablediff.exe. Discovered from known install roots if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tablediff_path: Option<PathBuf>,

    /// Concurrent tablediff processes. Auto-tuned based on CPU cores if not set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Per-table time limit in seconds (default: 3600).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Bare table names never diffed. Replaces the built-in list when set.
    #[serde(default = "default_excluded_tables")]
    pub excluded_tables: Vec<String>,
}

impl Default for DiffSettings {
    fn default() -> Self {
        Self {
            tablediff_path: None,
            workers: None,
            timeout_seconds: default_timeout_seconds(),
            excluded_tables: default_excluded_tables(),
        }
    }
}

impl DiffSettings {
    /// Fill in worker count from CPU cores when not explicitly set.
    pub fn with_auto_tuning(mut self, resources: &SystemResources) -> Self {
        // Each tablediff holds two connections; cap to keep the server usable.
        if self.workers.is_none() {
            self.workers = Some(resources.cpu_cores.clamp(1, 16));
        }

        info!(
            "Auto-tuned config: workers={}, timeout={}s",
            self.get_workers(),
            self.timeout_seconds
        );

        self
    }

    pub fn get_workers(&self) -> usize {
        self.workers.unwrap_or(4)
    }
}

/// Where the run's artifacts are written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportSettings {
    /// Aggregated change script (default: changeScript.sql).
    #[serde(default = "default_script_path")]
    pub script_path: PathBuf,

    /// Root directory for per-row exports of unsupported columns (default: ".").
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            script_path: default_script_path(),
            export_dir: default_export_dir(),
        }
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_true() -> bool {
    true
}

fn default_timeout_seconds() -> u64 {
    3600
}

fn default_excluded_tables() -> Vec<String> {
    DEFAULT_EXCLUDED_TABLES.iter().map(|s| s.to_string()).collect()
}

fn default_script_path() -> PathBuf {
    PathBuf::from("changeScript.sql")
}

fn default_export_dir() -> PathBuf {
    PathBuf::from(".")
}
