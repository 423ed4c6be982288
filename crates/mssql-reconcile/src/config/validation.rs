//! Configuration validation.

use super::{AuthConfig, Config};
use crate::error::{ReconcileError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let params = &config.params;

    if params.server.trim().is_empty() {
        return Err(ReconcileError::Config("server is required".into()));
    }
    if params.source_database.trim().is_empty() {
        return Err(ReconcileError::Config("source database is required".into()));
    }
    if params.destination_database.trim().is_empty() {
        return Err(ReconcileError::Config(
            "destination database is required".into(),
        ));
    }
    if params
        .source_database
        .eq_ignore_ascii_case(&params.destination_database)
    {
        return Err(ReconcileError::Config(
            "source and destination cannot be the same database".into(),
        ));
    }
    if let AuthConfig::SqlServer { user, .. } = &params.auth {
        if user.is_empty() {
            return Err(ReconcileError::Config(
                "auth.user is required for sql_server authentication".into(),
            ));
        }
    }

    // Only check if explicitly set
    if let Some(0) = config.diff.workers {
        return Err(ReconcileError::Config(
            "diff.workers must be at least 1".into(),
        ));
    }
    if config.diff.timeout_seconds == 0 {
        return Err(ReconcileError::Config(
            "diff.timeout_seconds must be at least 1".into(),
        ));
    }

    Ok(())
}
