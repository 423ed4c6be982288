//! Key/value command-line parameters.
//!
//! Accepts pairs such as `-server HOST -sourcedatabase A -destinationdatabase B`.
//! Names are case-insensitive and may be prefixed with `-`, `--` or `/`;
//! hyphens and underscores inside a name are ignored.

use super::RunParameters;
use crate::error::{ReconcileError, Result};

impl RunParameters {
    /// Parse key/value pairs into a fresh parameter set.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut params = RunParameters::default();
        params.apply_args(args)?;
        Ok(params)
    }

    /// Apply key/value pairs over existing parameters.
    pub fn apply_args<S: AsRef<str>>(&mut self, args: &[S]) -> Result<()> {
        if args.is_empty() {
            return Err(ReconcileError::Config(
                "Command line parameters must be used".into(),
            ));
        }
        if args.len() % 2 != 0 {
            return Err(ReconcileError::Config(
                "Invalid number of command line parameters".into(),
            ));
        }

        for pair in args.chunks(2) {
            let name = pair[0].as_ref();
            let value = pair[1].as_ref().to_string();

            match normalize_name(name).as_str() {
                "server" | "sourceserver" => self.server = value,
                "sourcedatabase" => self.source_database = value,
                "destinationdatabase" => self.destination_database = value,
                _ => {
                    return Err(ReconcileError::Config(format!(
                        "{} is not a valid parameter",
                        name
                    )))
                }
            }
        }

        Ok(())
    }
}

fn normalize_name(name: &str) -> String {
    name.trim_start_matches(['-', '/'])
        .chars()
        .filter(|c| *c != '-' && *c != '_')
        .flat_map(char::to_lowercase)
        .collect()
}
