//! Init command implementation
//!
//! Emits the SQL that installs the recording tables and procedures.
//! Running it against a server is left to the `mysql` client.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::instrument::Mode;
use crate::schema::{event_table, install_script};

/// Run the init command
///
/// Usage: coverage init [--output <FILE>]
pub fn run_init(mode: Mode, output: Option<PathBuf>) -> Result<()> {
    let script = install_script(mode);
    match output {
        Some(path) => {
            std::fs::write(&path, script)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(
                path = %path.display(),
                tool = mode.tool_name(),
                table = event_table(mode),
                "wrote install script"
            );
        }
        None => print!("{}", script),
    }
    Ok(())
}
