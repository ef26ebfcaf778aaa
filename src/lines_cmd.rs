//! Lines command implementation
//!
//! Lists the source lines that carry a coverage probe in instrumented files.

use std::path::PathBuf;

use anyhow::Result;

use crate::instrument::Mode;
use crate::lines::{discover, scan_files};
use crate::output::{generate_execution_id, output_json, JsonResponse, LinesResponse, OutputFormat};

/// Run the lines command
///
/// Usage: coverage lines [--format <FORMAT>] <PATH>...
///
/// Directories are searched recursively for `*.sql.instrumented` files.
/// Human output is one `file:routine:line` per instrumented line, ordered
/// by file and line.
pub fn run_lines(paths: Vec<PathBuf>, output_format: OutputFormat) -> Result<()> {
    let files = discover(&paths)?;
    let points = scan_files(&files)?;
    tracing::debug!(files = files.len(), points = points.len(), "collected coverage points");

    match output_format {
        OutputFormat::Json | OutputFormat::Pretty => {
            let response = LinesResponse {
                files: files.iter().map(|f| f.display().to_string()).collect(),
                points,
            };
            let exec_id = generate_execution_id();
            let json_response =
                JsonResponse::new(response, &exec_id, Mode::Coverage.tool_name());
            output_json(&json_response, output_format)?;
        }
        OutputFormat::Human => {
            for point in &points {
                println!("{}:{}:{}", point.file, point.routine, point.line);
            }
        }
    }
    Ok(())
}
