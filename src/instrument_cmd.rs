//! Instrument command implementation
//!
//! Rewrites SQL files (or standard input) for coverage or function tracing.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;

use crate::diagnostics::FileDiagnostic;
use crate::error::InstrumentError;
use crate::instrument::Mode;
use crate::output::{
    generate_execution_id, output_json, InstrumentResponse, JsonResponse, OutputFormat,
};
use crate::pipeline::{instrument_file, instrument_source, InstrumentConfig};

/// Name used for standard input in recording calls and diagnostics.
pub const STDIN_NAME: &str = "stdin";

/// Run the instrument command
///
/// Usage: coverage instrument [--output <DIR>] [--format <FORMAT>] [FILES...]
///
/// With no files, reads SQL from stdin and writes the instrumented text to
/// stdout. Otherwise each file is written next to the input, or under
/// `output_dir`. Processing stops at the first file that fails; its
/// diagnostic goes to stderr and the exit code is 1.
pub fn run_instrument(
    mode: Mode,
    files: Vec<PathBuf>,
    output_dir: Option<PathBuf>,
    output_format: OutputFormat,
) -> Result<ExitCode> {
    if files.is_empty() {
        return run_stdin(mode);
    }

    let exec_id = generate_execution_id();
    let mut reports = Vec::with_capacity(files.len());
    let mut failure = None;

    for file in &files {
        match instrument_file(file, output_dir.as_deref(), mode) {
            Ok(report) => {
                if output_format == OutputFormat::Human {
                    println!(
                        "{} -> {} ({} routines, {} probes)",
                        report.input, report.output, report.routines, report.probes
                    );
                }
                reports.push(report);
            }
            Err(err) => {
                let diagnostic = FileDiagnostic::from_error(file, &err);
                eprintln!("{}", diagnostic);
                failure = Some(diagnostic);
                break;
            }
        }
    }

    let failed = failure.is_some();
    if output_format.is_json() {
        let mut response = JsonResponse::new(
            InstrumentResponse::new(mode, reports, failure),
            &exec_id,
            mode.tool_name(),
        );
        if failed {
            response = response.with_partial(true);
        }
        output_json(&response, output_format)?;
    }

    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

/// stdin -> stdout. Nothing is written unless the whole input succeeds.
fn run_stdin(mode: Mode) -> Result<ExitCode> {
    match instrument_stdin(mode) {
        Ok(text) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("{}", FileDiagnostic::from_error(Path::new(STDIN_NAME), &err));
            Ok(ExitCode::from(1))
        }
    }
}

fn instrument_stdin(mode: Mode) -> std::result::Result<String, InstrumentError> {
    let mut source = String::new();
    std::io::stdin()
        .read_to_string(&mut source)
        .map_err(|source| InstrumentError::Read {
            path: PathBuf::from(STDIN_NAME),
            source,
        })?;
    let config = InstrumentConfig::new(mode, STDIN_NAME);
    let output = instrument_source(&source, &config)?;
    tracing::info!(routines = output.routines, probes = output.probes, "instrumented stdin");
    Ok(output.text)
}
