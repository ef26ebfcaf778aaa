//! File-level orchestration: split, parse, instrument, emit, splice.
//!
//! The output is built by splicing. Bytes outside routine definitions are
//! copied from the input as they are; each routine statement, through its
//! terminator, is replaced by the rewritten routine followed by a space and
//! the delimiter that was active for it. A file without routines comes out
//! byte-identical.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::emit::emit_routine;
use crate::error::{context_snippet, InstrumentError};
use crate::instrument::{instrument_routine, Mode, RoutineContext};
use crate::parser::{parse_statement, Parsed};
use crate::splitter::split;

/// Bytes of statement text quoted in parse errors.
const CONTEXT_BYTES: usize = 50;

/// Engine configuration for one input.
#[derive(Debug, Clone)]
pub struct InstrumentConfig {
    pub mode: Mode,
    /// Basename embedded in every recording call.
    pub filename: String,
}

impl InstrumentConfig {
    pub fn new(mode: Mode, filename: impl Into<String>) -> Self {
        Self {
            mode,
            filename: filename.into(),
        }
    }
}

/// One rewritten routine definition, without terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentedRoutine {
    pub name: String,
    pub text: String,
    pub probes: usize,
    /// Byte offset of `CREATE` within the statement text. Anything before
    /// it (leading comments) is kept as written.
    pub offset: usize,
}

/// Result of instrumenting a whole source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentOutput {
    pub text: String,
    /// SQL statements seen (directives and comment runs excluded)
    pub statements: usize,
    pub routines: usize,
    pub probes: usize,
}

/// Summary of one instrumented file, as reported with `--format json`.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: String,
    pub output: String,
    pub statements: usize,
    pub routines: usize,
    pub probes: usize,
    pub source_sha256: String,
}

/// Instrument a single SQL statement that starts on file line `start_line`.
///
/// Returns `Ok(None)` for statements that are not routine definitions.
pub fn instrument_statement(
    text: &str,
    start_line: usize,
    config: &InstrumentConfig,
) -> Result<Option<InstrumentedRoutine>, InstrumentError> {
    let routine = match parse_statement(text) {
        Ok(Parsed::Routine(routine)) => routine,
        Ok(Parsed::Passthrough) => return Ok(None),
        Err(err) => {
            return Err(InstrumentError::Parse {
                line: start_line + err.position.line.saturating_sub(1),
                context: context_snippet(text, CONTEXT_BYTES),
                reason: err.message,
            })
        }
    };

    let context = RoutineContext {
        filename: &config.filename,
        start_line,
    };
    let name = routine.plain_name();
    let offset = routine.position.offset;
    let rewrite = instrument_routine(config.mode, routine, &context).map_err(|err| {
        InstrumentError::Transform {
            line: context.absolute_line(err.position),
            reason: err.message,
        }
    })?;

    Ok(Some(InstrumentedRoutine {
        name,
        text: emit_routine(&rewrite.routine),
        probes: rewrite.probes,
        offset,
    }))
}

/// Instrument every routine in `source`.
pub fn instrument_source(
    source: &str,
    config: &InstrumentConfig,
) -> Result<InstrumentOutput, InstrumentError> {
    let statements = split(source)?;

    let mut text = String::with_capacity(source.len() * 2);
    let mut cursor = 0;
    let mut sql_statements = 0;
    let mut routines = 0;
    let mut probes = 0;

    for statement in statements.iter().filter(|s| s.is_sql()) {
        sql_statements += 1;
        let Some(routine) = instrument_statement(&statement.text, statement.start_line, config)?
        else {
            tracing::debug!(line = statement.start_line, "passing statement through");
            continue;
        };
        tracing::debug!(
            line = statement.start_line,
            routine = %routine.name,
            probes = routine.probes,
            "instrumented routine"
        );

        text.push_str(&source[cursor..statement.span.start + routine.offset]);
        text.push_str(&routine.text);
        if !routine.text.ends_with('\n') {
            text.push(' ');
        }
        text.push_str(&statement.delimiter);
        cursor = statement.end;
        let rest = &source[cursor..];
        if !(rest.starts_with('\n') || rest.starts_with("\r\n")) {
            text.push('\n');
        }

        routines += 1;
        probes += routine.probes;
    }
    text.push_str(&source[cursor..]);

    Ok(InstrumentOutput {
        text,
        statements: sql_statements,
        routines,
        probes,
    })
}

/// `<dir>/<basename><suffix>`, where `dir` defaults to the input's directory.
pub fn output_path(input: &Path, output_dir: Option<&Path>, mode: Mode) -> PathBuf {
    let mut name = input
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| input.as_os_str().to_os_string());
    name.push(mode.suffix());
    match output_dir {
        Some(dir) => dir.join(name),
        None => input.with_file_name(name),
    }
}

/// Instrument `input` and write the result next to it (or under
/// `output_dir`).
///
/// The output is written to a temporary file in the target directory and
/// renamed into place only once the whole file has been instrumented.
pub fn instrument_file(
    input: &Path,
    output_dir: Option<&Path>,
    mode: Mode,
) -> Result<FileReport, InstrumentError> {
    let source = std::fs::read_to_string(input).map_err(|source| InstrumentError::Read {
        path: input.to_path_buf(),
        source,
    })?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.display().to_string());
    let config = InstrumentConfig::new(mode, filename);
    let output = instrument_source(&source, &config)?;

    let target = output_path(input, output_dir, mode);
    write_atomic(&target, output.text.as_bytes())?;

    tracing::info!(
        input = %input.display(),
        output = %target.display(),
        routines = output.routines,
        probes = output.probes,
        "instrumented file"
    );

    Ok(FileReport {
        input: input.display().to_string(),
        output: target.display().to_string(),
        statements: output.statements,
        routines: output.routines,
        probes: output.probes,
        source_sha256: compute_hash(source.as_bytes()),
    })
}

fn write_atomic(target: &Path, bytes: &[u8]) -> Result<(), InstrumentError> {
    let write_error = |source| InstrumentError::Write {
        path: target.to_path_buf(),
        source,
    };
    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(write_error)?;

    let mut temp = NamedTempFile::new_in(&dir).map_err(write_error)?;
    temp.write_all(bytes).map_err(write_error)?;
    temp.flush().map_err(write_error)?;

    if target.exists() {
        tracing::warn!(path = %target.display(), "replacing existing output file");
    }
    temp.persist(target).map_err(|err| write_error(err.error))?;
    Ok(())
}

/// Compute SHA-256 hash of file contents
pub fn compute_hash(source: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source);
    hex::encode(hasher.finalize())
}
