//! Tree transforms that insert recording calls into a parsed routine.
//!
//! Both policies are built on [`rewrite_lists`], which hands every
//! statement list of a routine (innermost first) to a closure that may
//! insert statements around the existing ones. Inserted calls are plain
//! [`StatementKind::Generic`] leaves, so the emitter needs no knowledge of
//! either policy.

pub mod coverage;
pub mod ftrace;

use serde::Serialize;

use crate::ast::{labels_match, Position, Routine, Statement, StatementKind};
use crate::error::TransformError;
use crate::schema;

pub use coverage::CoveragePolicy;
pub use ftrace::FtracePolicy;

/// Which instrumentation to apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// One probe before every executable statement.
    Coverage,
    /// Entry/exit probes around every routine body.
    Ftrace,
}

impl Mode {
    /// Suffix appended to an input file name to name its output.
    pub fn suffix(&self) -> &'static str {
        match self {
            Mode::Coverage => ".instrumented",
            Mode::Ftrace => ".ftraced",
        }
    }

    /// Name of the binary that drives this mode.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Mode::Coverage => "coverage",
            Mode::Ftrace => "ftrace",
        }
    }

    pub fn policy(&self) -> &'static dyn Instrumentation {
        match self {
            Mode::Coverage => &CoveragePolicy,
            Mode::Ftrace => &FtracePolicy,
        }
    }
}

/// Where the routine being instrumented lives.
#[derive(Debug, Clone, Copy)]
pub struct RoutineContext<'a> {
    /// Basename embedded in every emitted call.
    pub filename: &'a str,
    /// File line of the first byte of the routine's statement.
    pub start_line: usize,
}

impl RoutineContext<'_> {
    /// Convert a statement-relative position into a file line.
    pub fn absolute_line(&self, position: Position) -> usize {
        self.start_line + position.line.saturating_sub(1)
    }
}

/// A transformed routine and the number of recording calls inserted.
#[derive(Debug, Clone)]
pub struct RoutineRewrite {
    pub routine: Routine,
    pub probes: usize,
}

/// An instrumentation policy.
pub trait Instrumentation {
    fn instrument(
        &self,
        routine: Routine,
        context: &RoutineContext<'_>,
    ) -> Result<RoutineRewrite, TransformError>;
}

/// Check jump targets, then apply `mode`'s policy.
pub fn instrument_routine(
    mode: Mode,
    routine: Routine,
    context: &RoutineContext<'_>,
) -> Result<RoutineRewrite, TransformError> {
    check_jump_targets(&routine.body, &mut Vec::new())?;
    let rewrite = mode.policy().instrument(routine, context)?;
    tracing::debug!(
        routine = %rewrite.routine.plain_name(),
        probes = rewrite.probes,
        mode = mode.tool_name(),
        "rewrote routine"
    );
    Ok(rewrite)
}

/// Apply `rewrite` to every statement list under `list`, children before
/// parents, `list` itself last.
///
/// Statements the closure inserts into a list are not visited again.
pub fn rewrite_lists<F>(list: &mut Vec<Statement>, rewrite: &mut F)
where
    F: FnMut(&mut Vec<Statement>),
{
    for statement in list.iter_mut() {
        for child in statement.kind.child_lists_mut() {
            rewrite_lists(child, rewrite);
        }
    }
    rewrite(list);
}

/// `LEAVE` and `ITERATE` must name a label on an enclosing construct.
fn check_jump_targets<'a>(
    list: &'a [Statement],
    labels: &mut Vec<&'a str>,
) -> Result<(), TransformError> {
    for statement in list {
        match &statement.kind {
            StatementKind::Leave { target } | StatementKind::Iterate { target } => {
                if !labels.iter().any(|label| labels_match(label, target)) {
                    return Err(TransformError {
                        position: statement.position,
                        message: format!("jump to unknown label `{}`", target),
                    });
                }
            }
            kind => {
                let label = statement.label.as_deref();
                if let Some(label) = label {
                    labels.push(label);
                }
                for child in kind.child_lists() {
                    check_jump_targets(child, labels)?;
                }
                if label.is_some() {
                    labels.pop();
                }
            }
        }
    }
    Ok(())
}

/// Single-quote `value` for SQL, doubling embedded quotes.
pub fn sql_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CALL __record_coverage('<file>', '<routine>', <line>)`
pub fn coverage_call(filename: &str, routine: &str, line: usize) -> String {
    format!(
        "CALL {}({}, {}, {})",
        schema::RECORD_COVERAGE,
        sql_quote(filename),
        sql_quote(routine),
        line
    )
}

/// `CALL __record_ftrace_entry(...)` or `CALL __record_ftrace_exit(...)`.
pub fn ftrace_call(
    procedure: &str,
    filename: &str,
    routine: &str,
    object_type: &str,
    payload: &str,
) -> String {
    format!(
        "CALL {}({}, {}, {}, {})",
        procedure,
        sql_quote(filename),
        sql_quote(routine),
        sql_quote(object_type),
        payload
    )
}
