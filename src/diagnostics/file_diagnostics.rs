//! Per-file diagnostics for instrumentation runs.
//!
//! A run stops at the first failing file; the failure is reported once on
//! stderr and, with `--format json`, as part of the response payload.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::Path;

use crate::error::InstrumentError;

/// Stage of the pipeline where a file failed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticStage {
    /// Failed to read the input
    Read,
    /// Failed to split the file into statements
    Split,
    /// Failed to parse a routine definition
    Parse,
    /// Failed to transform a parsed routine
    Transform,
    /// Failed to write the output
    Write,
}

impl DiagnosticStage {
    /// Stable sort key, in pipeline order.
    pub fn sort_key(&self) -> u8 {
        match self {
            DiagnosticStage::Read => 0,
            DiagnosticStage::Split => 1,
            DiagnosticStage::Parse => 2,
            DiagnosticStage::Transform => 3,
            DiagnosticStage::Write => 4,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DiagnosticStage::Read => "reading file",
            DiagnosticStage::Split => "splitting statements",
            DiagnosticStage::Parse => "parsing routine",
            DiagnosticStage::Transform => "instrumenting routine",
            DiagnosticStage::Write => "writing output",
        }
    }
}

impl fmt::Display for DiagnosticStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

impl PartialOrd for DiagnosticStage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DiagnosticStage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

/// Why one file could not be instrumented.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileDiagnostic {
    /// Input path as given on the command line (`stdin` for standard input)
    pub path: String,
    pub stage: DiagnosticStage,
    /// Stable error code, see `error_codes`
    pub code: String,
    pub message: String,
}

impl FileDiagnostic {
    pub fn from_error(path: &Path, error: &InstrumentError) -> Self {
        FileDiagnostic {
            path: path.display().to_string(),
            stage: error.stage(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }

    /// One-line stderr form.
    ///
    /// Example: "failed to instrument src/a.sql: parse error at line 4: ..."
    pub fn format_stderr(&self) -> String {
        format!("failed to instrument {}: {}", self.path, self.message)
    }
}

impl fmt::Display for FileDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_stderr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LexError;
    use crate::error_codes;

    #[test]
    fn test_diagnostic_stage_ord_follows_pipeline() {
        assert!(DiagnosticStage::Read < DiagnosticStage::Split);
        assert!(DiagnosticStage::Split < DiagnosticStage::Parse);
        assert!(DiagnosticStage::Parse < DiagnosticStage::Transform);
        assert!(DiagnosticStage::Transform < DiagnosticStage::Write);
    }

    #[test]
    fn test_diagnostic_stage_display() {
        assert_eq!(DiagnosticStage::Read.to_string(), "reading file");
        assert_eq!(DiagnosticStage::Parse.to_string(), "parsing routine");
    }

    #[test]
    fn test_from_error_and_format_stderr() {
        let error = InstrumentError::Lexical(LexError::UnterminatedLiteral { line: 4 });
        let diag = FileDiagnostic::from_error(Path::new("src/a.sql"), &error);
        assert_eq!(diag.stage, DiagnosticStage::Split);
        assert_eq!(diag.code, error_codes::SQLP_LEX_001_UNTERMINATED_LITERAL);
        assert_eq!(
            diag.format_stderr(),
            "failed to instrument src/a.sql: unterminated literal at line 4"
        );
    }

    #[test]
    fn test_stage_serializes_lowercase() {
        let json = serde_json::to_string(&DiagnosticStage::Transform).unwrap();
        assert_eq!(json, "\"transform\"");
    }
}
