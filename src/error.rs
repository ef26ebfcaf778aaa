//! Error types for the instrumentation engine.
//!
//! Lexical and parse errors are produced relative to the text they were
//! raised on. [`InstrumentError`] is the file-level error: it carries
//! absolute line numbers and a short context snippet, and is what the
//! command runners report.

use std::path::PathBuf;

use crate::ast::Position;
use crate::diagnostics::DiagnosticStage;
use crate::error_codes;

/// Failure of the shared scanner.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LexError {
    #[error("unterminated literal at line {line}")]
    UnterminatedLiteral { line: usize },

    #[error("unterminated comment at line {line}")]
    UnterminatedComment { line: usize },

    #[error("malformed DELIMITER directive at line {line}")]
    MalformedDelimiter { line: usize },
}

impl LexError {
    /// Line (relative to the scanned text) where the problem starts.
    pub fn line(&self) -> usize {
        match self {
            LexError::UnterminatedLiteral { line }
            | LexError::UnterminatedComment { line }
            | LexError::MalformedDelimiter { line } => *line,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            LexError::UnterminatedLiteral { .. } => error_codes::SQLP_LEX_001_UNTERMINATED_LITERAL,
            LexError::UnterminatedComment { .. } => error_codes::SQLP_LEX_002_UNTERMINATED_COMMENT,
            LexError::MalformedDelimiter { .. } => error_codes::SQLP_LEX_003_MALFORMED_DELIMITER,
        }
    }
}

/// Flow parser failure, positioned relative to the statement text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {}, column {})", .position.line, .position.column)]
pub struct ParseError {
    pub position: Position,
    pub message: String,
}

impl ParseError {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        ParseError::new(
            Position {
                line: err.line(),
                column: 1,
                offset: 0,
            },
            err.to_string(),
        )
    }
}

/// Tree transform failure, positioned relative to the statement text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (line {}, column {})", .position.line, .position.column)]
pub struct TransformError {
    pub position: Position,
    pub message: String,
}

/// File-level instrumentation error.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Lexical(#[from] LexError),

    #[error("parse error at line {line}: {reason} near `{context}`")]
    Parse {
        line: usize,
        context: String,
        reason: String,
    },

    #[error("transform error at line {line}: {reason}")]
    Transform { line: usize, reason: String },
}

impl InstrumentError {
    /// Stable error code, see [`crate::error_codes`].
    pub fn code(&self) -> &'static str {
        match self {
            InstrumentError::Read { .. } => error_codes::SQLP_IO_001_READ_FAILED,
            InstrumentError::Write { .. } => error_codes::SQLP_IO_002_WRITE_FAILED,
            InstrumentError::Lexical(err) => err.code(),
            InstrumentError::Parse { .. } => error_codes::SQLP_PRS_001_PARSE_FAILED,
            InstrumentError::Transform { .. } => error_codes::SQLP_TRN_001_TRANSFORM_FAILED,
        }
    }

    /// Pipeline stage the error was raised in.
    pub fn stage(&self) -> DiagnosticStage {
        match self {
            InstrumentError::Read { .. } => DiagnosticStage::Read,
            InstrumentError::Write { .. } => DiagnosticStage::Write,
            InstrumentError::Lexical(_) => DiagnosticStage::Split,
            InstrumentError::Parse { .. } => DiagnosticStage::Parse,
            InstrumentError::Transform { .. } => DiagnosticStage::Transform,
        }
    }
}

/// First `max` bytes of `text`, cut back to a character boundary.
pub fn context_snippet(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}
