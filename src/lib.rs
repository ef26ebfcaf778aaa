//! sqlprobe: source-level instrumentation of MySQL stored routines.
//!
//! A file is processed in four stages:
//!
//! 1. [`splitter`] cuts it into top-level statements, honoring `DELIMITER`.
//! 2. [`parser`] turns each `CREATE PROCEDURE` / `CREATE FUNCTION` into a
//!    syntax tree ([`ast`]); every other statement passes through.
//! 3. [`instrument`] inserts recording calls, either one per executable
//!    line (coverage) or around the routine body (ftrace).
//! 4. [`emit`] re-serializes the tree and [`pipeline`] splices the result
//!    back into the original file text.
//!
//! # Position Conventions
//!
//! - **Line positions**: 1-indexed, absolute within the input file once
//!   they leave the pipeline
//! - **Column positions**: 1-indexed
//! - **Byte offsets**: 0-indexed from the start of the statement text
//!
//! The recording procedures the instrumented code calls are created by the
//! scripts in [`schema`].

pub mod ast;
pub mod cli;
pub mod diagnostics;
pub mod emit;
pub mod error;
pub mod error_codes;
pub mod init_cmd;
pub mod instrument;
pub mod instrument_cmd;
pub mod lexer;
pub mod lines;
pub mod lines_cmd;
pub mod logging;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod schema;
pub mod splitter;
pub mod version;

pub use diagnostics::{DiagnosticStage, FileDiagnostic};
pub use error::{InstrumentError, LexError, ParseError, TransformError};
pub use instrument::Mode;
pub use lines::CoveragePoint;
pub use output::{generate_execution_id, output_json, JsonResponse, OutputFormat};
pub use pipeline::{
    instrument_file, instrument_source, instrument_statement, FileReport, InstrumentConfig,
    InstrumentOutput, InstrumentedRoutine,
};
pub use splitter::{split, RawStatement};
