//! Structured diagnostics for instrumentation runs.
//!
//! Provides sortable stage types and the per-file failure record printed on
//! stderr and embedded in JSON reports.

pub mod file_diagnostics;

pub use file_diagnostics::{DiagnosticStage, FileDiagnostic};
