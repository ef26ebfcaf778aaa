//! JSON output module for CLI commands
//!
//! Provides schema-versioned response types for `instrument` and `lines`.

pub mod command;

pub use command::{
    generate_execution_id, output_json, InstrumentResponse, JsonResponse, LinesResponse,
    OutputFormat, SQLPROBE_JSON_SCHEMA_VERSION,
};
