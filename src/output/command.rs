//! JSON output types for CLI commands
//!
//! Every JSON payload is wrapped in a [`JsonResponse`] carrying the schema
//! version, an execution id and the producing tool, so that reports from
//! `coverage` and `ftrace` runs can be told apart and parsed stably.

use serde::{Deserialize, Serialize};

use crate::diagnostics::FileDiagnostic;
use crate::instrument::Mode;
use crate::lines::CoveragePoint;
use crate::pipeline::FileReport;

/// Current JSON output schema version
pub const SQLPROBE_JSON_SCHEMA_VERSION: &str = "1.0.0";

/// Wrapper for all JSON responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse<T> {
    /// Schema version for parsing stability
    pub schema_version: String,
    /// Unique execution ID for this run
    pub execution_id: String,
    /// Binary that produced the response (`coverage` or `ftrace`)
    pub tool: String,
    /// RFC 3339 UTC timestamp
    pub timestamp: String,
    /// Response data
    pub data: T,
    /// Set when processing stopped before all inputs were handled
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<bool>,
}

impl<T> JsonResponse<T> {
    /// Create a new JSON response
    pub fn new(data: T, execution_id: &str, tool: &str) -> Self {
        JsonResponse {
            schema_version: SQLPROBE_JSON_SCHEMA_VERSION.to_string(),
            execution_id: execution_id.to_string(),
            tool: tool.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            data,
            partial: None,
        }
    }

    /// Mark the response as partial
    pub fn with_partial(mut self, partial: bool) -> Self {
        self.partial = Some(partial);
        self
    }
}

/// Response for `instrument`
#[derive(Debug, Clone, Serialize)]
pub struct InstrumentResponse {
    /// Instrumentation applied (`coverage` or `ftrace`)
    pub mode: Mode,
    /// Files written, in command-line order
    pub files: Vec<FileReport>,
    /// Total routines rewritten
    pub routines: usize,
    /// Total recording calls inserted
    pub probes: usize,
    /// The file that stopped the run, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FileDiagnostic>,
}

impl InstrumentResponse {
    pub fn new(mode: Mode, files: Vec<FileReport>, failure: Option<FileDiagnostic>) -> Self {
        InstrumentResponse {
            mode,
            routines: files.iter().map(|f| f.routines).sum(),
            probes: files.iter().map(|f| f.probes).sum(),
            files,
            failure,
        }
    }
}

/// Response for `lines`
#[derive(Debug, Clone, Serialize)]
pub struct LinesResponse {
    /// Instrumented files scanned
    pub files: Vec<String>,
    pub points: Vec<CoveragePoint>,
}

/// Output format for commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output
    Human,
    /// Compact JSON, one document per line
    Json,
    /// Indented JSON
    Pretty,
}

impl OutputFormat {
    /// Parse from string
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Some(OutputFormat::Human),
            "json" => Some(OutputFormat::Json),
            "pretty" => Some(OutputFormat::Pretty),
            _ => None,
        }
    }

    pub fn is_json(&self) -> bool {
        matches!(self, OutputFormat::Json | OutputFormat::Pretty)
    }
}

/// Generate a unique execution ID for this run
///
/// Uses timestamp + process ID.
pub fn generate_execution_id() -> String {
    use std::process;
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let pid = process::id();

    format!("{:x}-{:x}", timestamp, pid)
}

/// Output JSON to stdout
pub fn output_json<T: Serialize>(data: &T, format: OutputFormat) -> anyhow::Result<()> {
    let json = match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(data)?,
        _ => serde_json::to_string(data)?,
    };
    println!("{}", json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_id_format() {
        let id = generate_execution_id();

        // ID should be in format "{timestamp}-{pid}"
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 2, "Execution ID should have 2 parts: {}", id);
        assert!(u64::from_str_radix(parts[0], 16).is_ok());
        assert!(u64::from_str_radix(parts[1], 16).is_ok());
    }

    #[test]
    fn test_json_response_serialization() {
        let response = JsonResponse::new(
            LinesResponse {
                files: vec!["a.sql.instrumented".to_string()],
                points: vec![CoveragePoint {
                    file: "a.sql".to_string(),
                    routine: "f".to_string(),
                    line: 3,
                }],
            },
            "test-exec-123",
            "coverage",
        );

        let json = serde_json::to_string(&response).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["schema_version"], SQLPROBE_JSON_SCHEMA_VERSION);
        assert_eq!(parsed["execution_id"], "test-exec-123");
        assert_eq!(parsed["tool"], "coverage");
        assert_eq!(parsed["data"]["points"][0]["line"], 3);
        assert!(parsed.get("partial").is_none());
    }

    #[test]
    fn test_instrument_response_totals() {
        let report = |routines, probes| FileReport {
            input: "a.sql".to_string(),
            output: "a.sql.ftraced".to_string(),
            statements: 3,
            routines,
            probes,
            source_sha256: String::new(),
        };
        let response = InstrumentResponse::new(Mode::Ftrace, vec![report(2, 4), report(1, 3)], None);
        assert_eq!(response.routines, 3);
        assert_eq!(response.probes, 7);

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("failure").is_none());
        assert_eq!(json["mode"], "ftrace");
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!(OutputFormat::from_str("json"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::from_str("pretty"), Some(OutputFormat::Pretty));
        assert_eq!(OutputFormat::from_str("text"), Some(OutputFormat::Human));
        assert_eq!(OutputFormat::from_str("invalid"), None);
        assert!(OutputFormat::Pretty.is_json());
        assert!(!OutputFormat::Human.is_json());
    }
}
