//! sqlprobe error codes
//!
//! Error codes follow the pattern: SQLP-{CATEGORY}-{3-digit number}
//!
//! Categories (2-3 uppercase letters):
//! - IO: I/O-related errors (reading input, writing output)
//! - LEX: Lexical errors raised while splitting a file into statements
//! - PRS: Flow parser errors inside routine definitions
//! - TRN: Tree transform errors
//!
//! Each error code is stable and should not be reused.
//!
//! | Code | Description | Remediation |
//! |------|-------------|-------------|
//! | SQLP-IO-001 | Input file could not be read | Check the path and read permissions |
//! | SQLP-IO-002 | Output file could not be written | Check the output directory and write permissions |
//! | SQLP-LEX-001 | Unterminated literal | Close the quote opened at the reported line |
//! | SQLP-LEX-002 | Unterminated comment | Close the `/*` opened at the reported line |
//! | SQLP-LEX-003 | Malformed DELIMITER | Give `DELIMITER` a terminator argument |
//! | SQLP-PRS-001 | Parse failure | Fix the routine at the reported line; the file is not instrumented |
//! | SQLP-TRN-001 | Transform failure | `LEAVE`/`ITERATE` must name an enclosing label |

/// Input file could not be read
pub const SQLP_IO_001_READ_FAILED: &str = "SQLP-IO-001";

/// Output file could not be written
pub const SQLP_IO_002_WRITE_FAILED: &str = "SQLP-IO-002";

/// String or identifier literal not closed before end of input
pub const SQLP_LEX_001_UNTERMINATED_LITERAL: &str = "SQLP-LEX-001";

/// Block comment not closed before end of input
pub const SQLP_LEX_002_UNTERMINATED_COMMENT: &str = "SQLP-LEX-002";

/// DELIMITER directive without an argument
pub const SQLP_LEX_003_MALFORMED_DELIMITER: &str = "SQLP-LEX-003";

/// Routine definition could not be parsed
pub const SQLP_PRS_001_PARSE_FAILED: &str = "SQLP-PRS-001";

/// Syntax tree could not be transformed (e.g. jump to an unknown label)
pub const SQLP_TRN_001_TRANSFORM_FAILED: &str = "SQLP-TRN-001";
