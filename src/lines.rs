//! Inventory of instrumented lines.
//!
//! Recovers every `CALL __record_coverage('<file>', '<routine>', <line>)`
//! from coverage-instrumented SQL by re-tokenizing it with the shared
//! lexer, so calls inside comments or string literals are never counted.
//! Report generators join this inventory with the recorded events to tell
//! executed lines from missed ones.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use globset::{Glob, GlobMatcher};
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::{InstrumentError, LexError};
use crate::lexer::{tokenize, unquote_literal, Token, TokenKind};
use crate::schema::RECORD_COVERAGE;

/// File name pattern of coverage-instrumented files.
pub const INSTRUMENTED_PATTERN: &str = "*.sql.instrumented";

/// One instrumented source line.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CoveragePoint {
    pub file: String,
    pub routine: String,
    pub line: usize,
}

impl Ord for CoveragePoint {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.file, self.line, &self.routine).cmp(&(&other.file, other.line, &other.routine))
    }
}

impl PartialOrd for CoveragePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// All coverage points in `text`, ordered by file then line, without
/// duplicates.
pub fn scan_instrumented(text: &str) -> std::result::Result<Vec<CoveragePoint>, LexError> {
    let tokens = tokenize(text)?.tokens;
    let mut points = BTreeSet::new();
    for window_start in 0..tokens.len() {
        if let Some(point) = match_call(text, &tokens[window_start..]) {
            points.insert(point);
        }
    }
    Ok(points.into_iter().collect())
}

/// `CALL __record_coverage ( 'file' , 'routine' , N )`
fn match_call(text: &str, tokens: &[Token]) -> Option<CoveragePoint> {
    let [call, name, open, file, c1, routine, c2, line, close, ..] = tokens else {
        return None;
    };
    let shape = call.is_word(text, "CALL")
        && name.is_word(text, RECORD_COVERAGE)
        && open.is_punct(text, "(")
        && file.kind == TokenKind::String
        && c1.is_punct(text, ",")
        && routine.kind == TokenKind::String
        && c2.is_punct(text, ",")
        && line.kind == TokenKind::Number
        && close.is_punct(text, ")");
    if !shape {
        return None;
    }
    Some(CoveragePoint {
        file: unquote_literal(file.text(text)),
        routine: unquote_literal(routine.text(text)),
        line: line.text(text).parse().ok()?,
    })
}

/// Expand `paths` into instrumented files.
///
/// Directories are walked recursively and filtered by
/// [`INSTRUMENTED_PATTERN`]; files named explicitly are taken as given.
/// The result is sorted and free of duplicates.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let matcher = Glob::new(INSTRUMENTED_PATTERN)?.compile_matcher();
    let mut found = BTreeSet::new();

    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(false)
                .into_iter()
                .filter_map(std::result::Result::ok)
            {
                if entry.file_type().is_file() && matches_name(&matcher, entry.path()) {
                    found.insert(entry.path().to_path_buf());
                }
            }
        } else if path.is_file() {
            found.insert(path.clone());
        } else {
            return Err(anyhow!("Path not found: {}", path.display()));
        }
    }

    Ok(found.into_iter().collect())
}

fn matches_name(matcher: &GlobMatcher, path: &Path) -> bool {
    path.file_name().is_some_and(|name| matcher.is_match(name))
}

/// Read and scan each file, merging the points.
pub fn scan_files(files: &[PathBuf]) -> std::result::Result<Vec<CoveragePoint>, InstrumentError> {
    let mut points = BTreeSet::new();
    for file in files {
        let text = std::fs::read_to_string(file).map_err(|source| InstrumentError::Read {
            path: file.clone(),
            source,
        })?;
        points.extend(scan_instrumented(&text)?);
        tracing::debug!(path = %file.display(), total = points.len(), "scanned instrumented file");
    }
    Ok(points.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_scan_finds_calls_and_unquotes() {
        let text = "BEGIN\n\tCALL __record_coverage('a.sql', 'f', 3);\n\tCALL __record_coverage('o''neil.sql', 'g', 10);\nEND";
        let points = scan_instrumented(text).unwrap();
        assert_eq!(
            points,
            vec![
                CoveragePoint {
                    file: "a.sql".into(),
                    routine: "f".into(),
                    line: 3
                },
                CoveragePoint {
                    file: "o'neil.sql".into(),
                    routine: "g".into(),
                    line: 10
                },
            ]
        );
    }

    #[test]
    fn test_scan_ignores_comments_and_literals() {
        let text = "-- CALL __record_coverage('a.sql', 'f', 1)\n\
                    SELECT 'CALL __record_coverage(''a.sql'', ''f'', 2)';\n\
                    /* CALL __record_coverage('a.sql', 'f', 3) */";
        assert!(scan_instrumented(text).unwrap().is_empty());
    }

    #[test]
    fn test_scan_orders_by_line_and_deduplicates() {
        let text = "CALL __record_coverage('a.sql', 'f', 9);\n\
                    CALL __record_coverage('a.sql', 'f', 2);\n\
                    CALL __record_coverage('a.sql', 'f', 2);";
        let lines: Vec<usize> = scan_instrumented(text).unwrap().iter().map(|p| p.line).collect();
        assert_eq!(lines, vec![2, 9]);
    }

    #[test]
    fn test_discover_walks_directories_and_filters() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a.sql.instrumented"), "").unwrap();
        std::fs::write(nested.join("b.sql.instrumented"), "").unwrap();
        std::fs::write(dir.path().join("a.sql"), "").unwrap();
        std::fs::write(dir.path().join("a.sql.ftraced"), "").unwrap();

        let found = discover(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(
            found,
            vec![
                dir.path().join("a.sql.instrumented"),
                nested.join("b.sql.instrumented"),
            ]
        );

        let explicit = discover(&[dir.path().join("a.sql")]).unwrap();
        assert_eq!(explicit, vec![dir.path().join("a.sql")]);

        assert!(discover(&[dir.path().join("missing")]).is_err());
    }
}
