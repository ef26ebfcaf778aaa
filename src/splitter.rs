//! Statement splitter.
//!
//! Turns a whole SQL file into an ordered list of top-level statements,
//! honoring `DELIMITER` redefinition the way the `mysql` client does.
//! Terminators are matched byte-exact, and only outside literals and
//! comments.

use std::ops::Range;

use crate::error::LexError;
use crate::lexer::{Scanner, UnitKind};

/// Terminator in effect at the start of every file.
pub const DEFAULT_DELIMITER: &str = ";";

const DELIMITER_KEYWORD: &[u8] = b"DELIMITER";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Sql,
    Delimiter,
    Comment,
}

/// One top-level statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawStatement {
    /// Statement text with outer whitespace trimmed. For `DELIMITER`
    /// directives this is the normalized form `DELIMITER <token>`.
    pub text: String,
    pub kind: StatementKind,
    /// 1-based line of the first non-blank byte.
    pub start_line: usize,
    /// Byte range of the statement in the input (terminator excluded).
    pub span: Range<usize>,
    /// Byte offset just past the terminator, or past the directive line.
    pub end: usize,
    /// Terminator in effect for this statement; for a `DELIMITER`
    /// directive, the newly installed terminator.
    pub delimiter: String,
}

impl RawStatement {
    pub fn is_sql(&self) -> bool {
        self.kind == StatementKind::Sql
    }
}

/// Statement being accumulated between terminators.
struct Pending {
    start: usize,
    end: usize,
    line: usize,
    has_sql: bool,
}

struct Splitter<'a> {
    input: &'a str,
    scanner: Scanner<'a>,
    delimiter: String,
    pending: Option<Pending>,
    statements: Vec<RawStatement>,
}

/// Split `input` into statements.
///
/// Blank runs between terminators are dropped. Runs holding only comments
/// become [`StatementKind::Comment`] statements.
pub fn split(input: &str) -> Result<Vec<RawStatement>, LexError> {
    let mut splitter = Splitter {
        input,
        scanner: Scanner::new(input),
        delimiter: DEFAULT_DELIMITER.to_string(),
        pending: None,
        statements: Vec::new(),
    };
    splitter.run()?;
    Ok(splitter.statements)
}

impl<'a> Splitter<'a> {
    fn run(&mut self) -> Result<(), LexError> {
        while !self.scanner.is_eof() {
            if self.at_delimiter_directive() {
                self.flush(None);
                self.read_delimiter_directive()?;
                continue;
            }

            if self.scanner.starts_with(self.delimiter.as_bytes()) {
                self.scanner.bump_n(self.delimiter.len());
                self.flush(Some(self.scanner.offset()));
                continue;
            }

            let Some(unit) = self.scanner.next_unit()? else {
                break;
            };
            match unit.kind {
                UnitKind::Byte(byte) if byte.is_ascii_whitespace() => {}
                UnitKind::LineComment | UnitKind::BlockComment => {
                    self.extend(unit.start, unit.end, unit.position.line, false)
                }
                UnitKind::Byte(_) | UnitKind::Literal(_) => {
                    self.extend(unit.start, unit.end, unit.position.line, true)
                }
            }
        }
        self.flush(None);
        Ok(())
    }

    fn extend(&mut self, start: usize, end: usize, line: usize, is_sql: bool) {
        match &mut self.pending {
            Some(pending) => {
                pending.end = end;
                pending.has_sql |= is_sql;
            }
            None => {
                self.pending = Some(Pending {
                    start,
                    end,
                    line,
                    has_sql: is_sql,
                })
            }
        }
    }

    /// Emit the pending statement. `terminator_end` is the offset past the
    /// terminator when one was seen.
    fn flush(&mut self, terminator_end: Option<usize>) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let kind = if pending.has_sql {
            StatementKind::Sql
        } else {
            StatementKind::Comment
        };
        self.statements.push(RawStatement {
            text: self.input[pending.start..pending.end].to_string(),
            kind,
            start_line: pending.line,
            span: pending.start..pending.end,
            end: terminator_end.unwrap_or(pending.end),
            delimiter: self.delimiter.clone(),
        });
    }

    fn at_delimiter_directive(&self) -> bool {
        if !self.scanner.starts_with_ignore_case(DELIMITER_KEYWORD) || !self.scanner.at_line_start() {
            return false;
        }
        // `DELIMITERS` or `delimiter_col` are ordinary words
        !matches!(
            self.scanner.peek_at(DELIMITER_KEYWORD.len()),
            Some(b) if b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
        )
    }

    fn read_delimiter_directive(&mut self) -> Result<(), LexError> {
        let line = self.scanner.line();
        let start = self.scanner.offset();
        self.scanner.bump_n(DELIMITER_KEYWORD.len());
        self.scanner.skip_blanks();

        let token_start = self.scanner.offset();
        while self
            .scanner
            .peek()
            .is_some_and(|b| !b.is_ascii_whitespace())
        {
            self.scanner.bump();
        }
        let token_end = self.scanner.offset();
        if token_start == token_end {
            return Err(LexError::MalformedDelimiter { line });
        }
        let token = self.input[token_start..token_end].to_string();
        self.scanner.skip_line();

        self.statements.push(RawStatement {
            text: format!("DELIMITER {}", token),
            kind: StatementKind::Delimiter,
            start_line: line,
            span: start..token_end,
            end: self.scanner.offset(),
            delimiter: token.clone(),
        });
        self.delimiter = token;
        Ok(())
    }
}
