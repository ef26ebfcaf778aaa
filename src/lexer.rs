//! Shared lexical layer.
//!
//! [`Scanner`] walks a text one logical unit at a time: a plain byte, a
//! whole quoted literal, or a whole comment. The statement splitter and the
//! tokenizer both drive it, so a keyword inside `'...'`, `"..."`,
//! `` `...` ``, `-- ...`, `# ...` or `/* ... */` is inert in both layers.
//!
//! Lexical rules:
//! - quotes: a doubled quote is an embedded quote; a backslash escapes the
//!   next byte (newlines included)
//! - `--` starts a comment only when followed by space, tab, or end of line
//! - `/* */` does not nest
//! - lines advance on every `\n`, wherever it is consumed

use crate::ast::Position;
use crate::error::LexError;

/// What a [`Unit`] consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// A single byte outside any literal or comment.
    Byte(u8),
    /// A quoted literal, delimited by the given quote byte.
    Literal(u8),
    /// `-- ...` or `# ...`, excluding the terminating newline.
    LineComment,
    /// `/* ... */`
    BlockComment,
}

/// One logical step of the scanner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unit {
    pub kind: UnitKind,
    pub start: usize,
    pub end: usize,
    /// Position of the first byte of the unit.
    pub position: Position,
}

/// Byte cursor with line and column tracking.
#[derive(Debug, Clone)]
pub struct Scanner<'a> {
    src: &'a [u8],
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(src: &'a str) -> Self {
        Scanner {
            src: src.as_bytes(),
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    pub fn offset(&self) -> usize {
        self.pos
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn position(&self) -> Position {
        Position {
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    pub fn peek_at(&self, n: usize) -> Option<u8> {
        self.src.get(self.pos + n).copied()
    }

    pub fn starts_with(&self, pattern: &[u8]) -> bool {
        self.src[self.pos..].starts_with(pattern)
    }

    pub fn starts_with_ignore_case(&self, pattern: &[u8]) -> bool {
        let rest = &self.src[self.pos..];
        rest.len() >= pattern.len() && rest[..pattern.len()].eq_ignore_ascii_case(pattern)
    }

    /// True when only spaces and tabs precede the cursor on its line.
    pub fn at_line_start(&self) -> bool {
        self.src[..self.pos]
            .iter()
            .rev()
            .take_while(|b| **b != b'\n')
            .all(|b| *b == b' ' || *b == b'\t')
    }

    /// Advance one byte.
    pub fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        if byte == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(byte)
    }

    pub fn bump_n(&mut self, n: usize) {
        for _ in 0..n {
            if self.bump().is_none() {
                break;
            }
        }
    }

    /// Advance over spaces and tabs only.
    pub fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t')) {
            self.bump();
        }
    }

    /// Advance past the end of the current line, newline included.
    pub fn skip_line(&mut self) {
        while let Some(byte) = self.bump() {
            if byte == b'\n' {
                break;
            }
        }
    }

    fn at_line_comment(&self) -> bool {
        match self.peek() {
            Some(b'#') => true,
            Some(b'-') => {
                self.peek_at(1) == Some(b'-')
                    && matches!(self.peek_at(2), None | Some(b' ' | b'\t' | b'\n' | b'\r'))
            }
            _ => false,
        }
    }

    /// Consume the next logical unit, or `None` at end of input.
    pub fn next_unit(&mut self) -> Result<Option<Unit>, LexError> {
        let Some(byte) = self.peek() else {
            return Ok(None);
        };
        let start = self.pos;
        let position = self.position();

        let kind = if matches!(byte, b'\'' | b'"' | b'`') {
            self.consume_literal(byte, position.line)?;
            UnitKind::Literal(byte)
        } else if self.at_line_comment() {
            while !matches!(self.peek(), None | Some(b'\n')) {
                self.bump();
            }
            UnitKind::LineComment
        } else if self.starts_with(b"/*") {
            self.consume_block_comment(position.line)?;
            UnitKind::BlockComment
        } else {
            self.bump();
            UnitKind::Byte(byte)
        };

        Ok(Some(Unit {
            kind,
            start,
            end: self.pos,
            position,
        }))
    }

    fn consume_literal(&mut self, quote: u8, line: usize) -> Result<(), LexError> {
        self.bump();
        loop {
            match self.bump() {
                None => return Err(LexError::UnterminatedLiteral { line }),
                Some(b'\\') => {
                    if self.bump().is_none() {
                        return Err(LexError::UnterminatedLiteral { line });
                    }
                }
                Some(b) if b == quote => {
                    if self.peek() == Some(quote) {
                        self.bump();
                    } else {
                        return Ok(());
                    }
                }
                Some(_) => {}
            }
        }
    }

    fn consume_block_comment(&mut self, line: usize) -> Result<(), LexError> {
        self.bump_n(2);
        loop {
            if self.starts_with(b"*/") {
                self.bump_n(2);
                return Ok(());
            }
            if self.bump().is_none() {
                return Err(LexError::UnterminatedComment { line });
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Identifier or keyword.
    Word,
    /// `@name`, `@@scope.name`.
    Variable,
    /// Single- or double-quoted string.
    String,
    /// Backtick-quoted identifier.
    QuotedIdent,
    Number,
    /// Punctuation or operator (`(`, `;`, `:=`, `<=`, ...).
    Punct,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
    pub position: Position,
}

impl Token {
    pub fn text<'s>(&self, src: &'s str) -> &'s str {
        &src[self.start..self.end]
    }

    /// Case-insensitive keyword test; only plain words match.
    pub fn is_word(&self, src: &str, keyword: &str) -> bool {
        self.kind == TokenKind::Word && self.text(src).eq_ignore_ascii_case(keyword)
    }

    pub fn is_punct(&self, src: &str, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text(src) == punct
    }

    /// Words and backtick identifiers can name things (labels, parameters).
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, TokenKind::Word | TokenKind::QuotedIdent)
    }
}

/// Result of tokenizing a text: significant tokens plus the position just
/// past the last byte.
#[derive(Debug, Clone)]
pub struct TokenStream {
    pub tokens: Vec<Token>,
    pub eof: Position,
}

fn is_word_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$' || byte >= 0x80
}

const MULTI_BYTE_OPERATORS: [&[u8]; 9] = [
    b"<=>", b"->>", b":=", b"<=", b">=", b"<>", b"!=", b"->", b"||",
];

/// Ordinary comments in `src`, in source order.
///
/// Executable comments (`/*! ... */`, `/*+ ... */`) are not included.
pub fn comments(src: &str) -> Result<Vec<Unit>, LexError> {
    let mut scanner = Scanner::new(src);
    let mut found = Vec::new();
    while let Some(unit) = scanner.next_unit()? {
        let rest = &src[unit.start..];
        let executable = rest.starts_with("/*!") || rest.starts_with("/*+");
        match unit.kind {
            UnitKind::LineComment => found.push(unit),
            UnitKind::BlockComment if !executable => found.push(unit),
            _ => {}
        }
    }
    Ok(found)
}

/// Split `src` into significant tokens. Whitespace and comments are dropped;
/// token offsets still index into `src`, so slicing between two tokens keeps
/// any comments in between.
pub fn tokenize(src: &str) -> Result<TokenStream, LexError> {
    let mut scanner = Scanner::new(src);
    let mut tokens = Vec::new();

    loop {
        let start = scanner.offset();
        let position = scanner.position();
        let Some(byte) = scanner.peek() else {
            break;
        };

        let kind = if byte.is_ascii_whitespace() {
            scanner.bump();
            None
        } else if byte == b'@' && scanner.peek_at(1).is_some_and(|b| is_word_byte(b) || b == b'@')
        {
            scanner.bump();
            if scanner.peek() == Some(b'@') {
                scanner.bump();
            }
            while scanner
                .peek()
                .is_some_and(|b| is_word_byte(b) || b == b'.')
            {
                scanner.bump();
            }
            Some(TokenKind::Variable)
        } else if byte.is_ascii_digit() {
            while scanner
                .peek()
                .is_some_and(|b| is_word_byte(b) || b == b'.')
            {
                scanner.bump();
            }
            Some(TokenKind::Number)
        } else if is_word_byte(byte) {
            while scanner.peek().is_some_and(is_word_byte) {
                scanner.bump();
            }
            Some(TokenKind::Word)
        } else {
            let unit = scanner.next_unit()?;
            match unit.map(|u| u.kind) {
                Some(UnitKind::Literal(b'`')) => Some(TokenKind::QuotedIdent),
                Some(UnitKind::Literal(_)) => Some(TokenKind::String),
                Some(UnitKind::LineComment | UnitKind::BlockComment) | None => None,
                Some(UnitKind::Byte(_)) => {
                    // Extend single-byte punctuation to a known operator.
                    let rest = &src.as_bytes()[start..];
                    if let Some(op) = MULTI_BYTE_OPERATORS.iter().find(|op| rest.starts_with(op)) {
                        scanner.bump_n(op.len() - 1);
                    }
                    Some(TokenKind::Punct)
                }
            }
        };

        if let Some(kind) = kind {
            tokens.push(Token {
                kind,
                start,
                end: scanner.offset(),
                position,
            });
        }
    }

    Ok(TokenStream {
        tokens,
        eof: scanner.position(),
    })
}

/// Decode a quoted SQL literal: strip the outer quotes, undouble embedded
/// quotes, and resolve backslash escapes.
pub fn unquote_literal(literal: &str) -> String {
    let bytes = literal.as_bytes();
    if bytes.len() < 2 {
        return literal.to_string();
    }
    let quote = bytes[0] as char;
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => {}
            }
        } else if c == quote && chars.peek() == Some(&quote) {
            chars.next();
            out.push(quote);
        } else {
            out.push(c);
        }
    }
    out
}
