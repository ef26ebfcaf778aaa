//! Flow parser for stored routine definitions.
//!
//! A hand-written recursive-descent parser over the shared token stream.
//! Only `CREATE PROCEDURE` and `CREATE FUNCTION` are parsed; any other
//! statement is reported as [`Parsed::Passthrough`] and copied verbatim by
//! the pipeline.
//!
//! Expressions are never parsed. Conditions, `RETURN` expressions, SET
//! values and opaque statements are captured as source slices, located by
//! scanning for a keyword or terminator at parenthesis depth zero.

use crate::ast::{
    labels_match, ConditionalBranch, Parameter, ParameterMode, Position, Routine, RoutineKind,
    Statement, StatementKind, VariableAssignment,
};
use crate::error::ParseError;
use crate::lexer::{comments, tokenize, Token, TokenKind};

/// Result of parsing one SQL statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Parsed {
    Routine(Routine),
    /// Not a routine definition; leave the statement untouched.
    Passthrough,
}

/// Keywords that close a statement list.
const LIST_TERMINATORS: [&str; 5] = ["END", "ELSE", "ELSEIF", "WHEN", "UNTIL"];

/// Constructs that accept a `label:` prefix.
const LABELABLE: [&str; 5] = ["BEGIN", "LOOP", "WHILE", "REPEAT", "CASE"];

/// Words that never name an end label.
const NOT_LABELS: [&str; 9] = [
    "END", "ELSE", "ELSEIF", "WHEN", "UNTIL", "IF", "LOOP", "WHILE", "REPEAT",
];

const TYPE_MODIFIERS: [&str; 8] = [
    "UNSIGNED", "SIGNED", "ZEROFILL", "BINARY", "ASCII", "UNICODE", "PRECISION", "VARYING",
];

const CHARACTERISTICS: [&[&str]; 9] = [
    &["LANGUAGE", "SQL"],
    &["NOT", "DETERMINISTIC"],
    &["DETERMINISTIC"],
    &["CONTAINS", "SQL"],
    &["NO", "SQL"],
    &["READS", "SQL", "DATA"],
    &["MODIFIES", "SQL", "DATA"],
    &["SQL", "SECURITY", "DEFINER"],
    &["SQL", "SECURITY", "INVOKER"],
];

/// `SET` forms that are not variable assignments.
const SET_NON_ASSIGNMENT: [&str; 8] = [
    "NAMES",
    "CHARACTER",
    "CHARSET",
    "TRANSACTION",
    "PASSWORD",
    "ROLE",
    "DEFAULT",
    "RESOURCE",
];

const SET_SCOPES: [&str; 5] = ["GLOBAL", "SESSION", "LOCAL", "PERSIST", "PERSIST_ONLY"];

const HANDLER_ACTIONS: [&str; 3] = ["CONTINUE", "EXIT", "UNDO"];

/// Parse one statement as produced by the splitter.
pub fn parse_statement(src: &str) -> Result<Parsed, ParseError> {
    let stream = tokenize(src)?;
    let mut parser = Parser {
        src,
        tokens: stream.tokens,
        pos: 0,
        eof: stream.eof,
    };
    parser.parse_create()
}

struct Parser<'a> {
    src: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    eof: Position,
}

impl<'a> Parser<'a> {
    // ------------------------------------------------------------------
    // Token helpers
    // ------------------------------------------------------------------

    fn peek(&self) -> Option<Token> {
        self.tokens.get(self.pos).copied()
    }

    fn nth(&self, n: usize) -> Option<Token> {
        self.tokens.get(self.pos + n).copied()
    }

    fn nth_is_word(&self, n: usize, keyword: &str) -> bool {
        self.nth(n).is_some_and(|t| t.is_word(self.src, keyword))
    }

    fn at_word(&self, keyword: &str) -> bool {
        self.nth_is_word(0, keyword)
    }

    fn at_any_word(&self, keywords: &[&str]) -> bool {
        keywords.iter().any(|kw| self.at_word(kw))
    }

    fn at_punct(&self, punct: &str) -> bool {
        self.peek().is_some_and(|t| t.is_punct(self.src, punct))
    }

    fn eat_word(&mut self, keyword: &str) -> bool {
        if self.at_word(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume a keyword sequence only if every word matches.
    fn eat_words(&mut self, sequence: &[&str]) -> bool {
        let matched = sequence
            .iter()
            .enumerate()
            .all(|(i, kw)| self.nth_is_word(i, kw));
        if matched {
            self.pos += sequence.len();
        }
        matched
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.at_punct(punct) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, keyword: &str) -> Result<(), ParseError> {
        if self.eat_word(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", keyword)))
        }
    }

    fn expect_words(&mut self, sequence: &[&str]) -> Result<(), ParseError> {
        if self.eat_words(sequence) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected {}", sequence.join(" "))))
        }
    }

    fn current_position(&self) -> Position {
        self.peek().map(|t| t.position).unwrap_or(self.eof)
    }

    fn unexpected(&self, expected: &str) -> ParseError {
        let found = match self.peek() {
            Some(token) => format!("`{}`", token.text(self.src)),
            None => "end of input".to_string(),
        };
        ParseError::new(
            self.current_position(),
            format!("{}, found {}", expected, found),
        )
    }

    /// Source text covering tokens `from..to`, comments in between included.
    /// Byte offset just past the last consumed token.
    fn consumed_end(&self) -> usize {
        self.pos.checked_sub(1).map_or(0, |i| self.tokens[i].end)
    }

    fn position_at(&self, offset: usize) -> Position {
        let before = &self.src[..offset];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        Position {
            line: before.matches('\n').count() + 1,
            column: offset - line_start + 1,
            offset,
        }
    }

    /// Comments from byte offset `from` up to the next token.
    fn comments_from(&self, from: usize) -> Result<Vec<(Position, String)>, ParseError> {
        let to = self.peek().map_or(self.src.len(), |t| t.start);
        let gap = &self.src[from..to];
        Ok(comments(gap)?
            .into_iter()
            .map(|unit| {
                (
                    self.position_at(from + unit.start),
                    gap[unit.start..unit.end].to_string(),
                )
            })
            .collect())
    }

    fn text(&self, from: usize, to: usize) -> String {
        if from >= to {
            return String::new();
        }
        self.src[self.tokens[from].start..self.tokens[to - 1].end].to_string()
    }

    fn keyword(&self) -> Option<String> {
        self.peek()
            .filter(|t| t.kind == TokenKind::Word)
            .map(|t| t.text(self.src).to_ascii_uppercase())
    }

    /// Advance to the next `;` at parenthesis depth zero (or end of input)
    /// and return the token range passed over.
    fn scan_to_terminator(&mut self) -> (usize, usize) {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            if token.is_punct(self.src, "(") {
                depth += 1;
            } else if token.is_punct(self.src, ")") {
                depth = depth.saturating_sub(1);
            } else if depth == 0 && token.is_punct(self.src, ";") {
                break;
            }
            self.pos += 1;
        }
        (start, self.pos)
    }

    /// Capture an expression up to one of `stops` at depth zero.
    ///
    /// Keywords inside parentheses and inside `CASE ... END` expressions do
    /// not stop the scan.
    fn scan_condition(&mut self, stops: &[&str]) -> Result<String, ParseError> {
        let start = self.pos;
        let mut depth = 0usize;
        let mut cases = 0usize;
        loop {
            let Some(token) = self.peek() else {
                return Err(self.unexpected(&format!("expected {}", stops.join(" or "))));
            };
            if depth == 0 && cases == 0 && stops.iter().any(|kw| token.is_word(self.src, kw)) {
                break;
            }
            if token.is_punct(self.src, "(") {
                depth += 1;
            } else if token.is_punct(self.src, ")") {
                if depth == 0 {
                    return Err(ParseError::new(token.position, "unbalanced `)`"));
                }
                depth -= 1;
            } else if depth == 0 && token.is_punct(self.src, ";") {
                return Err(self.unexpected(&format!("expected {}", stops.join(" or "))));
            } else if token.is_word(self.src, "CASE") {
                cases += 1;
            } else if cases > 0 && token.is_word(self.src, "END") {
                cases -= 1;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(self.unexpected("expected condition"));
        }
        Ok(self.text(start, self.pos))
    }

    fn skip_parens(&mut self) -> Result<(), ParseError> {
        let open = self.current_position();
        let mut depth = 0usize;
        while let Some(token) = self.peek() {
            self.pos += 1;
            if token.is_punct(self.src, "(") {
                depth += 1;
            } else if token.is_punct(self.src, ")") {
                depth -= 1;
                if depth == 0 {
                    return Ok(());
                }
            }
        }
        Err(ParseError::new(open, "unbalanced `(`"))
    }

    // ------------------------------------------------------------------
    // Routine header
    // ------------------------------------------------------------------

    fn parse_create(&mut self) -> Result<Parsed, ParseError> {
        let Some(create) = self.peek() else {
            return Ok(Parsed::Passthrough);
        };
        if !create.is_word(self.src, "CREATE") {
            return Ok(Parsed::Passthrough);
        }
        self.pos += 1;

        let definer = if self.at_word("DEFINER") {
            match self.parse_definer() {
                Some(definer) => Some(definer),
                None => return Ok(Parsed::Passthrough),
            }
        } else {
            None
        };

        let kind = if self.eat_word("PROCEDURE") {
            RoutineKind::Procedure
        } else if self.eat_word("FUNCTION") {
            RoutineKind::Function
        } else {
            // AGGREGATE FUNCTION, TABLE, VIEW, TRIGGER, ...
            return Ok(Parsed::Passthrough);
        };

        let if_not_exists = self.eat_words(&["IF", "NOT", "EXISTS"]);
        let Some(name) = self.parse_qualified_name() else {
            return Ok(Parsed::Passthrough);
        };
        if !self.at_punct("(") {
            // loadable function: `CREATE FUNCTION f RETURNS STRING SONAME ...`
            return Ok(Parsed::Passthrough);
        }

        let parameters = self.parse_parameters(kind)?;
        let returns = match kind {
            RoutineKind::Function => {
                self.expect_word("RETURNS")?;
                Some(self.parse_return_type()?)
            }
            RoutineKind::Procedure => None,
        };
        let characteristics = self.parse_characteristics();

        if self.peek().is_none() {
            return Err(self.unexpected("expected routine body"));
        }
        let body = self.parse_statement()?;
        let body_end = self.consumed_end();
        while self.eat_punct(";") {}
        if self.peek().is_some() {
            return Err(self.unexpected("expected end of routine"));
        }
        let trailing_comments = self
            .comments_from(body_end)?
            .into_iter()
            .map(|(_, text)| text)
            .collect();

        Ok(Parsed::Routine(Routine {
            kind,
            definer,
            if_not_exists,
            name,
            parameters,
            returns,
            characteristics,
            body: vec![body],
            trailing_comments,
            position: create.position,
        }))
    }

    /// `DEFINER = user`, where user is `name`, `'name'@'host'`,
    /// `name@host` or `CURRENT_USER[()]`.
    fn parse_definer(&mut self) -> Option<String> {
        let start = self.pos;
        self.pos += 1;
        if !self.eat_punct("=") {
            return None;
        }
        let user = self.peek()?;
        self.pos += 1;
        if user.is_word(self.src, "CURRENT_USER") && self.at_punct("(") {
            self.pos += 1;
            if !self.eat_punct(")") {
                return None;
            }
        } else if self.peek().is_some_and(|t| t.kind == TokenKind::Variable) {
            self.pos += 1;
        } else if self.eat_punct("@") {
            self.peek()?;
            self.pos += 1;
        }
        Some(self.text(start, self.pos))
    }

    fn parse_qualified_name(&mut self) -> Option<String> {
        let start = self.pos;
        if !self.peek()?.is_identifier() {
            return None;
        }
        self.pos += 1;
        while self.at_punct(".") && self.nth(1).is_some_and(|t| t.is_identifier()) {
            self.pos += 2;
        }
        Some(self.text(start, self.pos))
    }

    fn parse_parameters(&mut self, kind: RoutineKind) -> Result<Vec<Parameter>, ParseError> {
        self.pos += 1; // (
        let mut parameters = Vec::new();
        if self.eat_punct(")") {
            return Ok(parameters);
        }

        loop {
            let mode_token = self.peek().filter(|_| {
                self.at_any_word(&["IN", "OUT", "INOUT"])
                    && self.nth(1).is_some_and(|t| t.is_identifier())
            });
            let mode = match mode_token {
                Some(token) => {
                    if kind == RoutineKind::Function {
                        return Err(ParseError::new(
                            token.position,
                            "parameter modes are not allowed for functions",
                        ));
                    }
                    self.pos += 1;
                    match token.text(self.src).to_ascii_uppercase().as_str() {
                        "OUT" => ParameterMode::Out,
                        "INOUT" => ParameterMode::InOut,
                        _ => ParameterMode::In,
                    }
                }
                None => ParameterMode::In,
            };

            let name = match self.peek() {
                Some(token) if token.is_identifier() => {
                    self.pos += 1;
                    token.text(self.src).to_string()
                }
                _ => return Err(self.unexpected("expected parameter name")),
            };

            let type_start = self.pos;
            let mut depth = 0usize;
            loop {
                let Some(token) = self.peek() else {
                    return Err(self.unexpected("expected `)` closing the parameter list"));
                };
                if depth == 0 && (token.is_punct(self.src, ",") || token.is_punct(self.src, ")")) {
                    break;
                }
                if token.is_punct(self.src, "(") {
                    depth += 1;
                } else if token.is_punct(self.src, ")") {
                    depth -= 1;
                }
                self.pos += 1;
            }
            if self.pos == type_start {
                return Err(self.unexpected("expected parameter type"));
            }

            parameters.push(Parameter {
                mode,
                explicit_mode: mode_token.is_some(),
                name,
                type_text: self.text(type_start, self.pos),
            });

            if self.eat_punct(")") {
                return Ok(parameters);
            }
            self.pos += 1; // ,
        }
    }

    fn parse_return_type(&mut self) -> Result<String, ParseError> {
        let start = self.pos;
        match self.peek() {
            Some(token) if token.kind == TokenKind::Word => self.pos += 1,
            _ => return Err(self.unexpected("expected return type")),
        }
        let head = self.tokens[start].text(self.src).to_ascii_uppercase();
        if head == "NATIONAL" || (head == "LONG" && self.at_any_word(&["VARCHAR", "VARBINARY"])) {
            self.pos += 1;
        }
        if self.at_punct("(") {
            self.skip_parens()?;
        }

        loop {
            if self.at_any_word(&TYPE_MODIFIERS) {
                self.pos += 1;
            } else if self.eat_word("CHARSET")
                || self.eat_word("COLLATE")
                || self.eat_words(&["CHARACTER", "SET"])
                || self.eat_words(&["CHAR", "SET"])
            {
                match self.peek() {
                    Some(token) if token.kind != TokenKind::Punct => self.pos += 1,
                    _ => return Err(self.unexpected("expected character set or collation name")),
                }
            } else {
                break;
            }
        }
        Ok(self.text(start, self.pos))
    }

    fn parse_characteristics(&mut self) -> Vec<String> {
        let mut characteristics = Vec::new();
        loop {
            let start = self.pos;
            if self.at_word("COMMENT") && self.nth(1).is_some_and(|t| t.kind == TokenKind::String)
            {
                self.pos += 2;
            } else if !CHARACTERISTICS.iter().any(|form| self.eat_words(form)) {
                return characteristics;
            }
            characteristics.push(self.text(start, self.pos));
        }
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let Some(first) = self.peek() else {
            return Err(self.unexpected("expected statement"));
        };

        let label = if first.is_identifier() && self.nth(1).is_some_and(|t| t.is_punct(self.src, ":"))
        {
            self.pos += 2;
            if !self.at_any_word(&LABELABLE) {
                return Err(self.unexpected(&format!(
                    "expected BEGIN, LOOP, WHILE, REPEAT or CASE after label `{}`",
                    first.text(self.src)
                )));
            }
            Some(first.text(self.src).to_string())
        } else {
            None
        };

        if self.at_any_word(&LIST_TERMINATORS) {
            return Err(self.unexpected("expected statement"));
        }
        // a label may sit on its own line; the construct keyword is the head
        let position = self.peek().map_or(first.position, |head| head.position);

        let kind = match self.keyword().as_deref() {
            Some("BEGIN") => self.parse_begin(label.as_deref())?,
            Some("IF") => self.parse_if()?,
            Some("WHILE") => self.parse_while(label.as_deref())?,
            Some("LOOP") => self.parse_loop(label.as_deref())?,
            Some("REPEAT") => self.parse_repeat(label.as_deref())?,
            Some("CASE") => self.parse_case(label.as_deref())?,
            Some("LEAVE") => StatementKind::Leave {
                target: self.parse_jump_target()?,
            },
            Some("ITERATE") => StatementKind::Iterate {
                target: self.parse_jump_target()?,
            },
            Some("RETURN") => self.parse_return()?,
            Some("DECLARE") => self.parse_declare()?,
            Some("SET") => self.parse_set(),
            _ => {
                let (from, to) = self.scan_to_terminator();
                StatementKind::Generic {
                    text: self.text(from, to),
                }
            }
        };

        Ok(Statement {
            label,
            position,
            kind,
        })
    }

    /// Statements separated by `;`, up to a list-closing keyword. Comments
    /// between statements are kept as [`StatementKind::Comment`] entries.
    fn parse_list(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut list = Vec::new();
        loop {
            let gap_start = self.consumed_end();
            while self.eat_punct(";") {}
            for (position, text) in self.comments_from(gap_start)? {
                list.push(Statement::new(position, StatementKind::Comment { text }));
            }
            if self.peek().is_none() || self.at_any_word(&LIST_TERMINATORS) {
                return Ok(list);
            }
            list.push(self.parse_statement()?);
            if !self.eat_punct(";") {
                return Err(self.unexpected("expected `;`"));
            }
        }
    }

    /// Optional label repeated after a closing `END ...`.
    fn parse_end_label(&mut self, label: Option<&str>) -> Result<(), ParseError> {
        let Some(token) = self.peek() else {
            return Ok(());
        };
        if !token.is_identifier() || NOT_LABELS.iter().any(|kw| token.is_word(self.src, kw)) {
            return Ok(());
        }
        self.pos += 1;
        let end_label = token.text(self.src);
        match label {
            Some(open) if labels_match(open, end_label) => Ok(()),
            Some(open) => Err(ParseError::new(
                token.position,
                format!("end label `{}` does not match `{}`", end_label, open),
            )),
            None => Err(ParseError::new(
                token.position,
                format!("end label `{}` has no matching begin label", end_label),
            )),
        }
    }

    fn parse_begin(&mut self, label: Option<&str>) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let body = self.parse_list()?;
        self.expect_word("END")?;
        self.parse_end_label(label)?;
        Ok(StatementKind::Begin { body })
    }

    fn parse_if(&mut self) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let condition = self.scan_condition(&["THEN"])?;
        self.expect_word("THEN")?;
        let then = self.parse_list()?;

        let mut elseifs = Vec::new();
        while self.eat_word("ELSEIF") {
            let condition = self.scan_condition(&["THEN"])?;
            self.expect_word("THEN")?;
            let body = self.parse_list()?;
            elseifs.push(ConditionalBranch { condition, body });
        }

        let otherwise = if self.eat_word("ELSE") {
            self.parse_list()?
        } else {
            Vec::new()
        };
        self.expect_words(&["END", "IF"])?;

        Ok(StatementKind::If {
            condition,
            then,
            elseifs,
            otherwise,
        })
    }

    fn parse_while(&mut self, label: Option<&str>) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let condition = self.scan_condition(&["DO"])?;
        self.expect_word("DO")?;
        let body = self.parse_list()?;
        self.expect_words(&["END", "WHILE"])?;
        self.parse_end_label(label)?;
        Ok(StatementKind::While { condition, body })
    }

    fn parse_loop(&mut self, label: Option<&str>) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let body = self.parse_list()?;
        self.expect_words(&["END", "LOOP"])?;
        self.parse_end_label(label)?;
        Ok(StatementKind::Loop { body })
    }

    fn parse_repeat(&mut self, label: Option<&str>) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let body = self.parse_list()?;
        self.expect_word("UNTIL")?;
        let condition = self.scan_condition(&["END"])?;
        self.expect_words(&["END", "REPEAT"])?;
        self.parse_end_label(label)?;
        Ok(StatementKind::Repeat { body, condition })
    }

    fn parse_case(&mut self, label: Option<&str>) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let operand = if self.at_word("WHEN") {
            None
        } else {
            Some(self.scan_condition(&["WHEN"])?)
        };

        let mut whens = Vec::new();
        while self.eat_word("WHEN") {
            let condition = self.scan_condition(&["THEN"])?;
            self.expect_word("THEN")?;
            let body = self.parse_list()?;
            whens.push(ConditionalBranch { condition, body });
        }
        if whens.is_empty() {
            return Err(self.unexpected("expected WHEN"));
        }

        let otherwise = if self.eat_word("ELSE") {
            self.parse_list()?
        } else {
            Vec::new()
        };
        self.expect_words(&["END", "CASE"])?;
        self.parse_end_label(label)?;

        Ok(StatementKind::Case {
            operand,
            whens,
            otherwise,
        })
    }

    fn parse_jump_target(&mut self) -> Result<String, ParseError> {
        self.pos += 1;
        match self.peek() {
            Some(token) if token.is_identifier() => {
                self.pos += 1;
                Ok(token.text(self.src).to_string())
            }
            _ => Err(self.unexpected("expected label")),
        }
    }

    fn parse_return(&mut self) -> Result<StatementKind, ParseError> {
        self.pos += 1;
        let (from, to) = self.scan_to_terminator();
        if from == to {
            return Err(self.unexpected("expected expression after RETURN"));
        }
        Ok(StatementKind::Return {
            expression: self.text(from, to),
        })
    }

    /// Declarations are opaque. A cursor declaration keeps its whole
    /// `SELECT`; a handler keeps its body statement, compound or not.
    fn parse_declare(&mut self) -> Result<StatementKind, ParseError> {
        let start = self.pos;
        let is_handler = self
            .nth(1)
            .is_some_and(|t| HANDLER_ACTIONS.iter().any(|kw| t.is_word(self.src, kw)))
            && self.nth_is_word(2, "HANDLER");

        if is_handler {
            self.pos += 3;
            self.expect_word("FOR")?;
            loop {
                self.parse_handler_condition()?;
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.parse_statement()?;
        } else {
            self.pos += 1;
            let (from, to) = self.scan_to_terminator();
            if from == to {
                return Err(self.unexpected("expected declaration"));
            }
        }

        Ok(StatementKind::Declare {
            text: self.text(start, self.pos),
        })
    }

    fn parse_handler_condition(&mut self) -> Result<(), ParseError> {
        if self.eat_word("SQLSTATE") {
            self.eat_word("VALUE");
            return match self.peek() {
                Some(token) if token.kind == TokenKind::String => {
                    self.pos += 1;
                    Ok(())
                }
                _ => Err(self.unexpected("expected SQLSTATE value")),
            };
        }
        if self.eat_words(&["NOT", "FOUND"]) {
            return Ok(());
        }
        match self.peek() {
            Some(token) if token.is_identifier() || token.kind == TokenKind::Number => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(self.unexpected("expected handler condition")),
        }
    }

    /// `SET` with variable assignments becomes [`StatementKind::SetVariable`];
    /// every other form stays an opaque statement.
    fn parse_set(&mut self) -> StatementKind {
        let start = self.pos;
        self.pos += 1;
        let (from, to) = self.scan_to_terminator();
        match self.split_assignments(from, to) {
            Some(assignments) => StatementKind::SetVariable { assignments },
            None => StatementKind::Generic {
                text: self.text(start, to),
            },
        }
    }

    fn split_assignments(&self, from: usize, to: usize) -> Option<Vec<VariableAssignment>> {
        let first = self.tokens.get(from).filter(|_| from < to)?;
        if SET_NON_ASSIGNMENT.iter().any(|kw| first.is_word(self.src, kw)) {
            return None;
        }
        let scoped_transaction = SET_SCOPES.iter().any(|kw| first.is_word(self.src, kw))
            && self
                .tokens
                .get(from + 1)
                .is_some_and(|t| t.is_word(self.src, "TRANSACTION"));
        if scoped_transaction {
            return None;
        }

        let mut groups = Vec::new();
        let mut depth = 0usize;
        let mut group_start = from;
        for i in from..to {
            let token = &self.tokens[i];
            if token.is_punct(self.src, "(") {
                depth += 1;
            } else if token.is_punct(self.src, ")") {
                depth = depth.saturating_sub(1);
            } else if depth == 0 && token.is_punct(self.src, ",") {
                groups.push((group_start, i));
                group_start = i + 1;
            }
        }
        groups.push((group_start, to));

        groups
            .into_iter()
            .map(|(a, b)| self.assignment(a, b))
            .collect()
    }

    fn assignment(&self, from: usize, to: usize) -> Option<VariableAssignment> {
        let is_operator =
            |token: &Token| token.is_punct(self.src, "=") || token.is_punct(self.src, ":=");

        let mut from = from;
        let scope_keyword = match self.tokens.get(from) {
            Some(token)
                if from + 1 < to
                    && SET_SCOPES.iter().any(|kw| token.is_word(self.src, kw))
                    && !is_operator(&self.tokens[from + 1]) =>
            {
                from += 1;
                Some(token.text(self.src).to_string())
            }
            _ => None,
        };

        let operator = (from..to).find(|&i| is_operator(&self.tokens[i]))?;
        if operator == from || operator + 1 >= to {
            return None;
        }
        Some(VariableAssignment {
            scope_keyword,
            variable_ref: self.text(from, operator),
            operator: self.tokens[operator].text(self.src).to_string(),
            value_text: self.text(operator + 1, to),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn routine(src: &str) -> Routine {
        match parse_statement(src).unwrap() {
            Parsed::Routine(routine) => routine,
            Parsed::Passthrough => panic!("expected a routine: {}", src),
        }
    }

    /// Statements of a procedure body `BEGIN <inner> END`.
    fn block(inner: &str) -> Vec<Statement> {
        let routine = routine(&format!("CREATE PROCEDURE p()\nBEGIN\n{}\nEND", inner));
        match routine.body.into_iter().next().map(|s| s.kind) {
            Some(StatementKind::Begin { body }) => body,
            other => panic!("expected BEGIN body, got {:?}", other),
        }
    }

    fn parse_error(src: &str) -> ParseError {
        parse_statement(src).unwrap_err()
    }

    #[test]
    fn test_if_condition_ignores_then_in_literals_and_case() {
        let body = block(
            r#"IF IF((SELECT CASE "THEN" WHEN "THEN" THEN "(" ELSE "" END) = "(", TRUE, FALSE) THEN SET @a=1; END IF;"#,
        );
        assert_eq!(body.len(), 1);
        match &body[0].kind {
            StatementKind::If {
                condition, then, ..
            } => {
                assert_eq!(
                    condition,
                    r#"IF((SELECT CASE "THEN" WHEN "THEN" THEN "(" ELSE "" END) = "(", TRUE, FALSE)"#
                );
                assert_eq!(then.len(), 1);
            }
            other => panic!("expected IF, got {:?}", other),
        }
    }

    #[test]
    fn test_cursor_declaration_is_one_leaf() {
        let body = block(
            "DECLARE element_cursor CURSOR FOR SELECT i FROM t WHERE i IN (SELECT j FROM u) ORDER BY i;\nOPEN element_cursor;",
        );
        assert_eq!(body.len(), 2);
        assert_eq!(
            body[0].kind,
            StatementKind::Declare {
                text: "DECLARE element_cursor CURSOR FOR SELECT i FROM t WHERE i IN (SELECT j FROM u) ORDER BY i".into()
            }
        );
        assert_eq!(
            body[1].kind,
            StatementKind::Generic {
                text: "OPEN element_cursor".into()
            }
        );
    }

    #[test]
    fn test_labeled_loop_and_leave() {
        let body = block("loop_label: LOOP\n  LEAVE loop_label;\nEND LOOP;");
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].label.as_deref(), Some("loop_label"));
        match &body[0].kind {
            StatementKind::Loop { body } => {
                assert_eq!(
                    body[0].kind,
                    StatementKind::Leave {
                        target: "loop_label".into()
                    }
                );
            }
            other => panic!("expected LOOP, got {:?}", other),
        }
    }

    #[test]
    fn test_labeled_statement_position_is_its_keyword() {
        let body = block("outer_l:\nWHILE i < 3 DO\n  LEAVE outer_l;\nEND WHILE outer_l;");
        assert_eq!(body[0].label.as_deref(), Some("outer_l"));
        assert_eq!(body[0].position.line, 4);

        let body = block("l1: LOOP LEAVE l1; END LOOP;");
        assert_eq!(body[0].position.line, 3);
        assert_eq!(body[0].position.column, 5);
    }

    #[test]
    fn test_end_label_may_repeat_opening_label() {
        let body = block("l1: WHILE i < 3 DO SET i = i + 1; END WHILE l1;");
        assert_eq!(body[0].label.as_deref(), Some("l1"));

        let err = parse_error("CREATE PROCEDURE p() l1: BEGIN SELECT 1; END l2");
        assert!(err.message.contains("does not match"), "{}", err);
    }

    #[test]
    fn test_multi_assignment_set() {
        let body = block("SET GLOBAL max_x = 10, @y := (1, 2), z = 'a,b';");
        match &body[0].kind {
            StatementKind::SetVariable { assignments } => {
                assert_eq!(assignments.len(), 3);
                assert_eq!(assignments[0].scope_keyword.as_deref(), Some("GLOBAL"));
                assert_eq!(assignments[0].variable_ref, "max_x");
                assert_eq!(assignments[0].operator, "=");
                assert_eq!(assignments[0].value_text, "10");
                assert_eq!(assignments[1].scope_keyword, None);
                assert_eq!(assignments[1].variable_ref, "@y");
                assert_eq!(assignments[1].operator, ":=");
                assert_eq!(assignments[1].value_text, "(1, 2)");
                assert_eq!(assignments[2].value_text, "'a,b'");
            }
            other => panic!("expected SET, got {:?}", other),
        }
    }

    #[test]
    fn test_non_assignment_set_forms_are_generic() {
        let body = block("SET NAMES utf8mb4;\nSET SESSION TRANSACTION ISOLATION LEVEL READ COMMITTED;");
        assert_eq!(
            body[0].kind,
            StatementKind::Generic {
                text: "SET NAMES utf8mb4".into()
            }
        );
        assert!(matches!(body[1].kind, StatementKind::Generic { .. }));
    }

    #[test]
    fn test_function_header() {
        let routine = routine(
            "CREATE DEFINER=`root`@`%` FUNCTION IF NOT EXISTS `db`.`add one`(x INT, y DECIMAL(10,2))\n\
             RETURNS VARCHAR(20) CHARSET utf8mb4\n\
             DETERMINISTIC READS SQL DATA COMMENT 'adds one'\n\
             RETURN x + 1",
        );
        assert_eq!(routine.kind, RoutineKind::Function);
        assert_eq!(routine.definer.as_deref(), Some("DEFINER=`root`@`%`"));
        assert!(routine.if_not_exists);
        assert_eq!(routine.name, "`db`.`add one`");
        assert_eq!(routine.plain_name(), "add one");
        assert_eq!(routine.parameters.len(), 2);
        assert_eq!(routine.parameters[1].type_text, "DECIMAL(10,2)");
        assert_eq!(routine.returns.as_deref(), Some("VARCHAR(20) CHARSET utf8mb4"));
        assert_eq!(
            routine.characteristics,
            vec!["DETERMINISTIC", "READS SQL DATA", "COMMENT 'adds one'"]
        );
        assert_eq!(
            routine.body[0].kind,
            StatementKind::Return {
                expression: "x + 1".into()
            }
        );
    }

    #[test]
    fn test_procedure_parameter_modes() {
        let routine = routine("CREATE PROCEDURE p(a INT, OUT b INT, INOUT c TEXT, IN d INT) SELECT 1");
        let modes: Vec<ParameterMode> = routine.parameters.iter().map(|p| p.mode).collect();
        assert_eq!(
            modes,
            vec![
                ParameterMode::In,
                ParameterMode::Out,
                ParameterMode::InOut,
                ParameterMode::In
            ]
        );
        assert!(!routine.parameters[0].explicit_mode);
        assert!(routine.parameters[3].explicit_mode);
    }

    #[test]
    fn test_function_parameter_mode_is_rejected() {
        let err = parse_error("CREATE FUNCTION f(IN x INT) RETURNS INT RETURN x");
        assert!(err.message.contains("not allowed"));
    }

    #[test]
    fn test_non_routine_statements_pass_through() {
        for src in [
            "SELECT 1",
            "CREATE TABLE t (a INT)",
            "CREATE AGGREGATE FUNCTION f RETURNS STRING SONAME 'udf.so'",
            "CREATE FUNCTION metaphon RETURNS STRING SONAME 'udf_example.so'",
            "CREATE DEFINER=CURRENT_USER VIEW v AS SELECT 1",
            "-- just a comment",
        ] {
            assert_eq!(parse_statement(src).unwrap(), Parsed::Passthrough, "{}", src);
        }
    }

    #[test]
    fn test_handler_with_compound_body_is_one_declaration() {
        let body = block(
            "DECLARE done INT DEFAULT FALSE;\n\
             DECLARE CONTINUE HANDLER FOR SQLSTATE '02000', NOT FOUND BEGIN SET done = TRUE; END;\n\
             SELECT done;",
        );
        assert_eq!(body.len(), 3);
        match &body[1].kind {
            StatementKind::Declare { text } => {
                assert!(text.starts_with("DECLARE CONTINUE HANDLER"));
                assert!(text.ends_with("END"));
            }
            other => panic!("expected DECLARE, got {:?}", other),
        }
    }

    #[test]
    fn test_case_forms() {
        let body = block(
            "CASE x WHEN 1 THEN SELECT 'one'; WHEN 2 THEN SELECT 'two'; ELSE SELECT 'many'; END CASE;\n\
             CASE WHEN x > (CASE WHEN y THEN 1 ELSE 2 END) THEN SELECT 1; END CASE;",
        );
        match &body[0].kind {
            StatementKind::Case {
                operand,
                whens,
                otherwise,
            } => {
                assert_eq!(operand.as_deref(), Some("x"));
                assert_eq!(whens.len(), 2);
                assert_eq!(otherwise.len(), 1);
            }
            other => panic!("expected CASE, got {:?}", other),
        }
        match &body[1].kind {
            StatementKind::Case { operand, whens, .. } => {
                assert_eq!(*operand, None);
                assert_eq!(whens[0].condition, "x > (CASE WHEN y THEN 1 ELSE 2 END)");
            }
            other => panic!("expected CASE, got {:?}", other),
        }
    }

    #[test]
    fn test_repeat_until_with_case_expression() {
        let body = block("REPEAT SET i = i + 1; UNTIL CASE WHEN i > 3 THEN 1 ELSE 0 END END REPEAT;");
        match &body[0].kind {
            StatementKind::Repeat { body, condition } => {
                assert_eq!(body.len(), 1);
                assert_eq!(condition, "CASE WHEN i > 3 THEN 1 ELSE 0 END");
            }
            other => panic!("expected REPEAT, got {:?}", other),
        }
    }

    #[test]
    fn test_if_elseif_else() {
        let body = block("IF a THEN SELECT 1; ELSEIF b THEN SELECT 2; SELECT 3; ELSE SELECT 4; END IF;");
        match &body[0].kind {
            StatementKind::If {
                condition,
                then,
                elseifs,
                otherwise,
            } => {
                assert_eq!(condition, "a");
                assert_eq!(then.len(), 1);
                assert_eq!(elseifs.len(), 1);
                assert_eq!(elseifs[0].condition, "b");
                assert_eq!(elseifs[0].body.len(), 2);
                assert_eq!(otherwise.len(), 1);
            }
            other => panic!("expected IF, got {:?}", other),
        }
    }

    #[test]
    fn test_keywords_in_literals_and_comments_are_inert() {
        let body = block("SELECT 'END IF' /* WHILE */, \"THEN\";\n-- END\nSELECT `end`;");
        assert_eq!(body.len(), 3);
        assert_eq!(
            body[0].kind,
            StatementKind::Generic {
                text: "SELECT 'END IF' /* WHILE */, \"THEN\"".into()
            }
        );
        assert_eq!(
            body[1].kind,
            StatementKind::Comment {
                text: "-- END".into()
            }
        );
    }

    #[test]
    fn test_comments_between_statements_are_kept() {
        let body = block("-- first\nSET a = 1; # same line\nIF a THEN\n  /* inside */\n  SELECT 1;\nEND IF;\n/*!50003 SET b = 2 */;");
        let kinds: Vec<&StatementKind> = body.iter().map(|s| &s.kind).collect();
        assert!(matches!(kinds[0], StatementKind::Comment { text } if text == "-- first"));
        assert_eq!(body[0].position.line, 3);
        assert!(matches!(kinds[1], StatementKind::SetVariable { .. }));
        assert!(matches!(kinds[2], StatementKind::Comment { text } if text == "# same line"));
        assert_eq!(body[2].position.line, 4);
        match kinds[3] {
            StatementKind::If { then, .. } => {
                assert_eq!(
                    then[0].kind,
                    StatementKind::Comment {
                        text: "/* inside */".into()
                    }
                );
                assert_eq!(then.len(), 2);
            }
            other => panic!("expected IF, got {:?}", other),
        }
        assert_eq!(body.len(), 4);
    }

    #[test]
    fn test_trailing_comments_after_body() {
        let routine = routine("CREATE PROCEDURE p()\nBEGIN\n  SELECT 1;\nEND -- tail\n/* done */\n");
        assert_eq!(routine.trailing_comments, vec!["-- tail", "/* done */"]);
    }

    #[test]
    fn test_statement_positions_are_relative() {
        let body = block("  SELECT 1;\n\n  RETURN_VALUE_NOT_A_KEYWORD();");
        // block() puts the inner text on line 3
        assert_eq!(body[0].position.line, 3);
        assert_eq!(body[0].position.column, 3);
        assert_eq!(body[1].position.line, 5);
    }

    #[test]
    fn test_errors() {
        let err = parse_error("CREATE PROCEDURE p() BEGIN IF a THEN SELECT 1; END");
        assert!(err.message.contains("expected END IF"), "{}", err);

        let err = parse_error("CREATE PROCEDURE p() BEGIN lbl: SELECT 1; END");
        assert!(err.message.contains("after label `lbl`"), "{}", err);

        let err = parse_error("CREATE PROCEDURE p() BEGIN SELECT 1 END");
        assert!(err.message.contains("expected `;`") || err.message.contains("expected END"));

        let err = parse_error("CREATE FUNCTION f() BEGIN RETURN 1; END");
        assert!(err.message.contains("expected RETURNS"), "{}", err);

        let err = parse_error("CREATE PROCEDURE p()");
        assert!(err.message.contains("expected routine body"), "{}", err);

        let err = parse_error("CREATE PROCEDURE p() BEGIN SELECT 1; END; SELECT 2");
        assert!(err.message.contains("expected end of routine"), "{}", err);
    }

    #[test]
    fn test_error_position_points_at_offending_token() {
        let err = parse_error("CREATE PROCEDURE p()\nBEGIN\n  WHILE x THEN\nEND");
        assert_eq!(err.position.line, 4);
    }
}
