//! Syntax tree for MySQL stored routines.
//!
//! One tree is built per routine-bearing statement and dropped once the
//! statement has been rewritten. Positions are relative to the statement
//! text handed to the parser; add the statement's start line (minus one)
//! to get a file line.
//!
//! Labels are plain strings on both the labeled construct and the jump
//! (`LEAVE`/`ITERATE`); there are no back-references between nodes.

/// Location of a token inside a statement.
///
/// `line` and `column` are 1-based (column counts bytes), `offset` is the
/// 0-based byte offset from the start of the statement text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn start() -> Self {
        Position {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Procedure,
    Function,
}

impl RoutineKind {
    /// `object_type` value recorded by the ftrace routines.
    pub fn object_type(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "procedure",
            RoutineKind::Function => "function",
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            RoutineKind::Procedure => "PROCEDURE",
            RoutineKind::Function => "FUNCTION",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterMode {
    In,
    Out,
    InOut,
}

impl ParameterMode {
    pub fn keyword(&self) -> &'static str {
        match self {
            ParameterMode::In => "IN",
            ParameterMode::Out => "OUT",
            ParameterMode::InOut => "INOUT",
        }
    }

    /// OUT and INOUT parameters are reported on ftrace exit.
    pub fn is_output(&self) -> bool {
        matches!(self, ParameterMode::Out | ParameterMode::InOut)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub mode: ParameterMode,
    /// Whether the mode keyword was written in the source.
    pub explicit_mode: bool,
    /// Name as written, including backticks if quoted.
    pub name: String,
    /// Type phrase as written, e.g. `DECIMAL(10,2)`.
    pub type_text: String,
}

impl Parameter {
    /// Name with identifier quoting removed.
    pub fn plain_name(&self) -> String {
        unquote_identifier(&self.name)
    }
}

/// A `CREATE PROCEDURE` or `CREATE FUNCTION` statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    pub kind: RoutineKind,
    /// `DEFINER = ...` clause, verbatim.
    pub definer: Option<String>,
    pub if_not_exists: bool,
    /// Name as written (may be schema-qualified or backtick-quoted).
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// Declared return type, functions only.
    pub returns: Option<String>,
    /// Routine characteristics in source order, verbatim.
    pub characteristics: Vec<String>,
    pub body: Vec<Statement>,
    /// Comments between the end of the body and the terminator.
    pub trailing_comments: Vec<String>,
    pub position: Position,
}

impl Routine {
    /// Routine name without schema qualifier or identifier quoting.
    pub fn plain_name(&self) -> String {
        let last = split_qualified(&self.name).pop().unwrap_or_default();
        unquote_identifier(&last)
    }

    /// True when the declared return type is a binary string type.
    ///
    /// Covers the BLOB family, `BINARY`/`VARBINARY`, `LONG VARBINARY`, and
    /// character types declared with `CHARACTER SET binary`.
    pub fn returns_binary(&self) -> bool {
        let Some(returns) = &self.returns else {
            return false;
        };
        let upper = returns.to_ascii_uppercase();
        let words: Vec<&str> = upper
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .filter(|w| !w.is_empty())
            .collect();
        let binary_type = match words.as_slice() {
            ["LONG", "VARBINARY", ..] => true,
            [head, ..] => matches!(
                *head,
                "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY"
            ),
            [] => false,
        };
        binary_type
            || words.windows(3).any(|w| {
                (w[0] == "CHARACTER" || w[0] == "CHAR") && w[1] == "SET" && w[2] == "BINARY"
            })
            || words.windows(2).any(|w| w == ["CHARSET", "BINARY"])
    }
}

/// One statement of a routine body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Prefix label (`label:`), as written.
    pub label: Option<String>,
    /// Position of the first significant token (the label when present).
    pub position: Position,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionalBranch {
    pub condition: String,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableAssignment {
    /// `GLOBAL`, `SESSION`, `LOCAL`, `PERSIST` or `PERSIST_ONLY` when written
    /// as a separate keyword.
    pub scope_keyword: Option<String>,
    pub variable_ref: String,
    /// `=` or `:=`.
    pub operator: String,
    pub value_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    Begin {
        body: Vec<Statement>,
    },
    If {
        condition: String,
        then: Vec<Statement>,
        elseifs: Vec<ConditionalBranch>,
        otherwise: Vec<Statement>,
    },
    While {
        condition: String,
        body: Vec<Statement>,
    },
    Loop {
        body: Vec<Statement>,
    },
    Repeat {
        body: Vec<Statement>,
        condition: String,
    },
    Case {
        operand: Option<String>,
        whens: Vec<ConditionalBranch>,
        otherwise: Vec<Statement>,
    },
    Leave {
        target: String,
    },
    Iterate {
        target: String,
    },
    Return {
        expression: String,
    },
    /// Variable, condition, handler or cursor declaration, verbatim.
    Declare {
        text: String,
    },
    SetVariable {
        assignments: Vec<VariableAssignment>,
    },
    /// Any other statement, verbatim.
    Generic {
        text: String,
    },
    /// A comment standing between statements, verbatim and unterminated.
    Comment {
        text: String,
    },
}

impl StatementKind {
    /// Every nested statement list, in source order.
    pub fn child_lists(&self) -> Vec<&Vec<Statement>> {
        match self {
            StatementKind::Begin { body }
            | StatementKind::While { body, .. }
            | StatementKind::Loop { body }
            | StatementKind::Repeat { body, .. } => vec![body],
            StatementKind::If {
                then,
                elseifs,
                otherwise,
                ..
            } => {
                let mut lists = vec![then];
                lists.extend(elseifs.iter().map(|branch| &branch.body));
                lists.push(otherwise);
                lists
            }
            StatementKind::Case {
                whens, otherwise, ..
            } => {
                let mut lists: Vec<&Vec<Statement>> =
                    whens.iter().map(|branch| &branch.body).collect();
                lists.push(otherwise);
                lists
            }
            _ => Vec::new(),
        }
    }

    /// Mutable variant of [`StatementKind::child_lists`].
    pub fn child_lists_mut(&mut self) -> Vec<&mut Vec<Statement>> {
        match self {
            StatementKind::Begin { body }
            | StatementKind::While { body, .. }
            | StatementKind::Loop { body }
            | StatementKind::Repeat { body, .. } => vec![body],
            StatementKind::If {
                then,
                elseifs,
                otherwise,
                ..
            } => {
                let mut lists = vec![then];
                lists.extend(elseifs.iter_mut().map(|branch| &mut branch.body));
                lists.push(otherwise);
                lists
            }
            StatementKind::Case {
                whens, otherwise, ..
            } => {
                let mut lists: Vec<&mut Vec<Statement>> =
                    whens.iter_mut().map(|branch| &mut branch.body).collect();
                lists.push(otherwise);
                lists
            }
            _ => Vec::new(),
        }
    }
}

impl Statement {
    pub fn new(position: Position, kind: StatementKind) -> Self {
        Statement {
            label: None,
            position,
            kind,
        }
    }

    pub fn generic(text: impl Into<String>, position: Position) -> Self {
        Statement::new(position, StatementKind::Generic { text: text.into() })
    }

    /// Statements that get a coverage probe. `DECLARE`, `BEGIN` and
    /// comments do not.
    pub fn is_instrumentable(&self) -> bool {
        !matches!(
            self.kind,
            StatementKind::Declare { .. }
                | StatementKind::Begin { .. }
                | StatementKind::Comment { .. }
        )
    }

    pub fn is_comment(&self) -> bool {
        matches!(self.kind, StatementKind::Comment { .. })
    }

    pub fn is_declare(&self) -> bool {
        matches!(self.kind, StatementKind::Declare { .. })
    }

    pub fn is_return(&self) -> bool {
        matches!(self.kind, StatementKind::Return { .. })
    }
}

/// Strip backticks (or double quotes) from an identifier, undoubling
/// embedded quote characters.
pub fn unquote_identifier(ident: &str) -> String {
    let bytes = ident.as_bytes();
    if bytes.len() >= 2 {
        let quote = bytes[0];
        if (quote == b'`' || quote == b'"') && bytes[bytes.len() - 1] == quote {
            let inner = &ident[1..ident.len() - 1];
            let q = quote as char;
            return inner.replace(&format!("{}{}", q, q), &q.to_string());
        }
    }
    ident.to_string()
}

/// Labels compare case-insensitively, ignoring identifier quoting.
pub fn labels_match(a: &str, b: &str) -> bool {
    unquote_identifier(a).eq_ignore_ascii_case(&unquote_identifier(b))
}

/// Split `schema.name` on dots outside backticks.
fn split_qualified(name: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    for c in name.chars() {
        match c {
            '`' => {
                in_quote = !in_quote;
                current.push(c);
            }
            '.' if !in_quote => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}
