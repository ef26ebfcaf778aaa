//! Re-serialization of a routine tree to SQL text.
//!
//! Layout is cosmetic: one tab per nesting level, one statement per line.
//! Opaque text (conditions, expressions, declarations, generic statements)
//! is copied exactly as it was captured, and so are comments. The returned
//! text has no trailing terminator; the pipeline appends the active
//! delimiter. When comments follow the body the text ends with a newline.

use crate::ast::{ConditionalBranch, Parameter, Routine, RoutineKind, Statement, StatementKind};

/// Render a complete `CREATE PROCEDURE` / `CREATE FUNCTION` statement.
///
/// A body of more than one statement is wrapped in `BEGIN ... END`.
pub fn emit_routine(routine: &Routine) -> String {
    let mut out = String::new();

    out.push_str("CREATE");
    if let Some(definer) = &routine.definer {
        out.push(' ');
        out.push_str(definer);
    }
    out.push(' ');
    out.push_str(routine.kind.keyword());
    if routine.if_not_exists {
        out.push_str(" IF NOT EXISTS");
    }
    out.push(' ');
    out.push_str(&routine.name);
    out.push('(');
    let parameters: Vec<String> = routine
        .parameters
        .iter()
        .map(|p| emit_parameter(p, routine.kind))
        .collect();
    out.push_str(&parameters.join(", "));
    out.push_str(")\n");

    if let Some(returns) = &routine.returns {
        out.push_str("RETURNS ");
        out.push_str(returns);
        out.push('\n');
    }
    for characteristic in &routine.characteristics {
        out.push_str(characteristic);
        out.push('\n');
    }

    match routine.body.as_slice() {
        [single] => emit_statement(single, 0, &mut out),
        body => {
            out.push_str("BEGIN\n");
            emit_list(body, 1, &mut out);
            out.push_str("END");
        }
    }
    for comment in &routine.trailing_comments {
        out.push('\n');
        out.push_str(comment);
    }
    if !routine.trailing_comments.is_empty() {
        out.push('\n');
    }
    out
}

fn emit_parameter(parameter: &Parameter, kind: RoutineKind) -> String {
    if kind == RoutineKind::Procedure && parameter.explicit_mode {
        format!(
            "{} {} {}",
            parameter.mode.keyword(),
            parameter.name,
            parameter.type_text
        )
    } else {
        format!("{} {}", parameter.name, parameter.type_text)
    }
}

fn indent(depth: usize, out: &mut String) {
    for _ in 0..depth {
        out.push('\t');
    }
}

/// Members of a compound block, each terminated by `;` except comments.
fn emit_list(list: &[Statement], depth: usize, out: &mut String) {
    for statement in list {
        indent(depth, out);
        emit_statement(statement, depth, out);
        if !statement.is_comment() {
            out.push(';');
        }
        out.push('\n');
    }
}

/// `END <keyword>` followed by the label when the construct has one.
fn emit_end(keyword: Option<&str>, label: Option<&str>, depth: usize, out: &mut String) {
    indent(depth, out);
    out.push_str("END");
    if let Some(keyword) = keyword {
        out.push(' ');
        out.push_str(keyword);
    }
    if let Some(label) = label {
        out.push(' ');
        out.push_str(label);
    }
}

fn emit_branches(
    branches: &[ConditionalBranch],
    keyword: &str,
    depth: usize,
    out: &mut String,
) {
    for branch in branches {
        indent(depth, out);
        out.push_str(keyword);
        out.push(' ');
        out.push_str(&branch.condition);
        out.push_str(" THEN\n");
        emit_list(&branch.body, depth + 1, out);
    }
}

fn emit_else(otherwise: &[Statement], depth: usize, out: &mut String) {
    if !otherwise.is_empty() {
        indent(depth, out);
        out.push_str("ELSE\n");
        emit_list(otherwise, depth + 1, out);
    }
}

/// Render one statement without its terminator. The caller has already
/// written the indentation of the first line.
fn emit_statement(statement: &Statement, depth: usize, out: &mut String) {
    let label = statement.label.as_deref();
    if let Some(label) = label {
        out.push_str(label);
        out.push_str(": ");
    }

    match &statement.kind {
        StatementKind::Begin { body } => {
            out.push_str("BEGIN\n");
            emit_list(body, depth + 1, out);
            emit_end(None, label, depth, out);
        }
        StatementKind::If {
            condition,
            then,
            elseifs,
            otherwise,
        } => {
            out.push_str("IF ");
            out.push_str(condition);
            out.push_str(" THEN\n");
            emit_list(then, depth + 1, out);
            emit_branches(elseifs, "ELSEIF", depth, out);
            emit_else(otherwise, depth, out);
            emit_end(Some("IF"), None, depth, out);
        }
        StatementKind::While { condition, body } => {
            out.push_str("WHILE ");
            out.push_str(condition);
            out.push_str(" DO\n");
            emit_list(body, depth + 1, out);
            emit_end(Some("WHILE"), label, depth, out);
        }
        StatementKind::Loop { body } => {
            out.push_str("LOOP\n");
            emit_list(body, depth + 1, out);
            emit_end(Some("LOOP"), label, depth, out);
        }
        StatementKind::Repeat { body, condition } => {
            out.push_str("REPEAT\n");
            emit_list(body, depth + 1, out);
            indent(depth, out);
            out.push_str("UNTIL ");
            out.push_str(condition);
            out.push('\n');
            emit_end(Some("REPEAT"), label, depth, out);
        }
        StatementKind::Case {
            operand,
            whens,
            otherwise,
        } => {
            out.push_str("CASE");
            if let Some(operand) = operand {
                out.push(' ');
                out.push_str(operand);
            }
            out.push('\n');
            emit_branches(whens, "WHEN", depth, out);
            emit_else(otherwise, depth, out);
            emit_end(Some("CASE"), None, depth, out);
        }
        StatementKind::Leave { target } => {
            out.push_str("LEAVE ");
            out.push_str(target);
        }
        StatementKind::Iterate { target } => {
            out.push_str("ITERATE ");
            out.push_str(target);
        }
        StatementKind::Return { expression } => {
            out.push_str("RETURN ");
            out.push_str(expression);
        }
        StatementKind::SetVariable { assignments } => {
            out.push_str("SET ");
            let rendered: Vec<String> = assignments
                .iter()
                .map(|a| match &a.scope_keyword {
                    Some(scope) => format!(
                        "{} {} {} {}",
                        scope, a.variable_ref, a.operator, a.value_text
                    ),
                    None => format!("{} {} {}", a.variable_ref, a.operator, a.value_text),
                })
                .collect();
            out.push_str(&rendered.join(", "));
        }
        StatementKind::Declare { text }
        | StatementKind::Generic { text }
        | StatementKind::Comment { text } => {
            out.push_str(text);
        }
    }
}
