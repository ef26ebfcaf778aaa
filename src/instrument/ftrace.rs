//! Function-trace policy.
//!
//! The executable part of every routine body is bracketed by
//! `CALL __record_ftrace_entry(...)` and `CALL __record_ftrace_exit(...)`.
//! In functions, every `RETURN` is preceded by its own exit call carrying
//! the returned value; a trailing exit is added only when the body does not
//! end in `RETURN`. Procedures always get a trailing exit reporting their
//! OUT and INOUT parameters.
//!
//! Call depth is maintained by the recording procedures, not inline.

use crate::ast::{Parameter, Position, Routine, RoutineKind, Statement, StatementKind};
use crate::error::TransformError;
use crate::lexer::tokenize;
use crate::schema;

use super::{ftrace_call, rewrite_lists, sql_quote, Instrumentation, RoutineContext, RoutineRewrite};

#[derive(Debug, Clone, Copy, Default)]
pub struct FtracePolicy;

/// Everything needed to build entry and exit calls for one routine.
struct Probe<'a> {
    filename: &'a str,
    routine: String,
    object_type: &'static str,
}

impl Probe<'_> {
    fn entry(&self, payload: &str, position: Position) -> Statement {
        Statement::generic(
            ftrace_call(
                schema::RECORD_FTRACE_ENTRY,
                self.filename,
                &self.routine,
                self.object_type,
                payload,
            ),
            position,
        )
    }

    fn exit(&self, payload: &str, position: Position) -> Statement {
        Statement::generic(
            ftrace_call(
                schema::RECORD_FTRACE_EXIT,
                self.filename,
                &self.routine,
                self.object_type,
                payload,
            ),
            position,
        )
    }
}

impl Instrumentation for FtracePolicy {
    fn instrument(
        &self,
        mut routine: Routine,
        context: &RoutineContext<'_>,
    ) -> Result<RoutineRewrite, TransformError> {
        let probe = Probe {
            filename: context.filename,
            routine: routine.plain_name(),
            object_type: routine.kind.object_type(),
        };
        let is_function = routine.kind == RoutineKind::Function;
        let binary = routine.returns_binary();
        let entry_payload = json_object(routine.parameters.iter());
        let procedure_payload = json_object(routine.parameters.iter().filter(|p| p.mode.is_output()));
        let mut probes = 0;

        let body = std::mem::take(&mut routine.body);
        let (prefix, mut tail, tail_label, position) = match <[Statement; 1]>::try_from(body) {
            Ok([Statement {
                label,
                position,
                kind: StatementKind::Begin { body },
            }]) => {
                let split = body
                    .iter()
                    .take_while(|s| s.is_declare() || s.is_comment())
                    .count();
                let mut declarations = body;
                let tail = declarations.split_off(split);
                (declarations, tail, label, position)
            }
            Ok([statement]) => {
                let position = statement.position;
                (Vec::new(), vec![statement], None, position)
            }
            Err(body) => {
                let position = body.first().map(|s| s.position).unwrap_or(routine.position);
                (Vec::new(), body, None, position)
            }
        };

        if is_function {
            rewrite_lists(&mut tail, &mut |list: &mut Vec<Statement>| {
                let original = std::mem::take(list);
                for statement in original {
                    if let StatementKind::Return { expression } = &statement.kind {
                        list.push(probe.exit(&return_payload(expression, binary), statement.position));
                        probes += 1;
                    }
                    list.push(statement);
                }
            });
        }

        let last = tail.iter().rev().find(|s| !s.is_comment());
        let needs_trailing_exit = !is_function || !last.is_some_and(Statement::is_return);
        if needs_trailing_exit {
            let payload = if is_function {
                "NULL"
            } else {
                procedure_payload.as_str()
            };
            let exit = probe.exit(payload, position);
            probes += 1;
            match &tail_label {
                // LEAVE <label> must still reach the exit call
                Some(_) => {
                    tail = vec![
                        Statement {
                            label: tail_label.clone(),
                            position,
                            kind: StatementKind::Begin { body: tail },
                        },
                        exit,
                    ];
                }
                None => tail.push(exit),
            }
        } else if tail_label.is_some() {
            tail = vec![Statement {
                label: tail_label.clone(),
                position,
                kind: StatementKind::Begin { body: tail },
            }];
        }

        let mut statements = prefix;
        statements.push(probe.entry(&entry_payload, position));
        probes += 1;
        statements.extend(tail);

        routine.body = vec![Statement::new(position, StatementKind::Begin { body: statements })];
        Ok(RoutineRewrite { routine, probes })
    }
}

/// `JSON_OBJECT('a', a, ...)` over the given parameters.
fn json_object<'a>(parameters: impl Iterator<Item = &'a Parameter>) -> String {
    let pairs: Vec<String> = parameters
        .map(|p| format!("{}, {}", sql_quote(&p.plain_name()), p.name))
        .collect();
    format!("JSON_OBJECT({})", pairs.join(", "))
}

/// Exit payload for `RETURN <expression>`.
fn return_payload(expression: &str, binary: bool) -> String {
    let tested = if is_atomic(expression) {
        expression.to_string()
    } else {
        format!("({})", expression)
    };
    let rendered = if binary {
        format!("CONCAT('base64:', TO_BASE64({}))", expression)
    } else {
        format!("CAST({} AS CHAR)", expression)
    };
    format!(
        "JSON_QUOTE(CASE WHEN {} IS NULL THEN 'NULL' ELSE {} END)",
        tested, rendered
    )
}

/// A single token needs no parentheses in `<e> IS NULL`.
fn is_atomic(expression: &str) -> bool {
    tokenize(expression).is_ok_and(|stream| stream.tokens.len() == 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::emit_routine;
    use crate::parser::{parse_statement, Parsed};

    fn ftrace(src: &str) -> (String, usize) {
        let routine = match parse_statement(src).unwrap() {
            Parsed::Routine(routine) => routine,
            Parsed::Passthrough => panic!("not a routine"),
        };
        let context = RoutineContext {
            filename: "t.sql",
            start_line: 1,
        };
        let rewrite = FtracePolicy.instrument(routine, &context).unwrap();
        (emit_routine(&rewrite.routine), rewrite.probes)
    }

    fn body_lines(text: &str) -> Vec<&str> {
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect()
    }

    #[test]
    fn test_procedure_entry_and_exit() {
        let (text, probes) = ftrace("CREATE PROCEDURE p(IN a INT, OUT b INT) BEGIN SET b = a+1; END");
        let lines = body_lines(&text);
        let begin = lines.iter().position(|l| *l == "BEGIN").unwrap();
        assert_eq!(
            lines[begin + 1],
            "CALL __record_ftrace_entry('t.sql', 'p', 'procedure', JSON_OBJECT('a', a, 'b', b));"
        );
        assert_eq!(lines[begin + 2], "SET b = a+1;");
        assert_eq!(
            lines[begin + 3],
            "CALL __record_ftrace_exit('t.sql', 'p', 'procedure', JSON_OBJECT('b', b));"
        );
        assert_eq!(lines[begin + 4], "END");
        assert_eq!(probes, 2);
    }

    #[test]
    fn test_procedure_without_outputs_reports_empty_object() {
        let (text, _) = ftrace("CREATE PROCEDURE p() SELECT 1");
        assert!(text.contains("CALL __record_ftrace_entry('t.sql', 'p', 'procedure', JSON_OBJECT())"));
        assert!(text.contains("CALL __record_ftrace_exit('t.sql', 'p', 'procedure', JSON_OBJECT())"));
    }

    #[test]
    fn test_binary_return_is_base64_encoded() {
        let (text, _) = ftrace("CREATE FUNCTION g() RETURNS BLOB DETERMINISTIC BEGIN RETURN _binary X'AA'; END");
        assert!(text.contains("CONCAT('base64:', TO_BASE64(_binary X'AA'))"));
        assert!(!text.contains("AS CHAR"));
    }

    #[test]
    fn test_long_varbinary_and_binary_charset_returns_are_base64_encoded() {
        for returns in ["LONG VARBINARY", "VARCHAR(16) CHARACTER SET binary"] {
            let (text, _) = ftrace(&format!("CREATE FUNCTION g() RETURNS {} RETURN X'AA'", returns));
            assert!(text.contains("CONCAT('base64:', TO_BASE64(X'AA'))"), "{}", returns);
            assert!(!text.contains("AS CHAR"), "{}", returns);
        }
        let (text, _) = ftrace("CREATE FUNCTION g() RETURNS VARCHAR(16) CHARACTER SET utf8mb4 RETURN 'a'");
        assert!(text.contains("CAST('a' AS CHAR)"));
    }

    #[test]
    fn test_inout_and_out_parameters_form_the_exit_payload() {
        let (text, _) = ftrace("CREATE PROCEDURE p(INOUT x INT, OUT y INT, z INT) SET x = 1");
        assert!(text.contains("JSON_OBJECT('x', x, 'y', y, 'z', z)"));
        assert!(text.contains(
            "CALL __record_ftrace_exit('t.sql', 'p', 'procedure', JSON_OBJECT('x', x, 'y', y))"
        ));
    }

    #[test]
    fn test_entry_follows_comments_and_declarations() {
        let (text, _) = ftrace("CREATE PROCEDURE p() BEGIN -- vars\nDECLARE a INT; SET a = 1; END");
        let lines = body_lines(&text);
        let begin = lines.iter().position(|l| *l == "BEGIN").unwrap();
        assert_eq!(lines[begin + 1], "-- vars");
        assert_eq!(lines[begin + 2], "DECLARE a INT;");
        assert!(lines[begin + 3].starts_with("CALL __record_ftrace_entry("));
    }

    #[test]
    fn test_each_return_gets_an_exit() {
        let src = "CREATE FUNCTION f(x INT) RETURNS INT BEGIN IF x > 0 THEN RETURN x; END IF; RETURN -x; END";
        let (text, probes) = ftrace(src);
        assert_eq!(text.matches("__record_ftrace_entry").count(), 1);
        assert_eq!(text.matches("__record_ftrace_exit").count(), 2);
        assert_eq!(probes, 3);

        let lines = body_lines(&text);
        for (i, line) in lines.iter().enumerate() {
            if line.starts_with("RETURN ") {
                assert!(lines[i - 1].starts_with("CALL __record_ftrace_exit"), "{}", text);
            }
        }
        assert!(text.contains(
            "JSON_QUOTE(CASE WHEN x IS NULL THEN 'NULL' ELSE CAST(x AS CHAR) END)"
        ));
        assert!(text.contains(
            "JSON_QUOTE(CASE WHEN (-x) IS NULL THEN 'NULL' ELSE CAST(-x AS CHAR) END)"
        ));
    }

    #[test]
    fn test_function_without_final_return_gets_null_exit() {
        let src = "CREATE FUNCTION f(x INT) RETURNS INT BEGIN IF x > 0 THEN RETURN 1; ELSE RETURN 0; END IF; END";
        let (text, _) = ftrace(src);
        assert_eq!(text.matches("__record_ftrace_exit").count(), 3);
        assert!(text.contains("CALL __record_ftrace_exit('t.sql', 'f', 'function', NULL);\nEND"));
    }

    #[test]
    fn test_declarations_stay_before_entry() {
        let src = "CREATE PROCEDURE p(x INT) BEGIN DECLARE a INT; DECLARE c CURSOR FOR SELECT 1; OPEN c; END";
        let (text, _) = ftrace(src);
        let lines = body_lines(&text);
        let begin = lines.iter().position(|l| *l == "BEGIN").unwrap();
        assert_eq!(lines[begin + 1], "DECLARE a INT;");
        assert_eq!(lines[begin + 2], "DECLARE c CURSOR FOR SELECT 1;");
        assert!(lines[begin + 3].starts_with("CALL __record_ftrace_entry"));
        assert_eq!(lines[begin + 4], "OPEN c;");
    }

    #[test]
    fn test_bare_return_body() {
        let (text, probes) = ftrace("CREATE FUNCTION f(x INT) RETURNS INT RETURN x + 1");
        assert_eq!(probes, 2);
        let lines = body_lines(&text);
        let begin = lines.iter().position(|l| *l == "BEGIN").unwrap();
        assert!(lines[begin + 1].starts_with("CALL __record_ftrace_entry"));
        assert!(lines[begin + 2].starts_with("CALL __record_ftrace_exit"));
        assert_eq!(lines[begin + 3], "RETURN x + 1;");
    }

    #[test]
    fn test_labeled_body_keeps_leave_inside_exit() {
        let src = "CREATE PROCEDURE p(OUT r INT) body: BEGIN DECLARE x INT; SET r = 1; IF r THEN LEAVE body; END IF; SET r = 2; END body";
        let (text, _) = ftrace(src);
        let inner = text.find("body: BEGIN").unwrap();
        let entry = text.find("__record_ftrace_entry").unwrap();
        let leave = text.find("LEAVE body").unwrap();
        let inner_end = text.find("END body;").unwrap();
        let exit = text.find("__record_ftrace_exit").unwrap();
        let declare = text.find("DECLARE x INT").unwrap();
        assert!(declare < entry && entry < inner && inner < leave);
        assert!(leave < inner_end && inner_end < exit);
    }

    #[test]
    fn test_arguments_use_unquoted_keys() {
        let (text, _) = ftrace("CREATE PROCEDURE p(`my arg` INT) SELECT 1");
        assert!(text.contains("JSON_OBJECT('my arg', `my arg`)"));
    }
}
