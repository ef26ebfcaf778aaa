//! End-to-end instrumentation through the library API
//!
//! Each test feeds a complete SQL file through split, parse, instrument and
//! emit, and checks the spliced output text.

use sqlprobe::lines::scan_instrumented;
use sqlprobe::splitter::{split, StatementKind};
use sqlprobe::{instrument_source, instrument_statement, InstrumentConfig, Mode};

fn coverage(source: &str) -> String {
    instrument_source(source, &InstrumentConfig::new(Mode::Coverage, "t.sql"))
        .unwrap()
        .text
}

fn ftrace(source: &str) -> String {
    instrument_source(source, &InstrumentConfig::new(Mode::Ftrace, "t.sql"))
        .unwrap()
        .text
}

#[test]
fn test_function_with_default_delimiter_statement() {
    let routine = instrument_statement(
        "CREATE FUNCTION f(x INT) RETURNS INT DETERMINISTIC BEGIN RETURN x*2; END",
        1,
        &InstrumentConfig::new(Mode::Coverage, "t.sql"),
    )
    .unwrap()
    .expect("routine");

    let call = routine
        .text
        .find("CALL __record_coverage('t.sql', 'f', 1)")
        .expect("coverage call");
    let ret = routine.text.find("RETURN x*2").expect("return");
    assert!(call < ret);
}

#[test]
fn test_if_head_and_both_returns_are_probed() {
    let source = "DELIMITER $$\nCREATE FUNCTION f(x INT) RETURNS INT DETERMINISTIC BEGIN IF x>0 THEN RETURN x; ELSE RETURN 0; END IF; END$$\nDELIMITER ;";
    let expected = "DELIMITER $$\n\
CREATE FUNCTION f(x INT)\n\
RETURNS INT\n\
DETERMINISTIC\n\
BEGIN\n\
\tCALL __record_coverage('t.sql', 'f', 2);\n\
\tIF x>0 THEN\n\
\t\tCALL __record_coverage('t.sql', 'f', 2);\n\
\t\tRETURN x;\n\
\tELSE\n\
\t\tCALL __record_coverage('t.sql', 'f', 2);\n\
\t\tRETURN 0;\n\
\tEND IF;\n\
END $$\n\
DELIMITER ;";
    assert_eq!(coverage(source), expected);
}

#[test]
fn test_procedure_entry_and_exit_payloads() {
    let source = "DELIMITER $$\nCREATE PROCEDURE p(IN a INT, OUT b INT) BEGIN SET b = a+1; END$$\nDELIMITER ;\n";
    let text = ftrace(source);
    let body: Vec<&str> = text
        .lines()
        .skip_while(|line| *line != "BEGIN")
        .skip(1)
        .take_while(|line| !line.starts_with("END"))
        .map(str::trim)
        .collect();
    assert_eq!(
        body,
        vec![
            "CALL __record_ftrace_entry('t.sql', 'p', 'procedure', JSON_OBJECT('a', a, 'b', b));",
            "SET b = a+1;",
            "CALL __record_ftrace_exit('t.sql', 'p', 'procedure', JSON_OBJECT('b', b));",
        ]
    );
}

#[test]
fn test_inout_parameters_are_reported_on_exit() {
    let source = "DELIMITER $$\nCREATE PROCEDURE p(INOUT x INT, OUT y INT, z INT) SET x = 1$$\nDELIMITER ;\n";
    let text = ftrace(source);
    let call = |name: &str| {
        text.lines()
            .map(str::trim)
            .find(|line| line.contains(name))
            .expect("ftrace call")
            .to_string()
    };
    assert_eq!(
        call("__record_ftrace_entry"),
        "CALL __record_ftrace_entry('t.sql', 'p', 'procedure', JSON_OBJECT('x', x, 'y', y, 'z', z));"
    );
    assert_eq!(
        call("__record_ftrace_exit"),
        "CALL __record_ftrace_exit('t.sql', 'p', 'procedure', JSON_OBJECT('x', x, 'y', y));"
    );
}

#[test]
fn test_binary_function_result_is_base64_encoded() {
    let source =
        "DELIMITER $$\nCREATE FUNCTION g() RETURNS BLOB DETERMINISTIC BEGIN RETURN _binary X'AA'; END$$\nDELIMITER ;\n";
    let text = ftrace(source);
    let exit = text
        .lines()
        .find(|line| line.contains("__record_ftrace_exit"))
        .expect("exit call");
    assert!(exit.contains("CONCAT('base64:', TO_BASE64("));
    assert!(!exit.contains("AS CHAR"));
    assert_eq!(text.matches("__record_ftrace_exit").count(), 1);
}

#[test]
fn test_comment_only_file_is_copied_verbatim() {
    let source = "-- only a comment\n\n";
    let statements = split(source).unwrap();
    assert_eq!(statements.len(), 1);
    assert_eq!(statements[0].kind, StatementKind::Comment);
    assert_eq!(coverage(source), source);
}

#[test]
fn test_cursor_declaration_is_not_probed() {
    let source = "DELIMITER $$\nCREATE PROCEDURE p()\nBEGIN\n  DECLARE c CURSOR FOR SELECT 1;\n  SET x=1;\nEND$$\n";
    let text = coverage(source);
    assert_eq!(text.matches("__record_coverage").count(), 1);

    let declare = text.find("DECLARE c CURSOR FOR SELECT 1;").unwrap();
    let call = text.find("CALL __record_coverage('t.sql', 'p', 5);").unwrap();
    let set = text.find("SET x = 1;").unwrap();
    assert!(declare < call && call < set);
}

#[test]
fn test_probe_lines_follow_the_source_file() {
    let source = "\
-- fixtures
CREATE TABLE t (id INT);

DELIMITER //
CREATE PROCEDURE fill(IN n INT)
BEGIN
  DECLARE i INT DEFAULT 0;
  /* a comment;
     spanning lines */
  WHILE i < n DO
    INSERT INTO t VALUES ('a;b'), (i);
    SET i = i + 1;
  END WHILE;
END//

CREATE FUNCTION total() RETURNS INT
READS SQL DATA
RETURN (SELECT COUNT(*) FROM t)//
DELIMITER ;
";
    let text = coverage(source);
    let points: Vec<(String, usize)> = scan_instrumented(&text)
        .unwrap()
        .into_iter()
        .map(|p| (p.routine, p.line))
        .collect();
    assert_eq!(
        points,
        vec![
            ("fill".to_string(), 10),
            ("fill".to_string(), 11),
            ("fill".to_string(), 12),
            ("total".to_string(), 18),
        ]
    );
    assert!(text.starts_with("-- fixtures\nCREATE TABLE t (id INT);\n\nDELIMITER //\n"));
    assert!(text.ends_with("END //\nDELIMITER ;\n"));
}

#[test]
fn test_label_on_its_own_line_records_the_loop_head_line() {
    let source = "DELIMITER $$
CREATE PROCEDURE p()
BEGIN
  outer_l:
  WHILE 1 DO
    LEAVE outer_l;
  END WHILE outer_l;
END$$
DELIMITER ;
";
    let points: Vec<usize> = scan_instrumented(&coverage(source))
        .unwrap()
        .into_iter()
        .map(|p| p.line)
        .collect();
    assert_eq!(points, vec![5, 6]);
}

#[test]
fn test_every_function_return_gets_an_exit() {
    let source = "DELIMITER $$
CREATE FUNCTION sign_of(x INT) RETURNS INT DETERMINISTIC
BEGIN
  IF x > 0 THEN
    RETURN 1;
  ELSEIF x < 0 THEN
    RETURN -1;
  END IF;
  RETURN 0;
END$$
DELIMITER ;
";
    let text = ftrace(source);
    assert_eq!(text.matches("__record_ftrace_entry").count(), 1);
    assert_eq!(text.matches("__record_ftrace_exit").count(), 3);

    let lines: Vec<&str> = text.lines().map(str::trim).collect();
    for (i, line) in lines.iter().enumerate() {
        if line.starts_with("RETURN ") {
            assert!(
                lines[i - 1].starts_with("CALL __record_ftrace_exit"),
                "no exit before `{}`",
                line
            );
        }
    }
}

#[test]
fn test_comments_inside_and_after_the_body_survive() {
    let source = "DELIMITER $$\nCREATE PROCEDURE p()\nBEGIN\n  -- keep me\n  SELECT 1;\n  -- tail\nEND -- after end\n$$\nDELIMITER ;\n";
    let expected = "DELIMITER $$\n\
CREATE PROCEDURE p()\n\
BEGIN\n\
\t-- keep me\n\
\tCALL __record_coverage('t.sql', 'p', 5);\n\
\tSELECT 1;\n\
\t-- tail\n\
END\n\
-- after end\n\
$$\n\
DELIMITER ;\n";
    assert_eq!(coverage(source), expected);
}

#[test]
fn test_non_routine_ddl_passes_through_untouched() {
    let source = "CREATE VIEW v AS SELECT 1;\nCREATE TRIGGER trg BEFORE INSERT ON t FOR EACH ROW SET NEW.a = 1;\n";
    assert_eq!(coverage(source), source);
    assert_eq!(ftrace(source), source);
}
