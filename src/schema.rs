//! Recording tables and procedures installed by `init`.
//!
//! Instrumented routines only ever call the three `__record_*` procedures
//! named here. The scripts are plain SQL meant for the `mysql` client;
//! routine definitions are wrapped in `DELIMITER $$`.

use crate::instrument::Mode;

pub const COVERAGE_TABLE: &str = "__CoverageEvent";
pub const FTRACE_TABLE: &str = "__FtraceEvent";

pub const RECORD_COVERAGE: &str = "__record_coverage";
pub const RECORD_FTRACE_ENTRY: &str = "__record_ftrace_entry";
pub const RECORD_FTRACE_EXIT: &str = "__record_ftrace_exit";

/// Session variable holding the current ftrace call depth.
pub const FTRACE_DEPTH_VARIABLE: &str = "@__ftrace_call_depth";

const COVERAGE_INSTALL: &str = "\
-- Coverage recording schema
CREATE TABLE IF NOT EXISTS __CoverageEvent (
    id BIGINT NOT NULL AUTO_INCREMENT PRIMARY KEY,
    filename VARCHAR(255) NOT NULL,
    function_name VARCHAR(255) NOT NULL,
    line_number INT NOT NULL,
    timestamp TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6)
);

DROP PROCEDURE IF EXISTS __record_coverage;

DELIMITER $$
CREATE PROCEDURE __record_coverage(IN filename VARCHAR(255), IN function_name VARCHAR(255), IN line_number INT)
BEGIN
    INSERT INTO __CoverageEvent (filename, function_name, line_number)
    VALUES (filename, function_name, line_number);
END$$
DELIMITER ;
";

const FTRACE_INSTALL: &str = "\
-- Function trace recording schema
CREATE TABLE IF NOT EXISTS __FtraceEvent (
    id BIGINT NOT NULL AUTO_INCREMENT,
    connection_id BIGINT UNSIGNED NOT NULL,
    filename VARCHAR(255) NOT NULL,
    function_name VARCHAR(255) NOT NULL,
    object_type ENUM('function', 'procedure') NOT NULL,
    call_type ENUM('entry', 'exit') NOT NULL,
    arguments JSON NULL,
    return_value JSON NULL,
    call_depth INT NOT NULL,
    timestamp TIMESTAMP(6) NOT NULL DEFAULT CURRENT_TIMESTAMP(6),
    PRIMARY KEY (id)
) ENGINE=ARCHIVE;

DROP PROCEDURE IF EXISTS __ftrace_increment_depth;
DROP PROCEDURE IF EXISTS __ftrace_decrement_depth;
DROP PROCEDURE IF EXISTS __record_ftrace_entry;
DROP PROCEDURE IF EXISTS __record_ftrace_exit;

DELIMITER $$
CREATE PROCEDURE __ftrace_increment_depth()
BEGIN
    SET @__ftrace_call_depth = COALESCE(@__ftrace_call_depth, 0) + 1;
END$$

CREATE PROCEDURE __ftrace_decrement_depth()
BEGIN
    SET @__ftrace_call_depth = GREATEST(COALESCE(@__ftrace_call_depth, 0) - 1, 0);
END$$

CREATE PROCEDURE __record_ftrace_entry(IN filename VARCHAR(255), IN function_name VARCHAR(255), IN object_type VARCHAR(16), IN arguments JSON)
BEGIN
    CALL __ftrace_increment_depth();
    INSERT INTO __FtraceEvent (connection_id, filename, function_name, object_type, call_type, arguments, return_value, call_depth)
    VALUES (CONNECTION_ID(), filename, function_name, object_type, 'entry', arguments, NULL, @__ftrace_call_depth);
END$$

CREATE PROCEDURE __record_ftrace_exit(IN filename VARCHAR(255), IN function_name VARCHAR(255), IN object_type VARCHAR(16), IN return_value JSON)
BEGIN
    INSERT INTO __FtraceEvent (connection_id, filename, function_name, object_type, call_type, arguments, return_value, call_depth)
    VALUES (CONNECTION_ID(), filename, function_name, object_type, 'exit', NULL, return_value, COALESCE(@__ftrace_call_depth, 0));
    CALL __ftrace_decrement_depth();
END$$
DELIMITER ;
";

/// Table and `__record_coverage` procedure.
pub fn coverage_install_script() -> &'static str {
    COVERAGE_INSTALL
}

/// Archive table, depth helpers, and the entry/exit procedures.
///
/// Entry increments the depth before recording; exit records before
/// decrementing, so a matched pair carries the same depth.
pub fn ftrace_install_script() -> &'static str {
    FTRACE_INSTALL
}

/// Event table the recording procedures of `mode` insert into.
pub fn event_table(mode: Mode) -> &'static str {
    match mode {
        Mode::Coverage => COVERAGE_TABLE,
        Mode::Ftrace => FTRACE_TABLE,
    }
}

pub fn install_script(mode: Mode) -> &'static str {
    match mode {
        Mode::Coverage => coverage_install_script(),
        Mode::Ftrace => ftrace_install_script(),
    }
}
