//! `coverage`: line-coverage instrumentation for MySQL stored routines.

use std::process::ExitCode;

use sqlprobe::instrument::Mode;

fn main() -> ExitCode {
    sqlprobe::cli::main_for(Mode::Coverage)
}
