//! CLI argument parsing shared by the `coverage` and `ftrace` binaries
//!
//! Defines the Command enum, parse_args_impl() and the common entry point
//! [`main_for`]. Both binaries accept the same commands except `lines`,
//! which only exists for coverage.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Result};

use crate::init_cmd::run_init;
use crate::instrument::Mode;
use crate::instrument_cmd::run_instrument;
use crate::lines_cmd::run_lines;
use crate::output::OutputFormat;
use crate::version::version;

pub fn print_usage(mode: Mode) {
    let tool = mode.tool_name();
    eprintln!("{} - MySQL stored routine instrumentation", tool);
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  {} <command> [arguments]", tool);
    eprintln!("  {} --help", tool);
    eprintln!();
    eprintln!(
        "  {} instrument [--output <DIR>] [--format human|json|pretty] [FILES...]",
        tool
    );
    eprintln!("  {} init [--output <FILE>]", tool);
    if mode == Mode::Coverage {
        eprintln!("  {} lines [--format human|json|pretty] <PATH>...", tool);
    }
    eprintln!();
    eprintln!("Commands:");
    eprintln!(
        "  instrument      Rewrite routines; each FILE is written to FILE{}",
        mode.suffix()
    );
    eprintln!("                  (stdin to stdout when no FILES are given)");
    eprintln!("  init            Print the SQL that installs the recording tables and procedures");
    if mode == Mode::Coverage {
        eprintln!("  lines           List instrumented lines found in *.sql.instrumented files");
    }
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  --output <PATH>     instrument: output directory; init: output file");
    eprintln!("  --format <FORMAT>   Output format: human (default), json (compact), or pretty");
    eprintln!("  --version, -V       Print version information");
    eprintln!("  --help, -h          Print this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SQLPROBE_LOG        Log filter (default: sqlprobe=warn), logs go to stderr");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Instrument {
        files: Vec<PathBuf>,
        output_dir: Option<PathBuf>,
        output_format: OutputFormat,
    },
    Init {
        output: Option<PathBuf>,
    },
    Lines {
        paths: Vec<PathBuf>,
        output_format: OutputFormat,
    },
    Help,
    Version,
}

fn value_of<'a>(args: &'a [String], i: usize) -> Result<&'a str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} requires an argument", args[i]))
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::from_str(value).ok_or_else(|| {
        anyhow!(
            "Invalid output format: {}. Must be human, json, or pretty",
            value
        )
    })
}

/// Parse `args` (program name first) for the binary driving `mode`.
pub fn parse_args_impl(mode: Mode, args: &[String]) -> Result<Command> {
    if args.len() < 2 {
        return Err(anyhow!("Missing command"));
    }

    let command = &args[1];

    match command.as_str() {
        "--version" | "-V" => Ok(Command::Version),
        "--help" | "-h" => Ok(Command::Help),
        "instrument" => {
            let mut files = Vec::new();
            let mut output_dir: Option<PathBuf> = None;
            let mut output_format = OutputFormat::Human;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--output" | "-o" => {
                        output_dir = Some(PathBuf::from(value_of(args, i)?));
                        i += 2;
                    }
                    "--format" => {
                        output_format = parse_format(value_of(args, i)?)?;
                        i += 2;
                    }
                    arg if arg.starts_with('-') => {
                        return Err(anyhow!("Unknown argument: {}", arg));
                    }
                    file => {
                        files.push(PathBuf::from(file));
                        i += 1;
                    }
                }
            }

            if files.is_empty() && output_dir.is_some() {
                return Err(anyhow!("--output requires input files"));
            }

            Ok(Command::Instrument {
                files,
                output_dir,
                output_format,
            })
        }
        "init" => {
            let mut output: Option<PathBuf> = None;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--output" | "-o" => {
                        output = Some(PathBuf::from(value_of(args, i)?));
                        i += 2;
                    }
                    "--database" => {
                        return Err(anyhow!(
                            "--database is not supported; pipe the script into the mysql client instead"
                        ));
                    }
                    _ => {
                        return Err(anyhow!("Unknown argument: {}", args[i]));
                    }
                }
            }

            Ok(Command::Init { output })
        }
        "lines" if mode == Mode::Coverage => {
            let mut paths = Vec::new();
            let mut output_format = OutputFormat::Human;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--format" => {
                        output_format = parse_format(value_of(args, i)?)?;
                        i += 2;
                    }
                    arg if arg.starts_with('-') => {
                        return Err(anyhow!("Unknown argument: {}", arg));
                    }
                    path => {
                        paths.push(PathBuf::from(path));
                        i += 1;
                    }
                }
            }

            if paths.is_empty() {
                return Err(anyhow!("lines requires at least one path"));
            }

            Ok(Command::Lines {
                paths,
                output_format,
            })
        }
        _ => Err(anyhow!("Unknown command: {}", command)),
    }
}

/// Entry point of both binaries.
pub fn main_for(mode: Mode) -> ExitCode {
    crate::logging::init_tracing();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage(mode);
        return ExitCode::from(1);
    }

    let command = match parse_args_impl(mode, &args) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Run '{} --help' for usage", mode.tool_name());
            return ExitCode::from(1);
        }
    };

    let result = match command {
        Command::Help => {
            print_usage(mode);
            Ok(ExitCode::SUCCESS)
        }
        Command::Version => {
            println!("{}", version(mode));
            Ok(ExitCode::SUCCESS)
        }
        Command::Instrument {
            files,
            output_dir,
            output_format,
        } => run_instrument(mode, files, output_dir, output_format),
        Command::Init { output } => run_init(mode, output).map(|()| ExitCode::SUCCESS),
        Command::Lines {
            paths,
            output_format,
        } => run_lines(paths, output_format).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
