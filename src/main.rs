//! # datamedic command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Install logging (console, plus rolling files unless --no-log-files)
//!   └─> Run the command inside the panic boundary
//!         ├─> Ok  → pretty JSON on stdout, exit 0
//!         └─> Err → ErrorReport JSON on stdout, exit 1
//! ```
//!
//! Nothing but JSON is written to stdout; logs go to stderr and the log files.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout, clippy::print_stderr)] // the binary's job is printing

mod cli;

use clap::Parser as _;
use datamedic::error::{self, EngineError};
use datamedic::logging;
use std::process::ExitCode;

fn print_json(value: &impl serde::Serialize) -> bool {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            true
        }
        Err(err) => {
            eprintln!("Failed to render output: {err}");
            false
        }
    }
}

fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let logging = if cli.no_log_files {
        logging::init_console()
    } else {
        logging::init().or_else(|err| {
            eprintln!("File logging unavailable ({err:#}); logging to console only");
            logging::init_console()
        })
    };
    if let Err(err) = logging {
        eprintln!("Failed to initialise logging: {err:#}");
    }

    match error::catch_fatal(|| cli::run(cli)) {
        Ok(value) if print_json(&value) => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            if matches!(err, EngineError::Fatal(_)) {
                tracing::error!("{err}");
            } else {
                tracing::warn!("{err}");
            }
            print_json(&err.report());
            ExitCode::FAILURE
        }
    }
}
