//! Instruction selector command-line driver.
//!
//! Reads a textual DAG module, selects it for WebAssembly and prints the
//! machine-level graphs. Fatal errors go to stderr with a non-zero exit
//! status and nothing is printed on stdout.

use clap::Parser;
use dagsel::text::{Invocation, ToolError};
use std::fs;
use std::io::{self, Read};
use std::process::ExitCode;

fn read_input(path: &str) -> Result<String, ToolError> {
    let io_error = |source| ToolError::Io {
        path: path.to_string(),
        source,
    };
    if path == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer).map_err(io_error)?;
        Ok(buffer)
    } else {
        fs::read_to_string(path).map_err(io_error)
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let invocation = Invocation::parse();

    match read_input(&invocation.input).and_then(|source| invocation.run(&source)) {
        Ok(output) => {
            print!("{output}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
