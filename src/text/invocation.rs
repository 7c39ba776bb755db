// This module defines one invocation of the selector as a command line would describe it:
// input name, target triple, feature string, inline-asm failure policy, worker count and
// output switches. The clap-derived Invocation is parsed by the dagsel binary from the real
// command line and by the file-test runner from `; RUN:` lines, so both paths exercise the
// same configuration and produce the same text. Running an invocation parses the module,
// selects it with the WebAssembly target and renders the selected functions, any recorded
// inline-asm failures and optionally the merged statistics.

//! Command-line shaped selector invocation.

use super::Module;
use crate::core::error::{FatalError, ParseError};
use crate::core::session::SessionStats;
use crate::core::target::{ConfigError, TargetContext};
use crate::isel::{AsmFailurePolicy, SelectionDriver, SelectionOptions};
use crate::wasm::WasmTarget;
use clap::{Parser, ValueEnum};
use std::fmt::Write;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{input}:{source}")]
    Parse { input: String, source: ParseError },

    #[error(transparent)]
    Select(#[from] FatalError),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsmFailureArg {
    Fatal,
    Report,
}

impl From<AsmFailureArg> for AsmFailurePolicy {
    fn from(arg: AsmFailureArg) -> Self {
        match arg {
            AsmFailureArg::Fatal => AsmFailurePolicy::Fatal,
            AsmFailureArg::Report => AsmFailurePolicy::Report,
        }
    }
}

/// Select instructions for a textual DAG module.
#[derive(Parser, Debug, Clone)]
#[command(name = "dagsel", version, about = "DAG-to-DAG instruction selector for WebAssembly")]
pub struct Invocation {
    /// Input .dag file, or `-` for stdin
    pub input: String,

    /// Target triple
    #[arg(long, default_value = "wasm32-unknown-unknown")]
    pub mtriple: String,

    /// Target features, e.g. +atomics,+bulk-memory
    #[arg(long, default_value = "", allow_hyphen_values = true)]
    pub mattr: String,

    /// What to do with inline-asm operands whose constraint cannot be bound
    #[arg(long, value_enum, default_value_t = AsmFailureArg::Fatal)]
    pub asm_failure: AsmFailureArg,

    /// Worker threads for selecting functions in parallel
    #[arg(long, short = 'j', default_value_t = 1)]
    pub jobs: usize,

    /// Skip the post-selection verifier
    #[arg(long)]
    pub no_verify: bool,

    /// Print the parsed input before selecting
    #[arg(long)]
    pub print_input: bool,

    /// Print selection statistics
    #[arg(long)]
    pub stats: bool,
}

impl Invocation {
    pub fn options(&self) -> SelectionOptions {
        SelectionOptions {
            asm_failure: self.asm_failure.into(),
            verify: !self.no_verify,
            jobs: self.jobs,
        }
    }

    pub fn target_context(&self) -> Result<TargetContext, ConfigError> {
        TargetContext::from_strs(&self.mtriple, &self.mattr)
    }

    /// Parse `source`, select it and render the result.
    ///
    /// Nothing is rendered for a unit that hits a fatal error.
    pub fn run(&self, source: &str) -> Result<String, ToolError> {
        let target_cx = self.target_context()?;
        let wasm = WasmTarget::new();
        let module = Module::parse(source, &wasm).map_err(|source| ToolError::Parse {
            input: self.input.clone(),
            source,
        })?;

        let mut out = String::new();
        if self.print_input {
            let _ = writeln!(out, "*** Input ***");
            let _ = writeln!(out, "{module}");
            let _ = writeln!(out, "*** Selected ***");
        }

        let driver = SelectionDriver::new(&wasm, self.options());
        let selected = driver.select_module(&target_cx, module.functions)?;

        let mut total = SessionStats::default();
        for (idx, function) in selected.iter().enumerate() {
            if idx > 0 {
                out.push('\n');
            }
            let _ = write!(out, "{}", function.dag);
            if !function.report.fully_selected {
                let _ = writeln!(
                    out,
                    "; incomplete: {} unbound inline asm operand(s)",
                    function.report.failures.len()
                );
                for failure in &function.report.failures {
                    let _ = writeln!(out, "; {failure}");
                }
            }
            total.merge(&function.report.stats);
        }

        if self.stats {
            let _ = write!(out, "\n{total}");
        }
        Ok(out)
    }
}
