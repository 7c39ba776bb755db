//! Textual DAG format.
//!
//! A small line-oriented format for writing selection inputs by hand, used
//! by the command-line driver and the file tests.
//!
//! ```text
//! ; Comments start with semicolon
//! define @load_offset {
//!   %a = arg.i32 0
//!   %c = const.i32 16
//!   %p = add.i32 nuw %a, %c
//!   %l = load.i32 %entry, %p       ; results: i32 value, chain
//!   %f = fence %l:1, seq_cst, system
//!   ret %f, %l
//! }
//! ```
//!
//! `%entry` is the function's entry token and `%v:N` names result `N` of
//! `%v`. The last statement of a body is the root. Upper-case mnemonics
//! name target machine instructions, with result types as suffixes
//! (`LOAD_I32.i32.ch`) and `$N` for i32 target constants.

pub mod check;
pub mod invocation;
pub mod parser;

pub use check::{CheckDirective, RunDirective, TestRunner, TestSpec};
pub use invocation::{Invocation, ToolError};
pub use parser::parse_module;

use crate::core::error::ParseError;
use crate::dag::Dag;
use crate::isel::Target;
use std::fmt;

/// Functions of one compilation unit.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub functions: Vec<Dag>,
}

impl Module {
    pub fn parse(text: &str, target: &dyn Target) -> Result<Self, ParseError> {
        parse_module(text, target)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, dag) in self.functions.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{dag}")?;
        }
        Ok(())
    }
}
