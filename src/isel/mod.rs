//! Target-independent instruction selection engine.
//!
//! - [`driver`]: traversal, dispatch and module-level parallelism.
//! - [`rules`]: the [`Target`] trait and custom lowering rule registry.
//! - [`pattern`] / [`matcher`]: table-driven pattern matching.
//! - [`constraint`]: inline-assembly operand constraints.

pub mod constraint;
pub mod driver;
pub mod matcher;
pub mod pattern;
pub mod rules;

pub use constraint::{
    bind_simple_memory_operand, AsmOperandKind, ConstraintCode, UnsupportedConstraint,
};
pub use driver::{
    AsmFailurePolicy, SelectedFunction, SelectionDriver, SelectionOptions, SelectionReport,
};
pub use matcher::{selection_type, Matcher};
pub use pattern::{ImmDomain, OperandPattern, Pattern, PatternTable, RootCapture};
pub use rules::{CustomRules, LoweringRule, Target};
