// This module defines the error taxonomy of instruction selection using the thiserror crate.
// FatalError covers everything that aborts the compilation unit: a required target feature
// or ABI facility is missing (thread-local storage without bulk memory, unsupported TLS
// model for the OS, 64-bit addressing), an internal invariant was violated (unknown fence
// scope, replacement with the wrong result signature), the pattern table has no entry for a
// legal node, or an inline-asm failure was escalated by policy. MatchFailure is the local,
// per-use-site failure raised when an inline-asm memory constraint cannot be bound; the
// driver's policy decides whether it escalates. SelectResult<T> is the convenience alias.

//! Error types for instruction selection.

use crate::dag::{NodeId, Opcode, TlsModel, ValueType, VerifyError};
use crate::isel::constraint::ConstraintCode;
use thiserror::Error;

/// Conditions that abort the whole compilation unit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error("cannot use thread-local storage without bulk memory")]
    TlsWithoutBulkMemory,

    #[error(
        "only -ftls-model=local-exec is supported for now on non-Emscripten OSes: variable {variable} (requested {model})"
    )]
    UnsupportedTlsModel { variable: String, model: TlsModel },

    #[error("{what} is not currently supported")]
    Unsupported { what: String },

    #[error("internal error at {node} ({opcode}): {reason}")]
    Internal {
        node: NodeId,
        opcode: &'static str,
        reason: String,
    },

    #[error("cannot select {node}: no pattern for {opcode} of type {ty}")]
    CannotSelect {
        node: NodeId,
        opcode: &'static str,
        ty: ValueType,
    },

    #[error("inline asm failure: {0}")]
    InlineAsm(#[from] MatchFailure),

    #[error("malformed DAG: {0}")]
    Verify(#[from] VerifyError),

    #[error("cannot start {jobs} selection workers: {reason}")]
    WorkerPool { jobs: usize, reason: String },

    #[error("in function '{function}': {error}")]
    InFunction {
        function: String,
        error: Box<FatalError>,
    },
}

impl FatalError {
    pub fn internal(node: NodeId, opcode: Opcode, reason: impl Into<String>) -> Self {
        Self::Internal {
            node,
            opcode: opcode.name(),
            reason: reason.into(),
        }
    }

    /// Attach the function name unless it is already attached.
    pub fn in_function(self, function: &str) -> Self {
        match self {
            Self::InFunction { .. } => self,
            error => Self::InFunction {
                function: function.to_string(),
                error: Box::new(error),
            },
        }
    }

    /// The underlying error without function context.
    pub fn root_cause(&self) -> &FatalError {
        match self {
            Self::InFunction { error, .. } => error.root_cause(),
            error => error,
        }
    }
}

/// A use site the matcher or constraint binder could not handle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("could not match memory operand {operand} of {node} with constraint '{constraint}'")]
pub struct MatchFailure {
    pub node: NodeId,
    /// Index into the node's operand list.
    pub operand: usize,
    pub constraint: ConstraintCode,
}

/// Result type alias for selection operations.
pub type SelectResult<T> = Result<T, FatalError>;

/// Malformed textual DAG input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::GenericOp;

    #[test]
    fn function_context_wraps_once() {
        let err = FatalError::TlsWithoutBulkMemory
            .in_function("f")
            .in_function("g");
        assert_eq!(
            err.to_string(),
            "in function 'f': cannot use thread-local storage without bulk memory"
        );
        assert_eq!(err.root_cause(), &FatalError::TlsWithoutBulkMemory);
    }

    #[test]
    fn internal_names_node_and_opcode() {
        let err = FatalError::internal(
            NodeId::new(4),
            Opcode::Generic(GenericOp::AtomicFence),
            "unknown scope 9",
        );
        assert_eq!(err.to_string(), "internal error at t4 (fence): unknown scope 9");
    }
}
