//! Value types carried by DAG results.

use std::fmt;

/// Machine-representable value type of a node result.
///
/// The legalizer has already reduced every operand to one of these, so the
/// selector never sees illegal widths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    I64,
    F32,
    F64,
    /// Side-effect ordering token.
    Chain,
}

impl ValueType {
    pub const fn is_chain(self) -> bool {
        matches!(self, ValueType::Chain)
    }

    pub const fn is_integer(self) -> bool {
        matches!(self, ValueType::I32 | ValueType::I64)
    }

    pub const fn is_float(self) -> bool {
        matches!(self, ValueType::F32 | ValueType::F64)
    }

    /// Width in bits, zero for chains.
    pub const fn bits(self) -> u32 {
        match self {
            ValueType::I32 | ValueType::F32 => 32,
            ValueType::I64 | ValueType::F64 => 64,
            ValueType::Chain => 0,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::I64 => "i64",
            ValueType::F32 => "f32",
            ValueType::F64 => "f64",
            ValueType::Chain => "ch",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "i32" => Some(ValueType::I32),
            "i64" => Some(ValueType::I64),
            "f32" => Some(ValueType::F32),
            "f64" => Some(ValueType::F64),
            "ch" => Some(ValueType::Chain),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
