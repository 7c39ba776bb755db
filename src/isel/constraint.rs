//! Inline-assembly operand constraints and the constraint binder.

use crate::dag::SdValue;
use std::fmt;
use thiserror::Error;

/// Constraint class of an inline-assembly memory operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstraintCode {
    /// `i`: address-like operand.
    Address,
    /// `m`: any memory operand.
    Memory,
    /// `o`: offsettable memory operand.
    Offsettable,
    /// `v`: vector memory operand.
    Vector,
    /// `Q`: target-specific base-register-only memory.
    Q,
    /// `X`: any operand whatsoever.
    X,
}

impl ConstraintCode {
    pub const fn letter(self) -> char {
        match self {
            ConstraintCode::Address => 'i',
            ConstraintCode::Memory => 'm',
            ConstraintCode::Offsettable => 'o',
            ConstraintCode::Vector => 'v',
            ConstraintCode::Q => 'Q',
            ConstraintCode::X => 'X',
        }
    }

    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'i' => Some(ConstraintCode::Address),
            'm' => Some(ConstraintCode::Memory),
            'o' => Some(ConstraintCode::Offsettable),
            'v' => Some(ConstraintCode::Vector),
            'Q' => Some(ConstraintCode::Q),
            'X' => Some(ConstraintCode::X),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// How an inline-assembly operand is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsmOperandKind {
    /// Register use, passed through.
    Register,
    /// Immediate, passed through.
    Immediate,
    /// Memory operand resolved by the target's constraint binder.
    Memory(ConstraintCode),
}

impl fmt::Display for AsmOperandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmOperandKind::Register => f.write_str("r"),
            AsmOperandKind::Immediate => f.write_str("n"),
            AsmOperandKind::Memory(code) => write!(f, "{code}"),
        }
    }
}

/// The binder does not know how to bind this constraint class.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("unsupported memory constraint '{0}'")]
pub struct UnsupportedConstraint(pub ConstraintCode);

/// Bind a memory operand that needs no address decomposition.
///
/// The `i` and `m` classes denote a plain address, so the existing operand
/// is reused verbatim. Everything else is reported as unsupported.
pub fn bind_simple_memory_operand(
    constraint: ConstraintCode,
    operand: SdValue,
) -> Result<Vec<SdValue>, UnsupportedConstraint> {
    match constraint {
        ConstraintCode::Address | ConstraintCode::Memory => Ok(vec![operand]),
        other => Err(UnsupportedConstraint(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeId;

    #[test]
    fn address_and_memory_reuse_operand() {
        let op = SdValue::new(NodeId::new(3), 0);
        assert_eq!(bind_simple_memory_operand(ConstraintCode::Address, op), Ok(vec![op]));
        assert_eq!(bind_simple_memory_operand(ConstraintCode::Memory, op), Ok(vec![op]));
    }

    #[test]
    fn other_classes_are_unsupported() {
        let op = SdValue::new(NodeId::new(3), 0);
        for code in [
            ConstraintCode::Offsettable,
            ConstraintCode::Vector,
            ConstraintCode::Q,
            ConstraintCode::X,
        ] {
            assert_eq!(
                bind_simple_memory_operand(code, op),
                Err(UnsupportedConstraint(code))
            );
        }
    }

    #[test]
    fn letters_round_trip() {
        for letter in ['i', 'm', 'o', 'v', 'Q', 'X'] {
            assert_eq!(ConstraintCode::from_letter(letter).map(|c| c.letter()), Some(letter));
        }
        assert_eq!(ConstraintCode::from_letter('r'), None);
    }
}
