//! Pattern table types.
//!
//! A pattern table is static data produced ahead of time from declarative
//! instruction descriptions. Each [`Pattern`] says: a node with this generic
//! opcode and selection type, whose operands have this shape, becomes this
//! machine instruction with these operands. The matcher in
//! [`super::matcher`] only interprets the table; it knows nothing about any
//! particular target.

use crate::dag::{GenericOp, MachineOpcode, ValueType};
use hashbrown::HashMap;

/// Range an immediate must fall in to be folded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImmDomain {
    Any,
    /// Fits a signed 32-bit field.
    S32,
    /// Fits an unsigned 32-bit field.
    U32,
}

impl ImmDomain {
    pub const fn contains(self, value: i64) -> bool {
        match self {
            ImmDomain::Any => true,
            ImmDomain::S32 => value >= i32::MIN as i64 && value <= i32::MAX as i64,
            ImmDomain::U32 => value >= 0 && value <= u32::MAX as i64,
        }
    }
}

/// Shape of one operand.
#[derive(Debug, Clone, Copy)]
pub enum OperandPattern {
    /// Any data value; emitted as-is.
    Reg,
    /// The chain operand; emitted last.
    Chain,
    /// A generic constant in range; emitted as a target constant.
    Imm(ImmDomain),
    /// An existing target constant; emitted as-is.
    TargetImm,
    /// Anything; not emitted.
    Skip,
    /// A target constant equal to this intrinsic id; not emitted.
    IntrinsicId(i64),
    /// A generic global address; emitted as a target global address.
    Global,
    /// A single-use generic node folded into the instruction. Its own
    /// operands are matched recursively and their captures emitted inline.
    Fold {
        op: GenericOp,
        /// Require the no-unsigned-wrap flag.
        nuw: bool,
        operands: &'static [OperandPattern],
    },
    /// All remaining data operands.
    Variadic,
}

/// What the root node itself contributes, for leaf-like roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootCapture {
    None,
    /// Integer payload, emitted as a target constant.
    Imm(ImmDomain),
    /// Float payload, emitted as a target FP constant.
    FpBits,
    /// Global reference payload, emitted as a target global address.
    Global,
}

/// One table entry.
#[derive(Debug, Clone, Copy)]
pub struct Pattern {
    pub name: &'static str,
    pub op: GenericOp,
    pub ty: ValueType,
    pub root: RootCapture,
    pub operands: &'static [OperandPattern],
    pub emit: MachineOpcode,
    /// Leading immediates emitted before the captures (i32 target constants).
    pub implicit: &'static [i64],
    /// Emission order of captures; empty means capture order.
    pub order: &'static [usize],
    pub cost: u32,
}

impl Pattern {
    pub const fn new(
        name: &'static str,
        op: GenericOp,
        ty: ValueType,
        emit: MachineOpcode,
    ) -> Self {
        Self {
            name,
            op,
            ty,
            root: RootCapture::None,
            operands: &[],
            emit,
            implicit: &[],
            order: &[],
            cost: 1,
        }
    }

    pub const fn operands(self, operands: &'static [OperandPattern]) -> Self {
        Self { operands, ..self }
    }

    pub const fn root(self, root: RootCapture) -> Self {
        Self { root, ..self }
    }

    pub const fn implicit(self, implicit: &'static [i64]) -> Self {
        Self { implicit, ..self }
    }

    pub const fn order(self, order: &'static [usize]) -> Self {
        Self { order, ..self }
    }

    pub const fn cost(self, cost: u32) -> Self {
        Self { cost, ..self }
    }
}

/// Indexed, immutable pattern table.
#[derive(Debug)]
pub struct PatternTable {
    patterns: &'static [Pattern],
    by_key: HashMap<(GenericOp, ValueType), Vec<u16>>,
}

impl PatternTable {
    /// Index `patterns` by (opcode, type), keeping declaration order.
    pub fn new(patterns: &'static [Pattern]) -> Self {
        let mut by_key: HashMap<(GenericOp, ValueType), Vec<u16>> = HashMap::new();
        for (idx, pattern) in patterns.iter().enumerate() {
            by_key
                .entry((pattern.op, pattern.ty))
                .or_default()
                .push(idx as u16);
        }
        Self { patterns, by_key }
    }

    /// Patterns for a key in declaration order.
    pub fn candidates(
        &self,
        op: GenericOp,
        ty: ValueType,
    ) -> impl Iterator<Item = &'static Pattern> + '_ {
        let patterns = self.patterns;
        self.by_key
            .get(&(op, ty))
            .into_iter()
            .flatten()
            .map(move |&idx| &patterns[idx as usize])
    }

    /// Whether at least one pattern exists for the key.
    pub fn covers(&self, op: GenericOp, ty: ValueType) -> bool {
        self.by_key.contains_key(&(op, ty))
    }

    pub fn patterns(&self) -> &'static [Pattern] {
        self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOP: MachineOpcode = MachineOpcode::new(300, "NOP", 0);
    static TABLE: &[Pattern] = &[
        Pattern::new("a", GenericOp::Add, ValueType::I32, NOP).cost(2),
        Pattern::new("b", GenericOp::Sub, ValueType::I32, NOP),
        Pattern::new("c", GenericOp::Add, ValueType::I32, NOP),
    ];

    #[test]
    fn candidates_keep_declaration_order() {
        let table = PatternTable::new(TABLE);
        let names: Vec<_> = table
            .candidates(GenericOp::Add, ValueType::I32)
            .map(|p| p.name)
            .collect();
        assert_eq!(names, ["a", "c"]);
        assert!(table.covers(GenericOp::Sub, ValueType::I32));
        assert!(!table.covers(GenericOp::Sub, ValueType::I64));
    }

    #[test]
    fn immediate_domains() {
        assert!(ImmDomain::U32.contains(u32::MAX as i64));
        assert!(!ImmDomain::U32.contains(-1));
        assert!(ImmDomain::S32.contains(-1));
        assert!(!ImmDomain::S32.contains(1 << 40));
        assert!(ImmDomain::Any.contains(i64::MIN));
    }
}
