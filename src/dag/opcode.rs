//! Opcode space of the selection DAG.
//!
//! Nodes are tagged with one of three opcode families:
//! - [`GenericOp`]: architecture-independent operations produced by the
//!   builder and legalizer. These are what instruction selection consumes.
//! - [`TargetLeaf`]: operand leaves that are already in their final form
//!   (entry token, target constants, symbols). They are never selected.
//! - [`MachineOpcode`]: concrete target instructions, supplied by a target's
//!   opcode catalogue.

use std::fmt;

/// Architecture-independent operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GenericOp {
    /// Incoming function argument; payload holds the argument index.
    Argument,
    Constant,
    ConstantFP,
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    Sra,
    Srl,
    FAdd,
    FSub,
    FMul,
    FDiv,
    /// `(chain, addr) -> (value, chain)`
    Load,
    /// `(chain, value, addr) -> chain`
    Store,
    /// `(chain, ordering, scope) -> chain`
    AtomicFence,
    GlobalAddress,
    GlobalTlsAddress,
    /// `(id, args...) -> value`
    IntrinsicWoChain,
    /// `(chain, id, args...) -> (value, chain)`
    IntrinsicWChain,
    /// `(chain, operands...) -> chain`
    InlineAsm,
    /// `(chain, values...)`, the function root.
    Return,
}

impl GenericOp {
    pub const ALL: [GenericOp; 25] = [
        GenericOp::Argument,
        GenericOp::Constant,
        GenericOp::ConstantFP,
        GenericOp::Add,
        GenericOp::Sub,
        GenericOp::Mul,
        GenericOp::And,
        GenericOp::Or,
        GenericOp::Xor,
        GenericOp::Shl,
        GenericOp::Sra,
        GenericOp::Srl,
        GenericOp::FAdd,
        GenericOp::FSub,
        GenericOp::FMul,
        GenericOp::FDiv,
        GenericOp::Load,
        GenericOp::Store,
        GenericOp::AtomicFence,
        GenericOp::GlobalAddress,
        GenericOp::GlobalTlsAddress,
        GenericOp::IntrinsicWoChain,
        GenericOp::IntrinsicWChain,
        GenericOp::InlineAsm,
        GenericOp::Return,
    ];

    /// Mnemonic used by the textual DAG format and the printer.
    pub const fn name(self) -> &'static str {
        use GenericOp::*;
        match self {
            Argument => "arg",
            Constant => "const",
            ConstantFP => "fconst",
            Add => "add",
            Sub => "sub",
            Mul => "mul",
            And => "and",
            Or => "or",
            Xor => "xor",
            Shl => "shl",
            Sra => "sra",
            Srl => "srl",
            FAdd => "fadd",
            FSub => "fsub",
            FMul => "fmul",
            FDiv => "fdiv",
            Load => "load",
            Store => "store",
            AtomicFence => "fence",
            GlobalAddress => "global",
            GlobalTlsAddress => "tlsaddr",
            IntrinsicWoChain => "intrinsic",
            IntrinsicWChain => "intrinsic_chain",
            InlineAsm => "asm",
            Return => "ret",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.name() == name)
    }

    pub const fn is_binary(self) -> bool {
        use GenericOp::*;
        matches!(
            self,
            Add | Sub | Mul | And | Or | Xor | Shl | Sra | Srl | FAdd | FSub | FMul | FDiv
        )
    }
}

impl fmt::Display for GenericOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Leaves that are final as soon as they are created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetLeaf {
    EntryToken,
    TargetConstant,
    TargetConstantFP,
    TargetSymbol,
    TargetGlobalAddress,
}

impl TargetLeaf {
    pub const fn name(self) -> &'static str {
        match self {
            TargetLeaf::EntryToken => "EntryToken",
            TargetLeaf::TargetConstant => "TargetConstant",
            TargetLeaf::TargetConstantFP => "TargetConstantFP",
            TargetLeaf::TargetSymbol => "TargetExternalSymbol",
            TargetLeaf::TargetGlobalAddress => "TargetGlobalAddress",
        }
    }
}

/// Opcode flag: pseudo instruction that emits no bytes.
pub const MI_PSEUDO: u8 = 1 << 0;
/// Opcode flag: instruction has side effects beyond its results.
pub const MI_SIDE_EFFECTS: u8 = 1 << 1;

/// A target machine instruction.
///
/// Targets declare their catalogue as `const` items; identity is the
/// numeric id, the name is only for printing and parsing.
#[derive(Debug, Clone, Copy)]
pub struct MachineOpcode {
    pub id: u16,
    pub name: &'static str,
    pub flags: u8,
}

impl MachineOpcode {
    pub const fn new(id: u16, name: &'static str, flags: u8) -> Self {
        Self { id, name, flags }
    }

    pub const fn is_pseudo(&self) -> bool {
        self.flags & MI_PSEUDO != 0
    }
}

impl PartialEq for MachineOpcode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MachineOpcode {}

impl std::hash::Hash for MachineOpcode {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for MachineOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Target-independent machine opcodes. Target catalogues start above
/// [`FIRST_TARGET_OPCODE`].
pub mod target_opcode {
    use super::{MachineOpcode, MI_SIDE_EFFECTS};

    pub const INLINEASM: MachineOpcode = MachineOpcode::new(1, "INLINEASM", MI_SIDE_EFFECTS);

    pub const FIRST_TARGET_OPCODE: u16 = 16;
}

/// Node opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    Generic(GenericOp),
    Target(TargetLeaf),
    Machine(MachineOpcode),
}

impl Opcode {
    /// True for anything instruction selection must not touch.
    pub const fn is_machine_level(&self) -> bool {
        !matches!(self, Opcode::Generic(_))
    }

    pub const fn generic(&self) -> Option<GenericOp> {
        match self {
            Opcode::Generic(op) => Some(*op),
            _ => None,
        }
    }

    pub const fn machine(&self) -> Option<MachineOpcode> {
        match self {
            Opcode::Machine(op) => Some(*op),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Opcode::Generic(op) => op.name(),
            Opcode::Target(leaf) => leaf.name(),
            Opcode::Machine(op) => op.name,
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Memory ordering encoded in a fence's ordering operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicOrdering {
    NotAtomic = 0,
    Unordered = 1,
    Monotonic = 2,
    Acquire = 4,
    Release = 5,
    AcquireRelease = 6,
    SequentiallyConsistent = 7,
}

impl AtomicOrdering {
    pub const fn encoding(self) -> i64 {
        self as i64
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "unordered" => Some(AtomicOrdering::Unordered),
            "monotonic" => Some(AtomicOrdering::Monotonic),
            "acquire" => Some(AtomicOrdering::Acquire),
            "release" => Some(AtomicOrdering::Release),
            "acq_rel" => Some(AtomicOrdering::AcquireRelease),
            "seq_cst" => Some(AtomicOrdering::SequentiallyConsistent),
            _ => None,
        }
    }
}

/// Synchronization scope ids carried by a fence's scope operand.
pub mod sync_scope {
    pub const SINGLE_THREAD: i64 = 0;
    pub const SYSTEM: i64 = 1;
}

/// Thread-local storage addressing model requested for a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TlsModel {
    GeneralDynamic,
    LocalDynamic,
    InitialExec,
    #[default]
    LocalExec,
}

impl TlsModel {
    pub const fn name(self) -> &'static str {
        match self {
            TlsModel::GeneralDynamic => "generaldynamic",
            TlsModel::LocalDynamic => "localdynamic",
            TlsModel::InitialExec => "initialexec",
            TlsModel::LocalExec => "localexec",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "generaldynamic" => Some(TlsModel::GeneralDynamic),
            "localdynamic" => Some(TlsModel::LocalDynamic),
            "initialexec" => Some(TlsModel::InitialExec),
            "localexec" => Some(TlsModel::LocalExec),
            _ => None,
        }
    }
}

impl fmt::Display for TlsModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
