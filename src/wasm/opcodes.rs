//! WebAssembly machine opcode catalogue and intrinsic ids.

use crate::dag::target_opcode::{FIRST_TARGET_OPCODE, INLINEASM};
use crate::dag::opcode::{MI_PSEUDO, MI_SIDE_EFFECTS};
use crate::dag::MachineOpcode;

const fn op(offset: u16, name: &'static str) -> MachineOpcode {
    MachineOpcode::new(FIRST_TARGET_OPCODE + offset, name, 0)
}

const fn op_with(offset: u16, name: &'static str, flags: u8) -> MachineOpcode {
    MachineOpcode::new(FIRST_TARGET_OPCODE + offset, name, flags)
}

pub const CONST_I32: MachineOpcode = op(0, "CONST_I32");
pub const CONST_I64: MachineOpcode = op(1, "CONST_I64");
pub const CONST_F32: MachineOpcode = op(2, "CONST_F32");
pub const CONST_F64: MachineOpcode = op(3, "CONST_F64");

pub const ARGUMENT_I32: MachineOpcode = op(4, "ARGUMENT_i32");
pub const ARGUMENT_I64: MachineOpcode = op(5, "ARGUMENT_i64");
pub const ARGUMENT_F32: MachineOpcode = op(6, "ARGUMENT_f32");
pub const ARGUMENT_F64: MachineOpcode = op(7, "ARGUMENT_f64");

pub const ADD_I32: MachineOpcode = op(8, "ADD_I32");
pub const ADD_I64: MachineOpcode = op(9, "ADD_I64");
pub const SUB_I32: MachineOpcode = op(10, "SUB_I32");
pub const SUB_I64: MachineOpcode = op(11, "SUB_I64");
pub const MUL_I32: MachineOpcode = op(12, "MUL_I32");
pub const MUL_I64: MachineOpcode = op(13, "MUL_I64");
pub const AND_I32: MachineOpcode = op(14, "AND_I32");
pub const AND_I64: MachineOpcode = op(15, "AND_I64");
pub const OR_I32: MachineOpcode = op(16, "OR_I32");
pub const OR_I64: MachineOpcode = op(17, "OR_I64");
pub const XOR_I32: MachineOpcode = op(18, "XOR_I32");
pub const XOR_I64: MachineOpcode = op(19, "XOR_I64");
pub const SHL_I32: MachineOpcode = op(20, "SHL_I32");
pub const SHL_I64: MachineOpcode = op(21, "SHL_I64");
pub const SHR_S_I32: MachineOpcode = op(22, "SHR_S_I32");
pub const SHR_S_I64: MachineOpcode = op(23, "SHR_S_I64");
pub const SHR_U_I32: MachineOpcode = op(24, "SHR_U_I32");
pub const SHR_U_I64: MachineOpcode = op(25, "SHR_U_I64");

pub const ADD_F32: MachineOpcode = op(26, "ADD_F32");
pub const ADD_F64: MachineOpcode = op(27, "ADD_F64");
pub const SUB_F32: MachineOpcode = op(28, "SUB_F32");
pub const SUB_F64: MachineOpcode = op(29, "SUB_F64");
pub const MUL_F32: MachineOpcode = op(30, "MUL_F32");
pub const MUL_F64: MachineOpcode = op(31, "MUL_F64");
pub const DIV_F32: MachineOpcode = op(32, "DIV_F32");
pub const DIV_F64: MachineOpcode = op(33, "DIV_F64");

// Loads: (p2align, offset, addr, chain). Stores: (p2align, offset, addr, value, chain).
pub const LOAD_I32: MachineOpcode = op(34, "LOAD_I32");
pub const LOAD_I64: MachineOpcode = op(35, "LOAD_I64");
pub const LOAD_F32: MachineOpcode = op(36, "LOAD_F32");
pub const LOAD_F64: MachineOpcode = op(37, "LOAD_F64");
pub const STORE_I32: MachineOpcode = op_with(38, "STORE_I32", MI_SIDE_EFFECTS);
pub const STORE_I64: MachineOpcode = op_with(39, "STORE_I64", MI_SIDE_EFFECTS);
pub const STORE_F32: MachineOpcode = op_with(40, "STORE_F32", MI_SIDE_EFFECTS);
pub const STORE_F64: MachineOpcode = op_with(41, "STORE_F64", MI_SIDE_EFFECTS);

/// `atomic.fence`; operand 0 is the ordering (0 = seq_cst).
pub const ATOMIC_FENCE: MachineOpcode = op_with(42, "ATOMIC_FENCE", MI_SIDE_EFFECTS);
/// Ordering barrier for the compiler only; emits nothing.
pub const COMPILER_FENCE: MachineOpcode =
    op_with(43, "COMPILER_FENCE", MI_PSEUDO | MI_SIDE_EFFECTS);

pub const GLOBAL_GET_I32: MachineOpcode = op(44, "GLOBAL_GET_I32");
pub const RETURN: MachineOpcode = op_with(45, "RETURN", MI_SIDE_EFFECTS);
pub const MEMORY_SIZE_I32: MachineOpcode = op(46, "MEMORY_SIZE_I32");

/// Every opcode the target can emit, including target-independent ones.
pub const ALL: &[MachineOpcode] = &[
    INLINEASM,
    CONST_I32,
    CONST_I64,
    CONST_F32,
    CONST_F64,
    ARGUMENT_I32,
    ARGUMENT_I64,
    ARGUMENT_F32,
    ARGUMENT_F64,
    ADD_I32,
    ADD_I64,
    SUB_I32,
    SUB_I64,
    MUL_I32,
    MUL_I64,
    AND_I32,
    AND_I64,
    OR_I32,
    OR_I64,
    XOR_I32,
    XOR_I64,
    SHL_I32,
    SHL_I64,
    SHR_S_I32,
    SHR_S_I64,
    SHR_U_I32,
    SHR_U_I64,
    ADD_F32,
    ADD_F64,
    SUB_F32,
    SUB_F64,
    MUL_F32,
    MUL_F64,
    DIV_F32,
    DIV_F64,
    LOAD_I32,
    LOAD_I64,
    LOAD_F32,
    LOAD_F64,
    STORE_I32,
    STORE_I64,
    STORE_F32,
    STORE_F64,
    ATOMIC_FENCE,
    COMPILER_FENCE,
    GLOBAL_GET_I32,
    RETURN,
    MEMORY_SIZE_I32,
];

pub fn by_name(name: &str) -> Option<MachineOpcode> {
    ALL.iter().copied().find(|op| op.name == name)
}

/// Target intrinsics understood by the selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intrinsic {
    TlsSize = 1,
    TlsAlign = 2,
    TlsBase = 3,
    MemorySize = 4,
}

impl Intrinsic {
    pub const ALL: [Intrinsic; 4] = [
        Intrinsic::TlsSize,
        Intrinsic::TlsAlign,
        Intrinsic::TlsBase,
        Intrinsic::MemorySize,
    ];

    pub const fn id(self) -> i64 {
        self as i64
    }

    pub const fn name(self) -> &'static str {
        match self {
            Intrinsic::TlsSize => "tls_size",
            Intrinsic::TlsAlign => "tls_align",
            Intrinsic::TlsBase => "tls_base",
            Intrinsic::MemorySize => "memory_size",
        }
    }

    pub fn from_id(id: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.id() == id)
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|i| i.name() == name)
    }
}
