//! WebAssembly pattern table.
//!
//! Every (generic op, type) pair the legalizer can produce for wasm32 has
//! at least one entry whose operand shapes accept anything, so matching a
//! well-formed graph cannot miss. Cheaper entries that fold constant offsets
//! into memory accesses are listed first.

use super::opcodes::*;
use crate::dag::{GenericOp as G, MachineOpcode, ValueType as T};
use crate::isel::pattern::{ImmDomain, OperandPattern as O, Pattern as P, RootCapture};

const RR: &[O] = &[O::Reg, O::Reg];

/// `base + imm` with no unsigned wrap folds into a memory offset.
const ADDR_OFFSET: O = O::Fold {
    op: G::Add,
    nuw: true,
    operands: &[O::Reg, O::Imm(ImmDomain::U32)],
};

const fn binary(name: &'static str, op: G, ty: T, emit: MachineOpcode) -> P {
    P::new(name, op, ty, emit).operands(RR)
}

// Loads emit (p2align, offset, addr, chain).
const fn load(name: &'static str, ty: T, emit: MachineOpcode) -> P {
    P::new(name, G::Load, ty, emit)
        .operands(&[O::Chain, O::Reg])
        .implicit(&[0, 0])
        .cost(2)
}

const fn load_offset(name: &'static str, ty: T, emit: MachineOpcode) -> P {
    P::new(name, G::Load, ty, emit)
        .operands(&[O::Chain, ADDR_OFFSET])
        .implicit(&[0])
        .order(&[1, 0])
}

// Stores take (chain, value, addr) and emit (p2align, offset, addr, value, chain).
const fn store(name: &'static str, ty: T, emit: MachineOpcode) -> P {
    P::new(name, G::Store, ty, emit)
        .operands(&[O::Chain, O::Reg, O::Reg])
        .implicit(&[0, 0])
        .order(&[1, 0])
        .cost(2)
}

const fn store_offset(name: &'static str, ty: T, emit: MachineOpcode) -> P {
    P::new(name, G::Store, ty, emit)
        .operands(&[O::Chain, O::Reg, ADDR_OFFSET])
        .implicit(&[0])
        .order(&[2, 1, 0])
}

pub static PATTERNS: &[P] = &[
    // Constants and arguments.
    P::new("const_i32", G::Constant, T::I32, CONST_I32).root(RootCapture::Imm(ImmDomain::Any)),
    P::new("const_i64", G::Constant, T::I64, CONST_I64).root(RootCapture::Imm(ImmDomain::Any)),
    P::new("const_f32", G::ConstantFP, T::F32, CONST_F32).root(RootCapture::FpBits),
    P::new("const_f64", G::ConstantFP, T::F64, CONST_F64).root(RootCapture::FpBits),
    P::new("arg_i32", G::Argument, T::I32, ARGUMENT_I32).root(RootCapture::Imm(ImmDomain::U32)),
    P::new("arg_i64", G::Argument, T::I64, ARGUMENT_I64).root(RootCapture::Imm(ImmDomain::U32)),
    P::new("arg_f32", G::Argument, T::F32, ARGUMENT_F32).root(RootCapture::Imm(ImmDomain::U32)),
    P::new("arg_f64", G::Argument, T::F64, ARGUMENT_F64).root(RootCapture::Imm(ImmDomain::U32)),
    P::new("global_addr", G::GlobalAddress, T::I32, CONST_I32).root(RootCapture::Global),
    // Integer arithmetic.
    binary("add_i32", G::Add, T::I32, ADD_I32),
    binary("add_i64", G::Add, T::I64, ADD_I64),
    binary("sub_i32", G::Sub, T::I32, SUB_I32),
    binary("sub_i64", G::Sub, T::I64, SUB_I64),
    binary("mul_i32", G::Mul, T::I32, MUL_I32),
    binary("mul_i64", G::Mul, T::I64, MUL_I64),
    binary("and_i32", G::And, T::I32, AND_I32),
    binary("and_i64", G::And, T::I64, AND_I64),
    binary("or_i32", G::Or, T::I32, OR_I32),
    binary("or_i64", G::Or, T::I64, OR_I64),
    binary("xor_i32", G::Xor, T::I32, XOR_I32),
    binary("xor_i64", G::Xor, T::I64, XOR_I64),
    binary("shl_i32", G::Shl, T::I32, SHL_I32),
    binary("shl_i64", G::Shl, T::I64, SHL_I64),
    binary("sra_i32", G::Sra, T::I32, SHR_S_I32),
    binary("sra_i64", G::Sra, T::I64, SHR_S_I64),
    binary("srl_i32", G::Srl, T::I32, SHR_U_I32),
    binary("srl_i64", G::Srl, T::I64, SHR_U_I64),
    // Float arithmetic.
    binary("fadd_f32", G::FAdd, T::F32, ADD_F32),
    binary("fadd_f64", G::FAdd, T::F64, ADD_F64),
    binary("fsub_f32", G::FSub, T::F32, SUB_F32),
    binary("fsub_f64", G::FSub, T::F64, SUB_F64),
    binary("fmul_f32", G::FMul, T::F32, MUL_F32),
    binary("fmul_f64", G::FMul, T::F64, MUL_F64),
    binary("fdiv_f32", G::FDiv, T::F32, DIV_F32),
    binary("fdiv_f64", G::FDiv, T::F64, DIV_F64),
    // Memory.
    load_offset("load_i32_off", T::I32, LOAD_I32),
    load("load_i32", T::I32, LOAD_I32),
    load_offset("load_i64_off", T::I64, LOAD_I64),
    load("load_i64", T::I64, LOAD_I64),
    load_offset("load_f32_off", T::F32, LOAD_F32),
    load("load_f32", T::F32, LOAD_F32),
    load_offset("load_f64_off", T::F64, LOAD_F64),
    load("load_f64", T::F64, LOAD_F64),
    store_offset("store_i32_off", T::I32, STORE_I32),
    store("store_i32", T::I32, STORE_I32),
    store_offset("store_i64_off", T::I64, STORE_I64),
    store("store_i64", T::I64, STORE_I64),
    store_offset("store_f32_off", T::F32, STORE_F32),
    store("store_f32", T::F32, STORE_F32),
    store_offset("store_f64_off", T::F64, STORE_F64),
    store("store_f64", T::F64, STORE_F64),
    // Without atomics there are no other threads to order against.
    P::new("fence_compiler", G::AtomicFence, T::Chain, COMPILER_FENCE)
        .operands(&[O::Chain, O::Skip, O::Skip]),
    P::new("memory_size", G::IntrinsicWoChain, T::I32, MEMORY_SIZE_I32)
        .operands(&[O::IntrinsicId(Intrinsic::MemorySize.id()), O::Imm(ImmDomain::U32)]),
    P::new("memory_size_target_imm", G::IntrinsicWoChain, T::I32, MEMORY_SIZE_I32)
        .operands(&[O::IntrinsicId(Intrinsic::MemorySize.id()), O::TargetImm]),
    P::new("return", G::Return, T::Chain, RETURN).operands(&[O::Chain, O::Variadic]),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::isel::pattern::PatternTable;

    #[test]
    fn every_legal_pair_is_covered() {
        let table = PatternTable::new(PATTERNS);
        let ints = [T::I32, T::I64];
        let floats = [T::F32, T::F64];
        for op in [G::Add, G::Sub, G::Mul, G::And, G::Or, G::Xor, G::Shl, G::Sra, G::Srl] {
            for ty in ints {
                assert!(table.covers(op, ty), "{op} {ty}");
            }
        }
        for op in [G::FAdd, G::FSub, G::FMul, G::FDiv] {
            for ty in floats {
                assert!(table.covers(op, ty), "{op} {ty}");
            }
        }
        for ty in ints.into_iter().chain(floats) {
            assert!(table.covers(G::Load, ty));
            assert!(table.covers(G::Store, ty));
            assert!(table.covers(G::Argument, ty));
        }
        assert!(table.covers(G::AtomicFence, T::Chain));
        assert!(table.covers(G::Return, T::Chain));
    }

    #[test]
    fn folded_forms_are_cheaper() {
        let table = PatternTable::new(PATTERNS);
        let costs: Vec<_> = table.candidates(G::Load, T::I32).map(|p| (p.name, p.cost)).collect();
        assert_eq!(costs, [("load_i32_off", 1), ("load_i32", 2)]);
    }
}
