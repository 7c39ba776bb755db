// This module holds the WebAssembly lowering rules that cannot be expressed as table patterns
// because the right instruction depends on target facts: the synchronization scope of an
// atomic fence together with whether the subtarget has atomics, and the thread-local storage
// model of a variable together with bulk-memory support and the OS. Each rule either returns
// a finalized machine node, declines with Ok(None) so the pattern table handles the node, or
// fails with a FatalError. Rules only build replacement nodes; the driver installs them.

use super::opcodes::{self, Intrinsic};
use crate::core::error::{FatalError, SelectResult};
use crate::core::session::SelectionContext;
use crate::dag::{sync_scope, GenericOp, NodeId, Payload, SdValue, TlsModel, ValueType};
use crate::isel::CustomRules;

/// Rules registered by the WebAssembly target.
pub fn custom_rules() -> CustomRules {
    CustomRules::new()
        .with(GenericOp::AtomicFence, lower_atomic_fence)
        .with(GenericOp::GlobalTlsAddress, lower_tls_address)
        .with(GenericOp::IntrinsicWoChain, lower_intrinsic)
        .with(GenericOp::IntrinsicWChain, lower_intrinsic_with_chain)
}

/// Immediate carried by operand `idx` of `id`.
fn constant_operand(cx: &SelectionContext<'_>, id: NodeId, idx: usize) -> SelectResult<i64> {
    let node = &cx.dag[id];
    node.operands
        .get(idx)
        .and_then(|op| cx.dag[op.node].imm())
        .ok_or_else(|| {
            FatalError::internal(id, node.opcode, format!("operand {idx} is not a constant"))
        })
}

fn chain_operand(cx: &SelectionContext<'_>, id: NodeId) -> SelectResult<SdValue> {
    cx.dag
        .chain_operand(id)
        .ok_or_else(|| FatalError::internal(id, cx.dag[id].opcode, "missing chain operand"))
}

fn lower_atomic_fence(cx: &mut SelectionContext<'_>, id: NodeId) -> SelectResult<Option<NodeId>> {
    if !cx.target().has_atomics() {
        return Ok(None);
    }
    let chain = chain_operand(cx, id)?;
    let scope = constant_operand(cx, id, 2)?;

    let fence = match scope {
        // Blocks reordering in the compiler; nothing is emitted.
        sync_scope::SINGLE_THREAD => cx
            .dag
            .get_machine_node(opcodes::COMPILER_FENCE, &[ValueType::Chain], &[chain]),
        sync_scope::SYSTEM => {
            // Wasm only has sequentially consistent fences; ordering 0 is seq_cst.
            let ordering = cx.dag.get_target_constant(0, ValueType::I32);
            cx.dag
                .get_machine_node(opcodes::ATOMIC_FENCE, &[ValueType::Chain], &[ordering, chain])
        }
        other => {
            return Err(FatalError::internal(
                id,
                cx.dag[id].opcode,
                format!("unknown synchronization scope {other}"),
            ))
        }
    };
    Ok(Some(fence))
}

/// Checks shared by everything that reads the TLS globals.
fn require_tls(cx: &SelectionContext<'_>, id: NodeId) -> SelectResult<()> {
    if !cx.target().has_bulk_memory() {
        return Err(FatalError::TlsWithoutBulkMemory);
    }
    require_wasm32(cx, id)
}

fn require_wasm32(cx: &SelectionContext<'_>, id: NodeId) -> SelectResult<()> {
    if cx.target().pointer_type() != ValueType::I32 {
        return Err(FatalError::internal(
            id,
            cx.dag[id].opcode,
            "only wasm32 is supported for now",
        ));
    }
    Ok(())
}

fn lower_tls_address(cx: &mut SelectionContext<'_>, id: NodeId) -> SelectResult<Option<NodeId>> {
    let node = &cx.dag[id];
    let Payload::Global(global) = node.payload else {
        return Err(FatalError::internal(id, node.opcode, "TLS address without a global"));
    };
    if !cx.target().has_bulk_memory() {
        return Err(FatalError::TlsWithoutBulkMemory);
    }
    // Dynamic linking with threads is not available, so only local-exec
    // can be resolved, except on Emscripten.
    if global.tls_model != TlsModel::LocalExec && !cx.target().is_os_emscripten() {
        return Err(FatalError::UnsupportedTlsModel {
            variable: cx.dag.symbol_name(global.symbol).to_string(),
            model: global.tls_model,
        });
    }
    require_wasm32(cx, id)?;

    let ptr = ValueType::I32;
    let base_sym = cx.dag.get_target_symbol("__tls_base", ptr);
    let offset_sym = cx.dag.get_target_global(global, ptr);
    let base = cx.dag.get_machine_node(opcodes::GLOBAL_GET_I32, &[ptr], &[base_sym]);
    let offset = cx.dag.get_machine_node(opcodes::CONST_I32, &[ptr], &[offset_sym]);
    let address = cx.dag.get_machine_node(
        opcodes::ADD_I32,
        &[ptr],
        &[SdValue::new(base, 0), SdValue::new(offset, 0)],
    );
    Ok(Some(address))
}

fn lower_intrinsic(cx: &mut SelectionContext<'_>, id: NodeId) -> SelectResult<Option<NodeId>> {
    let symbol = match Intrinsic::from_id(constant_operand(cx, id, 0)?) {
        Some(Intrinsic::TlsSize) => "__tls_size",
        Some(Intrinsic::TlsAlign) => "__tls_align",
        _ => return Ok(None),
    };
    require_tls(cx, id)?;
    let sym = cx.dag.get_target_symbol(symbol, ValueType::I32);
    Ok(Some(cx.dag.get_machine_node(opcodes::GLOBAL_GET_I32, &[ValueType::I32], &[sym])))
}

fn lower_intrinsic_with_chain(
    cx: &mut SelectionContext<'_>,
    id: NodeId,
) -> SelectResult<Option<NodeId>> {
    if Intrinsic::from_id(constant_operand(cx, id, 1)?) != Some(Intrinsic::TlsBase) {
        return Ok(None);
    }
    require_tls(cx, id)?;
    let chain = chain_operand(cx, id)?;
    let sym = cx.dag.get_target_symbol("__tls_base", ValueType::I32);
    Ok(Some(cx.dag.get_machine_node(
        opcodes::GLOBAL_GET_I32,
        &[ValueType::I32, ValueType::Chain],
        &[sym, chain],
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::target::TargetContext;
    use crate::dag::{AtomicOrdering, Dag, GlobalRef, Opcode};

    fn fence(dag: &mut Dag, scope: i64) -> NodeId {
        let entry = dag.entry_token();
        let ordering = dag.get_target_constant(
            AtomicOrdering::SequentiallyConsistent.encoding(),
            ValueType::I32,
        );
        let scope = dag.get_target_constant(scope, ValueType::I32);
        dag.get_node(
            GenericOp::AtomicFence,
            &[ValueType::Chain],
            &[entry, ordering, scope],
            Payload::None,
        )
    }

    fn tls_address(dag: &mut Dag, model: TlsModel) -> NodeId {
        let symbol = dag.intern("tls_var");
        let global = GlobalRef {
            symbol,
            offset: 0,
            tls_model: model,
        };
        dag.get_node(GenericOp::GlobalTlsAddress, &[ValueType::I32], &[], Payload::Global(global))
    }

    #[test]
    fn fence_declines_without_atomics() {
        let target = TargetContext::default();
        let mut dag = Dag::new("f");
        let node = fence(&mut dag, sync_scope::SYSTEM);
        let mut cx = SelectionContext::new(dag, &target);
        assert_eq!(lower_atomic_fence(&mut cx, node).unwrap(), None);
    }

    #[test]
    fn fence_scopes_with_atomics() {
        let target = TargetContext::from_strs("wasm32-unknown-unknown", "+atomics").unwrap();
        let mut dag = Dag::new("f");
        let single = fence(&mut dag, sync_scope::SINGLE_THREAD);
        let system = fence(&mut dag, sync_scope::SYSTEM);
        let bogus = fence(&mut dag, 7);
        let mut cx = SelectionContext::new(dag, &target);

        let lowered = lower_atomic_fence(&mut cx, single).unwrap().unwrap();
        assert_eq!(cx.dag[lowered].opcode, Opcode::Machine(opcodes::COMPILER_FENCE));

        let lowered = lower_atomic_fence(&mut cx, system).unwrap().unwrap();
        let node = &cx.dag[lowered];
        assert_eq!(node.opcode, Opcode::Machine(opcodes::ATOMIC_FENCE));
        assert_eq!(cx.dag[node.operands[0].node].imm(), Some(0));
        assert_eq!(node.operands[1], cx.dag.entry_token());

        let err = lower_atomic_fence(&mut cx, bogus).unwrap_err();
        assert!(err.to_string().contains("unknown synchronization scope 7"));
    }

    #[test]
    fn tls_requires_bulk_memory() {
        let target = TargetContext::default();
        let mut dag = Dag::new("f");
        let node = tls_address(&mut dag, TlsModel::LocalExec);
        let mut cx = SelectionContext::new(dag, &target);
        let before = cx.dag.len();
        assert_eq!(lower_tls_address(&mut cx, node), Err(FatalError::TlsWithoutBulkMemory));
        assert_eq!(cx.dag.len(), before);
    }

    #[test]
    fn tls_model_checked_outside_emscripten() {
        let target = TargetContext::from_strs("wasm32-wasi", "+bulk-memory").unwrap();
        let mut dag = Dag::new("f");
        let node = tls_address(&mut dag, TlsModel::InitialExec);
        let mut cx = SelectionContext::new(dag, &target);
        let err = lower_tls_address(&mut cx, node).unwrap_err();
        assert_eq!(
            err,
            FatalError::UnsupportedTlsModel {
                variable: "tls_var".into(),
                model: TlsModel::InitialExec,
            }
        );

        let target = TargetContext::from_strs("wasm32-unknown-emscripten", "+bulk-memory").unwrap();
        let mut dag = Dag::new("f");
        let node = tls_address(&mut dag, TlsModel::InitialExec);
        let mut cx = SelectionContext::new(dag, &target);
        assert!(lower_tls_address(&mut cx, node).unwrap().is_some());
    }

    #[test]
    fn tls_address_adds_base_and_offset() {
        let target = TargetContext::from_strs("wasm32-unknown-unknown", "+bulk-memory").unwrap();
        let mut dag = Dag::new("f");
        let node = tls_address(&mut dag, TlsModel::LocalExec);
        let mut cx = SelectionContext::new(dag, &target);
        let add = lower_tls_address(&mut cx, node).unwrap().unwrap();

        let add = &cx.dag[add];
        assert_eq!(add.opcode, Opcode::Machine(opcodes::ADD_I32));
        let base = &cx.dag[add.operands[0].node];
        let offset = &cx.dag[add.operands[1].node];
        assert_eq!(base.opcode, Opcode::Machine(opcodes::GLOBAL_GET_I32));
        assert_eq!(offset.opcode, Opcode::Machine(opcodes::CONST_I32));
        let Payload::Symbol(sym) = cx.dag[base.operands[0].node].payload else {
            panic!("expected a symbol operand");
        };
        assert_eq!(cx.dag.symbol_name(sym), "__tls_base");
    }

    #[test]
    fn unrelated_intrinsics_decline() {
        let target = TargetContext::from_strs("wasm32-unknown-unknown", "+bulk-memory").unwrap();
        let mut dag = Dag::new("f");
        let id = dag.get_target_constant(Intrinsic::MemorySize.id(), ValueType::I32);
        let mem = dag.get_target_constant(0, ValueType::I32);
        let node = dag.get_node(
            GenericOp::IntrinsicWoChain,
            &[ValueType::I32],
            &[id, mem],
            Payload::None,
        );
        let mut cx = SelectionContext::new(dag, &target);
        assert_eq!(lower_intrinsic(&mut cx, node).unwrap(), None);
    }
}
