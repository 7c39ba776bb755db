//! Target hooks for instruction selection.
//!
//! A [`Target`] contributes three things to the generic driver: custom
//! lowering rules keyed by generic opcode, a static pattern table, and a
//! binder for inline-assembly memory constraints. Custom rules run before
//! the table and may decline by returning `Ok(None)`.

use super::constraint::{ConstraintCode, UnsupportedConstraint};
use super::pattern::PatternTable;
use crate::core::error::SelectResult;
use crate::core::session::SelectionContext;
use crate::dag::{GenericOp, MachineOpcode, NodeId, SdValue};
use hashbrown::HashMap;

/// A custom lowering rule.
///
/// Returns the finalized machine node replacing `node`, or `None` to let
/// the pattern table handle it. Rules must not call `replace_node`
/// themselves; the driver does.
pub type LoweringRule = fn(&mut SelectionContext<'_>, NodeId) -> SelectResult<Option<NodeId>>;

/// Custom lowering rules by generic opcode.
#[derive(Default, Clone)]
pub struct CustomRules {
    rules: HashMap<GenericOp, LoweringRule>,
}

impl CustomRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `rule` for `op`, replacing any earlier registration.
    pub fn with(mut self, op: GenericOp, rule: LoweringRule) -> Self {
        self.rules.insert(op, rule);
        self
    }

    pub fn get(&self, op: GenericOp) -> Option<LoweringRule> {
        self.rules.get(&op).copied()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl std::fmt::Debug for CustomRules {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ops: Vec<_> = self.rules.keys().map(|op| op.name()).collect();
        ops.sort_unstable();
        f.debug_struct("CustomRules").field("ops", &ops).finish()
    }
}

/// A selection target.
///
/// Targets are shared read-only by every worker of a compilation unit.
pub trait Target: Sync {
    fn name(&self) -> &'static str;

    fn rules(&self) -> &CustomRules;

    fn patterns(&self) -> &PatternTable;

    /// Look up a machine opcode by mnemonic, for parsing pre-selected input.
    fn machine_opcode(&self, name: &str) -> Option<MachineOpcode>;

    /// Look up an intrinsic id by name.
    fn intrinsic_id(&self, name: &str) -> Option<i64>;

    /// Called once before a function is selected.
    fn begin_function(&self, _cx: &SelectionContext<'_>) -> SelectResult<()> {
        Ok(())
    }

    /// Run the custom rule registered for the node's opcode, if any.
    fn try_select(
        &self,
        cx: &mut SelectionContext<'_>,
        node: NodeId,
    ) -> SelectResult<Option<NodeId>> {
        let Some(op) = cx.dag[node].generic_op() else {
            return Ok(None);
        };
        match self.rules().get(op) {
            Some(rule) => rule(cx, node),
            None => Ok(None),
        }
    }

    /// Produce the machine operands for an inline-asm memory operand.
    fn bind_constraint(
        &self,
        constraint: ConstraintCode,
        operand: SdValue,
    ) -> Result<Vec<SdValue>, UnsupportedConstraint>;
}
