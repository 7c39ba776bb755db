//! Table-driven pattern matcher.
//!
//! For a node, every pattern keyed by its (opcode, selection type) is tried
//! in declaration order. The match with the lowest declared cost wins; among
//! equal costs the first declared wins. The winning pattern is emitted as a
//! finalized machine node whose result signature equals the matched node's.
//! A miss is an internal error: legal input always has a catch-all entry.

use super::pattern::{OperandPattern, Pattern, PatternTable, RootCapture};
use crate::core::error::{FatalError, SelectResult};
use crate::dag::{
    Dag, GenericOp, GlobalRef, NodeId, Opcode, Payload, SdValue, TargetLeaf, ValueType,
};

/// Operand value collected while matching, materialized on emission.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Capture {
    Value(SdValue),
    Imm(i64, ValueType),
    FpBits(u64, ValueType),
    Global(GlobalRef, ValueType),
}

/// A successful match of one pattern against one node.
#[derive(Debug, Clone)]
pub struct Match {
    pub pattern: &'static Pattern,
    captures: Vec<Capture>,
    chain: Option<SdValue>,
}

/// Type a node is keyed by in the pattern table.
///
/// The first non-chain result, except for stores, which are keyed by the
/// stored value. Nodes with only a chain result (or none) key on `ch`.
pub fn selection_type(dag: &Dag, id: NodeId) -> ValueType {
    let node = &dag[id];
    if node.generic_op() == Some(GenericOp::Store) {
        if let Some(value) = node.operands.get(1) {
            return dag.value_type(*value);
        }
    }
    node.results
        .iter()
        .copied()
        .find(|ty| !ty.is_chain())
        .unwrap_or(ValueType::Chain)
}

pub struct Matcher<'p> {
    table: &'p PatternTable,
}

impl<'p> Matcher<'p> {
    pub fn new(table: &'p PatternTable) -> Self {
        Self { table }
    }

    /// Select `id` through the table and return the new machine node.
    pub fn select(&self, dag: &mut Dag, id: NodeId) -> SelectResult<NodeId> {
        let node = &dag[id];
        let Some(op) = node.generic_op() else {
            return Err(FatalError::internal(id, node.opcode, "matcher given a machine-level node"));
        };
        let ty = selection_type(dag, id);
        match self.find(dag, id) {
            Some(found) => {
                log::debug!("ISEL: {} ({}) matched pattern {}", id, op, found.pattern.name);
                Self::emit(dag, id, &found)
            }
            None => Err(FatalError::CannotSelect {
                node: id,
                opcode: op.name(),
                ty,
            }),
        }
    }

    /// Find the best pattern for `id` without touching the DAG.
    pub fn find(&self, dag: &Dag, id: NodeId) -> Option<Match> {
        let op = dag[id].generic_op()?;
        let ty = selection_type(dag, id);

        let mut best: Option<Match> = None;
        for pattern in self.table.candidates(op, ty) {
            let Some(found) = Self::match_pattern(dag, id, pattern) else {
                log::trace!("  {} does not match {}", pattern.name, id);
                continue;
            };
            log::trace!("  {} matches {} at cost {}", pattern.name, id, pattern.cost);
            if best.as_ref().map_or(true, |b| pattern.cost < b.pattern.cost) {
                best = Some(found);
            }
        }
        best
    }

    fn match_pattern(dag: &Dag, id: NodeId, pattern: &'static Pattern) -> Option<Match> {
        let node = &dag[id];
        let mut captures = Vec::new();
        let mut chain = None;

        match (pattern.root, node.payload) {
            (RootCapture::None, _) => {}
            (RootCapture::Imm(domain), Payload::Imm(value)) if domain.contains(value) => {
                captures.push(Capture::Imm(value, node.results[0]));
            }
            (RootCapture::FpBits, Payload::FpBits(bits)) => {
                captures.push(Capture::FpBits(bits, node.results[0]));
            }
            (RootCapture::Global, Payload::Global(global)) => {
                captures.push(Capture::Global(global, node.results[0]));
            }
            _ => return None,
        }

        if !Self::match_operands(dag, &node.operands, pattern.operands, &mut captures, &mut chain) {
            return None;
        }
        Some(Match {
            pattern,
            captures,
            chain,
        })
    }

    fn match_operands(
        dag: &Dag,
        operands: &[SdValue],
        patterns: &[OperandPattern],
        captures: &mut Vec<Capture>,
        chain: &mut Option<SdValue>,
    ) -> bool {
        let mut next = 0;
        for pattern in patterns {
            if let OperandPattern::Variadic = pattern {
                for &op in &operands[next..] {
                    if dag.value_type(op).is_chain() {
                        return false;
                    }
                    captures.push(Capture::Value(op));
                }
                next = operands.len();
                continue;
            }
            let Some(&op) = operands.get(next) else {
                return false;
            };
            next += 1;
            if !Self::match_operand(dag, op, pattern, captures, chain) {
                return false;
            }
        }
        next == operands.len()
    }

    fn match_operand(
        dag: &Dag,
        op: SdValue,
        pattern: &OperandPattern,
        captures: &mut Vec<Capture>,
        chain: &mut Option<SdValue>,
    ) -> bool {
        let def = &dag[op.node];
        let ty = dag.value_type(op);
        match *pattern {
            OperandPattern::Reg => {
                if ty.is_chain() {
                    return false;
                }
                captures.push(Capture::Value(op));
                true
            }
            OperandPattern::Chain => {
                if !ty.is_chain() || chain.is_some() {
                    return false;
                }
                *chain = Some(op);
                true
            }
            OperandPattern::Imm(domain) => match (def.opcode, def.payload) {
                (Opcode::Generic(GenericOp::Constant), Payload::Imm(value))
                    if domain.contains(value) =>
                {
                    captures.push(Capture::Imm(value, ty));
                    true
                }
                _ => false,
            },
            OperandPattern::TargetImm => {
                if def.opcode != Opcode::Target(TargetLeaf::TargetConstant) {
                    return false;
                }
                captures.push(Capture::Value(op));
                true
            }
            OperandPattern::Skip => true,
            OperandPattern::IntrinsicId(id) => {
                def.opcode == Opcode::Target(TargetLeaf::TargetConstant) && def.imm() == Some(id)
            }
            OperandPattern::Global => match (def.opcode, def.payload) {
                (Opcode::Generic(GenericOp::GlobalAddress), Payload::Global(global)) => {
                    captures.push(Capture::Global(global, ty));
                    true
                }
                _ => false,
            },
            OperandPattern::Fold { op: fold_op, nuw, operands } => {
                if def.opcode != Opcode::Generic(fold_op)
                    || op.result != 0
                    || def.is_finalized()
                    || !dag.has_one_use(op.node)
                    || (nuw && !def.flags.nuw)
                {
                    return false;
                }
                Self::match_operands(dag, &def.operands, operands, captures, chain)
            }
            OperandPattern::Variadic => false,
        }
    }

    /// Materialize a match as a finalized machine node.
    pub fn emit(dag: &mut Dag, id: NodeId, found: &Match) -> SelectResult<NodeId> {
        let pattern = found.pattern;
        let mut operands = Vec::with_capacity(pattern.implicit.len() + found.captures.len() + 1);
        for &imm in pattern.implicit {
            operands.push(dag.get_target_constant(imm, ValueType::I32));
        }

        let materialized: Vec<SdValue> = found
            .captures
            .iter()
            .map(|capture| match *capture {
                Capture::Value(value) => value,
                Capture::Imm(value, ty) => dag.get_target_constant(value, ty),
                Capture::FpBits(bits, ty) => dag.get_target_constant_fp(bits, ty),
                Capture::Global(global, ty) => dag.get_target_global(global, ty),
            })
            .collect();

        if pattern.order.is_empty() {
            operands.extend(materialized);
        } else {
            if pattern.order.len() != materialized.len() {
                return Err(FatalError::internal(
                    id,
                    dag[id].opcode,
                    format!(
                        "pattern {} orders {} of {} captures",
                        pattern.name,
                        pattern.order.len(),
                        materialized.len()
                    ),
                ));
            }
            for &idx in pattern.order {
                let Some(&value) = materialized.get(idx) else {
                    return Err(FatalError::internal(
                        id,
                        dag[id].opcode,
                        format!("pattern {} orders missing capture {}", pattern.name, idx),
                    ));
                };
                operands.push(value);
            }
        }

        if let Some(chain) = found.chain {
            operands.push(chain);
        }

        let results = dag[id].results.clone();
        Ok(dag.get_machine_node(pattern.emit, &results, &operands))
    }
}
