//! Structural checks over a [`Dag`].
//!
//! `verify` checks referential integrity (every operand points at a live
//! node and a valid result, user lists mirror operand lists), acyclicity and
//! reachability. `verify_selected` additionally requires that nothing
//! generic is left reachable from the root and that every reachable node is
//! finalized.

use super::{Dag, NodeId, NodeState};
use hashbrown::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("function has no root")]
    NoRoot,

    #[error("{user} uses removed node {operand}")]
    DanglingOperand { user: NodeId, operand: NodeId },

    #[error("{user} uses result {result} of {node}, which has {count} results")]
    BadResult {
        user: NodeId,
        node: NodeId,
        result: u32,
        count: usize,
    },

    #[error("user list of {node} does not match its uses")]
    UserMismatch { node: NodeId },

    #[error("cycle through {0}")]
    Cycle(NodeId),

    #[error("{0} is live but not reachable from the root")]
    Unreachable(NodeId),

    #[error("{node} ({opcode}) was not selected")]
    Unselected { node: NodeId, opcode: &'static str },

    #[error("{node} ({opcode}) is machine-level but not finalized")]
    NotFinalized { node: NodeId, opcode: &'static str },
}

impl Dag {
    pub fn verify(&self) -> Result<(), VerifyError> {
        let root = self.root.ok_or(VerifyError::NoRoot)?;

        let mut use_counts: HashMap<NodeId, usize> = HashMap::new();
        for id in self.node_ids() {
            for op in &self[id].operands {
                let Some(def) = self.get(op.node) else {
                    return Err(VerifyError::DanglingOperand {
                        user: id,
                        operand: op.node,
                    });
                };
                if op.result as usize >= def.results.len() {
                    return Err(VerifyError::BadResult {
                        user: id,
                        node: op.node,
                        result: op.result,
                        count: def.results.len(),
                    });
                }
                *use_counts.entry(op.node).or_default() += 1;
            }
        }
        for id in self.node_ids() {
            let expected = use_counts.get(&id).copied().unwrap_or(0);
            let users = &self[id].users;
            let consistent = users.len() == expected
                && users.iter().all(|u| {
                    self.get(*u)
                        .is_some_and(|n| n.operands.iter().any(|op| op.node == id))
                });
            if !consistent {
                return Err(VerifyError::UserMismatch { node: id });
            }
        }

        self.check_acyclic(root)?;

        let reachable = self.reachable();
        for id in self.node_ids() {
            if id != self.entry && !reachable.contains(&id) {
                return Err(VerifyError::Unreachable(id));
            }
        }
        Ok(())
    }

    /// Post-selection check: structure plus no generic node left.
    pub fn verify_selected(&self) -> Result<(), VerifyError> {
        self.verify()?;
        for id in self.topological_order() {
            let node = &self[id];
            if !node.is_machine_level() {
                return Err(VerifyError::Unselected {
                    node: id,
                    opcode: node.opcode.name(),
                });
            }
            if node.state != NodeState::Finalized {
                return Err(VerifyError::NotFinalized {
                    node: id,
                    opcode: node.opcode.name(),
                });
            }
        }
        Ok(())
    }

    fn check_acyclic(&self, root: NodeId) -> Result<(), VerifyError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Open,
            Done,
        }

        let mut marks = vec![Mark::New; self.nodes.len()];
        let mut stack = vec![(root, 0usize)];
        marks[root.index()] = Mark::Open;

        while let Some(top) = stack.last_mut() {
            let (id, next) = *top;
            let operands = &self[id].operands;
            if next < operands.len() {
                top.1 += 1;
                let op = operands[next].node;
                match marks[op.index()] {
                    Mark::Open => return Err(VerifyError::Cycle(op)),
                    Mark::New => {
                        marks[op.index()] = Mark::Open;
                        stack.push((op, 0));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[id.index()] = Mark::Done;
                stack.pop();
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::VerifyError;
    use crate::dag::{opcode::MachineOpcode, Dag, GenericOp, Payload, ValueType};

    const RET: MachineOpcode = MachineOpcode::new(200, "RET", 0);

    #[test]
    fn generic_root_fails_selected_check() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let ret = dag.get_node(GenericOp::Return, &[], &[entry], Payload::None);
        dag.set_root(ret);
        assert_eq!(dag.verify(), Ok(()));
        assert!(matches!(
            dag.verify_selected(),
            Err(VerifyError::Unselected { opcode: "ret", .. })
        ));
    }

    #[test]
    fn machine_graph_passes() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let ret = dag.get_machine_node(RET, &[], &[entry]);
        dag.set_root(ret);
        assert_eq!(dag.verify_selected(), Ok(()));
    }

    #[test]
    fn stray_nodes_are_reported() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let stray = dag.get_node(GenericOp::Argument, &[ValueType::I32], &[], Payload::Imm(0));
        let ret = dag.get_machine_node(RET, &[], &[entry]);
        dag.set_root(ret);
        assert_eq!(dag.verify(), Err(VerifyError::Unreachable(stray)));
    }
}
