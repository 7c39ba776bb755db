//! DAG rewriting: replacement, use rewiring and dead-node elimination.
//!
//! Replacement maps result `i` of the old node onto result `i` of the new
//! one, so a replacement with the same result signature (including the
//! chain result position) splices into the chain exactly where the old node
//! was. After rewiring, the old node and everything that only it kept alive
//! are reclaimed.

use super::{Dag, NodeId, SdValue};
use crate::core::error::{FatalError, SelectResult};

impl Dag {
    /// Redirect every use of `from` to `to`.
    pub fn replace_all_uses_of_value_with(&mut self, from: SdValue, to: SdValue) {
        if from == to {
            return;
        }

        let mut users = self[from.node].users.clone();
        users.sort_unstable();
        users.dedup();

        for user in users {
            let mut rewired = 0;
            for op in self.node_mut(user).operands.iter_mut() {
                if *op == from {
                    *op = to;
                    rewired += 1;
                }
            }
            for _ in 0..rewired {
                self.remove_user(from.node, user);
                self.node_mut(to.node).users.push(user);
            }
        }
    }

    /// Replace `old` with `new` and delete `old` if it became dead.
    ///
    /// Returns the number of nodes reclaimed.
    pub fn replace_node(&mut self, old: NodeId, new: NodeId) -> SelectResult<usize> {
        let old_node = &self[old];
        let new_node = &self[new];

        if new_node.results.len() < old_node.results.len()
            || old_node
                .results
                .iter()
                .zip(&new_node.results)
                .any(|(a, b)| a != b)
        {
            return Err(FatalError::internal(
                old,
                old_node.opcode,
                format!(
                    "replacement {} ({}) has a different result signature",
                    new, new_node.opcode
                ),
            ));
        }

        if old_node.chain_result().is_some() {
            if let Some(chain_in) = self.chain_operand(old) {
                if self.chain_operand(new) != Some(chain_in) {
                    return Err(FatalError::internal(
                        old,
                        old_node.opcode,
                        format!("replacement {new} does not take over the chain input {chain_in}"),
                    ));
                }
            }
        }

        let result_count = old_node.results.len() as u32;
        for result in 0..result_count {
            self.replace_all_uses_of_value_with(
                SdValue::new(old, result),
                SdValue::new(new, result),
            );
        }
        if self.root == Some(old) {
            self.root = Some(new);
        }

        log::trace!("replaced {} with {}", old, new);
        Ok(self.remove_dead_node(old))
    }

    fn is_dead(&self, id: NodeId) -> bool {
        self[id].users.is_empty() && self.root != Some(id) && self.entry != id
    }

    /// Delete `id` if nothing uses it, then every operand that becomes
    /// unused as a consequence.
    ///
    /// Returns the number of nodes deleted.
    pub fn remove_dead_node(&mut self, id: NodeId) -> usize {
        if !self.contains(id) || !self.is_dead(id) {
            return 0;
        }

        let mut removed = 0;
        let mut worklist = vec![id];
        while let Some(dead) = worklist.pop() {
            if !self.contains(dead) || !self.is_dead(dead) {
                continue;
            }
            let node = self.erase(dead);
            removed += 1;
            for op in node.operands {
                if !self.contains(op.node) {
                    continue;
                }
                self.remove_user(op.node, dead);
                if self.is_dead(op.node) {
                    worklist.push(op.node);
                }
            }
        }
        removed
    }

    /// Delete every node the root (and the entry token) cannot reach.
    pub fn remove_unreachable_nodes(&mut self) -> usize {
        let mut reachable = self.reachable();
        reachable.insert(self.entry);

        let dead: Vec<NodeId> = self.node_ids().filter(|id| !reachable.contains(id)).collect();
        for &id in &dead {
            let operands = std::mem::take(&mut self.node_mut(id).operands);
            for op in operands {
                if self.contains(op.node) {
                    self.remove_user(op.node, id);
                }
            }
        }
        for &id in &dead {
            self.erase(id);
        }
        dead.len()
    }

    fn remove_user(&mut self, node: NodeId, user: NodeId) {
        let users = &mut self.node_mut(node).users;
        if let Some(pos) = users.iter().position(|&u| u == user) {
            users.swap_remove(pos);
        }
    }

    fn erase(&mut self, id: NodeId) -> super::Node {
        let node = match self.nodes[id.index()].take() {
            Some(node) => node,
            None => panic!("{id} erased twice"),
        };
        if let Some(key) = Self::leaf_key(&node) {
            self.leaves.remove(&key);
        }
        self.live -= 1;
        node
    }
}

#[cfg(test)]
mod tests {
    use crate::dag::{
        opcode::{MachineOpcode, MI_SIDE_EFFECTS},
        Dag, GenericOp, Payload, SdValue, ValueType,
    };

    const ADD: MachineOpcode = MachineOpcode::new(100, "ADD", 0);
    const FENCE: MachineOpcode = MachineOpcode::new(101, "FENCE", MI_SIDE_EFFECTS);

    fn arg(dag: &mut Dag, idx: i64) -> SdValue {
        SdValue::new(
            dag.get_node(GenericOp::Argument, &[ValueType::I32], &[], Payload::Imm(idx)),
            0,
        )
    }

    #[test]
    fn replace_node_rewires_users_and_reclaims_old() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let a = arg(&mut dag, 0);
        let b = arg(&mut dag, 1);
        let add = dag.get_node(GenericOp::Add, &[ValueType::I32], &[a, b], Payload::None);
        let ret = dag.get_node(
            GenericOp::Return,
            &[],
            &[entry, SdValue::new(add, 0)],
            Payload::None,
        );
        dag.set_root(ret);

        let machine = dag.get_machine_node(ADD, &[ValueType::I32], &[a, b]);
        let removed = dag.replace_node(add, machine).unwrap();

        assert_eq!(removed, 1);
        assert!(!dag.contains(add));
        assert_eq!(dag[ret].operands[1], SdValue::new(machine, 0));
        assert_eq!(dag.users(machine), &[ret]);
        // The arguments are still used by the replacement.
        assert_eq!(dag.users(a.node), &[machine]);
    }

    #[test]
    fn replacement_must_keep_result_signature() {
        let mut dag = Dag::new("f");
        let a = arg(&mut dag, 0);
        let add = dag.get_node(GenericOp::Add, &[ValueType::I32], &[a, a], Payload::None);
        let wrong = dag.get_machine_node(ADD, &[ValueType::I64], &[a, a]);
        assert!(dag.replace_node(add, wrong).is_err());
    }

    #[test]
    fn chain_is_spliced_in_place() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let ord = dag.get_target_constant(7, ValueType::I32);
        let scope = dag.get_target_constant(1, ValueType::I32);
        let fence = dag.get_node(
            GenericOp::AtomicFence,
            &[ValueType::Chain],
            &[entry, ord, scope],
            Payload::None,
        );
        let ret = dag.get_node(GenericOp::Return, &[], &[SdValue::new(fence, 0)], Payload::None);
        dag.set_root(ret);

        let bad = dag.get_machine_node(FENCE, &[ValueType::Chain], &[]);
        assert!(dag.replace_node(fence, bad).is_err());

        let good = dag.get_machine_node(FENCE, &[ValueType::Chain], &[entry]);
        dag.replace_node(fence, good).unwrap();
        assert_eq!(dag.chain_operand(ret), Some(SdValue::new(good, 0)));
        assert_eq!(dag.chain_operand(good), Some(entry));
        // Ordering and scope constants had no other users.
        assert!(!dag.contains(ord.node));
        assert!(!dag.contains(scope.node));
    }

    #[test]
    fn dead_node_elimination_is_transitive() {
        let mut dag = Dag::new("f");
        let a = arg(&mut dag, 0);
        let add = dag.get_node(GenericOp::Add, &[ValueType::I32], &[a, a], Payload::None);
        let mul = dag.get_node(
            GenericOp::Mul,
            &[ValueType::I32],
            &[SdValue::new(add, 0), a],
            Payload::None,
        );
        assert_eq!(dag.remove_dead_node(mul), 3);
        assert!(!dag.contains(a.node));
        assert!(dag.contains(dag.entry_token().node));
    }

    #[test]
    fn unreachable_nodes_are_swept() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let a = arg(&mut dag, 0);
        let _stray = dag.get_node(GenericOp::Add, &[ValueType::I32], &[a, a], Payload::None);
        let ret = dag.get_node(GenericOp::Return, &[], &[entry, a], Payload::None);
        dag.set_root(ret);

        assert_eq!(dag.remove_unreachable_nodes(), 1);
        assert_eq!(dag.users(a.node), &[ret]);
        assert_eq!(dag.len(), 3);
    }
}
