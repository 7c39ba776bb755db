// This module defines the dataflow graph operated on by instruction selection. A Dag owns
// every node of one function in a slot vector indexed by NodeId; removed nodes leave an
// empty slot so ids stay stable for the whole pass. Each node records its opcode (generic,
// target leaf or machine), ordered operands (SdValue = node + result index), typed results,
// an immediate/symbol payload, and an explicit Unvisited/Finalized state. Users are kept as
// non-owning back-references so replacement can rewire consumers without the caller knowing
// who they are. Target leaves (constants, symbols, global addresses) are uniqued through a
// hashbrown map, and names are interned once per DAG.

//! Selection DAG model.
//!
//! - [`Dag`]: node store, leaf uniquing, symbol interning, traversal.
//! - [`rewrite`]: node replacement, use rewiring and dead-node elimination.
//! - [`verify`]: structural and post-selection invariants.
//! - [`print`]: LLVM-style dump with stable numbering.

pub mod opcode;
pub mod print;
pub mod rewrite;
pub mod types;
pub mod verify;

pub use opcode::{
    sync_scope, target_opcode, AtomicOrdering, GenericOp, MachineOpcode, Opcode, TargetLeaf,
    TlsModel, MI_PSEUDO, MI_SIDE_EFFECTS,
};
pub use types::ValueType;
pub use verify::VerifyError;

use crate::isel::constraint::AsmOperandKind;
use bumpalo::{collections::Vec as BumpVec, Bump};
use hashbrown::{HashMap, HashSet};
use std::fmt;
use std::ops::Index;

/// Stable handle of a node within its [`Dag`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub const fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// One result value of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SdValue {
    pub node: NodeId,
    pub result: u32,
}

impl SdValue {
    pub const fn new(node: NodeId, result: u32) -> Self {
        Self { node, result }
    }
}

impl fmt::Display for SdValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.result == 0 {
            write!(f, "{}", self.node)
        } else {
            write!(f, "{}:{}", self.node, self.result)
        }
    }
}

/// Selection state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NodeState {
    #[default]
    Unvisited,
    /// Already machine-level; never selected again.
    Finalized,
}

/// Interned name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(u32);

/// Index of an inline-assembly descriptor in its DAG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsmId(u32);

/// Reference to a global variable, optionally displaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlobalRef {
    pub symbol: Symbol,
    pub offset: i64,
    pub tls_model: TlsModel,
}

/// Inline assembly descriptor shared by the generic node and its selected form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmInfo {
    pub template: String,
    /// One entry per non-chain operand, in operand order.
    pub operands: Vec<AsmOperandKind>,
}

/// Non-operand data attached to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Payload {
    #[default]
    None,
    Imm(i64),
    FpBits(u64),
    Symbol(Symbol),
    Global(GlobalRef),
    Asm(AsmId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeFlags {
    /// Integer add known not to wrap as unsigned.
    pub nuw: bool,
}

/// A single operation or value in the graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub opcode: Opcode,
    pub operands: Vec<SdValue>,
    pub results: Vec<ValueType>,
    pub payload: Payload,
    pub flags: NodeFlags,
    pub state: NodeState,
    pub(crate) users: Vec<NodeId>,
}

impl Node {
    pub fn is_machine_level(&self) -> bool {
        self.opcode.is_machine_level()
    }

    pub fn is_finalized(&self) -> bool {
        self.state == NodeState::Finalized
    }

    pub fn generic_op(&self) -> Option<GenericOp> {
        self.opcode.generic()
    }

    /// Index of the chain result, if the node produces one.
    pub fn chain_result(&self) -> Option<u32> {
        self.results
            .iter()
            .position(|ty| ty.is_chain())
            .map(|idx| idx as u32)
    }

    pub fn imm(&self) -> Option<i64> {
        match self.payload {
            Payload::Imm(value) => Some(value),
            _ => None,
        }
    }

    pub fn users(&self) -> &[NodeId] {
        &self.users
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct LeafKey {
    leaf: TargetLeaf,
    ty: ValueType,
    payload: Payload,
}

#[derive(Debug, Default, Clone)]
struct SymbolTable {
    names: Vec<String>,
    lookup: HashMap<String, Symbol>,
}

/// Dataflow graph of one function.
#[derive(Debug, Clone)]
pub struct Dag {
    name: String,
    nodes: Vec<Option<Node>>,
    live: usize,
    root: Option<NodeId>,
    entry: NodeId,
    leaves: HashMap<LeafKey, NodeId>,
    symbols: SymbolTable,
    asm: Vec<AsmInfo>,
}

impl Dag {
    /// Create an empty graph holding only the entry token.
    pub fn new(name: impl Into<String>) -> Self {
        let mut dag = Self {
            name: name.into(),
            nodes: Vec::new(),
            live: 0,
            root: None,
            entry: NodeId::new(0),
            leaves: HashMap::new(),
            symbols: SymbolTable::default(),
            asm: Vec::new(),
        };
        dag.entry = dag.push_node(Node {
            opcode: Opcode::Target(TargetLeaf::EntryToken),
            operands: Vec::new(),
            results: vec![ValueType::Chain],
            payload: Payload::None,
            flags: NodeFlags::default(),
            state: NodeState::Finalized,
            users: Vec::new(),
        });
        dag
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry_token(&self) -> SdValue {
        SdValue::new(self.entry, 0)
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn set_root(&mut self, root: NodeId) {
        self.root = Some(root);
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Upper bound (exclusive) of node indices ever handed out.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.nodes.get_mut(id.index()).and_then(Option::as_mut) {
            Some(node) => node,
            None => panic!("{id} is not a live node"),
        }
    }

    /// Ids of all live nodes in creation order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(idx, _)| NodeId::new(idx))
    }

    pub fn users(&self, id: NodeId) -> &[NodeId] {
        &self[id].users
    }

    pub fn has_one_use(&self, id: NodeId) -> bool {
        self[id].users.len() == 1
    }

    pub fn value_type(&self, value: SdValue) -> ValueType {
        self[value.node].results[value.result as usize]
    }

    /// The chain operand of a node, if any.
    pub fn chain_operand(&self, id: NodeId) -> Option<SdValue> {
        self[id]
            .operands
            .iter()
            .copied()
            .find(|op| self.value_type(*op).is_chain())
    }

    pub fn intern(&mut self, name: &str) -> Symbol {
        if let Some(&sym) = self.symbols.lookup.get(name) {
            return sym;
        }
        let sym = Symbol(self.symbols.names.len() as u32);
        self.symbols.names.push(name.to_string());
        self.symbols.lookup.insert(name.to_string(), sym);
        sym
    }

    pub fn symbol_name(&self, sym: Symbol) -> &str {
        &self.symbols.names[sym.0 as usize]
    }

    pub fn add_asm(&mut self, info: AsmInfo) -> AsmId {
        self.asm.push(info);
        AsmId(self.asm.len() as u32 - 1)
    }

    pub fn asm_info(&self, id: AsmId) -> &AsmInfo {
        &self.asm[id.0 as usize]
    }

    fn push_node(&mut self, node: Node) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        for op in &node.operands {
            self.node_mut(op.node).users.push(id);
        }
        self.nodes.push(Some(node));
        self.live += 1;
        id
    }

    /// Create an unselected generic node.
    pub fn get_node(
        &mut self,
        op: GenericOp,
        results: &[ValueType],
        operands: &[SdValue],
        payload: Payload,
    ) -> NodeId {
        self.get_node_with_flags(op, results, operands, payload, NodeFlags::default())
    }

    pub fn get_node_with_flags(
        &mut self,
        op: GenericOp,
        results: &[ValueType],
        operands: &[SdValue],
        payload: Payload,
        flags: NodeFlags,
    ) -> NodeId {
        self.push_node(Node {
            opcode: Opcode::Generic(op),
            operands: operands.to_vec(),
            results: results.to_vec(),
            payload,
            flags,
            state: NodeState::Unvisited,
            users: Vec::new(),
        })
    }

    /// Create a finalized machine node.
    pub fn get_machine_node(
        &mut self,
        op: MachineOpcode,
        results: &[ValueType],
        operands: &[SdValue],
    ) -> NodeId {
        self.get_machine_node_with_payload(op, results, operands, Payload::None)
    }

    pub fn get_machine_node_with_payload(
        &mut self,
        op: MachineOpcode,
        results: &[ValueType],
        operands: &[SdValue],
        payload: Payload,
    ) -> NodeId {
        self.push_node(Node {
            opcode: Opcode::Machine(op),
            operands: operands.to_vec(),
            results: results.to_vec(),
            payload,
            flags: NodeFlags::default(),
            state: NodeState::Finalized,
            users: Vec::new(),
        })
    }

    fn get_leaf(&mut self, leaf: TargetLeaf, ty: ValueType, payload: Payload) -> SdValue {
        let key = LeafKey { leaf, ty, payload };
        if let Some(&id) = self.leaves.get(&key) {
            return SdValue::new(id, 0);
        }
        let id = self.push_node(Node {
            opcode: Opcode::Target(leaf),
            operands: Vec::new(),
            results: vec![ty],
            payload,
            flags: NodeFlags::default(),
            state: NodeState::Finalized,
            users: Vec::new(),
        });
        self.leaves.insert(key, id);
        SdValue::new(id, 0)
    }

    pub fn get_target_constant(&mut self, value: i64, ty: ValueType) -> SdValue {
        self.get_leaf(TargetLeaf::TargetConstant, ty, Payload::Imm(value))
    }

    pub fn get_target_constant_fp(&mut self, bits: u64, ty: ValueType) -> SdValue {
        self.get_leaf(TargetLeaf::TargetConstantFP, ty, Payload::FpBits(bits))
    }

    pub fn get_target_symbol(&mut self, name: &str, ty: ValueType) -> SdValue {
        let sym = self.intern(name);
        self.get_leaf(TargetLeaf::TargetSymbol, ty, Payload::Symbol(sym))
    }

    pub fn get_target_global(&mut self, global: GlobalRef, ty: ValueType) -> SdValue {
        self.get_leaf(TargetLeaf::TargetGlobalAddress, ty, Payload::Global(global))
    }

    fn leaf_key(node: &Node) -> Option<LeafKey> {
        match node.opcode {
            Opcode::Target(TargetLeaf::EntryToken) => None,
            Opcode::Target(leaf) => Some(LeafKey {
                leaf,
                ty: node.results[0],
                payload: node.payload,
            }),
            _ => None,
        }
    }

    /// Nodes reachable from the root, operands before users.
    pub fn topological_order_in<'b>(&self, bump: &'b Bump) -> BumpVec<'b, NodeId> {
        let mut order = BumpVec::with_capacity_in(self.live, bump);
        let Some(root) = self.root else {
            return order;
        };
        let mut visited = bumpalo::vec![in bump; false; self.nodes.len()];
        let mut stack: BumpVec<'b, (NodeId, usize)> = BumpVec::new_in(bump);
        visited[root.index()] = true;
        stack.push((root, 0));

        while let Some(top) = stack.last_mut() {
            let (id, next) = *top;
            let operands = &self[id].operands;
            if next < operands.len() {
                top.1 += 1;
                let op = operands[next].node;
                if !visited[op.index()] {
                    visited[op.index()] = true;
                    stack.push((op, 0));
                }
            } else {
                stack.pop();
                order.push(id);
            }
        }
        order
    }

    pub fn topological_order(&self) -> Vec<NodeId> {
        let bump = Bump::new();
        let order = self.topological_order_in(&bump).to_vec();
        order
    }

    pub fn reachable(&self) -> HashSet<NodeId> {
        self.topological_order().into_iter().collect()
    }
}

impl Index<NodeId> for Dag {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.get(id) {
            Some(node) => node,
            None => panic!("{id} is not a live node"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_are_uniqued() {
        let mut dag = Dag::new("f");
        let a = dag.get_target_constant(4, ValueType::I32);
        let b = dag.get_target_constant(4, ValueType::I32);
        let c = dag.get_target_constant(4, ValueType::I64);
        assert_eq!(a, b);
        assert_ne!(a, c);
        let s1 = dag.get_target_symbol("__tls_base", ValueType::I32);
        let s2 = dag.get_target_symbol("__tls_base", ValueType::I32);
        assert_eq!(s1, s2);
        assert!(dag[a.node].is_finalized());
    }

    #[test]
    fn users_track_operands() {
        let mut dag = Dag::new("f");
        let a = dag.get_node(GenericOp::Argument, &[ValueType::I32], &[], Payload::Imm(0));
        let a = SdValue::new(a, 0);
        let add = dag.get_node(GenericOp::Add, &[ValueType::I32], &[a, a], Payload::None);
        assert_eq!(dag.users(a.node), &[add, add]);
        assert!(!dag[add].is_finalized());
    }

    #[test]
    fn topological_order_puts_operands_first() {
        let mut dag = Dag::new("f");
        let entry = dag.entry_token();
        let a = dag.get_node(GenericOp::Argument, &[ValueType::I32], &[], Payload::Imm(0));
        let c = dag.get_node(GenericOp::Constant, &[ValueType::I32], &[], Payload::Imm(1));
        let add = dag.get_node(
            GenericOp::Add,
            &[ValueType::I32],
            &[SdValue::new(a, 0), SdValue::new(c, 0)],
            Payload::None,
        );
        let ret = dag.get_node(
            GenericOp::Return,
            &[],
            &[entry, SdValue::new(add, 0)],
            Payload::None,
        );
        dag.set_root(ret);

        let order = dag.topological_order();
        let pos = |id: NodeId| order.iter().position(|&n| n == id).unwrap();
        assert!(pos(a) < pos(add));
        assert!(pos(c) < pos(add));
        assert!(pos(add) < pos(ret));
        assert_eq!(*order.last().unwrap(), ret);
    }
}
