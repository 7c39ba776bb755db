//! LLVM-style DAG dump.
//!
//! Nodes reachable from the root are printed in topological order and
//! renumbered densely, so two graphs with the same shape print the same
//! text regardless of how many nodes were created and deleted on the way.

use super::{Dag, Node, NodeId, Opcode, Payload, SdValue, ValueType};
use hashbrown::HashMap;
use std::fmt::{self, Write};

pub struct DagPrinter<'a> {
    dag: &'a Dag,
}

impl<'a> DagPrinter<'a> {
    pub fn new(dag: &'a Dag) -> Self {
        Self { dag }
    }

    fn write_payload(&self, out: &mut impl Write, node: &Node) -> fmt::Result {
        match node.payload {
            Payload::None => Ok(()),
            Payload::Imm(value) => write!(out, "<{value}>"),
            Payload::FpBits(bits) => match node.results.first() {
                Some(ValueType::F32) => write!(out, "<{:?}>", f32::from_bits(bits as u32)),
                _ => write!(out, "<{:?}>", f64::from_bits(bits)),
            },
            Payload::Symbol(sym) => write!(out, "<'{}'>", self.dag.symbol_name(sym)),
            Payload::Global(global) => {
                write!(out, "<@{}", self.dag.symbol_name(global.symbol))?;
                if global.offset != 0 {
                    write!(out, "{:+}", global.offset)?;
                }
                if node.opcode == Opcode::Generic(super::GenericOp::GlobalTlsAddress) {
                    write!(out, " {}", global.tls_model)?;
                }
                out.write_char('>')
            }
            Payload::Asm(id) => {
                let info = self.dag.asm_info(id);
                write!(out, "<{:?}", info.template)?;
                for (idx, kind) in info.operands.iter().enumerate() {
                    out.write_str(if idx == 0 { " " } else { ", " })?;
                    write!(out, "{kind}")?;
                }
                out.write_char('>')
            }
        }
    }
}

impl fmt::Display for DagPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {}:", self.dag.name())?;

        let order = self.dag.topological_order();
        let numbering: HashMap<NodeId, usize> =
            order.iter().enumerate().map(|(idx, &id)| (id, idx)).collect();
        let value = |v: &SdValue| -> String {
            let n = numbering.get(&v.node).copied().unwrap_or(usize::MAX);
            if v.result == 0 {
                format!("t{n}")
            } else {
                format!("t{n}:{}", v.result)
            }
        };

        for (idx, &id) in order.iter().enumerate() {
            let node = &self.dag[id];
            write!(f, "  t{idx}: ")?;
            if !node.results.is_empty() {
                let types: Vec<&str> = node.results.iter().map(|ty| ty.name()).collect();
                write!(f, "{} = ", types.join(","))?;
            }
            f.write_str(node.opcode.name())?;
            self.write_payload(f, node)?;
            if node.flags.nuw {
                f.write_str(" nuw")?;
            }
            for (i, op) in node.operands.iter().enumerate() {
                f.write_str(if i == 0 { " " } else { ", " })?;
                f.write_str(&value(op))?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl fmt::Display for Dag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        DagPrinter::new(self).fmt(f)
    }
}
