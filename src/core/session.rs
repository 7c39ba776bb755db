// This module provides the per-function selection session. SelectionContext is the mutable
// state scoped to selecting one function: it owns the function's Dag (the cursor for fresh
// nodes is the DAG's own id allocator), borrows the immutable TargetContext shared by the
// whole compilation unit, and owns a bumpalo arena for per-pass scratch data such as the
// traversal order and worklists. The arena is reset between functions when a context is
// reused. SessionStats records what the driver did (nodes visited, claimed by custom rules,
// covered by patterns, dead nodes reclaimed, per-opcode counts) and can be merged across
// functions for a unit-level summary.

//! Per-function selection session.
//!
//! A [`SelectionContext`] is created when selection of one function starts
//! and dropped when it completes. It is `Send`, so independent workers can
//! each own one while sharing a single `&TargetContext`.

use super::target::TargetContext;
use crate::dag::Dag;
use bumpalo::Bump;
use std::collections::BTreeMap;
use std::fmt;

/// Mutable state of one function's selection pass.
pub struct SelectionContext<'t> {
    /// Graph being rewritten in place.
    pub dag: Dag,

    /// Target facts shared by the compilation unit.
    target: &'t TargetContext,

    /// Scratch arena for traversal data.
    arena: Bump,

    /// Statistics for this function.
    pub stats: SessionStats,
}

impl<'t> SelectionContext<'t> {
    pub fn new(dag: Dag, target: &'t TargetContext) -> Self {
        Self {
            dag,
            target,
            arena: Bump::new(),
            stats: SessionStats::default(),
        }
    }

    pub fn target(&self) -> &'t TargetContext {
        self.target
    }

    pub fn arena(&self) -> &Bump {
        &self.arena
    }

    /// Release scratch memory and statistics, keeping the target.
    pub fn reset(&mut self, dag: Dag) {
        self.arena.reset();
        self.dag = dag;
        self.stats = SessionStats::default();
    }

    /// Move the scratch arena out so traversal data allocated in it can
    /// outlive mutable borrows of the context. Pair with [`Self::restore_arena`].
    pub(crate) fn take_arena(&mut self) -> Bump {
        std::mem::take(&mut self.arena)
    }

    pub(crate) fn restore_arena(&mut self, arena: Bump) {
        self.arena = arena;
        self.record_arena_usage();
    }

    pub fn into_dag(self) -> Dag {
        self.dag
    }

    /// Record a node selected by a custom lowering rule.
    pub fn record_custom(&mut self, opcode: &str) {
        self.stats.custom_selected += 1;
        *self
            .stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    /// Record a node covered by a table pattern.
    pub fn record_pattern(&mut self, opcode: &str) {
        self.stats.pattern_selected += 1;
        *self
            .stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_removed(&mut self, count: usize) {
        self.stats.nodes_removed += count;
    }

    pub fn record_arena_usage(&mut self) {
        let bytes = self.arena.allocated_bytes();
        if bytes > self.stats.peak_arena_bytes {
            self.stats.peak_arena_bytes = bytes;
        }
    }
}

/// Selection statistics.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SessionStats {
    /// Functions selected (1 for a single pass, summed when merged).
    pub functions_selected: usize,

    /// Nodes taken from the traversal order.
    pub nodes_visited: usize,

    /// Nodes skipped because they were already machine-level.
    pub already_selected: usize,

    /// Nodes claimed by a custom lowering rule.
    pub custom_selected: usize,

    /// Nodes covered by the pattern table.
    pub pattern_selected: usize,

    /// Inline-assembly nodes whose operands were bound.
    pub asm_bound: usize,

    /// Nodes reclaimed as dead or unreachable.
    pub nodes_removed: usize,

    /// Count of each machine opcode emitted as a replacement root.
    pub instruction_counts: BTreeMap<String, usize>,

    /// Largest function by live node count after selection.
    pub largest_function_nodes: usize,

    /// Name of the largest function.
    pub largest_function_name: String,

    /// High-water mark of the scratch arena.
    pub peak_arena_bytes: usize,
}

impl SessionStats {
    /// Total replacements performed.
    pub fn replacements(&self) -> usize {
        self.custom_selected + self.pattern_selected + self.asm_bound
    }

    pub fn record_function(&mut self, name: &str, nodes: usize) {
        self.functions_selected += 1;
        if nodes > self.largest_function_nodes || self.largest_function_name.is_empty() {
            self.largest_function_nodes = nodes;
            self.largest_function_name = name.to_string();
        }
    }

    pub fn merge(&mut self, other: &SessionStats) {
        self.functions_selected += other.functions_selected;
        self.nodes_visited += other.nodes_visited;
        self.already_selected += other.already_selected;
        self.custom_selected += other.custom_selected;
        self.pattern_selected += other.pattern_selected;
        self.asm_bound += other.asm_bound;
        self.nodes_removed += other.nodes_removed;
        for (opcode, count) in &other.instruction_counts {
            *self.instruction_counts.entry(opcode.clone()).or_insert(0) += count;
        }
        if other.largest_function_nodes > self.largest_function_nodes {
            self.largest_function_nodes = other.largest_function_nodes;
            self.largest_function_name = other.largest_function_name.clone();
        }
        self.peak_arena_bytes = self.peak_arena_bytes.max(other.peak_arena_bytes);
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Selection Statistics:")?;
        writeln!(f, "  Functions selected: {}", self.functions_selected)?;
        writeln!(f, "  Nodes visited: {}", self.nodes_visited)?;
        writeln!(f, "  Already machine-level: {}", self.already_selected)?;
        writeln!(f, "  Custom lowered: {}", self.custom_selected)?;
        writeln!(f, "  Pattern matched: {}", self.pattern_selected)?;
        writeln!(f, "  Inline asm bound: {}", self.asm_bound)?;
        writeln!(f, "  Dead nodes removed: {}", self.nodes_removed)?;

        if !self.largest_function_name.is_empty() {
            writeln!(
                f,
                "  Largest function: {} ({} nodes)",
                self.largest_function_name, self.largest_function_nodes
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by_key(|(_, count)| std::cmp::Reverse(**count));

            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_creation() {
        let target = TargetContext::default();
        let cx = SelectionContext::new(Dag::new("f"), &target);
        assert_eq!(cx.stats, SessionStats::default());
        assert_eq!(cx.dag.name(), "f");
    }

    #[test]
    fn test_context_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<SelectionContext<'static>>();
    }

    #[test]
    fn test_statistics_recording() {
        let target = TargetContext::default();
        let mut cx = SelectionContext::new(Dag::new("f"), &target);
        cx.record_custom("ATOMIC_FENCE");
        cx.record_pattern("ADD_I32");
        cx.record_pattern("ADD_I32");
        cx.record_removed(3);

        assert_eq!(cx.stats.custom_selected, 1);
        assert_eq!(cx.stats.pattern_selected, 2);
        assert_eq!(cx.stats.replacements(), 3);
        assert_eq!(cx.stats.instruction_counts["ADD_I32"], 2);
        assert_eq!(cx.stats.nodes_removed, 3);
    }

    #[test]
    fn test_merge_and_display() {
        let mut total = SessionStats::default();
        let mut a = SessionStats::default();
        a.record_function("small", 4);
        a.pattern_selected = 2;
        a.instruction_counts.insert("CONST_I32".into(), 2);
        let mut b = SessionStats::default();
        b.record_function("big", 12);
        b.custom_selected = 1;
        b.instruction_counts.insert("CONST_I32".into(), 1);

        total.merge(&a);
        total.merge(&b);
        assert_eq!(total.functions_selected, 2);
        assert_eq!(total.instruction_counts["CONST_I32"], 3);
        assert_eq!(total.largest_function_name, "big");

        let output = total.to_string();
        assert!(output.contains("Functions selected: 2"));
        assert!(output.contains("big (12 nodes)"));
        assert!(output.contains("CONST_I32: 3"));
    }

    #[test]
    fn test_reset_clears_scratch() {
        let target = TargetContext::default();
        let mut cx = SelectionContext::new(Dag::new("f"), &target);
        cx.arena().alloc([0u8; 256]);
        cx.record_arena_usage();
        assert!(cx.stats.peak_arena_bytes >= 256);
        cx.reset(Dag::new("g"));
        assert_eq!(cx.stats.peak_arena_bytes, 0);
        assert_eq!(cx.dag.name(), "g");
    }
}
