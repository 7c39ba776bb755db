// This module drives instruction selection over one function and over a compilation unit.
// The per-function pass sweeps unreachable nodes, computes a topological order in the
// session's scratch arena and walks it in reverse so that every user is selected before its
// operands; that order is what lets a load swallow its single-use address computation. Each
// node is dispatched in a fixed order: already-finalized nodes are skipped, inline assembly
// goes through the constraint binder, custom lowering rules get first refusal, and the
// pattern table takes everything else. The winner replaces the node through the DAG rewriter,
// which also reclaims whatever became dead. The unit-level entry point fans functions out to
// a rayon pool sharing the read-only TargetContext; once a function fails, later functions
// are skipped, the earliest failure is reported and no output is produced.

//! Selection driver.

use super::constraint::{AsmOperandKind, UnsupportedConstraint};
use super::matcher::Matcher;
use super::rules::Target;
use crate::core::error::{FatalError, MatchFailure, SelectResult};
use crate::core::session::{SelectionContext, SessionStats};
use crate::core::target::TargetContext;
use crate::dag::{target_opcode, Dag, GenericOp, NodeId, Payload, VerifyError};
use log::{debug, info, warn};
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicUsize, Ordering};

/// What to do when an inline-asm memory constraint cannot be bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AsmFailurePolicy {
    /// Abort the compilation unit.
    #[default]
    Fatal,
    /// Record the failure, leave the node unselected and keep going.
    Report,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOptions {
    pub asm_failure: AsmFailurePolicy,
    /// Check graph invariants after each function.
    pub verify: bool,
    /// Worker threads for module selection.
    pub jobs: usize,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            asm_failure: AsmFailurePolicy::Fatal,
            verify: true,
            jobs: 1,
        }
    }
}

/// Outcome of selecting one function.
#[derive(Debug, Clone)]
pub struct SelectionReport {
    pub function: String,
    /// Every reachable node is machine-level.
    pub fully_selected: bool,
    /// Inline-asm failures recorded under [`AsmFailurePolicy::Report`].
    pub failures: Vec<MatchFailure>,
    pub stats: SessionStats,
}

/// A function after selection.
#[derive(Debug, Clone)]
pub struct SelectedFunction {
    pub dag: Dag,
    pub report: SelectionReport,
}

pub struct SelectionDriver<'a, T: Target + ?Sized> {
    target: &'a T,
    options: SelectionOptions,
    matcher: Matcher<'a>,
}

impl<'a, T: Target + ?Sized> SelectionDriver<'a, T> {
    pub fn new(target: &'a T, options: SelectionOptions) -> Self {
        Self {
            target,
            options,
            matcher: Matcher::new(target.patterns()),
        }
    }

    pub fn options(&self) -> &SelectionOptions {
        &self.options
    }

    /// Select every node of the function held by `cx`.
    pub fn select_function(&self, cx: &mut SelectionContext<'_>) -> SelectResult<SelectionReport> {
        let name = cx.dag.name().to_string();
        self.run(cx).map_err(|e| e.in_function(&name))
    }

    fn run(&self, cx: &mut SelectionContext<'_>) -> SelectResult<SelectionReport> {
        info!(
            "Selecting function '{}' for {} ({} nodes)",
            cx.dag.name(),
            self.target.name(),
            cx.dag.len()
        );
        self.target.begin_function(cx)?;
        if cx.dag.root().is_none() {
            return Err(VerifyError::NoRoot.into());
        }

        let swept = cx.dag.remove_unreachable_nodes();
        if swept > 0 {
            debug!("removed {swept} unreachable nodes before selection");
            cx.record_removed(swept);
        }

        let mut failures = Vec::new();
        let arena = cx.take_arena();
        let outcome = {
            let order = cx.dag.topological_order_in(&arena);
            let mut outcome = Ok(());
            for &id in order.iter().rev() {
                // Reclaimed as dead by an earlier replacement.
                if !cx.dag.contains(id) {
                    continue;
                }
                cx.stats.nodes_visited += 1;
                if cx.dag[id].is_finalized() {
                    debug!("== {} ({}) already selected", id, cx.dag[id].opcode.name());
                    cx.stats.already_selected += 1;
                    continue;
                }
                outcome = self.select_node(cx, id, &mut failures);
                if outcome.is_err() {
                    break;
                }
            }
            outcome
        };
        cx.restore_arena(arena);
        outcome?;

        let fully_selected = failures.is_empty();
        if self.options.verify {
            if fully_selected {
                cx.dag.verify_selected()?;
            } else {
                cx.dag.verify()?;
            }
        }

        let name = cx.dag.name().to_string();
        let nodes = cx.dag.len();
        cx.stats.record_function(&name, nodes);
        info!(
            "Selected '{}': {} replacements, {} nodes removed{}",
            name,
            cx.stats.replacements(),
            cx.stats.nodes_removed,
            if fully_selected { "" } else { ", incomplete" }
        );

        Ok(SelectionReport {
            function: name,
            fully_selected,
            failures,
            stats: cx.stats.clone(),
        })
    }

    fn select_node(
        &self,
        cx: &mut SelectionContext<'_>,
        id: NodeId,
        failures: &mut Vec<MatchFailure>,
    ) -> SelectResult<()> {
        let node = &cx.dag[id];
        let Some(op) = node.generic_op() else {
            return Err(FatalError::internal(id, node.opcode, "unfinalized node is not generic"));
        };
        debug!("ISEL: starting selection on {} ({})", id, op);

        if op == GenericOp::InlineAsm {
            return self.select_inline_asm(cx, id, failures);
        }

        if let Some(new) = self.target.try_select(cx, id)? {
            let replacement = &cx.dag[new];
            if !replacement.is_machine_level() || !replacement.is_finalized() {
                return Err(FatalError::internal(
                    id,
                    cx.dag[id].opcode,
                    format!("custom rule returned unselected {}", new),
                ));
            }
            let name = replacement.opcode.name();
            debug!("ISEL: {} lowered by custom rule to {} ({})", id, new, name);
            cx.record_custom(name);
            let removed = cx.dag.replace_node(id, new)?;
            cx.record_removed(removed);
            return Ok(());
        }

        let new = self.matcher.select(&mut cx.dag, id)?;
        let name = cx.dag[new].opcode.name();
        cx.record_pattern(name);
        let removed = cx.dag.replace_node(id, new)?;
        cx.record_removed(removed);
        Ok(())
    }

    fn select_inline_asm(
        &self,
        cx: &mut SelectionContext<'_>,
        id: NodeId,
        failures: &mut Vec<MatchFailure>,
    ) -> SelectResult<()> {
        let node = &cx.dag[id];
        let Payload::Asm(asm) = node.payload else {
            return Err(FatalError::internal(id, node.opcode, "inline asm without descriptor"));
        };
        let kinds = cx.dag.asm_info(asm).operands.clone();
        let operands = node.operands.clone();
        let results = node.results.clone();

        let mut bound = Vec::with_capacity(operands.len());
        let mut chain = None;
        let mut kinds = kinds.into_iter();
        let mut failed = false;

        for (idx, &operand) in operands.iter().enumerate() {
            if cx.dag.value_type(operand).is_chain() {
                if chain.is_some() {
                    return Err(FatalError::internal(
                        id,
                        cx.dag[id].opcode,
                        format!("operand {idx} is a second chain"),
                    ));
                }
                chain = Some(operand);
                continue;
            }
            let Some(kind) = kinds.next() else {
                return Err(FatalError::internal(
                    id,
                    cx.dag[id].opcode,
                    "more operands than constraint descriptors",
                ));
            };
            let AsmOperandKind::Memory(code) = kind else {
                bound.push(operand);
                continue;
            };
            match self.target.bind_constraint(code, operand) {
                Ok(values) => bound.extend(values),
                Err(UnsupportedConstraint(constraint)) => {
                    let failure = MatchFailure {
                        node: id,
                        operand: idx,
                        constraint,
                    };
                    match self.options.asm_failure {
                        AsmFailurePolicy::Fatal => return Err(failure.into()),
                        AsmFailurePolicy::Report => {
                            warn!("{failure}");
                            failures.push(failure);
                            failed = true;
                        }
                    }
                }
            }
        }

        if kinds.next().is_some() {
            return Err(FatalError::internal(
                id,
                cx.dag[id].opcode,
                "more constraint descriptors than operands",
            ));
        }

        if failed {
            // Left generic; the report says the function is incomplete.
            return Ok(());
        }
        if let Some(chain) = chain {
            bound.push(chain);
        }

        let new = cx.dag.get_machine_node_with_payload(
            target_opcode::INLINEASM,
            &results,
            &bound,
            Payload::Asm(asm),
        );
        cx.stats.asm_bound += 1;
        *cx.stats
            .instruction_counts
            .entry(target_opcode::INLINEASM.name.to_string())
            .or_insert(0) += 1;
        let removed = cx.dag.replace_node(id, new)?;
        cx.record_removed(removed);
        Ok(())
    }

    /// Select every function of a compilation unit.
    ///
    /// With more than one job the functions are selected on a rayon pool of
    /// `options.jobs` threads, each with its own [`SelectionContext`].
    /// Results come back in input order. On failure the error of the
    /// earliest failing function is returned and nothing else.
    pub fn select_module(
        &self,
        target: &TargetContext,
        functions: Vec<Dag>,
    ) -> SelectResult<Vec<SelectedFunction>> {
        let jobs = self.options.jobs.clamp(1, functions.len().max(1));
        info!("Selecting {} functions with {} workers", functions.len(), jobs);

        if jobs == 1 {
            return functions
                .into_iter()
                .map(|dag| self.select_owned(target, dag))
                .collect();
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(jobs)
            .thread_name(|i| format!("dagsel-select-{i}"))
            .build()
            .map_err(|e| FatalError::WorkerPool {
                jobs,
                reason: e.to_string(),
            })?;

        // Functions after the earliest failure so far are skipped; every
        // function before it still runs, so the first error in input order
        // is the same for any schedule.
        let first_failure = AtomicUsize::new(usize::MAX);
        let results: Vec<SelectResult<SelectedFunction>> = pool.install(|| {
            functions
                .into_par_iter()
                .enumerate()
                .filter_map(|(idx, dag)| {
                    if idx > first_failure.load(Ordering::Relaxed) {
                        return None;
                    }
                    let result = self.select_owned(target, dag);
                    if result.is_err() {
                        first_failure.fetch_min(idx, Ordering::Relaxed);
                    }
                    Some(result)
                })
                .collect()
        });
        results.into_iter().collect()
    }

    fn select_owned(&self, target: &TargetContext, dag: Dag) -> SelectResult<SelectedFunction> {
        let mut cx = SelectionContext::new(dag, target);
        let report = self.select_function(&mut cx)?;
        Ok(SelectedFunction {
            dag: cx.into_dag(),
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::test_utils::test::{with_target, TestContext};
    use crate::dag::Opcode;
    use crate::wasm::opcodes;

    const FENCES: &str = "define @fences {\n\
                            %a = fence %entry, seq_cst, singlethread\n\
                            %b = fence %a, seq_cst, system\n\
                            ret %b\n\
                          }\n";

    fn opcodes_of(dag: &Dag) -> Vec<&'static str> {
        dag.topological_order()
            .into_iter()
            .map(|id| dag[id].opcode.name())
            .collect()
    }

    #[test]
    fn selects_every_reachable_node() {
        with_target("wasm32-unknown-unknown", "+atomics", |ctx| {
            let selected = ctx.select(FENCES).unwrap();
            let function = &selected[0];
            assert!(function.report.fully_selected);
            let dag = &function.dag;
            assert!(dag.topological_order().iter().all(|&id| dag[id].is_machine_level()));
            assert_eq!(
                opcodes_of(dag),
                ["TargetConstant", "EntryToken", "COMPILER_FENCE", "ATOMIC_FENCE", "RETURN"]
            );
            assert_eq!(function.report.stats.custom_selected, 2);
            assert_eq!(function.report.stats.pattern_selected, 1);
        });
    }

    #[test]
    fn already_selected_function_is_untouched() {
        let ctx = TestContext::new();
        let text = "define @done {\n  %c = CONST_I32.i32 $7\n  RETURN %c, %entry\n}\n";
        let selected = ctx.select(text).unwrap();
        let stats = &selected[0].report.stats;
        assert_eq!(stats.replacements(), 0);
        assert_eq!(stats.nodes_removed, 0);
        assert_eq!(selected[0].dag.to_string(), ctx.parse(text)[0].to_string());
    }

    #[test]
    fn unreachable_nodes_are_swept_first() {
        let ctx = TestContext::new();
        let selected = ctx
            .select("define @f {\n  %dead = const.i32 3\n  ret %entry\n}\n")
            .unwrap();
        // The swept constant plus the replaced generic return.
        assert_eq!(selected[0].report.stats.nodes_removed, 2);
        assert_eq!(selected[0].report.stats.pattern_selected, 1);
        assert_eq!(selected[0].dag.len(), 2);
    }

    #[test]
    fn missing_root_is_rejected() {
        let ctx = TestContext::new();
        let mut cx = ctx.session(Dag::new("empty"));
        let driver = SelectionDriver::new(ctx.wasm(), SelectionOptions::default());
        let err = driver.select_function(&mut cx).unwrap_err();
        assert_eq!(err.root_cause(), &FatalError::Verify(VerifyError::NoRoot));
        assert!(err.to_string().starts_with("in function 'empty'"));
    }

    #[test]
    fn asm_binds_address_operands() {
        let ctx = TestContext::new();
        let selected = ctx
            .select(
                "define @f {\n\
                   %p = arg.i32 0\n\
                   %x = asm %entry, \"use $0\", m %p, r %p\n\
                   ret %x\n\
                 }\n",
            )
            .unwrap();
        let dag = &selected[0].dag;
        let root = dag.root().unwrap();
        let asm = dag[root].operands[0].node;
        assert_eq!(dag[asm].opcode, Opcode::Machine(target_opcode::INLINEASM));
        // Both operands reuse the argument; the chain stays last.
        let arg = dag[asm].operands[0];
        assert_eq!(dag[arg.node].opcode, Opcode::Machine(opcodes::ARGUMENT_I32));
        assert_eq!(dag[asm].operands[1], arg);
        assert_eq!(dag[asm].operands[2], dag.entry_token());
        assert_eq!(selected[0].report.stats.asm_bound, 1);
    }

    #[test]
    fn asm_failure_policy() {
        let ctx = TestContext::new();
        let text = "define @f {\n\
                      %p = arg.i32 0\n\
                      %x = asm %entry, \"use $0\", o %p\n\
                      ret %x\n\
                    }\n";

        let err = ctx.select(text).unwrap_err();
        assert!(matches!(err.root_cause(), FatalError::InlineAsm(_)), "{err}");

        let report = SelectionOptions {
            asm_failure: AsmFailurePolicy::Report,
            ..SelectionOptions::default()
        };
        let selected = ctx.select_with(text, report).unwrap();
        let function = &selected[0];
        assert!(!function.report.fully_selected);
        assert_eq!(function.report.failures.len(), 1);
        let failure = &function.report.failures[0];
        assert_eq!(failure.operand, 1);
        assert_eq!(failure.constraint.letter(), 'o');
        assert_eq!(function.dag[failure.node].generic_op(), Some(GenericOp::InlineAsm));
    }

    #[test]
    fn asm_operands_never_vanish() {
        let ctx = TestContext::new();
        let err = ctx
            .select("define @f {\n  %x = asm %entry, \"use $0\", m %entry\n  ret %x\n}\n")
            .unwrap_err();
        assert!(matches!(err.root_cause(), FatalError::Internal { .. }), "{err}");
        assert!(err.to_string().contains("operand 1 is a second chain"), "{err}");
    }

    #[test]
    fn module_results_keep_input_order() {
        let ctx = TestContext::new();
        let text: String = (0..7)
            .map(|i| format!("define @f{i} {{\n  %c = const.i32 {i}\n  ret %entry, %c\n}}\n"))
            .collect();
        let options = SelectionOptions {
            jobs: 3,
            ..SelectionOptions::default()
        };
        let selected = ctx.select_with(&text, options).unwrap();
        let names: Vec<_> = selected.iter().map(|f| f.report.function.as_str()).collect();
        assert_eq!(names, ["f0", "f1", "f2", "f3", "f4", "f5", "f6"]);
    }

    #[test]
    fn module_stops_at_first_fatal_error() {
        let ctx = TestContext::new();
        let text = "define @ok {\n  ret %entry\n}\n\
                    define @bad {\n  %t = tlsaddr.i32 @v\n  ret %entry, %t\n}\n\
                    define @worse {\n  %t = tlsaddr.i32 @w\n  ret %entry, %t\n}\n";
        for jobs in [1, 2, 3] {
            let options = SelectionOptions {
                jobs,
                ..SelectionOptions::default()
            };
            let err = ctx.select_with(text, options).unwrap_err();
            assert_eq!(
                err.to_string(),
                "in function 'bad': cannot use thread-local storage without bulk memory"
            );
        }
    }

    #[test]
    fn earliest_failure_wins_on_any_schedule() {
        let ctx = TestContext::new();
        let text: String = (0..12)
            .map(|i| {
                if i == 3 || i == 9 {
                    format!("define @f{i} {{\n  %t = tlsaddr.i32 @v\n  ret %entry, %t\n}}\n")
                } else {
                    format!("define @f{i} {{\n  %c = const.i32 {i}\n  ret %entry, %c\n}}\n")
                }
            })
            .collect();
        let options = SelectionOptions {
            jobs: 4,
            ..SelectionOptions::default()
        };
        for _ in 0..16 {
            let err = ctx.select_with(&text, options.clone()).unwrap_err();
            assert_eq!(
                err.to_string(),
                "in function 'f3': cannot use thread-local storage without bulk memory"
            );
        }
    }
}
