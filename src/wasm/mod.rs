//! WebAssembly selection target.
//!
//! Combines the opcode catalogue, the pattern table and the custom lowering
//! rules into a [`Target`] for the generic driver.

pub mod lowering;
pub mod opcodes;
pub mod patterns;

pub use opcodes::Intrinsic;

use crate::core::error::{FatalError, SelectResult};
use crate::core::session::SelectionContext;
use crate::dag::{MachineOpcode, SdValue};
use crate::isel::constraint::{bind_simple_memory_operand, ConstraintCode, UnsupportedConstraint};
use crate::isel::{CustomRules, PatternTable, Target};

#[derive(Debug)]
pub struct WasmTarget {
    rules: CustomRules,
    patterns: PatternTable,
}

impl WasmTarget {
    pub fn new() -> Self {
        Self {
            rules: lowering::custom_rules(),
            patterns: PatternTable::new(patterns::PATTERNS),
        }
    }
}

impl Default for WasmTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl Target for WasmTarget {
    fn name(&self) -> &'static str {
        "wasm"
    }

    fn rules(&self) -> &CustomRules {
        &self.rules
    }

    fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    fn machine_opcode(&self, name: &str) -> Option<MachineOpcode> {
        opcodes::by_name(name)
    }

    fn intrinsic_id(&self, name: &str) -> Option<i64> {
        Intrinsic::from_name(name).map(Intrinsic::id)
    }

    fn begin_function(&self, cx: &SelectionContext<'_>) -> SelectResult<()> {
        if cx.target().has_addr64() {
            return Err(FatalError::Unsupported {
                what: "64-bit WebAssembly (wasm64)".to_string(),
            });
        }
        Ok(())
    }

    fn bind_constraint(
        &self,
        constraint: ConstraintCode,
        operand: SdValue,
    ) -> Result<Vec<SdValue>, UnsupportedConstraint> {
        bind_simple_memory_operand(constraint, operand)
    }
}
