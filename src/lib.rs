//! dagsel - DAG-to-DAG instruction selection.
//!
//! Lowers a legalized, target-independent selection DAG into target machine
//! nodes. Each node is claimed either by a custom lowering rule of the
//! target or by the cheapest matching entry of its pattern table; selected
//! nodes replace the originals in place and orphaned operands are reclaimed.
//!
//! # Primary Usage
//!
//! ```ignore
//! use dagsel::core::TargetContext;
//! use dagsel::isel::{SelectionDriver, SelectionOptions};
//! use dagsel::text::Module;
//! use dagsel::wasm::WasmTarget;
//!
//! let target_cx = TargetContext::from_strs("wasm32-unknown-unknown", "+atomics")?;
//! let wasm = WasmTarget::new();
//! let module = Module::parse(source, &wasm)?;
//! let driver = SelectionDriver::new(&wasm, SelectionOptions::default());
//! for function in driver.select_module(&target_cx, module.functions)? {
//!     print!("{}", function.dag);
//! }
//! ```
//!
//! # Architecture
//!
//! - [`core`] - Errors, target configuration, per-function session
//! - [`dag`] - Node store, replacement, verification, printing
//! - [`isel`] - Pattern tables, matcher, custom rules, driver
//! - [`wasm`] - WebAssembly opcodes, patterns and lowering rules
//! - [`text`] - Textual DAG format, command-line invocation, file checks

pub mod core;
pub mod dag;
pub mod isel;
pub mod text;
pub mod wasm;

pub use core::{
    ConfigError, FatalError, MatchFailure, SelectResult, SelectionContext, SessionStats,
    TargetContext, TargetFeatures,
};
pub use dag::{Dag, NodeId, SdValue};
pub use isel::{SelectionDriver, SelectionOptions, SelectionReport, Target};
pub use wasm::WasmTarget;
