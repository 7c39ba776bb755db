// This module gathers the infrastructure shared by every selection target. It defines the
// error taxonomy (fatal selection errors, locally recovered inline-asm match failures and
// parse errors of the textual format), the immutable TargetContext built once per compilation
// unit from a triple and a feature string, and the per-function SelectionContext that owns the
// DAG being rewritten, a scratch arena and the statistics of the pass. Nothing here knows
// about a particular instruction set; targets plug in through the isel::Target trait.

//! Core selection infrastructure.
//!
//! ## Errors (`error`)
//! - [`FatalError`] aborts the current compilation unit
//! - [`MatchFailure`] records an inline-asm operand that could not be bound
//!
//! ## Target configuration (`target`)
//! - Triple parsing through `target-lexicon`
//! - Feature bits such as atomics and bulk memory
//!
//! ## Session (`session`)
//! - Per-function DAG ownership and `bumpalo` scratch arena
//! - Selection statistics, mergeable across functions

pub mod error;
pub mod session;
pub mod target;
pub mod test_utils;

pub use error::{FatalError, MatchFailure, ParseError, SelectResult};
pub use session::{SelectionContext, SessionStats};
pub use target::{ConfigError, TargetContext, TargetFeatures};
