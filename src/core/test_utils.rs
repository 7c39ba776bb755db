//! Test utilities for selection tests.
//!
//! Builds target contexts from strings and runs whole textual modules
//! through the WebAssembly target, so unit tests can state inputs the way
//! the file tests do.
