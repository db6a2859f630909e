//! Tests for the interpreter and the engine behind it
//!
//! Organized by subsystem

mod cancel_tests;
mod helpers;
mod namespace_tests;
mod scope_tests;
mod stack_tests;
