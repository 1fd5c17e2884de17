//! A bytecode compiler and stack virtual machine for PHP programs.
//!
//! Source goes through three stages:
//!
//! 1. [`parser`] turns bytes into an arena-allocated AST.
//! 2. [`compiler`] lowers the AST into per-function bytecode chunks and
//!    links classes into the [`runtime::context::Program`] tables.
//! 3. [`vm`] executes `{main}` with reference-counted values, running
//!    destructors deterministically and collecting reference cycles.
//!
//! [`vm::executor::execute_code`] wraps all three for embedding and tests.

pub mod builtins;
pub mod compiler;
pub mod core;
pub mod parser;
pub mod runtime;
pub mod vm;
