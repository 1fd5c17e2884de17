//! Opcode execution modules
//!
//! Operator semantics shared by the dispatch loop, compound assignment and
//! the builtins: arithmetic, bitwise and comparison operators, array
//! literal construction, and the try/finally control transfer.
//!
//! Reference: $PHP_SRC_PATH/Zend/zend_vm_execute.h - opcode handlers

pub mod arithmetic;
pub mod array_ops;
pub mod bitwise;
pub mod comparison;
pub mod control_flow;
