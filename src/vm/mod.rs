mod array_access;
mod callable;
mod class_resolution;
pub mod engine;
mod error_construction;
mod error_formatting;
pub mod executor;
pub mod frame;
pub mod generator;
pub mod inc_dec;
mod iteration;
mod object_helpers;
pub mod opcode;
pub mod opcodes;
mod type_conversion;
mod variable_ops;
mod visibility;

pub use callable::ClosureState;
pub use type_conversion::TypeScope;
