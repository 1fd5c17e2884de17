pub mod context;
pub mod core_extension;
pub mod extension;
pub mod registry;
