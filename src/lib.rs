// src/lib.rs
pub mod binding;
pub mod cli;
pub mod codegen;
pub mod commands;
pub mod debugger;
pub mod errors;
pub mod frontend;
pub mod runtime;
pub mod sema;
