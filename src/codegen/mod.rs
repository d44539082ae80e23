// src/codegen/mod.rs
//! Bytecode generation: one opcode buffer per checked function body.

mod compiler;
mod opcode;

pub use compiler::compile_library;
pub use opcode::{CastKind, CompiledCode, Literal, Opcode, Scalar};
