// src/frontend/mod.rs

pub mod ast;
pub mod lexer;
mod location;
mod parse_expr;
mod parse_stmt;
pub mod parser;
mod project;
mod token;

pub use location::{code_entry_hash, CodeLocation};
pub use project::{CodeEntry, Project};
pub use token::{Associativity, Grammar, OperatorInfo, Token};
