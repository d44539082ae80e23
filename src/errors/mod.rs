// src/errors/mod.rs
//! Error types for every phase of the pipeline, plus rendering.
//!
//! Error codes follow a phase-based numbering scheme:
//! - E0xxx: lexer errors
//! - E1xxx: parser errors
//! - E2xxx: semantic analysis errors
//! - E3xxx: runtime errors

mod diagnostic;
mod lexer;
mod parser;
mod render;
mod runtime;
mod sema;

pub use diagnostic::{CompileError, CompileErrorKind, Diagnostics};
pub use lexer::LexerError;
pub use parser::ParserError;
pub use render::{render_report, MessageFormat};
pub use runtime::RuntimeError;
pub use sema::SemanticError;
