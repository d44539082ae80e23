// src/errors/diagnostic.rs
//! Accumulation of compile errors with their code locations.

use crate::errors::{LexerError, ParserError, SemanticError};
use crate::frontend::CodeLocation;

/// One compile error: the phase-specific error plus where it happened.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub location: CodeLocation,
}

#[derive(Debug, Clone)]
pub enum CompileErrorKind {
    Lexer(LexerError),
    Parser(ParserError),
    Sema(SemanticError),
}

impl CompileError {
    /// The human-readable message, without location prefix.
    pub fn message(&self) -> String {
        match &self.kind {
            CompileErrorKind::Lexer(e) => e.to_string(),
            CompileErrorKind::Parser(e) => e.to_string(),
            CompileErrorKind::Sema(e) => e.to_string(),
        }
    }
}

/// Sink for errors accumulated across the whole pipeline.
///
/// Passes check `was_error` before advancing; once set, no later pass runs
/// on the known-broken tree (except in tolerant mode, where the parser keeps
/// producing placeholder nodes so editor features still work).
#[derive(Debug, Default)]
pub struct Diagnostics {
    pub errors: Vec<CompileError>,
    pub was_error: bool,
    /// In tolerant mode errors are recorded but do not halt compilation.
    pub tolerant: bool,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tolerant() -> Self {
        Self {
            tolerant: true,
            ..Self::default()
        }
    }

    pub fn lexer_error(&mut self, error: LexerError, location: CodeLocation) {
        self.push(CompileErrorKind::Lexer(error), location);
    }

    pub fn parser_error(&mut self, error: ParserError, location: CodeLocation) {
        self.push(CompileErrorKind::Parser(error), location);
    }

    pub fn sema_error(&mut self, error: SemanticError, location: CodeLocation) {
        self.push(CompileErrorKind::Sema(error), location);
    }

    fn push(&mut self, kind: CompileErrorKind, location: CodeLocation) {
        self.errors.push(CompileError { kind, location });
        self.was_error = true;
    }

    /// True when later passes should not run.
    pub fn should_stop(&self) -> bool {
        self.was_error && !self.tolerant
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn take_errors(&mut self) -> Vec<CompileError> {
        self.was_error = false;
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn was_error_set_on_push() {
        let mut diags = Diagnostics::new();
        assert!(!diags.should_stop());

        diags.sema_error(
            SemanticError::UnknownType {
                name: "Foo".into(),
                span: (0, 3).into(),
            },
            CodeLocation::default(),
        );
        assert!(diags.was_error);
        assert!(diags.should_stop());
    }

    #[test]
    fn tolerant_mode_does_not_stop() {
        let mut diags = Diagnostics::tolerant();
        diags.parser_error(
            ParserError::ExpectedExpression {
                found: "}".into(),
                span: (0, 1).into(),
            },
            CodeLocation::default(),
        );
        assert!(diags.was_error);
        assert!(!diags.should_stop());
        assert!(diags.has_errors());
    }

    #[test]
    fn take_errors_clears_flag() {
        let mut diags = Diagnostics::new();
        diags.lexer_error(
            LexerError::UnexpectedCharacter {
                ch: '@',
                span: (0, 1).into(),
            },
            CodeLocation::default(),
        );
        let errors = diags.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(!diags.was_error);
    }
}
