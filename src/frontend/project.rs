// src/frontend/project.rs
//! A project is the set of code entries compiled together into one library.

use crate::binding::{Context, LibraryRef};
use crate::errors::Diagnostics;
use crate::frontend::lexer::tokenize_entry;
use crate::frontend::parser::parse;
use crate::frontend::{code_entry_hash, Grammar, Token};

/// One piece of source text with a stable identity.
#[derive(Debug, Clone)]
pub struct CodeEntry {
    pub origin: String,
    pub code: String,
    pub code_hash: u64,
}

impl CodeEntry {
    pub fn new(code: impl Into<String>, origin: impl Into<String>) -> Self {
        let code = code.into();
        let origin = origin.into();
        let code_hash = code_entry_hash(&code, &origin);
        Self {
            origin,
            code,
            code_hash,
        }
    }
}

#[derive(Debug, Default)]
pub struct Project {
    pub entries: Vec<CodeEntry>,
}

impl Project {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_code_from_string(&mut self, code: impl Into<String>, origin: impl Into<String>) {
        self.entries.push(CodeEntry::new(code, origin));
    }

    pub fn add_code_from_file(&mut self, path: &std::path::Path) -> std::io::Result<()> {
        let code = std::fs::read_to_string(path)?;
        self.add_code_from_string(code, path.display().to_string());
        Ok(())
    }

    /// Run the full pipeline over every entry: tokenize, parse, analyze,
    /// and generate code. Produces a sealed library, or `None` when
    /// diagnostics stopped the compilation.
    pub fn compile(
        &self,
        ctx: &mut Context,
        name: &str,
        dependencies: &[LibraryRef],
        diagnostics: &mut Diagnostics,
    ) -> Option<LibraryRef> {
        let mut tokens: Vec<Token> = Vec::new();
        let mut comments: Vec<Token> = Vec::new();
        for entry in &self.entries {
            // Entries share one token stream; only the last End survives.
            if matches!(tokens.last().map(|t| t.grammar), Some(Grammar::End)) {
                tokens.pop();
            }
            tokenize_entry(entry, &mut tokens, &mut comments, diagnostics);
        }
        if diagnostics.should_stop() {
            return None;
        }

        let program = parse(&tokens, diagnostics);
        if diagnostics.should_stop() {
            return None;
        }

        let analysis =
            crate::sema::analyze(ctx, &program, name, &self.entries, dependencies, diagnostics)?;

        crate::codegen::compile_library(ctx, &analysis);
        Some(analysis.library)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_hash_matches_formula() {
        let entry = CodeEntry::new("class A {}", "A");
        assert_eq!(entry.code_hash, code_entry_hash("class A {}", "A"));
    }

    #[test]
    fn compile_produces_library_for_valid_code() {
        let mut ctx = Context::new();
        let mut project = Project::new();
        project.add_code_from_string("class Player { var Lives : Integer = 3; }", "Player");
        let mut diagnostics = Diagnostics::new();
        let library = project.compile(&mut ctx, "game", &[], &mut diagnostics);
        assert!(diagnostics.take_errors().is_empty());
        let library = library.unwrap();
        assert_eq!(library.name, "game");
        assert_eq!(library.entries.len(), 1);
        assert!(ctx.find_type("Player").is_some());
    }

    #[test]
    fn compile_reports_parse_errors() {
        let mut ctx = Context::new();
        let mut project = Project::new();
        project.add_code_from_string("class {", "Broken");
        let mut diagnostics = Diagnostics::new();
        let library = project.compile(&mut ctx, "game", &[], &mut diagnostics);
        assert!(library.is_none());
        assert!(diagnostics.has_errors());
    }
}
