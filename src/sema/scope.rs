// src/sema/scope.rs
//! Lexical scopes for local variables. Resolution walks innermost outward;
//! slots are handed out monotonically within a function frame and the high
//! water mark becomes the function's required stack space.

use crate::binding::Type;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone)]
pub struct LocalVar {
    pub slot: u32,
    pub ty: Type,
}

#[derive(Debug, Default)]
pub struct ScopeStack {
    scopes: Vec<FxHashMap<String, LocalVar>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub fn pop(&mut self) {
        self.scopes.pop();
    }

    /// Declare in the innermost scope. Shadowing an outer scope is allowed;
    /// redeclaring within the same scope replaces (the duplicate is reported
    /// by the caller before insertion).
    pub fn declare(&mut self, name: impl Into<String>, local: LocalVar) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.into(), local);
        }
    }

    pub fn declared_in_current(&self, name: &str) -> bool {
        self.scopes
            .last()
            .map(|s| s.contains_key(name))
            .unwrap_or(false)
    }

    /// Innermost-outward lookup.
    pub fn resolve(&self, name: &str) -> Option<&LocalVar> {
        self.scopes.iter().rev().find_map(|s| s.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(slot: u32) -> LocalVar {
        LocalVar {
            slot,
            ty: Type::Void,
        }
    }

    #[test]
    fn inner_shadows_outer() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.declare("x", local(1));
        scopes.push();
        scopes.declare("x", local(2));
        assert_eq!(scopes.resolve("x").unwrap().slot, 2);
        scopes.pop();
        assert_eq!(scopes.resolve("x").unwrap().slot, 1);
    }

    #[test]
    fn popped_scope_is_gone() {
        let mut scopes = ScopeStack::new();
        scopes.push();
        scopes.push();
        scopes.declare("y", local(3));
        scopes.pop();
        assert!(scopes.resolve("y").is_none());
    }
}
