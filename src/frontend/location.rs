// src/frontend/location.rs
//! Code locations and the stable code-entry hash.

use miette::SourceSpan;

/// Stable identity for a code entry across sessions.
///
/// Breakpoints are keyed by this hash persistently across recompiles, so the
/// function must never change: it combines the hash of the source text with
/// the hash of the origin string.
pub fn code_entry_hash(code: &str, origin: &str) -> u64 {
    hash_str(code) ^ hash_str(origin).wrapping_mul(5689)
}

/// FNV-1a over the bytes of a string.
fn hash_str(s: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// A range within one code entry, carried by every token, syntax node, and
/// diagnostic. Start/primary/end each track line, character, and byte
/// position; the enclosing class/function names are filled in by the
/// semantic analyzer for stack traces and error prefixes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CodeLocation {
    pub origin: String,
    pub code_hash: u64,

    pub start_line: u32,
    pub start_character: u32,
    pub start_position: usize,

    pub primary_line: u32,
    pub primary_character: u32,
    pub primary_position: usize,

    pub end_line: u32,
    pub end_character: u32,
    pub end_position: usize,

    pub class_name: Option<String>,
    pub function_name: Option<String>,
    pub is_native: bool,
}

impl CodeLocation {
    /// The location reported for members bound from native code.
    pub fn native() -> CodeLocation {
        CodeLocation {
            origin: "[native]".into(),
            is_native: true,
            ..CodeLocation::default()
        }
    }

    /// A zero-width location collapsed onto the start of this range.
    pub fn start_only_location(&self) -> CodeLocation {
        let mut location = self.clone();
        location.primary_line = self.start_line;
        location.primary_character = self.start_character;
        location.primary_position = self.start_position;
        location.end_line = self.start_line;
        location.end_character = self.start_character;
        location.end_position = self.start_position;
        location
    }

    /// A zero-width location collapsed onto the end of this range.
    pub fn end_only_location(&self) -> CodeLocation {
        let mut location = self.clone();
        location.start_line = self.end_line;
        location.start_character = self.end_character;
        location.start_position = self.end_position;
        location.primary_line = self.end_line;
        location.primary_character = self.end_character;
        location.primary_position = self.end_position;
        location
    }

    /// Merge two locations into one spanning both (start of `self`, end of
    /// `other`). The primary point stays at `self`'s primary.
    pub fn merge(&self, other: &CodeLocation) -> CodeLocation {
        let mut location = self.clone();
        location.end_line = other.end_line;
        location.end_character = other.end_character;
        location.end_position = other.end_position;
        location
    }

    /// Byte span for miette labels.
    pub fn span(&self) -> SourceSpan {
        let len = self.end_position.saturating_sub(self.start_position);
        (self.start_position, len).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeLocation {
        CodeLocation {
            origin: "Test".into(),
            start_line: 2,
            start_character: 3,
            start_position: 10,
            primary_line: 2,
            primary_character: 7,
            primary_position: 14,
            end_line: 3,
            end_character: 1,
            end_position: 20,
            ..CodeLocation::default()
        }
    }

    #[test]
    fn code_entry_hash_is_stable() {
        let a = code_entry_hash("var X : Integer;", "Player");
        let b = code_entry_hash("var X : Integer;", "Player");
        assert_eq!(a, b);
    }

    #[test]
    fn code_entry_hash_depends_on_both_inputs() {
        let base = code_entry_hash("code", "origin");
        assert_ne!(base, code_entry_hash("code2", "origin"));
        assert_ne!(base, code_entry_hash("code", "origin2"));
    }

    #[test]
    fn start_only_collapses_to_start() {
        let loc = sample().start_only_location();
        assert_eq!(loc.start_line, loc.end_line);
        assert_eq!(loc.start_character, loc.end_character);
        assert_eq!(loc.start_position, loc.end_position);
        assert_eq!(loc.start_line, 2);
        assert_eq!(loc.start_character, 3);
    }

    #[test]
    fn end_only_collapses_to_end() {
        let loc = sample().end_only_location();
        assert_eq!(loc.start_line, loc.end_line);
        assert_eq!(loc.start_character, loc.end_character);
        assert_eq!(loc.end_line, 3);
        assert_eq!(loc.end_character, 1);
    }

    #[test]
    fn ordering_invariant_holds() {
        let loc = sample();
        assert!((loc.start_line, loc.start_character) <= (loc.primary_line, loc.primary_character));
        assert!((loc.primary_line, loc.primary_character) <= (loc.end_line, loc.end_character));
    }

    #[test]
    fn merge_takes_end_from_other() {
        let a = sample();
        let mut b = sample();
        b.end_line = 9;
        b.end_character = 4;
        b.end_position = 55;
        let merged = a.merge(&b);
        assert_eq!(merged.start_line, 2);
        assert_eq!(merged.end_line, 9);
        assert_eq!(merged.end_position, 55);
    }
}
