// src/binding/fix.rs
//! Identifier canonicalization. Generated member names (getters, setters,
//! constructors) are run through this so they never collide with user names
//! in the other case convention.

use std::borrow::Cow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierCase {
    /// UpperCamel: types, members.
    Upper,
    /// lowerCamel: locals, parameters.
    Lower,
}

/// Canonicalize an identifier to the requested case convention.
///
/// Idempotent: an identifier that is already valid for the convention is
/// returned as a borrow, with no new allocation.
pub fn fix_identifier(name: &str, case: IdentifierCase) -> Cow<'_, str> {
    // Strip anything that is not alphanumeric or underscore, then adjust
    // the first alphabetic character's case.
    let clean = name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if clean {
        if let Some(first) = name.chars().next() {
            let ok = match case {
                IdentifierCase::Upper => !first.is_ascii_lowercase(),
                IdentifierCase::Lower => !first.is_ascii_uppercase(),
            };
            if ok {
                return Cow::Borrowed(name);
            }
        } else {
            return Cow::Borrowed(name);
        }
    }

    let mut result = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' {
            result.push(c);
        }
    }
    if let Some(first) = result.chars().next() {
        let fixed = match case {
            IdentifierCase::Upper => first.to_ascii_uppercase(),
            IdentifierCase::Lower => first.to_ascii_lowercase(),
        };
        result.replace_range(0..first.len_utf8(), &fixed.to_string());
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_valid_returns_borrowed() {
        let fixed = fix_identifier("Health", IdentifierCase::Upper);
        assert!(matches!(fixed, Cow::Borrowed(_)));
        assert_eq!(fixed, "Health");

        let fixed = fix_identifier("health", IdentifierCase::Lower);
        assert!(matches!(fixed, Cow::Borrowed(_)));
    }

    #[test]
    fn fixes_first_character_case() {
        assert_eq!(fix_identifier("health", IdentifierCase::Upper), "Health");
        assert_eq!(fix_identifier("Health", IdentifierCase::Lower), "health");
    }

    #[test]
    fn strips_invalid_characters() {
        assert_eq!(fix_identifier("my-name", IdentifierCase::Upper), "Myname");
    }

    #[test]
    fn idempotent() {
        let once = fix_identifier("some value", IdentifierCase::Upper).into_owned();
        let twice = fix_identifier(&once, IdentifierCase::Upper);
        assert!(matches!(twice, Cow::Borrowed(_)));
        assert_eq!(once, twice);
    }
}
