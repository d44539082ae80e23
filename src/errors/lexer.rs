// src/errors/lexer.rs
//! Tokenization errors (E0xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum LexerError {
    #[error("unexpected character '{ch}'")]
    #[diagnostic(code(E0001))]
    UnexpectedCharacter {
        ch: char,
        #[label("not valid here")]
        span: SourceSpan,
    },

    #[error("unterminated string literal")]
    #[diagnostic(code(E0002), help("add a closing '\"' to terminate the string"))]
    UnterminatedString {
        #[label("string starts here")]
        span: SourceSpan,
    },

    #[error("unterminated block comment")]
    #[diagnostic(code(E0003), help("add a closing '*/'"))]
    UnterminatedComment {
        #[label("comment starts here")]
        span: SourceSpan,
    },

    #[error("invalid number literal '{text}'")]
    #[diagnostic(code(E0004))]
    InvalidNumber {
        text: String,
        #[label("cannot be parsed as a number")]
        span: SourceSpan,
    },

    #[error("invalid escape sequence '\\{ch}'")]
    #[diagnostic(code(E0005))]
    InvalidEscape {
        ch: char,
        #[label("unknown escape")]
        span: SourceSpan,
    },
}
