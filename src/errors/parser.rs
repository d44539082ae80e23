// src/errors/parser.rs
//! Parse errors (E1xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum ParserError {
    #[error("expected {expected}, found '{found}'")]
    #[diagnostic(code(E1001))]
    UnexpectedToken {
        expected: String,
        found: String,
        #[label("unexpected token")]
        span: SourceSpan,
    },

    #[error("expected an expression, found '{found}'")]
    #[diagnostic(code(E1002))]
    ExpectedExpression {
        found: String,
        #[label("expected expression")]
        span: SourceSpan,
    },

    #[error("expected a type name, found '{found}'")]
    #[diagnostic(code(E1003))]
    ExpectedType {
        found: String,
        #[label("expected type")]
        span: SourceSpan,
    },

    #[error("expected a declaration (class, struct, enum, or flags), found '{found}'")]
    #[diagnostic(code(E1004))]
    ExpectedDeclaration {
        found: String,
        #[label("not a declaration")]
        span: SourceSpan,
    },

    #[error("only one base type is allowed")]
    #[diagnostic(code(E1005), help("multiple inheritance is not supported"))]
    MultipleBaseTypes {
        #[label("second base type here")]
        span: SourceSpan,
    },

    #[error("a property must declare a getter, a setter, or both")]
    #[diagnostic(code(E1006))]
    EmptyProperty {
        #[label("property body is empty")]
        span: SourceSpan,
    },

    #[error("duplicate attribute '{name}'")]
    #[diagnostic(code(E1007))]
    DuplicateAttribute {
        name: String,
        #[label("already applied")]
        span: SourceSpan,
    },

    #[error("invalid assignment target")]
    #[diagnostic(code(E1008))]
    InvalidAssignmentTarget {
        #[label("cannot assign to this expression")]
        span: SourceSpan,
    },

    #[error("a destructor takes no parameters")]
    #[diagnostic(code(E1009))]
    DestructorWithParameters {
        #[label("remove these parameters")]
        span: SourceSpan,
    },
}
