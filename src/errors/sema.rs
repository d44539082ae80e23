// src/errors/sema.rs
//! Semantic analysis errors (E2xxx).

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone)]
pub enum SemanticError {
    #[error("duplicate type name '{name}'")]
    #[diagnostic(code(E2001))]
    DuplicateTypeName {
        name: String,
        #[label("already defined")]
        span: SourceSpan,
    },

    #[error("duplicate member '{name}' on type '{type_name}'")]
    #[diagnostic(code(E2002))]
    DuplicateMember {
        name: String,
        type_name: String,
        #[label("already defined on this type")]
        span: SourceSpan,
    },

    #[error("unknown type '{name}'")]
    #[diagnostic(code(E2003))]
    UnknownType {
        name: String,
        #[label("not found in this library or its dependencies")]
        span: SourceSpan,
    },

    #[error("undefined identifier '{name}'")]
    #[diagnostic(code(E2004))]
    UndefinedIdentifier {
        name: String,
        #[label("not found in any enclosing scope")]
        span: SourceSpan,
    },

    #[error("type '{type_name}' has no member '{name}'")]
    #[diagnostic(code(E2005))]
    UnknownMember {
        name: String,
        type_name: String,
        #[label("no such member")]
        span: SourceSpan,
    },

    #[error("expected {expected}, found {found}")]
    #[diagnostic(code(E2006))]
    TypeMismatch {
        expected: String,
        found: String,
        #[label("type mismatch")]
        span: SourceSpan,
    },

    #[error("cannot cast from '{from}' to '{to}'")]
    #[diagnostic(code(E2007))]
    InvalidCast {
        from: String,
        to: String,
        #[label("no conversion exists")]
        span: SourceSpan,
    },

    #[error("no overload of '{name}' matches the given arguments ({provided})")]
    #[diagnostic(code(E2008))]
    NoMatchingOverload {
        name: String,
        provided: String,
        #[label("no matching overload")]
        span: SourceSpan,
    },

    #[error("call to '{name}' is ambiguous: multiple overloads match equally well")]
    #[diagnostic(code(E2009))]
    AmbiguousOverload {
        name: String,
        #[label("ambiguous call")]
        span: SourceSpan,
    },

    #[error("expected {expected} template argument(s), found {found}")]
    #[diagnostic(code(E2010))]
    TemplateArgumentCount {
        expected: usize,
        found: usize,
        #[label("wrong number of template arguments")]
        span: SourceSpan,
    },

    #[error("type '{name}' contains itself by value")]
    #[diagnostic(
        code(E2011),
        help("a value-type field whose type transitively contains the declaring type would have infinite size; use a reference type instead")
    )]
    CompositionCycle {
        name: String,
        #[label("composition cycle through this type")]
        span: SourceSpan,
    },

    #[error("base type '{base}' of '{derived}' must have the same copy mode")]
    #[diagnostic(code(E2012), help("a struct cannot inherit from a class, nor a class from a struct"))]
    CopyModeMismatch {
        base: String,
        derived: String,
        #[label("mismatched copy mode")]
        span: SourceSpan,
    },

    #[error("inheritance cycle involving type '{name}'")]
    #[diagnostic(code(E2013))]
    InheritanceCycle {
        name: String,
        #[label("type is its own ancestor")]
        span: SourceSpan,
    },

    #[error("member '{name}' hides a member of base type '{base}'")]
    #[diagnostic(code(E2014), help("mark the base member [Virtual] and this one [Override], or rename it"))]
    HidesBaseMember {
        name: String,
        base: String,
        #[label("hides inherited member")]
        span: SourceSpan,
    },

    #[error("cannot write to this expression")]
    #[diagnostic(code(E2015))]
    NotWritable {
        #[label("read-only here")]
        span: SourceSpan,
    },

    #[error("cannot read from this expression")]
    #[diagnostic(code(E2016))]
    NotReadable {
        #[label("write-only here")]
        span: SourceSpan,
    },

    #[error("expression of type '{ty}' is not callable")]
    #[diagnostic(code(E2017))]
    NotCallable {
        ty: String,
        #[label("not a function")]
        span: SourceSpan,
    },

    #[error("not all code paths return a value")]
    #[diagnostic(code(E2018))]
    MissingReturn {
        #[label("function may exit here without returning")]
        span: SourceSpan,
    },

    #[error("unreachable code")]
    #[diagnostic(code(E2019))]
    UnreachableCode {
        #[label("all paths before this point have returned or thrown")]
        span: SourceSpan,
    },

    #[error("'{kind}' used outside of a loop")]
    #[diagnostic(code(E2020))]
    NotInLoop {
        kind: String,
        #[label("no enclosing loop")]
        span: SourceSpan,
    },

    #[error("condition must be Boolean, found '{found}'")]
    #[diagnostic(code(E2021))]
    ConditionNotBoolean {
        found: String,
        #[label("expected Boolean")]
        span: SourceSpan,
    },

    #[error("operator '{op}' is not defined for '{lhs}' and '{rhs}'")]
    #[diagnostic(code(E2022))]
    InvalidBinaryOperands {
        op: String,
        lhs: String,
        rhs: String,
        #[label("no such operator")]
        span: SourceSpan,
    },

    #[error("operator '{op}' is not defined for '{operand}'")]
    #[diagnostic(code(E2023))]
    InvalidUnaryOperand {
        op: String,
        operand: String,
        #[label("no such operator")]
        span: SourceSpan,
    },

    #[error("type '{name}' cannot be created from script")]
    #[diagnostic(code(E2024))]
    NotCreatable {
        name: String,
        #[label("construction not allowed")]
        span: SourceSpan,
    },

    #[error("cannot delete a value of type '{name}'")]
    #[diagnostic(code(E2025), help("only reference types can be deleted"))]
    CannotDelete {
        name: String,
        #[label("not a reference type")]
        span: SourceSpan,
    },

    #[error("type '{name}' is sealed and cannot be inherited from")]
    #[diagnostic(code(E2026))]
    BaseTypeSealed {
        name: String,
        #[label("sealed base type")]
        span: SourceSpan,
    },

    #[error("type '{name}' has no indexer")]
    #[diagnostic(code(E2027), help("an indexable type must define Get and Set methods"))]
    NoIndexer {
        name: String,
        #[label("cannot be indexed")]
        span: SourceSpan,
    },

    #[error("thrown value must derive from Exception, found '{found}'")]
    #[diagnostic(code(E2028))]
    ThrowNotException {
        found: String,
        #[label("not an Exception")]
        span: SourceSpan,
    },

    #[error("void expression used as a value")]
    #[diagnostic(code(E2029))]
    VoidUsedAsValue {
        #[label("produces no value")]
        span: SourceSpan,
    },

    #[error("template '{name}' referenced without arguments")]
    #[diagnostic(code(E2030))]
    TemplateNotInstantiated {
        name: String,
        #[label("template arguments required")]
        span: SourceSpan,
    },

    #[error("a local variable named '{name}' already exists in this scope")]
    #[diagnostic(code(E2031))]
    DuplicateLocal {
        name: String,
        #[label("already declared")]
        span: SourceSpan,
    },
}
