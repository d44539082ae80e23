// src/errors/runtime.rs
//! Runtime errors (E3xxx).
//!
//! These describe failures raised by the virtual machine or by native
//! bindings. They are never propagated by unwinding; the VM threads them
//! through an `ExceptionReport` so the runtime stays embeddable in hosts
//! without exception support.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum RuntimeError {
    #[error("attempted to access a member of a null object")]
    #[diagnostic(code(E3001))]
    NullDereference,

    #[error("invalid cast from '{from}' to '{to}'")]
    #[diagnostic(code(E3002))]
    InvalidCast { from: String, to: String },

    #[error("index {index} is out of range (count is {count})")]
    #[diagnostic(code(E3003))]
    IndexOutOfRange { index: i64, count: i64 },

    #[error("the timeout of {ticks} ticks was exceeded")]
    #[diagnostic(code(E3004))]
    TimeoutExceeded { ticks: u64 },

    #[error("allocation failed for type '{type_name}'")]
    #[diagnostic(code(E3005))]
    AllocationFailed { type_name: String },

    #[error("integer division by zero")]
    #[diagnostic(code(E3006))]
    DivideByZero,

    #[error("call stack depth exceeded {depth} frames")]
    #[diagnostic(code(E3007))]
    StackOverflow { depth: usize },

    #[error("{message}")]
    #[diagnostic(code(E3008))]
    UserException { message: String },

    #[error("native function reported: {message}")]
    #[diagnostic(code(E3009))]
    NativeError { message: String },
}
