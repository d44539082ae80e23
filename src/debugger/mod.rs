// src/debugger/mod.rs
//! The JSON debugger boundary: wire message shapes, the transport trait,
//! and the session that the interpreter's per-opcode hook drives.

mod messages;
mod session;

pub use messages::{
    BreakpointAction, ExplorerRoot, IncomingMessage, OutgoingMessage, QueryValue, StackFrame,
};
pub use session::{Debugger, Transport};
