// src/runtime/mod.rs
//! The virtual machine: values and handles, the handle managers, the frame
//! interpreter, the native call boundary, events, and the core library.

mod call;
pub mod core;
mod events;
mod exception;
mod handle;
mod interpreter;
mod managers;
mod state;

pub use call::Call;
pub use events::{EventRegistry, Subscription};
pub use exception::{ExceptionReport, StackTraceEntry, ThrownException};
pub use handle::{DelegateValue, Handle, HandleFlags, Value, NULL_SLOT};
pub use interpreter::{call_function, send_event};
pub use managers::{HeapManager, ObjectData, PointerManager, StackManager, StringManager};
pub use state::ExecutableState;

pub(crate) use interpreter::display;
