// src/runtime/call.rs
//! The native call boundary. A `Call` packages everything a bound native
//! function may touch: the arguments, the receiver, the return slot, the
//! executable state, and the exception report. Typed accessors raise a
//! native error on mismatch instead of panicking, so a miswritten binding
//! surfaces as a script-level failure.

use crate::binding::Context;
use crate::errors::RuntimeError;
use crate::runtime::exception::ExceptionReport;
use crate::runtime::handle::{Handle, Value};
use crate::runtime::managers::ObjectData;
use crate::runtime::state::ExecutableState;

pub struct Call<'a> {
    pub ctx: &'a Context,
    pub state: &'a mut ExecutableState,
    pub(crate) report: &'a mut ExceptionReport,
    args: Vec<Value>,
    this: Option<Handle>,
    ret: Value,
}

impl<'a> Call<'a> {
    pub(crate) fn new(
        ctx: &'a Context,
        state: &'a mut ExecutableState,
        report: &'a mut ExceptionReport,
        this: Option<Handle>,
        args: Vec<Value>,
    ) -> Call<'a> {
        Call {
            ctx,
            state,
            report,
            args,
            this,
            ret: Value::Empty,
        }
    }

    pub(crate) fn into_return(self) -> Value {
        self.ret
    }

    // ----- arguments -----

    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    pub fn get(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    pub fn get_integer(&mut self, index: usize) -> i64 {
        match self.get(index).as_integer() {
            Some(v) => v,
            None => {
                self.raise(format!("argument {index} is not an Integer"));
                0
            }
        }
    }

    pub fn get_real(&mut self, index: usize) -> f64 {
        match self.get(index).as_real() {
            Some(v) => v,
            None => {
                self.raise(format!("argument {index} is not a Real"));
                0.0
            }
        }
    }

    pub fn get_boolean(&mut self, index: usize) -> bool {
        match self.get(index).as_boolean() {
            Some(v) => v,
            None => {
                self.raise(format!("argument {index} is not a Boolean"));
                false
            }
        }
    }

    pub fn get_handle(&mut self, index: usize) -> Handle {
        match self.get(index).as_handle() {
            Some(h) => h,
            None => {
                self.raise(format!("argument {index} is not an object"));
                Handle::null()
            }
        }
    }

    pub fn get_string(&mut self, index: usize) -> String {
        let handle = self.get_handle(index);
        match self.state.strings.text(handle) {
            Some(text) => text.to_string(),
            None => {
                self.raise(format!("argument {index} is not a String"));
                String::new()
            }
        }
    }

    // ----- receiver -----

    pub fn this_handle(&self) -> Option<Handle> {
        self.this
    }

    pub fn this_object(&self) -> Option<&ObjectData> {
        self.state.object(self.this?)
    }

    pub fn this_object_mut(&mut self) -> Option<&mut ObjectData> {
        self.state.object_mut(self.this?)
    }

    // ----- return value -----

    pub fn set_return(&mut self, value: Value) {
        self.ret = value;
    }

    pub fn set_return_integer(&mut self, value: i64) {
        self.ret = Value::Integer(value);
    }

    pub fn set_return_real(&mut self, value: f64) {
        self.ret = Value::Real(value);
    }

    pub fn set_return_boolean(&mut self, value: bool) {
        self.ret = Value::Boolean(value);
    }

    pub fn set_return_handle(&mut self, handle: Handle) {
        self.ret = Value::Handle(handle);
    }

    pub fn set_return_string(&mut self, text: &str) {
        let handle = self.state.strings.intern(text);
        self.ret = Value::Handle(handle);
    }

    // ----- failure -----

    /// Raise a native error; the VM stops running the current body and
    /// unwinds the report through the callers.
    pub fn raise(&mut self, message: impl Into<String>) {
        self.report.raise(RuntimeError::NativeError {
            message: message.into(),
        });
    }

    pub fn raise_index(&mut self, index: i64, count: i64) {
        self.report
            .raise(RuntimeError::IndexOutOfRange { index, count });
    }

    /// Drop one reference held by a value a native binding owned.
    pub fn release(&mut self, value: Value) {
        crate::runtime::interpreter::release_value(self.ctx, self.state, value, self.report);
    }

    pub fn has_failed(&self) -> bool {
        self.report.is_set()
    }
}
