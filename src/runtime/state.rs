// src/runtime/state.rs
//! One executing instance of a linked module: the handle managers, static
//! memory, timeouts, event registry, and the optionally attached debugger.
//! Several states can run against the same context; each owns its objects
//! outright.

use crate::binding::{Context, ManagerKind, Module, TypeId};
use crate::errors::RuntimeError;
use crate::runtime::events::EventRegistry;
use crate::runtime::exception::ExceptionReport;
use crate::runtime::handle::{Handle, Value};
use crate::runtime::managers::{
    HeapManager, ObjectData, PointerManager, StackManager, StringManager,
};

const DEFAULT_MAX_CALL_DEPTH: usize = 512;

struct Timeout {
    budget: u64,
    remaining: u64,
}

pub struct ExecutableState {
    pub module: Module,
    pub heap: HeapManager,
    pub stack: StackManager,
    pub pointers: PointerManager,
    pub strings: StringManager,
    /// Static field storage, indexed by context-global static offsets.
    pub statics: Vec<Value>,
    pub events: EventRegistry,
    pub max_call_depth: usize,
    pub(crate) call_depth: usize,
    timeouts: Vec<Timeout>,
    output: Option<Box<dyn FnMut(&str)>>,
    pub(crate) debugger: Option<crate::debugger::Debugger>,
    torn_down: bool,
}

impl ExecutableState {
    pub fn new(ctx: &Context, module: Module) -> ExecutableState {
        ExecutableState {
            module,
            heap: HeapManager::new(),
            stack: StackManager::new(),
            pointers: PointerManager::new(),
            strings: StringManager::new(ctx.core_types().string),
            statics: vec![Value::Empty; ctx.static_count() as usize],
            events: EventRegistry::new(),
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            call_depth: 0,
            timeouts: Vec::new(),
            output: None,
            debugger: None,
            torn_down: false,
        }
    }

    /// Run the static initializer of every library in the module, in link
    /// order. Must be called once before any other script execution.
    pub fn link(&mut self, ctx: &Context, report: &mut ExceptionReport) {
        let initializers: Vec<_> = self
            .module
            .libraries
            .iter()
            .flat_map(|library| library.functions.iter().copied())
            .filter(|&id| ctx.function(id).name == crate::sema::STATIC_INIT_NAME)
            .collect();
        for function in initializers {
            crate::runtime::interpreter::call_function(ctx, self, function, None, vec![], report);
            if report.is_set() {
                return;
            }
        }
    }

    // ----- object access -----

    /// Allocate an instance in the manager its type declares. `None` when
    /// allocation is disabled or the type is host-managed.
    pub fn allocate(&mut self, ctx: &Context, ty: TypeId) -> Option<Handle> {
        let bound = ctx.ty(ty);
        match bound.manager {
            ManagerKind::Heap => self.heap.allocate(ty, bound.size),
            ManagerKind::Stack => Some(self.stack.allocate(ty, bound.size)),
            ManagerKind::String => Some(self.strings.intern("")),
            // Pointer-managed objects come from the host, never from `new`.
            ManagerKind::Pointer => None,
        }
    }

    pub fn object(&self, handle: Handle) -> Option<&ObjectData> {
        if handle.is_null() {
            return None;
        }
        match handle.manager {
            ManagerKind::Heap => self.heap.get(handle),
            ManagerKind::Stack => self.stack.get(handle),
            ManagerKind::Pointer => self.pointers.get(handle),
            ManagerKind::String => None,
        }
    }

    pub fn object_mut(&mut self, handle: Handle) -> Option<&mut ObjectData> {
        if handle.is_null() {
            return None;
        }
        match handle.manager {
            ManagerKind::Heap => self.heap.get_mut(handle),
            ManagerKind::Stack => self.stack.get_mut(handle),
            ManagerKind::Pointer => self.pointers.get_mut(handle),
            ManagerKind::String => None,
        }
    }

    /// Take one reference on whatever a value holds, if it is counted. A
    /// delegate counts through its bound receiver.
    pub fn add_reference(&mut self, value: &Value) {
        let handle = match value {
            Value::Handle(h) => *h,
            Value::Delegate(d) => match d.this {
                Some(h) => h,
                None => return,
            },
            _ => return,
        };
        if handle.is_null() || handle.flags.no_reference_counting {
            return;
        }
        match handle.manager {
            ManagerKind::Heap => self.heap.add_reference(handle),
            ManagerKind::String => self.strings.add_reference(handle),
            ManagerKind::Stack | ManagerKind::Pointer => {}
        }
    }

    // ----- timeouts -----

    /// Enter a timeout scope with a fixed tick budget. Scopes nest; every
    /// active scope is charged for each executed opcode.
    pub fn push_timeout(&mut self, ticks: u64) {
        self.timeouts.push(Timeout {
            budget: ticks,
            remaining: ticks,
        });
    }

    pub fn pop_timeout(&mut self) {
        self.timeouts.pop();
    }

    /// Charge one tick against every active timeout. Returns the exceeded
    /// budget, if any. Never called while the debugger has execution
    /// paused, so a breakpoint does not burn the budget.
    pub(crate) fn tick(&mut self) -> Option<RuntimeError> {
        for timeout in &mut self.timeouts {
            if timeout.remaining == 0 {
                return Some(RuntimeError::TimeoutExceeded {
                    ticks: timeout.budget,
                });
            }
            timeout.remaining -= 1;
        }
        None
    }

    // ----- output -----

    pub fn set_output(&mut self, sink: Box<dyn FnMut(&str)>) {
        self.output = Some(sink);
    }

    /// Write script output to the host sink and mirror it to an attached
    /// debugger.
    pub fn write_output(&mut self, text: &str) {
        if let Some(sink) = &mut self.output {
            sink(text);
        }
        if let Some(debugger) = &mut self.debugger {
            debugger.send_output(text);
        }
    }

    // ----- debugging -----

    pub fn attach_debugger(&mut self, debugger: crate::debugger::Debugger) {
        self.debugger = Some(debugger);
    }

    pub fn detach_debugger(&mut self) -> Option<crate::debugger::Debugger> {
        self.debugger.take()
    }

    // ----- teardown -----

    /// Destroy the state: statics are released, every live heap object has
    /// its destructor chain run and is freed, and leaks (objects that still
    /// held references) are reported through the output sink. Allocation is
    /// disabled first so destructors cannot create new objects.
    pub fn teardown(&mut self, ctx: &Context) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        self.heap.allocation_enabled = false;

        let mut report = ExceptionReport::new();
        for value in std::mem::take(&mut self.statics) {
            crate::runtime::interpreter::release_value(ctx, self, value, &mut report);
            report.clear();
        }
        self.events = EventRegistry::new();

        let live = self.heap.live_objects();
        let mut leaked = 0usize;
        for (handle, refs) in live {
            if refs > 0 {
                leaked += 1;
            }
            crate::runtime::interpreter::run_destructor_chain(ctx, self, handle, &mut report);
            report.clear();
            self.heap.free(handle);
        }
        self.stack.invalidate_scope();
        if leaked > 0 {
            let text = format!("{leaked} object(s) still referenced at teardown\n");
            self.write_output(&text);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn statics_are_sized_from_context() {
        let ctx = Context::new();
        let state = ExecutableState::new(&ctx, Module::new(&ctx));
        assert_eq!(state.statics.len(), ctx.static_count() as usize);
    }

    #[test]
    fn nested_timeouts_each_tick() {
        let ctx = Context::new();
        let mut state = ExecutableState::new(&ctx, Module::new(&ctx));
        state.push_timeout(10);
        state.push_timeout(2);
        assert!(state.tick().is_none());
        assert!(state.tick().is_none());
        // The inner budget is spent; the next tick trips it.
        let error = state.tick().unwrap();
        assert_eq!(error, RuntimeError::TimeoutExceeded { ticks: 2 });
        state.pop_timeout();
        assert!(state.tick().is_none());
    }

    #[test]
    fn teardown_frees_and_reports_leaks() {
        let ctx = Context::new();
        let mut state = ExecutableState::new(&ctx, Module::new(&ctx));
        let output = Rc::new(RefCell::new(String::new()));
        let sink = output.clone();
        state.set_output(Box::new(move |text| sink.borrow_mut().push_str(text)));

        let ty = ctx.core_types().exception;
        let handle = state.allocate(&ctx, ty).unwrap();
        assert!(state.object(handle).is_some());

        state.teardown(&ctx);
        assert!(state.object(handle).is_none());
        assert!(output.borrow().contains("still referenced at teardown"));
        // Allocation stays disabled after teardown.
        assert!(state.allocate(&ctx, ty).is_none());
    }
}
