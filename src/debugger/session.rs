// src/debugger/session.rs
//! The debug session: breakpoints, the execution mode state machine, and
//! the per-opcode hook the interpreter calls. Pausing blocks the VM thread
//! in a polling loop that keeps servicing inbound messages; timeouts are
//! not ticked while paused, so a breakpoint never trips a budget.

use crate::binding::Context;
use crate::debugger::messages::{
    BreakpointAction, ExplorerRoot, IncomingMessage, OutgoingMessage, QueryValue, StackFrame,
};
use crate::runtime::{ExecutableState, Handle, ObjectData, Value};
use rustc_hash::FxHashSet;
use std::time::Duration;

/// Carries protocol messages between the session and the front end. The
/// WebSocket (or pipe, or in-process channel) framing lives behind this.
pub trait Transport {
    fn send(&mut self, message: &OutgoingMessage);
    /// Non-blocking receive.
    fn try_receive(&mut self) -> Option<IncomingMessage>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecutionMode {
    Resume,
    Pause,
    /// Pause at the next new line at or above this frame depth.
    StepOver { depth: usize },
    StepIn,
    /// Pause at the next new line shallower than this frame depth.
    StepOut { depth: usize },
}

pub struct Debugger {
    transport: Box<dyn Transport>,
    mode: ExecutionMode,
    /// Persistent across recompiles: the hash keys the entry's text and
    /// origin, not this session's libraries.
    breakpoints: FxHashSet<(u64, u32)>,
    /// Last `(entry_hash, line)` seen per call depth. Callee frames get
    /// their own slot, so returning to a caller's line is not "moved".
    positions: Vec<(u64, u32)>,
}

impl Debugger {
    pub fn new(transport: Box<dyn Transport>) -> Debugger {
        Debugger {
            transport,
            mode: ExecutionMode::Resume,
            breakpoints: FxHashSet::default(),
            positions: Vec::new(),
        }
    }

    pub fn set_breakpoint(&mut self, code_hash: u64, line: u32) {
        self.breakpoints.insert((code_hash, line));
    }

    pub fn clear_breakpoint(&mut self, code_hash: u64, line: u32) {
        self.breakpoints.remove(&(code_hash, line));
    }

    pub fn has_breakpoint(&self, code_hash: u64, line: u32) -> bool {
        self.breakpoints.contains(&(code_hash, line))
    }

    pub(crate) fn send_output(&mut self, text: &str) {
        self.transport.send(&OutgoingMessage::Output {
            text: text.to_string(),
            origin: None,
            line: None,
            code_hash: None,
        });
    }

    /// The interpreter's per-opcode hook. Decides whether to pause here,
    /// and while paused services messages until a resume or step command.
    pub fn on_opcode(
        &mut self,
        ctx: &Context,
        state: &mut ExecutableState,
        entry_hash: u64,
        line: u32,
        depth: usize,
        this: Option<Handle>,
    ) {
        // Commands arrive whether or not we pause.
        while let Some(message) = self.transport.try_receive() {
            self.handle_running_message(ctx, state, this, message, depth);
        }

        let slot_depth = depth.max(1);
        self.positions.truncate(slot_depth);
        while self.positions.len() < slot_depth {
            self.positions.push((0, 0));
        }
        let slot = &mut self.positions[slot_depth - 1];
        let moved = *slot != (entry_hash, line);
        *slot = (entry_hash, line);
        if !moved {
            return;
        }

        let pause = match self.mode {
            ExecutionMode::Resume => self.breakpoints.contains(&(entry_hash, line)),
            ExecutionMode::Pause | ExecutionMode::StepIn => true,
            ExecutionMode::StepOver { depth: at } => depth <= at,
            ExecutionMode::StepOut { depth: at } => depth < at,
        };
        if pause {
            self.pause_at(ctx, state, entry_hash, line, depth, this);
        }
    }

    fn pause_at(
        &mut self,
        ctx: &Context,
        state: &mut ExecutableState,
        entry_hash: u64,
        line: u32,
        depth: usize,
        this: Option<Handle>,
    ) {
        let mut frame_text = String::new();
        if let Some(entry) = state.module.find_entry(entry_hash) {
            frame_text = entry.origin.clone();
            self.transport.send(&OutgoingMessage::ShowCodeEntry {
                origin: entry.origin.clone(),
                code: entry.code.clone(),
                code_hash: entry.code_hash,
            });
        }
        self.transport.send(&OutgoingMessage::UpdateExplorer {
            roots: explorer_roots(state),
        });
        self.transport.send(&OutgoingMessage::SetExecutionPoint {
            line,
            code_hash: entry_hash,
            call_stack: vec![StackFrame {
                text: frame_text,
                language: "Quill".to_string(),
                line: Some(line),
                code_hash: Some(entry_hash),
            }],
        });

        loop {
            let Some(message) = self.transport.try_receive() else {
                std::thread::sleep(Duration::from_millis(5));
                continue;
            };
            match message {
                IncomingMessage::Resume => {
                    self.mode = ExecutionMode::Resume;
                    break;
                }
                IncomingMessage::StepOver => {
                    self.mode = ExecutionMode::StepOver { depth };
                    break;
                }
                IncomingMessage::StepIn => {
                    self.mode = ExecutionMode::StepIn;
                    break;
                }
                IncomingMessage::StepOut => {
                    self.mode = ExecutionMode::StepOut { depth };
                    break;
                }
                IncomingMessage::Pause => {}
                other => self.handle_running_message(ctx, state, this, other, depth),
            }
        }
        self.transport.send(&OutgoingMessage::ClearExecutionPoint);
    }

    /// Messages that are valid whether running or paused.
    fn handle_running_message(
        &mut self,
        ctx: &Context,
        state: &mut ExecutableState,
        this: Option<Handle>,
        message: IncomingMessage,
        depth: usize,
    ) {
        match message {
            IncomingMessage::ChangeBreakpoint {
                code_hash,
                line,
                action,
            } => match action {
                BreakpointAction::Add => self.set_breakpoint(code_hash, line),
                BreakpointAction::Remove => self.clear_breakpoint(code_hash, line),
            },
            IncomingMessage::Pause => self.mode = ExecutionMode::Pause,
            IncomingMessage::Resume => self.mode = ExecutionMode::Resume,
            IncomingMessage::StepOver => self.mode = ExecutionMode::StepOver { depth },
            IncomingMessage::StepIn => self.mode = ExecutionMode::StepIn,
            IncomingMessage::StepOut => self.mode = ExecutionMode::StepOut { depth },
            IncomingMessage::QueryExpression {
                expression,
                query_id,
            } => {
                let values = query_values(ctx, state, this, &expression);
                self.transport.send(&OutgoingMessage::QueryResult {
                    query_id,
                    expression,
                    values,
                });
            }
            IncomingMessage::ViewExplorerItem { code_hash } => {
                if let Some(entry) = state.module.find_entry(code_hash) {
                    self.transport.send(&OutgoingMessage::ShowCodeEntry {
                        origin: entry.origin.clone(),
                        code: entry.code.clone(),
                        code_hash: entry.code_hash,
                    });
                }
            }
        }
    }
}

/// Evaluate a simple member path ("Lives", "this.Owner.Name") against the
/// current receiver. The debugger evaluates reads only; anything it cannot
/// resolve reports as unknown. An object answer expands into one row per
/// field; a scalar answer is a single row.
fn query_values(
    ctx: &Context,
    state: &ExecutableState,
    this: Option<Handle>,
    expression: &str,
) -> Vec<QueryValue> {
    let path: Vec<&str> = expression
        .split('.')
        .map(str::trim)
        .filter(|p| !p.is_empty() && *p != "this")
        .collect();
    let Some(value) = resolve_path(ctx, state, this, &path) else {
        return vec![QueryValue {
            property: expression.to_string(),
            value: "<unknown>".to_string(),
            expandable: false,
        }];
    };
    if let Some(object) = value.as_handle().and_then(|h| state.object(h)) {
        return object_rows(ctx, state, object);
    }
    vec![QueryValue {
        property: expression.to_string(),
        value: crate::runtime::display(ctx, state, &value),
        expandable: false,
    }]
}

fn resolve_path(
    ctx: &Context,
    state: &ExecutableState,
    this: Option<Handle>,
    path: &[&str],
) -> Option<Value> {
    let mut current = Value::Handle(this?);
    for segment in path {
        let handle = current.as_handle()?;
        let object = state.object(handle)?;
        let offset = field_offset(ctx, object.ty, segment)?;
        current = object.fields.get(offset as usize)?.clone();
    }
    if path.is_empty() {
        return None;
    }
    Some(current)
}

fn field_offset(ctx: &Context, ty: crate::binding::TypeId, name: &str) -> Option<u32> {
    let mut current = Some(ty);
    while let Some(id) = current {
        if let Some(field) = ctx.ty(id).find_field(name) {
            return Some(field.offset);
        }
        current = ctx.ty(id).base;
    }
    None
}

/// One property row per field, the base chain included.
fn object_rows(ctx: &Context, state: &ExecutableState, object: &ObjectData) -> Vec<QueryValue> {
    let mut rows = Vec::new();
    let mut current = Some(object.ty);
    while let Some(id) = current {
        for field in &ctx.ty(id).fields {
            let value = object
                .fields
                .get(field.offset as usize)
                .cloned()
                .unwrap_or_default();
            let expandable = matches!(&value, Value::Handle(h) if state.object(*h).is_some());
            rows.push(QueryValue {
                property: field.name.clone(),
                value: crate::runtime::display(ctx, state, &value),
                expandable,
            });
        }
        current = ctx.ty(id).base;
    }
    rows
}

/// The explorer's browsable roots: every code entry in the module.
fn explorer_roots(state: &ExecutableState) -> Vec<ExplorerRoot> {
    state
        .module
        .libraries
        .iter()
        .flat_map(|library| library.entries.iter())
        .enumerate()
        .map(|(id, entry)| ExplorerRoot {
            id: id as u64,
            name: entry.origin.clone(),
            code_hash: entry.code_hash,
        })
        .collect()
}
