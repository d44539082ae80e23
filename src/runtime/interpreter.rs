// src/runtime/interpreter.rs
//! The frame interpreter. One Rust call per script frame: `call_function`
//! allocates a flat slot frame, walks the opcodes, and recurses for calls.
//! Failures never unwind; they travel the `ExceptionReport` and each frame
//! appends its trace entry on the way out.
//!
//! Reference discipline: every `Value::Handle` stored in a live frame slot,
//! object field, or static slot holds one reference. Writes take the new
//! reference before releasing the displaced one. Returns transfer ownership
//! of one reference to the caller.

use crate::binding::{Context, FunctionId, TypeId};
use crate::codegen::{CastKind, Literal, Opcode, Scalar};
use crate::errors::RuntimeError;
use crate::frontend::ast::{BinaryOp, UnaryOp};
use crate::frontend::CodeLocation;
use crate::runtime::call::Call;
use crate::runtime::exception::{ExceptionReport, StackTraceEntry};
use crate::runtime::handle::{DelegateValue, Handle, Value};
use crate::runtime::state::ExecutableState;

/// Invoke a function, scripted or native. Arguments are passed borrowed
/// (the caller keeps its references); the returned value carries one owned
/// reference that the caller must store or release.
pub fn call_function(
    ctx: &Context,
    state: &mut ExecutableState,
    function: FunctionId,
    this: Option<Handle>,
    args: Vec<Value>,
    report: &mut ExceptionReport,
) -> Option<Value> {
    if state.call_depth >= state.max_call_depth {
        report.raise(RuntimeError::StackOverflow {
            depth: state.max_call_depth,
        });
        return None;
    }
    state.call_depth += 1;
    let result = run_function(ctx, state, function, this, args, report);
    state.call_depth -= 1;
    result
}

fn run_function(
    ctx: &Context,
    state: &mut ExecutableState,
    function: FunctionId,
    this: Option<Handle>,
    args: Vec<Value>,
    report: &mut ExceptionReport,
) -> Option<Value> {
    let meta = ctx.function(function);

    if let Some(native) = meta.native.clone() {
        let mut call = Call::new(ctx, state, report, this, args);
        native(&mut call);
        let ret = call.into_return();
        return if report.is_set() { None } else { Some(ret) };
    }

    let Some(code) = meta.code.as_ref() else {
        report.raise(RuntimeError::NativeError {
            message: format!("function '{}' has no implementation", meta.name),
        });
        return None;
    };

    // Build the frame: return slot, params, this, locals, temps.
    let mut frame = vec![Value::Empty; meta.required_stack as usize];
    for (offset, value) in meta.param_offsets.iter().zip(args) {
        state.add_reference(&value);
        frame[*offset as usize] = value;
    }
    if let Some(offset) = meta.this_offset {
        let handle = this.unwrap_or_else(Handle::null);
        let value = Value::Handle(handle);
        state.add_reference(&value);
        frame[offset as usize] = value;
    }

    let mut pc = 0usize;
    let mut failed_line = 0u32;
    while pc < code.opcodes.len() {
        let line = code.lines[pc];
        failed_line = line;

        // The debugger is moved out of the state for the duration of the
        // hook so it can inspect the state it is pausing.
        if let Some(mut debugger) = state.debugger.take() {
            let depth = state.call_depth;
            debugger.on_opcode(ctx, state, code.entry_hash, line, depth, this);
            state.debugger = Some(debugger);
        }
        if let Some(error) = state.tick() {
            report.raise(error);
            break;
        }

        match &code.opcodes[pc] {
            Opcode::LoadLiteral { dst, value } => {
                let value = match value {
                    Literal::Integer(v) => Value::Integer(*v),
                    Literal::Real(v) => Value::Real(*v),
                    Literal::Boolean(v) => Value::Boolean(*v),
                    Literal::String(text) => Value::Handle(state.strings.intern(text)),
                    Literal::Null => Value::Handle(Handle::null()),
                };
                write_owned(ctx, state, &mut frame, *dst, value, report);
            }
            Opcode::Copy { dst, src } => {
                let value = frame[*src as usize].clone();
                write_borrowed(ctx, state, &mut frame, *dst, value, report);
            }
            Opcode::Binary {
                op,
                operands,
                dst,
                lhs,
                rhs,
            } => {
                let lhs = frame[*lhs as usize].clone();
                let rhs = frame[*rhs as usize].clone();
                match binary(state, *op, *operands, lhs, rhs, report) {
                    Some(value) => write_owned(ctx, state, &mut frame, *dst, value, report),
                    None => break,
                }
            }
            Opcode::Unary {
                op,
                operands,
                dst,
                src,
            } => {
                let src = frame[*src as usize].clone();
                match unary(*op, *operands, src, report) {
                    Some(value) => write_owned(ctx, state, &mut frame, *dst, value, report),
                    None => break,
                }
            }
            Opcode::Jump { target } => {
                pc = *target;
                continue;
            }
            Opcode::JumpIfFalse { cond, target } => {
                match frame[*cond as usize].as_boolean() {
                    Some(false) => {
                        pc = *target;
                        continue;
                    }
                    Some(true) => {}
                    None => {
                        report.raise(RuntimeError::NativeError {
                            message: "branch condition is not a Boolean".into(),
                        });
                        break;
                    }
                }
            }
            Opcode::JumpIfTrue { cond, target } => match frame[*cond as usize].as_boolean() {
                Some(true) => {
                    pc = *target;
                    continue;
                }
                Some(false) => {}
                None => {
                    report.raise(RuntimeError::NativeError {
                        message: "branch condition is not a Boolean".into(),
                    });
                    break;
                }
            },
            Opcode::NewObject { dst, ty } => match state.allocate(ctx, *ty) {
                Some(handle) => {
                    write_owned(ctx, state, &mut frame, *dst, Value::Handle(handle), report);
                }
                None => {
                    report.raise(RuntimeError::AllocationFailed {
                        type_name: ctx.ty(*ty).name.clone(),
                    });
                    break;
                }
            },
            Opcode::Delete { src } => {
                let handle = frame[*src as usize].as_handle().unwrap_or_else(Handle::null);
                if state.object(handle).is_none()
                    || handle.manager != crate::binding::ManagerKind::Heap
                {
                    report.raise(RuntimeError::NullDereference);
                    break;
                }
                run_destructor_chain(ctx, state, handle, report);
                state.events.remove_object(handle);
                state.heap.free(handle);
                if report.is_set() {
                    break;
                }
            }
            Opcode::GetField { dst, obj, offset } => {
                let handle = frame[*obj as usize].as_handle().unwrap_or_else(Handle::null);
                let Some(object) = state.object(handle) else {
                    report.raise(RuntimeError::NullDereference);
                    break;
                };
                let value = object.fields[*offset as usize].clone();
                write_borrowed(ctx, state, &mut frame, *dst, value, report);
            }
            Opcode::SetField { obj, offset, src } => {
                let handle = frame[*obj as usize].as_handle().unwrap_or_else(Handle::null);
                let value = frame[*src as usize].clone();
                state.add_reference(&value);
                let old = match state.object_mut(handle) {
                    Some(object) => {
                        std::mem::replace(&mut object.fields[*offset as usize], value)
                    }
                    None => {
                        release_value(ctx, state, value, report);
                        report.raise(RuntimeError::NullDereference);
                        break;
                    }
                };
                release_value(ctx, state, old, report);
            }
            Opcode::GetStatic { dst, index } => {
                let value = state.statics[*index as usize].clone();
                write_borrowed(ctx, state, &mut frame, *dst, value, report);
            }
            Opcode::SetStatic { index, src } => {
                let value = frame[*src as usize].clone();
                state.add_reference(&value);
                let old = std::mem::replace(&mut state.statics[*index as usize], value);
                release_value(ctx, state, old, report);
            }
            Opcode::Call {
                function: callee,
                dst,
                this: this_slot,
                args,
                virtual_call,
            } => {
                let receiver = this_slot.map(|slot| {
                    frame[slot as usize].as_handle().unwrap_or_else(Handle::null)
                });
                let mut target = *callee;
                if let Some(receiver) = receiver {
                    if receiver.is_null() {
                        report.raise(RuntimeError::NullDereference);
                        break;
                    }
                    if *virtual_call {
                        let runtime_type = state
                            .object(receiver)
                            .map(|o| o.ty)
                            .unwrap_or(receiver.stored_type);
                        target = resolve_virtual(ctx, runtime_type, *callee);
                    }
                }
                let values: Vec<Value> =
                    args.iter().map(|&slot| frame[slot as usize].clone()).collect();
                let result = call_function(ctx, state, target, receiver, values, report);
                if report.is_set() {
                    break;
                }
                if let (Some(dst), Some(value)) = (dst, result) {
                    write_owned(ctx, state, &mut frame, *dst, value, report);
                }
            }
            Opcode::MakeDelegate {
                dst,
                this: this_slot,
                function,
            } => {
                let receiver = this_slot
                    .map(|slot| frame[slot as usize].as_handle().unwrap_or_else(Handle::null));
                let value = Value::Delegate(DelegateValue {
                    function: *function,
                    this: receiver,
                });
                write_borrowed(ctx, state, &mut frame, *dst, value, report);
            }
            Opcode::CallDelegate { callee, dst, args } => {
                let Value::Delegate(delegate) = frame[*callee as usize].clone() else {
                    report.raise(RuntimeError::NullDereference);
                    break;
                };
                let values: Vec<Value> =
                    args.iter().map(|&slot| frame[slot as usize].clone()).collect();
                let result =
                    call_function(ctx, state, delegate.function, delegate.this, values, report);
                if report.is_set() {
                    break;
                }
                if let (Some(dst), Some(value)) = (dst, result) {
                    write_owned(ctx, state, &mut frame, *dst, value, report);
                }
            }
            Opcode::Cast { dst, src, kind } => {
                let value = frame[*src as usize].clone();
                match cast(ctx, state, value, *kind, report) {
                    Some(value) => write_borrowed(ctx, state, &mut frame, *dst, value, report),
                    None => break,
                }
            }
            Opcode::ToString { dst, src } => {
                let text = display(ctx, state, &frame[*src as usize]);
                let handle = state.strings.intern(&text);
                write_owned(ctx, state, &mut frame, *dst, Value::Handle(handle), report);
            }
            Opcode::Concat { dst, parts } => {
                let mut text = String::new();
                for &part in parts {
                    let handle =
                        frame[part as usize].as_handle().unwrap_or_else(Handle::null);
                    if let Some(piece) = state.strings.text(handle) {
                        text.push_str(piece);
                    }
                }
                let handle = state.strings.intern(&text);
                write_owned(ctx, state, &mut frame, *dst, Value::Handle(handle), report);
            }
            Opcode::Throw { src } => {
                let handle = frame[*src as usize].as_handle().unwrap_or_else(Handle::null);
                if state.object(handle).is_none() {
                    report.raise(RuntimeError::NullDereference);
                    break;
                }
                let message = exception_message(ctx, state, handle);
                // The thrown object must outlive this frame.
                state.add_reference(&Value::Handle(handle));
                report.raise_thrown(RuntimeError::UserException { message }, handle);
                break;
            }
            Opcode::Return => break,
        }
        if report.is_set() {
            break;
        }
        pc += 1;
    }

    if report.is_set() {
        let mut location = meta.location.clone();
        location.primary_line = failed_line;
        report.push_trace(StackTraceEntry {
            function_name: meta.name.clone(),
            class_name: meta.owner.map(|id| ctx.ty(id).name.clone()),
            location,
        });
    }

    // Transfer the return value's reference out before the frame dies.
    let result = meta
        .return_offset
        .map(|offset| std::mem::take(&mut frame[offset as usize]))
        .unwrap_or(Value::Empty);
    for value in frame {
        release_value(ctx, state, value, report);
    }

    if report.is_set() {
        release_value(ctx, state, result, report);
        None
    } else {
        Some(result)
    }
}

// ----- writes and reference maintenance -----

/// Store a borrowed value into a frame slot, taking a new reference.
fn write_borrowed(
    ctx: &Context,
    state: &mut ExecutableState,
    frame: &mut [Value],
    slot: u32,
    value: Value,
    report: &mut ExceptionReport,
) {
    state.add_reference(&value);
    write_owned(ctx, state, frame, slot, value, report);
}

/// Store a value that already carries its reference, releasing the
/// displaced occupant.
fn write_owned(
    ctx: &Context,
    state: &mut ExecutableState,
    frame: &mut [Value],
    slot: u32,
    value: Value,
    report: &mut ExceptionReport,
) {
    let old = std::mem::replace(&mut frame[slot as usize], value);
    release_value(ctx, state, old, report);
}

/// Drop one reference. A heap object that reaches zero has its destructor
/// chain run and is reclaimed.
pub(crate) fn release_value(
    ctx: &Context,
    state: &mut ExecutableState,
    value: Value,
    report: &mut ExceptionReport,
) {
    let handle = match value {
        Value::Handle(h) => h,
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
        crate::binding::ManagerKind::Heap => {
            if state.heap.release(handle) {
                // A zero-crossing inside the object's own destructor frame:
                // the outer run owns the chain and the free.
                if state.heap.is_destructing(handle) {
                    return;
                }
                run_destructor_chain(ctx, state, handle, report);
                state.events.remove_object(handle);
                state.heap.free(handle);
            }
        }
        crate::binding::ManagerKind::String => state.strings.release(handle),
        _ => {}
    }
}

/// Run destructors from the object's runtime type down to the root base.
pub(crate) fn run_destructor_chain(
    ctx: &Context,
    state: &mut ExecutableState,
    handle: Handle,
    report: &mut ExceptionReport,
) {
    if handle.manager == crate::binding::ManagerKind::Heap && !state.heap.mark_destructing(handle)
    {
        return;
    }
    let Some(object) = state.object(handle) else {
        return;
    };
    let mut destructors = Vec::new();
    let mut current = Some(object.ty);
    while let Some(id) = current {
        if let Some(destructor) = ctx.ty(id).destructor {
            destructors.push(destructor);
        }
        current = ctx.ty(id).base;
    }
    for destructor in destructors {
        call_function(ctx, state, destructor, Some(handle), vec![], report);
        if report.is_set() {
            return;
        }
    }
    // Release everything the dead object's fields still hold.
    let fields = match state.object_mut(handle) {
        Some(object) => std::mem::take(&mut object.fields),
        None => return,
    };
    for field in fields {
        release_value(ctx, state, field, report);
    }
}

// ----- events -----

/// Deliver an event to every receiver connected to (sender, name). The
/// subscription list is snapshotted first, so handlers may connect or
/// disconnect freely. Returns the number of receivers invoked.
pub fn send_event(
    ctx: &Context,
    state: &mut ExecutableState,
    sender: Handle,
    name: &str,
    event: Value,
    report: &mut ExceptionReport,
) -> usize {
    let subscriptions = state.events.subscriptions(sender, name);
    let mut delivered = 0;
    for subscription in &subscriptions {
        if state.object(subscription.receiver).is_none() {
            continue;
        }
        call_function(
            ctx,
            state,
            subscription.function,
            Some(subscription.receiver),
            vec![event.clone()],
            report,
        );
        delivered += 1;
        if report.is_set() {
            break;
        }
    }
    delivered
}

// ----- operator evaluation -----

fn binary(
    state: &mut ExecutableState,
    op: BinaryOp,
    operands: Scalar,
    lhs: Value,
    rhs: Value,
    report: &mut ExceptionReport,
) -> Option<Value> {
    let mismatch = |report: &mut ExceptionReport| {
        report.raise(RuntimeError::NativeError {
            message: format!("operands of '{}' have the wrong representation", op.as_str()),
        });
        None
    };
    match operands {
        Scalar::Integer => {
            let (Some(a), Some(b)) = (lhs.as_integer(), rhs.as_integer()) else {
                return mismatch(report);
            };
            Some(match op {
                BinaryOp::Add => Value::Integer(a.wrapping_add(b)),
                BinaryOp::Subtract => Value::Integer(a.wrapping_sub(b)),
                BinaryOp::Multiply => Value::Integer(a.wrapping_mul(b)),
                BinaryOp::Divide => {
                    if b == 0 {
                        report.raise(RuntimeError::DivideByZero);
                        return None;
                    }
                    Value::Integer(a.wrapping_div(b))
                }
                BinaryOp::Modulo => {
                    if b == 0 {
                        report.raise(RuntimeError::DivideByZero);
                        return None;
                    }
                    Value::Integer(a.wrapping_rem(b))
                }
                BinaryOp::Equal => Value::Boolean(a == b),
                BinaryOp::NotEqual => Value::Boolean(a != b),
                BinaryOp::Less => Value::Boolean(a < b),
                BinaryOp::Greater => Value::Boolean(a > b),
                BinaryOp::LessEqual => Value::Boolean(a <= b),
                BinaryOp::GreaterEqual => Value::Boolean(a >= b),
                _ => return mismatch(report),
            })
        }
        Scalar::Real => {
            let (Some(a), Some(b)) = (lhs.as_real(), rhs.as_real()) else {
                return mismatch(report);
            };
            Some(match op {
                BinaryOp::Add => Value::Real(a + b),
                BinaryOp::Subtract => Value::Real(a - b),
                BinaryOp::Multiply => Value::Real(a * b),
                BinaryOp::Divide => Value::Real(a / b),
                BinaryOp::Modulo => Value::Real(a % b),
                BinaryOp::Equal => Value::Boolean(a == b),
                BinaryOp::NotEqual => Value::Boolean(a != b),
                BinaryOp::Less => Value::Boolean(a < b),
                BinaryOp::Greater => Value::Boolean(a > b),
                BinaryOp::LessEqual => Value::Boolean(a <= b),
                BinaryOp::GreaterEqual => Value::Boolean(a >= b),
                _ => return mismatch(report),
            })
        }
        Scalar::Boolean => {
            let (Some(a), Some(b)) = (lhs.as_boolean(), rhs.as_boolean()) else {
                return mismatch(report);
            };
            Some(match op {
                BinaryOp::Equal => Value::Boolean(a == b),
                BinaryOp::NotEqual => Value::Boolean(a != b),
                BinaryOp::And => Value::Boolean(a && b),
                BinaryOp::Or => Value::Boolean(a || b),
                _ => return mismatch(report),
            })
        }
        Scalar::String => {
            let text = |state: &ExecutableState, value: &Value| {
                value
                    .as_handle()
                    .and_then(|h| state.strings.text(h))
                    .map(|t| t.to_string())
            };
            match op {
                BinaryOp::Equal | BinaryOp::NotEqual => {
                    let equal = match (text(state, &lhs), text(state, &rhs)) {
                        (Some(a), Some(b)) => a == b,
                        (None, None) => true,
                        _ => false,
                    };
                    Some(Value::Boolean(if op == BinaryOp::Equal {
                        equal
                    } else {
                        !equal
                    }))
                }
                BinaryOp::Add => {
                    let (Some(a), Some(b)) = (text(state, &lhs), text(state, &rhs)) else {
                        report.raise(RuntimeError::NullDereference);
                        return None;
                    };
                    let handle = state.strings.intern(&format!("{a}{b}"));
                    Some(Value::Handle(handle))
                }
                BinaryOp::Less
                | BinaryOp::Greater
                | BinaryOp::LessEqual
                | BinaryOp::GreaterEqual => {
                    let (Some(a), Some(b)) = (text(state, &lhs), text(state, &rhs)) else {
                        report.raise(RuntimeError::NullDereference);
                        return None;
                    };
                    Some(Value::Boolean(match op {
                        BinaryOp::Less => a < b,
                        BinaryOp::Greater => a > b,
                        BinaryOp::LessEqual => a <= b,
                        _ => a >= b,
                    }))
                }
                _ => mismatch(report),
            }
        }
        Scalar::Handle => {
            // Reference identity: two nulls are equal, otherwise the
            // handles must name the same live slot.
            let equal = match (lhs.is_null(), rhs.is_null()) {
                (true, true) => true,
                (true, false) | (false, true) => false,
                (false, false) => lhs == rhs,
            };
            match op {
                BinaryOp::Equal => Some(Value::Boolean(equal)),
                BinaryOp::NotEqual => Some(Value::Boolean(!equal)),
                _ => mismatch(report),
            }
        }
    }
}

fn unary(
    op: UnaryOp,
    operands: Scalar,
    src: Value,
    report: &mut ExceptionReport,
) -> Option<Value> {
    let result = match (op, operands) {
        (UnaryOp::Negate, Scalar::Integer) => src.as_integer().map(|v| Value::Integer(v.wrapping_neg())),
        (UnaryOp::Negate, Scalar::Real) => src.as_real().map(|v| Value::Real(-v)),
        (UnaryOp::Not, Scalar::Boolean) => src.as_boolean().map(|v| Value::Boolean(!v)),
        _ => None,
    };
    if result.is_none() {
        report.raise(RuntimeError::NativeError {
            message: format!("operand of '{}' has the wrong representation", op.as_str()),
        });
    }
    result
}

fn cast(
    ctx: &Context,
    state: &mut ExecutableState,
    value: Value,
    kind: CastKind,
    report: &mut ExceptionReport,
) -> Option<Value> {
    match kind {
        CastKind::Identity | CastKind::ToAny | CastKind::IntegerToEnum => Some(value),
        CastKind::IntegerToReal => match value.as_integer() {
            Some(v) => Some(Value::Real(v as f64)),
            None => {
                report.raise(RuntimeError::NativeError {
                    message: "cast source is not an Integer".into(),
                });
                None
            }
        },
        CastKind::RealToInteger => match value.as_real() {
            Some(v) => Some(Value::Integer(v as i64)),
            None => {
                report.raise(RuntimeError::NativeError {
                    message: "cast source is not a Real".into(),
                });
                None
            }
        },
        CastKind::Downcast(target) => {
            let handle = value.as_handle().unwrap_or_else(Handle::null);
            // A null reference passes any downcast and stays null.
            if handle.is_null() {
                return Some(value);
            }
            let runtime_type = state.object(handle).map(|o| o.ty).unwrap_or(handle.stored_type);
            if ctx.is_subtype(runtime_type, target) {
                Some(value)
            } else {
                report.raise(RuntimeError::InvalidCast {
                    from: ctx.ty(runtime_type).name.clone(),
                    to: ctx.ty(target).name.clone(),
                });
                None
            }
        }
        CastKind::FromAny(target) => {
            let core = ctx.core_types();
            let matches = match &value {
                Value::Integer(_) => target == core.integer || ctx.ty(target).is_enum(),
                Value::Real(_) => target == core.real,
                Value::Boolean(_) => target == core.boolean,
                Value::Handle(handle) => {
                    if handle.is_null() {
                        true
                    } else {
                        let runtime_type =
                            state.object(*handle).map(|o| o.ty).unwrap_or(handle.stored_type);
                        ctx.is_subtype(runtime_type, target)
                            || (handle.manager == crate::binding::ManagerKind::String
                                && target == core.string)
                    }
                }
                Value::Delegate(_) => false,
                Value::Empty => true,
            };
            if matches {
                Some(value)
            } else {
                report.raise(RuntimeError::InvalidCast {
                    from: display(ctx, state, &value),
                    to: ctx.ty(target).name.clone(),
                });
                None
            }
        }
    }
}

// ----- display -----

/// Display form of any value, used by string interpolation and the
/// debugger's value explorer.
pub(crate) fn display(ctx: &Context, state: &ExecutableState, value: &Value) -> String {
    match value {
        Value::Empty => "null".to_string(),
        Value::Integer(v) => v.to_string(),
        Value::Real(v) => v.to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Handle(handle) => {
            if handle.is_null() {
                return "null".to_string();
            }
            if let Some(text) = state.strings.text(*handle) {
                return text.to_string();
            }
            match state.object(*handle) {
                Some(object) => ctx.ty(object.ty).name.clone(),
                None => "null".to_string(),
            }
        }
        Value::Delegate(delegate) => {
            format!("delegate {}", ctx.function(delegate.function).name)
        }
    }
}

fn exception_message(ctx: &Context, state: &ExecutableState, handle: Handle) -> String {
    let Some(object) = state.object(handle) else {
        return String::new();
    };
    let Some(field) = find_field_in_chain(ctx, object.ty, "Message") else {
        return String::new();
    };
    match &object.fields.get(field as usize) {
        Some(Value::Handle(text)) => state
            .strings
            .text(*text)
            .map(|t| t.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn find_field_in_chain(ctx: &Context, ty: TypeId, name: &str) -> Option<u32> {
    let mut current = Some(ty);
    while let Some(id) = current {
        if let Some(field) = ctx.ty(id).find_field(name) {
            return Some(field.offset);
        }
        current = ctx.ty(id).base;
    }
    None
}

/// Re-dispatch a virtual call on the receiver's runtime type: the deepest
/// override with the same name and signature wins.
fn resolve_virtual(ctx: &Context, runtime_type: TypeId, function: FunctionId) -> FunctionId {
    let base = ctx.function(function);
    let signature = ctx.delegate(base.delegate);
    let mut current = Some(runtime_type);
    while let Some(id) = current {
        if let Some(candidates) = ctx.ty(id).find_functions(&base.name, false) {
            for &candidate in candidates {
                let meta = ctx.function(candidate);
                if ctx.delegate(meta.delegate).same_signature(signature) {
                    return candidate;
                }
            }
        }
        current = ctx.ty(id).base;
    }
    function
}
