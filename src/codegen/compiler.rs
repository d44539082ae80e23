// src/codegen/compiler.rs
//! Straight-line code generation over lowered, fully-typed bodies. Every
//! resolution and conversion was decided by the analyzer; this walk only
//! picks slots and emits opcodes in evaluation order.

use crate::binding::{Context, FunctionId, Type, TypeId};
use crate::codegen::{CastKind, CompiledCode, Literal, Opcode, Scalar};
use crate::frontend::ast::*;
use crate::sema::{Analysis, Body, Resolved, Tables};

/// Compile every analyzed body and install the result on its function.
pub fn compile_library(ctx: &mut Context, analysis: &Analysis) {
    for body in &analysis.bodies {
        let (code, high_water) = compile_function(ctx, &analysis.tables, body);
        let function = ctx.function_mut(body.function);
        function.code = Some(code);
        if high_water > function.required_stack {
            function.required_stack = high_water;
        }
    }
}

fn compile_function(ctx: &Context, tables: &Tables, body: &Body) -> (CompiledCode, u32) {
    let function = ctx.function(body.function);
    let mut compiler = FunctionCompiler {
        ctx,
        tables,
        code: CompiledCode {
            entry_hash: function.location.code_hash,
            ..CompiledCode::default()
        },
        next_scratch: function.required_stack,
        high_water: function.required_stack,
        return_offset: function.return_offset,
        this_offset: function.this_offset,
        loops: Vec::new(),
    };
    for statement in &body.statements {
        compiler.statement(statement);
    }
    // Fall-off-the-end return; unreachable for non-void bodies, which the
    // analyzer proved exhaustive.
    let line = function.location.end_line;
    compiler.code.push(Opcode::Return, line);
    (compiler.code, compiler.high_water)
}

struct LoopFrame {
    /// `break` jumps patched to the loop exit.
    breaks: Vec<usize>,
    /// `continue` jumps patched to the loop's re-entry point.
    continues: Vec<usize>,
}

struct FunctionCompiler<'a> {
    ctx: &'a Context,
    tables: &'a Tables,
    code: CompiledCode,
    next_scratch: u32,
    high_water: u32,
    return_offset: Option<u32>,
    this_offset: Option<u32>,
    loops: Vec<LoopFrame>,
}

impl<'a> FunctionCompiler<'a> {
    // ----- slots -----

    fn scratch(&mut self) -> u32 {
        let slot = self.next_scratch;
        self.next_scratch += 1;
        if self.next_scratch > self.high_water {
            self.high_water = self.next_scratch;
        }
        slot
    }

    /// Scratch slots live for one statement; values that must survive
    /// longer were given named or temp slots by the analyzer.
    fn with_scratch_scope(&mut self, f: impl FnOnce(&mut Self)) {
        let mark = self.next_scratch;
        f(self);
        self.next_scratch = mark;
    }

    // ----- statements -----

    fn statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Expression(expr) => self.with_scratch_scope(|c| {
                c.expr(expr);
            }),
            Statement::Var(var) => self.with_scratch_scope(|c| {
                let slot = c.tables.var_slots[&var.initializer.id];
                if let Some(src) = c.expr(&var.initializer) {
                    let line = var.location.primary_line;
                    c.code.push(Opcode::Copy { dst: slot, src }, line);
                }
            }),
            Statement::If(parts) => self.compile_if(parts),
            Statement::While {
                condition,
                body,
                location,
            } => {
                let top = self.code.opcodes.len();
                let mut exit = None;
                self.with_scratch_scope(|c| {
                    if let Some(cond) = c.expr(condition) {
                        exit = Some(c.code.push(
                            Opcode::JumpIfFalse { cond, target: 0 },
                            location.primary_line,
                        ));
                    }
                });
                self.loops.push(LoopFrame {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                for inner in body {
                    self.statement(inner);
                }
                self.code
                    .push(Opcode::Jump { target: top }, location.primary_line);
                let end = self.code.opcodes.len();
                if let Some(at) = exit {
                    self.code.patch_jump(at, end);
                }
                self.finish_loop(end, top);
            }
            Statement::For {
                init,
                condition,
                increment,
                body,
                location,
            } => {
                if let Some(init) = init {
                    self.statement(init);
                }
                let top = self.code.opcodes.len();
                let mut exit = None;
                self.with_scratch_scope(|c| {
                    if let Some(condition) = condition {
                        if let Some(cond) = c.expr(condition) {
                            exit = Some(c.code.push(
                                Opcode::JumpIfFalse { cond, target: 0 },
                                location.primary_line,
                            ));
                        }
                    }
                });
                self.loops.push(LoopFrame {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                for inner in body {
                    self.statement(inner);
                }
                // `continue` re-enters at the increment, not the condition.
                let increment_at = self.code.opcodes.len();
                self.with_scratch_scope(|c| {
                    if let Some(increment) = increment {
                        c.expr(increment);
                    }
                });
                self.code
                    .push(Opcode::Jump { target: top }, location.primary_line);
                let end = self.code.opcodes.len();
                if let Some(at) = exit {
                    self.code.patch_jump(at, end);
                }
                self.finish_loop(end, increment_at);
            }
            Statement::Loop { body, location } => {
                let top = self.code.opcodes.len();
                self.loops.push(LoopFrame {
                    breaks: Vec::new(),
                    continues: Vec::new(),
                });
                for inner in body {
                    self.statement(inner);
                }
                self.code
                    .push(Opcode::Jump { target: top }, location.primary_line);
                let end = self.code.opcodes.len();
                self.finish_loop(end, top);
            }
            Statement::Scope { body, .. } => {
                for inner in body {
                    self.statement(inner);
                }
            }
            Statement::Break(location) => {
                let at = self
                    .code
                    .push(Opcode::Jump { target: 0 }, location.primary_line);
                if let Some(frame) = self.loops.last_mut() {
                    frame.breaks.push(at);
                }
            }
            Statement::Continue(location) => {
                let at = self
                    .code
                    .push(Opcode::Jump { target: 0 }, location.primary_line);
                if let Some(frame) = self.loops.last_mut() {
                    frame.continues.push(at);
                }
            }
            Statement::Return { value, location } => {
                let line = location.primary_line;
                self.with_scratch_scope(|c| {
                    if let (Some(value), Some(dst)) = (value, c.return_offset) {
                        if let Some(src) = c.expr(value) {
                            c.code.push(Opcode::Copy { dst, src }, line);
                        }
                    }
                });
                self.code.push(Opcode::Return, line);
            }
            Statement::Throw { value, location } => {
                let line = location.primary_line;
                self.with_scratch_scope(|c| {
                    if let Some(src) = c.expr(value) {
                        c.code.push(Opcode::Throw { src }, line);
                    }
                });
            }
            Statement::Delete { value, location } => {
                let line = location.primary_line;
                self.with_scratch_scope(|c| {
                    if let Some(src) = c.expr(value) {
                        c.code.push(Opcode::Delete { src }, line);
                    }
                });
            }
        }
    }

    fn compile_if(&mut self, parts: &[IfPart]) {
        let mut end_jumps = Vec::new();
        for (index, part) in parts.iter().enumerate() {
            let line = part.location.primary_line;
            let mut next = None;
            if let Some(condition) = &part.condition {
                self.with_scratch_scope(|c| {
                    if let Some(cond) = c.expr(condition) {
                        next = Some(c.code.push(Opcode::JumpIfFalse { cond, target: 0 }, line));
                    }
                });
            }
            for inner in &part.body {
                self.statement(inner);
            }
            if index + 1 < parts.len() {
                end_jumps.push(self.code.push(Opcode::Jump { target: 0 }, line));
            }
            if let Some(at) = next {
                let here = self.code.opcodes.len();
                self.code.patch_jump(at, here);
            }
        }
        let end = self.code.opcodes.len();
        for at in end_jumps {
            self.code.patch_jump(at, end);
        }
    }

    fn finish_loop(&mut self, break_target: usize, continue_target: usize) {
        if let Some(frame) = self.loops.pop() {
            for at in frame.breaks {
                self.code.patch_jump(at, break_target);
            }
            for at in frame.continues {
                self.code.patch_jump(at, continue_target);
            }
        }
    }

    // ----- expressions -----

    /// Emit code for one expression and return the slot holding its value,
    /// or `None` for void results.
    fn expr(&mut self, expr: &Expr) -> Option<u32> {
        let line = expr.location.primary_line;
        match &expr.kind {
            ExprKind::Literal(value) => {
                let dst = self.scratch();
                let literal = match value {
                    LiteralValue::Integer(v) => Literal::Integer(*v),
                    LiteralValue::Real(v) => Literal::Real(*v),
                    LiteralValue::Boolean(v) => Literal::Boolean(*v),
                    LiteralValue::String(v) => Literal::String(v.clone()),
                    LiteralValue::Null => Literal::Null,
                };
                self.code.push(Opcode::LoadLiteral { dst, value: literal }, line);
                Some(dst)
            }
            ExprKind::StringInterpolant(pieces) => {
                let mut parts = Vec::with_capacity(pieces.len());
                for piece in pieces {
                    let src = self.expr(piece)?;
                    let dst = self.scratch();
                    self.code
                        .push(Opcode::ToString { dst, src }, piece.location.primary_line);
                    parts.push(dst);
                }
                let dst = self.scratch();
                self.code.push(Opcode::Concat { dst, parts }, line);
                Some(dst)
            }
            ExprKind::Identifier(_) | ExprKind::This => self.read_resolved(expr.id, None, line),
            ExprKind::TempRef(temp) => Some(self.tables.temp_slots[temp]),
            ExprKind::LetTemp { temp, value } => {
                let dst = self.tables.temp_slots[temp];
                if let Some(src) = self.expr(value) {
                    self.code.push(Opcode::Copy { dst, src }, line);
                }
                Some(dst)
            }
            ExprKind::StaticType(_) => None,
            ExprKind::MemberAccess { base, .. } => {
                let base_slot = self.base_slot(base);
                self.read_resolved(expr.id, base_slot, line)
            }
            ExprKind::FunctionCall { callee, args } => self.compile_call(expr, callee, args, line),
            ExprKind::Binary { op, lhs, rhs } => self.compile_binary(*op, lhs, rhs, line),
            ExprKind::Unary { op, operand } => {
                let src = self.expr(operand)?;
                let dst = self.scratch();
                let operands = self.scalar_of(operand.id);
                self.code.push(
                    Opcode::Unary {
                        op: *op,
                        operands,
                        dst,
                        src,
                    },
                    line,
                );
                Some(dst)
            }
            ExprKind::Indexer { base, indices } => {
                // Reads were resolved to the container's Get overload.
                let this = self.expr(base)?;
                let mut arg_slots = Vec::with_capacity(indices.len());
                for index in indices {
                    arg_slots.push(self.expr(index)?);
                }
                match self.tables.refs.get(&expr.id) {
                    Some(Resolved::Function { id, .. }) => {
                        self.emit_call(*id, Some(this), arg_slots, false, line)
                    }
                    _ => None,
                }
            }
            ExprKind::TypeCast { operand, .. } => {
                let src = self.expr(operand)?;
                let kind = self
                    .tables
                    .casts
                    .get(&expr.id)
                    .copied()
                    .unwrap_or(CastKind::Identity);
                if kind == CastKind::Identity {
                    return Some(src);
                }
                let dst = self.scratch();
                self.code.push(Opcode::Cast { dst, src, kind }, line);
                Some(dst)
            }
            ExprKind::New { args, .. } => self.compile_new(expr, args, line),
            ExprKind::Initializer { base, values } => {
                let container = self.expr(base)?;
                for value in values {
                    self.with_scratch_scope(|c| {
                        if let Some(&add) = c.tables.initializer_adds.get(&value.id) {
                            if let Some(slot) = c.expr(value) {
                                c.emit_call(
                                    add,
                                    Some(container),
                                    vec![slot],
                                    false,
                                    value.location.primary_line,
                                );
                            }
                        }
                    });
                }
                Some(container)
            }
            ExprKind::Multi(pieces) => {
                let mut result = None;
                for piece in pieces {
                    result = self.expr(piece);
                }
                result
            }
            ExprKind::Error => None,
        }
    }

    /// The object slot a member access reads through, or `None` when the
    /// base named a type (static access).
    fn base_slot(&mut self, base: &Expr) -> Option<u32> {
        if let Some(Resolved::Type(_)) = self.tables.refs.get(&base.id) {
            return None;
        }
        self.expr(base)
    }

    /// Load whatever a name or member access resolved to into a slot.
    fn read_resolved(&mut self, id: NodeId, base: Option<u32>, line: u32) -> Option<u32> {
        match self.tables.refs.get(&id)? {
            Resolved::Local { slot } => Some(*slot),
            Resolved::This => self.this_offset,
            Resolved::Field {
                offset, is_static, ..
            } => {
                let dst = self.scratch();
                if *is_static {
                    self.code.push(Opcode::GetStatic { dst, index: *offset }, line);
                } else {
                    let obj = base.or(self.this_offset)?;
                    self.code.push(
                        Opcode::GetField {
                            dst,
                            obj,
                            offset: *offset,
                        },
                        line,
                    );
                }
                Some(dst)
            }
            Resolved::Property { get, is_static, .. } => {
                let get = (*get)?;
                let this = if *is_static {
                    None
                } else {
                    base.or(self.this_offset)
                };
                self.emit_call(get, this, Vec::new(), false, line)
            }
            Resolved::EnumValue(value) => {
                let dst = self.scratch();
                self.code.push(
                    Opcode::LoadLiteral {
                        dst,
                        value: Literal::Integer(*value),
                    },
                    line,
                );
                Some(dst)
            }
            Resolved::Function { id, .. } => {
                let function = self.ctx.function(*id);
                let this = if function.flags.is_static {
                    None
                } else {
                    base.or(self.this_offset)
                };
                let dst = self.scratch();
                self.code.push(
                    Opcode::MakeDelegate {
                        dst,
                        this,
                        function: *id,
                    },
                    line,
                );
                Some(dst)
            }
            Resolved::Type(_) | Resolved::Constructor { .. } => None,
        }
    }

    fn compile_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        line: u32,
    ) -> Option<u32> {
        // Resolved call: the callee node carries the chosen overload.
        if let Some(Resolved::Function { id, is_virtual }) = self.tables.refs.get(&callee.id) {
            let (id, is_virtual) = (*id, *is_virtual);
            let this = match &callee.kind {
                ExprKind::MemberAccess { base, .. } => self.base_slot(base),
                _ => None,
            };
            let function = self.ctx.function(id);
            let this = if function.flags.is_static {
                None
            } else {
                this.or(self.this_offset)
            };
            let mut arg_slots = Vec::with_capacity(args.len());
            for arg in args {
                arg_slots.push(self.expr(arg)?);
            }
            let virtual_call = is_virtual && this.is_some();
            return self.emit_call(id, this, arg_slots, virtual_call, line);
        }

        // Otherwise the callee is a delegate value.
        let callee_slot = self.expr(callee)?;
        let mut arg_slots = Vec::with_capacity(args.len());
        for arg in args {
            arg_slots.push(self.expr(arg)?);
        }
        let returns = !matches!(self.tables.result_type.get(&expr.id), Some(Type::Void) | None);
        let dst = returns.then(|| self.scratch());
        self.code.push(
            Opcode::CallDelegate {
                callee: callee_slot,
                dst,
                args: arg_slots,
            },
            line,
        );
        dst
    }

    fn compile_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, line: u32) -> Option<u32> {
        if op == BinaryOp::Assign {
            return self.compile_assignment(lhs, rhs, line);
        }
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            // Short circuit: the right side only runs when the left side
            // did not already decide the result.
            let dst = self.scratch();
            let left = self.expr(lhs)?;
            self.code.push(Opcode::Copy { dst, src: left }, line);
            let skip = match op {
                BinaryOp::And => self
                    .code
                    .push(Opcode::JumpIfFalse { cond: dst, target: 0 }, line),
                _ => self
                    .code
                    .push(Opcode::JumpIfTrue { cond: dst, target: 0 }, line),
            };
            let right = self.expr(rhs)?;
            self.code.push(Opcode::Copy { dst, src: right }, line);
            let end = self.code.opcodes.len();
            self.code.patch_jump(skip, end);
            return Some(dst);
        }

        let left = self.expr(lhs)?;
        let right = self.expr(rhs)?;
        let dst = self.scratch();
        let operands = self.scalar_of(lhs.id);
        self.code.push(
            Opcode::Binary {
                op,
                operands,
                dst,
                lhs: left,
                rhs: right,
            },
            line,
        );
        Some(dst)
    }

    /// Store into whatever the left side resolved to. The produced value of
    /// the whole assignment is the stored slot.
    fn compile_assignment(&mut self, lhs: &Expr, rhs: &Expr, line: u32) -> Option<u32> {
        match self.tables.refs.get(&lhs.id) {
            Some(Resolved::Local { slot }) => {
                let dst = *slot;
                let src = self.expr(rhs)?;
                self.code.push(Opcode::Copy { dst, src }, line);
                Some(dst)
            }
            Some(Resolved::Field {
                offset, is_static, ..
            }) => {
                let (offset, is_static) = (*offset, *is_static);
                if is_static {
                    let src = self.expr(rhs)?;
                    self.code.push(
                        Opcode::SetStatic {
                            index: offset,
                            src,
                        },
                        line,
                    );
                    Some(src)
                } else {
                    let obj = match &lhs.kind {
                        ExprKind::MemberAccess { base, .. } => self.base_slot(base),
                        _ => None,
                    }
                    .or(self.this_offset)?;
                    let src = self.expr(rhs)?;
                    self.code.push(Opcode::SetField { obj, offset, src }, line);
                    Some(src)
                }
            }
            Some(Resolved::Property { set, is_static, .. }) => {
                let set = (*set)?;
                let is_static = *is_static;
                let this = if is_static {
                    None
                } else {
                    match &lhs.kind {
                        ExprKind::MemberAccess { base, .. } => self.base_slot(base),
                        _ => None,
                    }
                    .or(self.this_offset)
                };
                let src = self.expr(rhs)?;
                self.emit_call(set, this, vec![src], false, line);
                Some(src)
            }
            _ => {
                // The analyzer reported this target; nothing to emit.
                self.expr(rhs)
            }
        }
    }

    fn compile_new(&mut self, expr: &Expr, args: &[Expr], line: u32) -> Option<u32> {
        let (ty, constructor) = match self.tables.refs.get(&expr.id) {
            Some(Resolved::Constructor { ty, function }) => (*ty, *function),
            _ => return None,
        };
        let dst = self.scratch();
        self.code.push(Opcode::NewObject { dst, ty }, line);

        // Ancestors initialize base first, each through its default
        // constructor, before the selected constructor runs.
        let mut chain = Vec::new();
        let mut current = self.ctx.ty(ty).base;
        while let Some(id) = current {
            chain.push(id);
            current = self.ctx.ty(id).base;
        }
        for &ancestor in chain.iter().rev() {
            if let Some(default) = self.default_constructor(ancestor) {
                self.emit_call(default, Some(dst), Vec::new(), false, line);
            }
        }

        if let Some(constructor) = constructor {
            let mut arg_slots = Vec::with_capacity(args.len());
            for arg in args {
                arg_slots.push(self.expr(arg)?);
            }
            self.emit_call(constructor, Some(dst), arg_slots, false, line);
        }
        Some(dst)
    }

    fn default_constructor(&self, ty: TypeId) -> Option<FunctionId> {
        self.ctx
            .ty(ty)
            .constructors
            .iter()
            .copied()
            .find(|&c| {
                let delegate = self.ctx.function(c).delegate;
                self.ctx.delegate(delegate).params.is_empty()
            })
    }

    fn emit_call(
        &mut self,
        function: FunctionId,
        this: Option<u32>,
        args: Vec<u32>,
        virtual_call: bool,
        line: u32,
    ) -> Option<u32> {
        let delegate = self.ctx.function(function).delegate;
        let returns = !self.ctx.delegate(delegate).return_type.is_void();
        let dst = returns.then(|| self.scratch());
        self.code.push(
            Opcode::Call {
                function,
                dst,
                this,
                args,
                virtual_call,
            },
            line,
        );
        dst
    }

    /// The runtime representation a binary or unary opcode manipulates,
    /// read off the operand's analyzed type.
    fn scalar_of(&self, id: NodeId) -> Scalar {
        let core = self.ctx.core_types();
        match self.tables.result_type.get(&id) {
            Some(Type::Bound(ty)) => {
                if *ty == core.integer {
                    Scalar::Integer
                } else if *ty == core.real {
                    Scalar::Real
                } else if *ty == core.boolean {
                    Scalar::Boolean
                } else if *ty == core.string {
                    Scalar::String
                } else if self.ctx.ty(*ty).is_enum() {
                    Scalar::Integer
                } else {
                    Scalar::Handle
                }
            }
            _ => Scalar::Handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::Context;
    use crate::errors::Diagnostics;
    use crate::frontend::Project;

    fn compile(source: &str) -> (Context, crate::binding::LibraryRef) {
        let mut ctx = Context::new();
        let mut project = Project::new();
        project.add_code_from_string(source, "Test");
        let mut diagnostics = Diagnostics::new();
        let library = project
            .compile(&mut ctx, "test", &[], &mut diagnostics)
            .expect("compilation should succeed");
        assert!(diagnostics.take_errors().is_empty());
        (ctx, library)
    }

    fn function_code<'c>(ctx: &'c Context, type_name: &str, name: &str) -> &'c CompiledCode {
        let ty = ctx.find_type(type_name).unwrap();
        let id = ctx.ty(ty).find_functions(name, false).unwrap()[0];
        ctx.function(id).code.as_ref().unwrap()
    }

    #[test]
    fn bodies_end_with_return() {
        let (ctx, _) = compile("class A { function F() { } }");
        let code = function_code(&ctx, "A", "F");
        assert!(matches!(code.opcodes.last(), Some(Opcode::Return)));
    }

    #[test]
    fn compiled_code_carries_entry_hash() {
        let (ctx, library) = compile("class A { function F() { } }");
        let code = function_code(&ctx, "A", "F");
        assert_eq!(code.entry_hash, library.entries[0].code_hash);
    }

    #[test]
    fn line_table_parallels_opcodes() {
        let (ctx, _) = compile(
            "class A {\n    function F() : Integer {\n        return 1 + 2;\n    }\n}",
        );
        let code = function_code(&ctx, "A", "F");
        assert_eq!(code.opcodes.len(), code.lines.len());
        assert!(code.lines.iter().any(|&l| l == 3));
    }

    #[test]
    fn static_field_reads_use_static_opcodes() {
        let (ctx, _) = compile(
            "class A {\n    [Static] var Count : Integer = 0;\n    function F() : Integer { return A.Count; }\n}",
        );
        let code = function_code(&ctx, "A", "F");
        assert!(code
            .opcodes
            .iter()
            .any(|op| matches!(op, Opcode::GetStatic { .. })));
    }

    #[test]
    fn new_runs_base_default_constructor_first() {
        let (ctx, _) = compile(
            "class Base { var X : Integer = 1; }\nclass Derived : Base { var Y : Integer = 2; }\nclass Maker { function Make() : Derived { return new Derived(); } }",
        );
        let code = function_code(&ctx, "Maker", "Make");
        let calls: Vec<FunctionId> = code
            .opcodes
            .iter()
            .filter_map(|op| match op {
                Opcode::Call { function, .. } => Some(*function),
                _ => None,
            })
            .collect();
        assert_eq!(calls.len(), 2);
        let base = ctx.find_type("Base").unwrap();
        let derived = ctx.find_type("Derived").unwrap();
        assert_eq!(ctx.function(calls[0]).owner, Some(base));
        assert_eq!(ctx.function(calls[1]).owner, Some(derived));
    }

    #[test]
    fn conversions_are_fixed_at_compile_time() {
        let (ctx, _) = compile(
            "class A { function F() : Real { return 1; } }",
        );
        let code = function_code(&ctx, "A", "F");
        assert!(code.opcodes.iter().any(|op| matches!(
            op,
            Opcode::Cast {
                kind: CastKind::IntegerToReal,
                ..
            }
        )));
    }
}
