// src/sema/typing.rs
//! The typing pass. Lowers compound assignments, increments, and indexers
//! into temp-mediated sequences, then walks every statement assigning a
//! result type, io capability, and resolution to each expression. Implicit
//! conversions become explicit `TypeCast` nodes here so the code generator
//! never derives a conversion on its own.

use crate::binding::{
    instantiate_template, Context, CopyMode, FunctionId, LibraryRef, TemplateError, Type, TypeId,
};
use crate::codegen::CastKind;
use crate::errors::{Diagnostics, SemanticError};
use crate::frontend::ast::*;
use crate::frontend::CodeLocation;
use crate::sema::overloads::{implicit_conversion, resolve_overload, Conversion, OverloadOutcome};
use crate::sema::rewrite;
use crate::sema::scope::{LocalVar, ScopeStack};
use crate::sema::{Io, Resolved, Tables};
use rustc_hash::FxHashMap;

/// Type-check one function body in place.
#[allow(clippy::too_many_arguments)]
pub(crate) fn check_body(
    ctx: &mut Context,
    tables: &mut Tables,
    diagnostics: &mut Diagnostics,
    ids: &mut NodeIdGen,
    dependencies: &[LibraryRef],
    owner: TypeId,
    function: FunctionId,
    statements: &mut Vec<Statement>,
) {
    let func = ctx.function(function);
    let delegate = ctx.delegate(func.delegate).clone();
    let is_static = func.flags.is_static;
    let this_offset = func.this_offset;
    let param_offsets = func.param_offsets.clone();
    let frame_base = func.required_stack;
    let location = func.location.clone();

    let mut checker = BodyChecker {
        ctx: &mut *ctx,
        tables,
        diagnostics,
        ids,
        dependencies,
        owner,
        is_static,
        this_offset,
        return_type: delegate.return_type.clone(),
        scopes: ScopeStack::new(),
        next_slot: frame_base,
        high_water: frame_base,
        loop_depth: 0,
        temp_types: FxHashMap::default(),
    };

    checker.scopes.push();
    for (param, &slot) in delegate.params.iter().zip(&param_offsets) {
        checker.scopes.declare(
            param.name.clone(),
            LocalVar {
                slot,
                ty: param.ty.clone(),
            },
        );
    }

    for statement in statements.iter_mut() {
        checker.lower_statement(statement);
    }
    let exhaustive = checker.check_statements(statements);
    checker.scopes.pop();

    if !checker.return_type.is_void() && !exhaustive {
        checker.diagnostics.sema_error(
            SemanticError::MissingReturn {
                span: location.span(),
            },
            location,
        );
    }

    let high_water = checker.high_water;
    ctx.function_mut(function).required_stack = high_water;
}

struct BodyChecker<'a> {
    ctx: &'a mut Context,
    tables: &'a mut Tables,
    diagnostics: &'a mut Diagnostics,
    ids: &'a mut NodeIdGen,
    dependencies: &'a [LibraryRef],
    owner: TypeId,
    is_static: bool,
    this_offset: Option<u32>,
    return_type: Type,
    scopes: ScopeStack,
    next_slot: u32,
    high_water: u32,
    loop_depth: u32,
    temp_types: FxHashMap<TempId, Type>,
}

/// What a member lookup found, owned so borrows do not pin the context.
enum FoundMember {
    Field {
        owner: TypeId,
        offset: u32,
        ty: Type,
        is_static: bool,
    },
    Property {
        get: Option<FunctionId>,
        set: Option<FunctionId>,
        ty: Type,
        is_static: bool,
    },
    Functions(Vec<FunctionId>),
    EnumValue(i64, TypeId),
}

impl<'a> BodyChecker<'a> {
    // ----- lowering -----

    fn lower_statement(&mut self, statement: &mut Statement) {
        match statement {
            Statement::Expression(expr) => self.lower_expr(expr),
            Statement::Var(var) => self.lower_expr(&mut var.initializer),
            Statement::If(parts) => {
                for part in parts {
                    if let Some(condition) = &mut part.condition {
                        self.lower_expr(condition);
                    }
                    for inner in &mut part.body {
                        self.lower_statement(inner);
                    }
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                self.lower_expr(condition);
                for inner in body {
                    self.lower_statement(inner);
                }
            }
            Statement::For {
                init,
                condition,
                increment,
                body,
                ..
            } => {
                if let Some(init) = init {
                    self.lower_statement(init);
                }
                if let Some(condition) = condition {
                    self.lower_expr(condition);
                }
                if let Some(increment) = increment {
                    self.lower_expr(increment);
                }
                for inner in body {
                    self.lower_statement(inner);
                }
            }
            Statement::Loop { body, .. } | Statement::Scope { body, .. } => {
                for inner in body {
                    self.lower_statement(inner);
                }
            }
            Statement::Return { value, .. } => {
                if let Some(value) = value {
                    self.lower_expr(value);
                }
            }
            Statement::Throw { value, .. } | Statement::Delete { value, .. } => {
                self.lower_expr(value)
            }
            Statement::Break(_) | Statement::Continue(_) => {}
        }
    }

    fn lower_expr(&mut self, expr: &mut Expr) {
        // Children first, so nested compound forms are already flat when
        // the parent is rewritten.
        match &mut expr.kind {
            ExprKind::StringInterpolant(pieces) | ExprKind::Multi(pieces) => {
                for piece in pieces {
                    self.lower_expr(piece);
                }
            }
            ExprKind::MemberAccess { base, .. } => self.lower_expr(base),
            ExprKind::FunctionCall { callee, args } => {
                self.lower_expr(callee);
                for arg in args {
                    self.lower_expr(arg);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.lower_expr(lhs);
                self.lower_expr(rhs);
            }
            ExprKind::Unary { operand, .. } => self.lower_expr(operand),
            ExprKind::Indexer { base, indices } => {
                self.lower_expr(base);
                for index in indices {
                    self.lower_expr(index);
                }
            }
            ExprKind::TypeCast { operand, .. } => self.lower_expr(operand),
            ExprKind::New { args, .. } => {
                for arg in args {
                    self.lower_expr(arg);
                }
            }
            ExprKind::Initializer { base, values } => {
                self.lower_expr(base);
                for value in values {
                    self.lower_expr(value);
                }
            }
            ExprKind::LetTemp { value, .. } => self.lower_expr(value),
            ExprKind::Literal(_)
            | ExprKind::Identifier(_)
            | ExprKind::This
            | ExprKind::StaticType(_)
            | ExprKind::TempRef(_)
            | ExprKind::Error => {}
        }

        // `x++` and `x--` become compound assignments, then fall through
        // to the compound lowering below.
        if let ExprKind::Unary {
            op: op @ (UnaryOp::Increment | UnaryOp::Decrement),
            operand,
        } = &mut expr.kind
        {
            let binary_op = if *op == UnaryOp::Increment {
                BinaryOp::AddAssign
            } else {
                BinaryOp::SubtractAssign
            };
            let location = expr.location.clone();
            let one = Expr::new(
                self.ids.fresh(),
                location,
                ExprKind::Literal(LiteralValue::Integer(1)),
            );
            let target = std::mem::replace(
                operand,
                Box::new(Expr::new(
                    NodeId(u32::MAX),
                    CodeLocation::default(),
                    ExprKind::Error,
                )),
            );
            expr.kind = ExprKind::Binary {
                op: binary_op,
                lhs: target,
                rhs: Box::new(one),
            };
        }

        let compound = match &expr.kind {
            ExprKind::Binary { op, .. } => op.compound_base(),
            _ => None,
        };
        if let Some(base_op) = compound {
            self.lower_compound_assignment(expr, base_op);
            return;
        }

        // `a[i] = v` becomes `a.Set(i, v)`.
        let is_index_assign = matches!(
            &expr.kind,
            ExprKind::Binary { op: BinaryOp::Assign, lhs, .. }
                if matches!(lhs.kind, ExprKind::Indexer { .. })
        );
        if is_index_assign {
            let location = expr.location.clone();
            if let ExprKind::Binary { lhs, rhs, .. } = std::mem::replace(
                &mut expr.kind,
                ExprKind::Error,
            ) {
                if let ExprKind::Indexer { base, mut indices } = lhs.kind {
                    let mut args: Vec<Expr> = Vec::with_capacity(indices.len() + 1);
                    args.append(&mut indices);
                    args.push(*rhs);
                    expr.kind = ExprKind::FunctionCall {
                        callee: Box::new(self.member_callee(*base, "Set", &location)),
                        args,
                    };
                }
            }
        }
    }

    /// Expand `target op= source`. Sources and indices with side effects
    /// are stashed in temps so each is evaluated exactly once; `Get` always
    /// runs before `Set` on the same source object.
    fn lower_compound_assignment(&mut self, expr: &mut Expr, base_op: BinaryOp) {
        let location = expr.location.clone();
        let (target, source) = match std::mem::replace(&mut expr.kind, ExprKind::Error) {
            ExprKind::Binary { lhs, rhs, .. } => (*lhs, *rhs),
            _ => return,
        };

        match target.kind {
            // Re-reading a plain name is free of side effects, so no temps.
            ExprKind::Identifier(_) | ExprKind::This | ExprKind::TempRef(_) => {
                let mut read = target.clone();
                rewrite::renumber_expr(&mut read, self.ids);
                let operation = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::Binary {
                        op: base_op,
                        lhs: Box::new(read),
                        rhs: Box::new(source),
                    },
                );
                expr.kind = ExprKind::Binary {
                    op: BinaryOp::Assign,
                    lhs: Box::new(target),
                    rhs: Box::new(operation),
                };
            }
            ExprKind::MemberAccess {
                base,
                name,
                name_location,
            } => {
                let (source_let, source_ref) = self.let_temp(source, &location);
                // A name, `this`, or static-type base re-reads with no side
                // effects. A static type must stay in place: a temp of it
                // has no value and the member write would not resolve.
                let reuses_base = matches!(
                    base.kind,
                    ExprKind::Identifier(_)
                        | ExprKind::This
                        | ExprKind::TempRef(_)
                        | ExprKind::StaticType(_)
                );
                let (base_let, read_base, write_base) = if reuses_base {
                    let mut read = (*base).clone();
                    rewrite::renumber_expr(&mut read, self.ids);
                    (None, read, *base)
                } else {
                    let (base_let, base_ref) = self.let_temp(*base, &location);
                    (Some(base_let), base_ref.clone(), base_ref)
                };
                let read = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::MemberAccess {
                        base: Box::new(read_base),
                        name: name.clone(),
                        name_location: name_location.clone(),
                    },
                );
                let operation = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::Binary {
                        op: base_op,
                        lhs: Box::new(read),
                        rhs: Box::new(source_ref),
                    },
                );
                let write_target = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::MemberAccess {
                        base: Box::new(write_base),
                        name,
                        name_location,
                    },
                );
                let assign = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::Binary {
                        op: BinaryOp::Assign,
                        lhs: Box::new(write_target),
                        rhs: Box::new(operation),
                    },
                );
                let mut parts = vec![source_let];
                parts.extend(base_let);
                parts.push(assign);
                expr.kind = ExprKind::Multi(parts);
            }
            ExprKind::Indexer { base, indices } => {
                let (source_let, source_ref) = self.let_temp(source, &location);
                let (base_let, base_ref) = self.let_temp(*base, &location);
                let mut lets = vec![source_let, base_let];
                let mut index_refs = Vec::with_capacity(indices.len());
                for index in indices {
                    let (index_let, index_ref) = self.let_temp(index, &location);
                    lets.push(index_let);
                    index_refs.push(index_ref);
                }

                let mut get_args = index_refs.clone();
                let get_call = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::FunctionCall {
                        callee: Box::new(self.member_callee(
                            base_ref.clone(),
                            "Get",
                            &location,
                        )),
                        args: std::mem::take(&mut get_args),
                    },
                );
                let operation = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::Binary {
                        op: base_op,
                        lhs: Box::new(get_call),
                        rhs: Box::new(source_ref),
                    },
                );
                let mut set_args = index_refs;
                set_args.push(operation);
                let set_call = Expr::new(
                    self.ids.fresh(),
                    location.clone(),
                    ExprKind::FunctionCall {
                        callee: Box::new(self.member_callee(base_ref, "Set", &location)),
                        args: set_args,
                    },
                );
                lets.push(set_call);
                expr.kind = ExprKind::Multi(lets);
            }
            // Anything else is an invalid target; typing reports it.
            other => {
                let lhs = Expr::new(self.ids.fresh(), location.clone(), other);
                expr.kind = ExprKind::Binary {
                    op: BinaryOp::Assign,
                    lhs: Box::new(lhs),
                    rhs: Box::new(source),
                };
            }
        }
    }

    fn let_temp(&mut self, value: Expr, location: &CodeLocation) -> (Expr, Expr) {
        let temp = self.ids.fresh_temp();
        let let_expr = Expr::new(
            self.ids.fresh(),
            location.clone(),
            ExprKind::LetTemp {
                temp,
                value: Box::new(value),
            },
        );
        let ref_expr = Expr::new(self.ids.fresh(), location.clone(), ExprKind::TempRef(temp));
        (let_expr, ref_expr)
    }

    fn member_callee(&mut self, base: Expr, name: &str, location: &CodeLocation) -> Expr {
        Expr::new(
            self.ids.fresh(),
            location.clone(),
            ExprKind::MemberAccess {
                base: Box::new(base),
                name: name.to_string(),
                name_location: location.clone(),
            },
        )
    }

    // ----- statements -----

    /// Check a statement list, reporting anything after an exhaustive
    /// point. Returns whether the list proves exhaustive.
    fn check_statements(&mut self, statements: &mut [Statement]) -> bool {
        let mut exhaustive = false;
        for statement in statements.iter_mut() {
            if exhaustive {
                let location = statement.location().clone();
                self.error(
                    SemanticError::UnreachableCode {
                        span: location.span(),
                    },
                    &location,
                );
                break;
            }
            exhaustive = self.check_statement(statement);
        }
        exhaustive
    }

    fn check_block(&mut self, statements: &mut [Statement]) -> bool {
        self.scopes.push();
        let exhaustive = self.check_statements(statements);
        self.scopes.pop();
        exhaustive
    }

    fn check_statement(&mut self, statement: &mut Statement) -> bool {
        match statement {
            Statement::Expression(expr) => {
                self.type_expr(expr, Io::default());
                false
            }
            Statement::Var(var) => {
                self.check_var(var);
                false
            }
            Statement::If(parts) => {
                let mut all_exhaustive = true;
                let mut has_else = false;
                for part in parts.iter_mut() {
                    match &mut part.condition {
                        Some(condition) => self.check_condition(condition),
                        None => has_else = true,
                    }
                    let exhaustive = self.check_block(&mut part.body);
                    all_exhaustive &= exhaustive;
                }
                all_exhaustive && has_else
            }
            Statement::While {
                condition, body, ..
            } => {
                self.check_condition(condition);
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                false
            }
            Statement::For {
                init,
                condition,
                increment,
                body,
                ..
            } => {
                self.scopes.push();
                if let Some(init) = init {
                    self.check_statement(init);
                }
                if let Some(condition) = condition {
                    self.check_condition(condition);
                }
                if let Some(increment) = increment {
                    self.type_expr(increment, Io::default());
                }
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                self.scopes.pop();
                false
            }
            Statement::Loop { body, .. } => {
                self.loop_depth += 1;
                self.check_block(body);
                self.loop_depth -= 1;
                // A loop with no way out never falls through.
                !rewrite::contains_break(body)
            }
            Statement::Scope { body, .. } => self.check_block(body),
            Statement::Break(location) => {
                if self.loop_depth == 0 {
                    let location = location.clone();
                    self.error(
                        SemanticError::NotInLoop {
                            kind: "break".into(),
                            span: location.span(),
                        },
                        &location,
                    );
                }
                false
            }
            Statement::Continue(location) => {
                if self.loop_depth == 0 {
                    let location = location.clone();
                    self.error(
                        SemanticError::NotInLoop {
                            kind: "continue".into(),
                            span: location.span(),
                        },
                        &location,
                    );
                }
                false
            }
            Statement::Return { value, location } => {
                let location = location.clone();
                match (value, self.return_type.is_void()) {
                    (Some(value), false) => {
                        self.type_expr(value, Io::READ);
                        let expected = self.return_type.clone();
                        self.convert(value, &expected);
                    }
                    (Some(value), true) => {
                        let found = self.type_expr(value, Io::READ);
                        let found = self.ctx.type_to_string(&found);
                        self.error(
                            SemanticError::TypeMismatch {
                                expected: "Void".into(),
                                found,
                                span: location.span(),
                            },
                            &location,
                        );
                    }
                    (None, false) => {
                        let expected = self.ctx.type_to_string(&self.return_type);
                        self.error(
                            SemanticError::TypeMismatch {
                                expected,
                                found: "Void".into(),
                                span: location.span(),
                            },
                            &location,
                        );
                    }
                    (None, true) => {}
                }
                true
            }
            Statement::Throw { value, location } => {
                let location = location.clone();
                let ty = self.type_expr(value, Io::READ);
                let exception = self.ctx.core_types().exception;
                let ok = matches!(ty, Type::Bound(id) if self.ctx.is_subtype(id, exception));
                if !ok {
                    let found = self.ctx.type_to_string(&ty);
                    self.error(
                        SemanticError::ThrowNotException {
                            found,
                            span: location.span(),
                        },
                        &location,
                    );
                }
                true
            }
            Statement::Delete { value, location } => {
                let location = location.clone();
                let ty = self.type_expr(value, Io::READ);
                let ok = matches!(ty, Type::Bound(id)
                    if self.ctx.ty(id).copy_mode == CopyMode::ReferenceType);
                if !ok && ty != Type::Any {
                    let name = self.ctx.type_to_string(&ty);
                    self.error(
                        SemanticError::CannotDelete {
                            name,
                            span: location.span(),
                        },
                        &location,
                    );
                }
                false
            }
        }
    }

    fn check_var(&mut self, var: &mut LocalVariableNode) {
        let initializer_ty = self.type_expr(&mut var.initializer, Io::READ);
        let declared = var.ty.as_ref().and_then(|ty| self.resolve_type(&ty.clone()));
        let ty = match declared {
            Some(declared) => {
                self.convert(&mut var.initializer, &declared);
                declared
            }
            None => initializer_ty,
        };
        if self.scopes.declared_in_current(&var.name) {
            let location = var.location.clone();
            self.error(
                SemanticError::DuplicateLocal {
                    name: var.name.clone(),
                    span: location.span(),
                },
                &location,
            );
            return;
        }
        let slot = self.alloc_slot();
        self.tables.var_slots.insert(var.initializer.id, slot);
        self.scopes.declare(var.name.clone(), LocalVar { slot, ty });
    }

    fn check_condition(&mut self, condition: &mut Expr) {
        let ty = self.type_expr(condition, Io::READ);
        let boolean = Type::Bound(self.ctx.core_types().boolean);
        if ty != boolean && ty != Type::Any {
            let location = condition.location.clone();
            let found = self.ctx.type_to_string(&ty);
            self.error(
                SemanticError::ConditionNotBoolean {
                    found,
                    span: location.span(),
                },
                &location,
            );
        }
    }

    // ----- expressions -----

    /// Type one expression, record its side-table entries, and return its
    /// result type. `Any` doubles as the poisoned type after an error so
    /// cascading diagnostics stay quiet.
    fn type_expr(&mut self, expr: &mut Expr, usage: Io) -> Type {
        let id = expr.id;
        let location = expr.location.clone();
        self.tables.io_usage.insert(id, usage);
        self.tables.locations.insert(id, location.clone());

        let (ty, io) = self.type_expr_inner(expr, &location);

        self.tables.result_type.insert(id, ty.clone());
        self.tables.io.insert(id, io);
        ty
    }

    fn type_expr_inner(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        let core = self.ctx.core_types();
        match &mut expr.kind {
            ExprKind::Literal(value) => {
                let ty = match value {
                    LiteralValue::Integer(_) => Type::Bound(core.integer),
                    LiteralValue::Real(_) => Type::Bound(core.real),
                    LiteralValue::Boolean(_) => Type::Bound(core.boolean),
                    LiteralValue::String(_) => Type::Bound(core.string),
                    LiteralValue::Null => Type::Any,
                };
                (ty, Io::READ)
            }
            ExprKind::StringInterpolant(pieces) => {
                for piece in pieces {
                    let ty = self.type_expr(piece, Io::READ);
                    if ty.is_void() {
                        self.void_as_value(&piece.location.clone());
                    }
                }
                (Type::Bound(core.string), Io::READ)
            }
            ExprKind::Identifier(name) => {
                let name = name.clone();
                self.type_identifier(expr, &name, location)
            }
            ExprKind::This => match self.this_offset {
                Some(_) => {
                    self.tables.refs.insert(expr.id, Resolved::This);
                    (Type::Bound(self.owner), Io::READ)
                }
                None => {
                    self.error(
                        SemanticError::UndefinedIdentifier {
                            name: "this".into(),
                            span: location.span(),
                        },
                        location,
                    );
                    (Type::Any, Io::READ_WRITE)
                }
            },
            ExprKind::StaticType(node) => {
                let node = node.clone();
                match self.resolve_type(&node) {
                    Some(Type::Bound(id)) => {
                        self.tables.refs.insert(expr.id, Resolved::Type(id));
                        (Type::Void, Io::READ)
                    }
                    _ => (Type::Any, Io::READ_WRITE),
                }
            }
            ExprKind::MemberAccess { .. } => self.type_member_access(expr, location),
            ExprKind::FunctionCall { .. } => self.type_call(expr, location),
            ExprKind::Binary { op, .. } => {
                let op = *op;
                self.type_binary(expr, op, location)
            }
            ExprKind::Unary { op, operand } => {
                let op = *op;
                let ty = self.type_expr(operand, Io::READ);
                let ok = match op {
                    UnaryOp::Negate => {
                        ty == Type::Bound(core.integer) || ty == Type::Bound(core.real)
                    }
                    UnaryOp::Not => ty == Type::Bound(core.boolean),
                    // Lowered away before typing.
                    UnaryOp::Increment | UnaryOp::Decrement => false,
                };
                if !ok && ty != Type::Any {
                    let operand_name = self.ctx.type_to_string(&ty);
                    self.error(
                        SemanticError::InvalidUnaryOperand {
                            op: op.as_str().into(),
                            operand: operand_name,
                            span: location.span(),
                        },
                        location,
                    );
                    return (Type::Any, Io::READ);
                }
                (ty, Io::READ)
            }
            ExprKind::Indexer { .. } => self.type_indexer(expr, location),
            ExprKind::TypeCast { operand, target } => {
                let target = target.clone();
                let from = self.type_expr(operand, Io::READ);
                let to = match self.resolve_type(&target) {
                    Some(to) => to,
                    None => return (Type::Any, Io::READ),
                };
                match crate::sema::overloads::explicit_conversion(self.ctx, &from, &to) {
                    Some(kind) => {
                        self.tables.casts.insert(expr.id, kind);
                        (to, Io::READ)
                    }
                    None => {
                        let from_name = self.ctx.type_to_string(&from);
                        let to_name = self.ctx.type_to_string(&to);
                        self.error(
                            SemanticError::InvalidCast {
                                from: from_name,
                                to: to_name,
                                span: location.span(),
                            },
                            location,
                        );
                        (Type::Any, Io::READ)
                    }
                }
            }
            ExprKind::New { .. } => self.type_new(expr, location),
            ExprKind::Initializer { .. } => self.type_initializer(expr, location),
            ExprKind::Multi(pieces) => {
                let mut ty = Type::Void;
                let count = pieces.len();
                for (index, piece) in pieces.iter_mut().enumerate() {
                    let usage = if index + 1 == count {
                        Io::READ
                    } else {
                        Io::default()
                    };
                    ty = self.type_expr(piece, usage);
                }
                (ty, Io::READ)
            }
            ExprKind::LetTemp { temp, value } => {
                let temp = *temp;
                let ty = self.type_expr(value, Io::READ);
                let slot = self.alloc_slot();
                self.tables.temp_slots.insert(temp, slot);
                self.temp_types.insert(temp, ty.clone());
                (ty, Io::READ)
            }
            ExprKind::TempRef(temp) => {
                let ty = self.temp_types.get(temp).cloned().unwrap_or(Type::Any);
                (ty, Io::READ)
            }
            ExprKind::Error => (Type::Any, Io::READ_WRITE),
        }
    }

    /// Resolution order for a bare name: enclosing lexical scopes, then
    /// members of the enclosing class (implicit `this`), then static
    /// members, then type names.
    fn type_identifier(
        &mut self,
        expr: &mut Expr,
        name: &str,
        location: &CodeLocation,
    ) -> (Type, Io) {
        if let Some(local) = self.scopes.resolve(name) {
            let resolved = Resolved::Local { slot: local.slot };
            let ty = local.ty.clone();
            self.tables.refs.insert(expr.id, resolved);
            return (ty, Io::READ_WRITE);
        }

        if !self.is_static && self.this_offset.is_some() {
            if let Some(found) = self.find_member(self.owner, name, false) {
                return self.record_member(expr.id, found, location);
            }
        }
        if let Some(found) = self.find_member(self.owner, name, true) {
            return self.record_member(expr.id, found, location);
        }

        if self.ctx.find_type(name).is_some() || self.ctx.type_exists(name) {
            let node = SyntaxTypeNode::simple(name, location.clone());
            expr.kind = ExprKind::StaticType(node.clone());
            return match self.resolve_type(&node) {
                Some(Type::Bound(id)) => {
                    self.tables.refs.insert(expr.id, Resolved::Type(id));
                    (Type::Void, Io::READ)
                }
                _ => (Type::Any, Io::READ_WRITE),
            };
        }

        self.error(
            SemanticError::UndefinedIdentifier {
                name: name.to_string(),
                span: location.span(),
            },
            location,
        );
        (Type::Any, Io::READ_WRITE)
    }

    fn type_member_access(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        let (base_id, name) = match &mut expr.kind {
            ExprKind::MemberAccess { base, name, .. } => {
                let name = name.clone();
                self.type_expr(base, Io::READ);
                (base.id, name)
            }
            _ => unreachable!(),
        };

        let (target, is_static) = match self.member_target(base_id) {
            Some(target) => target,
            None => return (Type::Any, Io::READ_WRITE),
        };

        match self.find_member(target, &name, is_static) {
            Some(found) => self.record_member(expr.id, found, location),
            None => {
                let type_name = self.ctx.ty(target).name.clone();
                self.error(
                    SemanticError::UnknownMember {
                        name,
                        type_name,
                        span: location.span(),
                    },
                    location,
                );
                (Type::Any, Io::READ_WRITE)
            }
        }
    }

    /// The type a member access searches, and whether it is the static
    /// namespace (base resolved to a type name) or the instance one.
    fn member_target(&mut self, base_id: NodeId) -> Option<(TypeId, bool)> {
        if let Some(Resolved::Type(ty)) = self.tables.refs.get(&base_id) {
            return Some((*ty, true));
        }
        match self.tables.result_type.get(&base_id) {
            Some(Type::Bound(id)) | Some(Type::Indirect(id)) => Some((*id, false)),
            _ => None,
        }
    }

    /// Field, then property, then functions, walking the base chain; at
    /// each level the dependency libraries' extension tables are scanned
    /// too. Enum values take priority in the static namespace.
    fn find_member(&self, start: TypeId, name: &str, is_static: bool) -> Option<FoundMember> {
        if is_static {
            if let Some(value) = self
                .ctx
                .ty(start)
                .enum_values
                .iter()
                .find(|v| v.name == name)
            {
                return Some(FoundMember::EnumValue(value.value, start));
            }
        }
        let mut current = Some(start);
        while let Some(id) = current {
            let bound = self.ctx.ty(id);
            if is_static {
                if let Some(field) = bound.find_static_field(name) {
                    return Some(FoundMember::Field {
                        owner: id,
                        offset: field.offset,
                        ty: field.ty.clone(),
                        is_static: true,
                    });
                }
            } else if let Some(field) = bound.find_field(name) {
                return Some(FoundMember::Field {
                    owner: id,
                    offset: field.offset,
                    ty: field.ty.clone(),
                    is_static: false,
                });
            }
            if let Some(property) = bound.find_property(name, is_static) {
                return Some(FoundMember::Property {
                    get: property.get,
                    set: property.set,
                    ty: property.ty.clone(),
                    is_static,
                });
            }
            if let Some(functions) = bound.find_functions(name, is_static) {
                return Some(FoundMember::Functions(functions.to_vec()));
            }
            for library in self.dependencies {
                if let Some(functions) = library.find_extension_functions(id, name) {
                    return Some(FoundMember::Functions(functions.to_vec()));
                }
            }
            current = bound.base;
        }
        None
    }

    fn record_member(
        &mut self,
        id: NodeId,
        found: FoundMember,
        location: &CodeLocation,
    ) -> (Type, Io) {
        match found {
            FoundMember::Field {
                owner,
                offset,
                ty,
                is_static,
            } => {
                self.tables.refs.insert(
                    id,
                    Resolved::Field {
                        owner,
                        offset,
                        is_static,
                    },
                );
                (ty, Io::READ_WRITE)
            }
            FoundMember::Property {
                get,
                set,
                ty,
                is_static,
            } => {
                let io = Io {
                    read: get.is_some(),
                    write: set.is_some(),
                };
                self.tables
                    .refs
                    .insert(id, Resolved::Property { get, set, is_static });
                (ty, io)
            }
            FoundMember::Functions(functions) => {
                // As a value, only an unambiguous function can become a
                // delegate.
                if functions.len() == 1 {
                    let function = functions[0];
                    let flags = self.ctx.function(function).flags;
                    self.tables.refs.insert(
                        id,
                        Resolved::Function {
                            id: function,
                            is_virtual: flags.is_virtual || flags.is_override,
                        },
                    );
                    let delegate = self.ctx.function(function).delegate;
                    (Type::Delegate(delegate), Io::READ)
                } else {
                    let name = self.ctx.function(functions[0]).name.clone();
                    self.error(
                        SemanticError::AmbiguousOverload {
                            name,
                            span: location.span(),
                        },
                        location,
                    );
                    (Type::Any, Io::READ)
                }
            }
            FoundMember::EnumValue(value, owner) => {
                self.tables.refs.insert(id, Resolved::EnumValue(value));
                (Type::Bound(owner), Io::READ)
            }
        }
    }

    fn type_call(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        // Arguments first; their types drive overload selection.
        let (mut arg_types, mut args_null) = (Vec::new(), Vec::new());
        if let ExprKind::FunctionCall { args, .. } = &mut expr.kind {
            for arg in args.iter_mut() {
                let ty = self.type_expr(arg, Io::READ);
                if ty.is_void() {
                    self.void_as_value(&arg.location.clone());
                }
                args_null.push(matches!(arg.kind, ExprKind::Literal(LiteralValue::Null)));
                arg_types.push(ty);
            }
        }

        // Member and bare-name calls resolve overloads directly; anything
        // else must evaluate to a delegate.
        enum CalleeKind {
            Member { target: TypeId, is_static: bool, name: String, callee_id: NodeId },
            ImplicitSelf { name: String, callee_id: NodeId },
            Value { callee_id: NodeId },
        }

        let callee_kind = match &mut expr.kind {
            ExprKind::FunctionCall { callee, .. } => match &mut callee.kind {
                ExprKind::MemberAccess { base, name, .. } => {
                    let name = name.clone();
                    self.type_expr(base, Io::READ);
                    match self.member_target(base.id) {
                        Some((target, is_static)) => CalleeKind::Member {
                            target,
                            is_static,
                            name,
                            callee_id: callee.id,
                        },
                        None => {
                            let ty = self
                                .tables
                                .result_type
                                .get(&base.id)
                                .cloned()
                                .unwrap_or(Type::Any);
                            if ty != Type::Any {
                                let ty_name = self.ctx.type_to_string(&ty);
                                self.error(
                                    SemanticError::NotCallable {
                                        ty: ty_name,
                                        span: location.span(),
                                    },
                                    location,
                                );
                            }
                            return (Type::Any, Io::READ);
                        }
                    }
                }
                ExprKind::Identifier(name)
                    if self.scopes.resolve(name).is_none()
                        && self.ctx.find_type(name).is_none() =>
                {
                    CalleeKind::ImplicitSelf {
                        name: name.clone(),
                        callee_id: callee.id,
                    }
                }
                _ => {
                    self.type_expr(callee, Io::READ);
                    CalleeKind::Value { callee_id: callee.id }
                }
            },
            _ => unreachable!(),
        };

        match callee_kind {
            CalleeKind::Member {
                target,
                is_static,
                name,
                callee_id,
            } => self.resolve_method_call(
                expr, target, is_static, &name, callee_id, &arg_types, &args_null, location,
            ),
            CalleeKind::ImplicitSelf { name, callee_id } => {
                // Instance methods of the enclosing class first, then its
                // statics.
                let has_this = !self.is_static && self.this_offset.is_some();
                let instance = has_this
                    && !self
                        .ctx
                        .find_functions_on(self.owner, &name, false, self.dependencies)
                        .is_empty();
                if instance {
                    self.resolve_method_call(
                        expr, self.owner, false, &name, callee_id, &arg_types, &args_null,
                        location,
                    )
                } else if !self
                    .ctx
                    .find_functions_on(self.owner, &name, true, self.dependencies)
                    .is_empty()
                {
                    self.resolve_method_call(
                        expr, self.owner, true, &name, callee_id, &arg_types, &args_null,
                        location,
                    )
                } else {
                    self.error(
                        SemanticError::UndefinedIdentifier {
                            name,
                            span: location.span(),
                        },
                        location,
                    );
                    (Type::Any, Io::READ)
                }
            }
            CalleeKind::Value { callee_id } => {
                let callee_ty = self
                    .tables
                    .result_type
                    .get(&callee_id)
                    .cloned()
                    .unwrap_or(Type::Any);
                match callee_ty {
                    Type::Delegate(delegate) => {
                        self.check_delegate_args(expr, delegate, &arg_types, &args_null, location)
                    }
                    Type::Any => (Type::Any, Io::READ),
                    other => {
                        let ty_name = self.ctx.type_to_string(&other);
                        self.error(
                            SemanticError::NotCallable {
                                ty: ty_name,
                                span: location.span(),
                            },
                            location,
                        );
                        (Type::Any, Io::READ)
                    }
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_method_call(
        &mut self,
        expr: &mut Expr,
        target: TypeId,
        is_static: bool,
        name: &str,
        callee_id: NodeId,
        arg_types: &[Type],
        args_null: &[bool],
        location: &CodeLocation,
    ) -> (Type, Io) {
        let candidates = self
            .ctx
            .find_functions_on(target, name, is_static, self.dependencies);
        if candidates.is_empty() {
            // Fall back to a delegate-valued field or property.
            if let Some(found) = self.find_member(target, name, is_static) {
                if !matches!(found, FoundMember::Functions(_)) {
                    let (ty, _) = self.record_member(callee_id, found, location);
                    self.tables.result_type.insert(callee_id, ty.clone());
                    if let Type::Delegate(delegate) = ty {
                        return self.check_delegate_args(
                            expr, delegate, arg_types, args_null, location,
                        );
                    }
                    let ty_name = self.ctx.type_to_string(&ty);
                    self.error(
                        SemanticError::NotCallable {
                            ty: ty_name,
                            span: location.span(),
                        },
                        location,
                    );
                    return (Type::Any, Io::READ);
                }
            }
            let type_name = self.ctx.ty(target).name.clone();
            self.error(
                SemanticError::UnknownMember {
                    name: name.to_string(),
                    type_name,
                    span: location.span(),
                },
                location,
            );
            return (Type::Any, Io::READ);
        }

        match resolve_overload(self.ctx, &candidates, arg_types, args_null) {
            OverloadOutcome::Selected {
                function,
                conversions,
            } => {
                let flags = self.ctx.function(function).flags;
                self.tables.refs.insert(
                    callee_id,
                    Resolved::Function {
                        id: function,
                        is_virtual: flags.is_virtual || flags.is_override,
                    },
                );
                self.apply_argument_casts(expr, &conversions);
                let delegate = self.ctx.function(function).delegate;
                let return_type = self.ctx.delegate(delegate).return_type.clone();
                (return_type, Io::READ)
            }
            OverloadOutcome::NoMatch => {
                let provided = self.provided_types(arg_types);
                self.error(
                    SemanticError::NoMatchingOverload {
                        name: name.to_string(),
                        provided,
                        span: location.span(),
                    },
                    location,
                );
                (Type::Any, Io::READ)
            }
            OverloadOutcome::Ambiguous => {
                self.error(
                    SemanticError::AmbiguousOverload {
                        name: name.to_string(),
                        span: location.span(),
                    },
                    location,
                );
                (Type::Any, Io::READ)
            }
        }
    }

    fn check_delegate_args(
        &mut self,
        expr: &mut Expr,
        delegate: crate::binding::DelegateId,
        arg_types: &[Type],
        args_null: &[bool],
        location: &CodeLocation,
    ) -> (Type, Io) {
        let signature = self.ctx.delegate(delegate).clone();
        if signature.params.len() != arg_types.len() {
            let provided = self.provided_types(arg_types);
            self.error(
                SemanticError::NoMatchingOverload {
                    name: "delegate".into(),
                    provided,
                    span: location.span(),
                },
                location,
            );
            return (signature.return_type, Io::READ);
        }
        let mut conversions = Vec::with_capacity(arg_types.len());
        for (index, param) in signature.params.iter().enumerate() {
            let is_null = args_null.get(index).copied().unwrap_or(false);
            match implicit_conversion(self.ctx, &arg_types[index], &param.ty, is_null) {
                Some(conversion) => conversions.push(conversion.cast()),
                None => {
                    let expected = self.ctx.type_to_string(&param.ty);
                    let found = self.ctx.type_to_string(&arg_types[index]);
                    self.error(
                        SemanticError::TypeMismatch {
                            expected,
                            found,
                            span: location.span(),
                        },
                        location,
                    );
                    conversions.push(None);
                }
            }
        }
        self.apply_argument_casts(expr, &conversions);
        (signature.return_type, Io::READ)
    }

    fn apply_argument_casts(&mut self, expr: &mut Expr, conversions: &[Option<CastKind>]) {
        let delegate_param_types: Vec<Option<CastKind>> = conversions.to_vec();
        if let ExprKind::FunctionCall { args, .. } = &mut expr.kind {
            let mut args_taken = std::mem::take(args);
            for (arg, conversion) in args_taken.iter_mut().zip(&delegate_param_types) {
                if let Some(kind) = conversion {
                    self.wrap_cast_with_kind(arg, *kind);
                }
            }
            *args = args_taken;
        }
    }

    fn type_indexer(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        let (base_id, mut index_types, mut index_nulls) = match &mut expr.kind {
            ExprKind::Indexer { base, indices } => {
                self.type_expr(base, Io::READ);
                let mut types = Vec::with_capacity(indices.len());
                let mut nulls = Vec::with_capacity(indices.len());
                for index in indices.iter_mut() {
                    nulls.push(matches!(index.kind, ExprKind::Literal(LiteralValue::Null)));
                    types.push(self.type_expr(index, Io::READ));
                }
                (base.id, types, nulls)
            }
            _ => unreachable!(),
        };

        let target = match self.member_target(base_id) {
            Some((target, false)) => target,
            _ => return (Type::Any, Io::READ),
        };
        let candidates = self
            .ctx
            .find_functions_on(target, "Get", false, self.dependencies);
        if candidates.is_empty() {
            let name = self.ctx.ty(target).name.clone();
            self.error(
                SemanticError::NoIndexer {
                    name,
                    span: location.span(),
                },
                location,
            );
            return (Type::Any, Io::READ);
        }
        let index_types_taken = std::mem::take(&mut index_types);
        let index_nulls_taken = std::mem::take(&mut index_nulls);
        match resolve_overload(self.ctx, &candidates, &index_types_taken, &index_nulls_taken) {
            OverloadOutcome::Selected {
                function,
                conversions,
            } => {
                self.tables.refs.insert(
                    expr.id,
                    Resolved::Function {
                        id: function,
                        is_virtual: false,
                    },
                );
                if let ExprKind::Indexer { indices, .. } = &mut expr.kind {
                    let mut taken = std::mem::take(indices);
                    for (index, conversion) in taken.iter_mut().zip(&conversions) {
                        if let Some(kind) = conversion {
                            self.wrap_cast_with_kind(index, *kind);
                        }
                    }
                    *indices = taken;
                }
                let delegate = self.ctx.function(function).delegate;
                (self.ctx.delegate(delegate).return_type.clone(), Io::READ)
            }
            OverloadOutcome::NoMatch => {
                let provided = self.provided_types(&index_types_taken);
                self.error(
                    SemanticError::NoMatchingOverload {
                        name: "Get".into(),
                        provided,
                        span: location.span(),
                    },
                    location,
                );
                (Type::Any, Io::READ)
            }
            OverloadOutcome::Ambiguous => {
                self.error(
                    SemanticError::AmbiguousOverload {
                        name: "Get".into(),
                        span: location.span(),
                    },
                    location,
                );
                (Type::Any, Io::READ)
            }
        }
    }

    fn type_binary(
        &mut self,
        expr: &mut Expr,
        op: BinaryOp,
        location: &CodeLocation,
    ) -> (Type, Io) {
        if op == BinaryOp::Assign {
            return self.type_assignment(expr, location);
        }
        // Compound forms were lowered away.
        debug_assert!(!op.is_assignment());

        let core = self.ctx.core_types();
        let integer = Type::Bound(core.integer);
        let real = Type::Bound(core.real);
        let boolean = Type::Bound(core.boolean);

        let (lhs_ty, rhs_ty, lhs_null, rhs_null) = match &mut expr.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                let lt = self.type_expr(lhs, Io::READ);
                let rt = self.type_expr(rhs, Io::READ);
                (
                    lt,
                    rt,
                    matches!(lhs.kind, ExprKind::Literal(LiteralValue::Null)),
                    matches!(rhs.kind, ExprKind::Literal(LiteralValue::Null)),
                )
            }
            _ => unreachable!(),
        };
        if lhs_ty == Type::Any && !lhs_null || rhs_ty == Type::Any && !rhs_null {
            // Poisoned operand; stay quiet.
            if !lhs_null && !rhs_null {
                return (Type::Any, Io::READ);
            }
        }

        let numeric = |ty: &Type| *ty == integer || *ty == real;
        match op {
            BinaryOp::Add
            | BinaryOp::Subtract
            | BinaryOp::Multiply
            | BinaryOp::Divide
            | BinaryOp::Modulo => {
                if numeric(&lhs_ty) && numeric(&rhs_ty) {
                    let result = if lhs_ty == real || rhs_ty == real {
                        self.promote_to_real(expr, &lhs_ty, &rhs_ty);
                        real
                    } else {
                        integer
                    };
                    (result, Io::READ)
                } else {
                    self.invalid_binary(op, &lhs_ty, &rhs_ty, location);
                    (Type::Any, Io::READ)
                }
            }
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                if numeric(&lhs_ty) && numeric(&rhs_ty) {
                    if lhs_ty == real || rhs_ty == real {
                        self.promote_to_real(expr, &lhs_ty, &rhs_ty);
                    }
                    (boolean, Io::READ)
                } else {
                    self.invalid_binary(op, &lhs_ty, &rhs_ty, location);
                    (Type::Any, Io::READ)
                }
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let comparable = lhs_ty == rhs_ty
                    || (numeric(&lhs_ty) && numeric(&rhs_ty))
                    || lhs_null
                    || rhs_null
                    || self.related_references(&lhs_ty, &rhs_ty);
                if comparable {
                    if numeric(&lhs_ty) && numeric(&rhs_ty) && lhs_ty != rhs_ty {
                        self.promote_to_real(expr, &lhs_ty, &rhs_ty);
                    }
                    (boolean, Io::READ)
                } else {
                    self.invalid_binary(op, &lhs_ty, &rhs_ty, location);
                    (Type::Any, Io::READ)
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                if lhs_ty == boolean && rhs_ty == boolean {
                    (boolean, Io::READ)
                } else {
                    self.invalid_binary(op, &lhs_ty, &rhs_ty, location);
                    (Type::Any, Io::READ)
                }
            }
            _ => unreachable!(),
        }
    }

    fn related_references(&self, lhs: &Type, rhs: &Type) -> bool {
        match (lhs, rhs) {
            (Type::Bound(a), Type::Bound(b)) => {
                self.ctx.ty(*a).copy_mode == CopyMode::ReferenceType
                    && self.ctx.ty(*b).copy_mode == CopyMode::ReferenceType
                    && (self.ctx.is_subtype(*a, *b) || self.ctx.is_subtype(*b, *a))
            }
            _ => false,
        }
    }

    fn promote_to_real(&mut self, expr: &mut Expr, lhs_ty: &Type, rhs_ty: &Type) {
        let integer = Type::Bound(self.ctx.core_types().integer);
        if let ExprKind::Binary { lhs, rhs, .. } = &mut expr.kind {
            if *lhs_ty == integer {
                let mut taken = std::mem::replace(
                    lhs,
                    Box::new(Expr::new(
                        NodeId(u32::MAX),
                        CodeLocation::default(),
                        ExprKind::Error,
                    )),
                );
                self.wrap_cast_with_kind(&mut taken, CastKind::IntegerToReal);
                *lhs = taken;
            }
            if *rhs_ty == integer {
                let mut taken = std::mem::replace(
                    rhs,
                    Box::new(Expr::new(
                        NodeId(u32::MAX),
                        CodeLocation::default(),
                        ExprKind::Error,
                    )),
                );
                self.wrap_cast_with_kind(&mut taken, CastKind::IntegerToReal);
                *rhs = taken;
            }
        }
    }

    fn type_assignment(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        let lhs_ty = match &mut expr.kind {
            ExprKind::Binary { lhs, rhs, .. } => {
                let lhs_ty = self.type_expr(lhs, Io::WRITE);
                self.type_expr(rhs, Io::READ);
                lhs_ty
            }
            _ => unreachable!(),
        };
        let _ = location;
        if let ExprKind::Binary { rhs, .. } = &mut expr.kind {
            let mut taken = std::mem::replace(
                rhs,
                Box::new(Expr::new(
                    NodeId(u32::MAX),
                    CodeLocation::default(),
                    ExprKind::Error,
                )),
            );
            self.convert(&mut taken, &lhs_ty);
            *rhs = taken;
        }
        (lhs_ty, Io::READ)
    }

    fn type_new(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        let (ty_node, mut arg_types, mut args_null) = match &mut expr.kind {
            ExprKind::New { ty, args } => {
                let mut types = Vec::with_capacity(args.len());
                let mut nulls = Vec::with_capacity(args.len());
                for arg in args.iter_mut() {
                    nulls.push(matches!(arg.kind, ExprKind::Literal(LiteralValue::Null)));
                    types.push(self.type_expr(arg, Io::READ));
                }
                (ty.clone(), types, nulls)
            }
            _ => unreachable!(),
        };

        let target = match self.resolve_type(&ty_node) {
            Some(Type::Bound(id)) => id,
            Some(_) | None => return (Type::Any, Io::READ),
        };
        if !self.ctx.ty(target).creatable_in_script {
            let name = self.ctx.ty(target).name.clone();
            self.error(
                SemanticError::NotCreatable {
                    name,
                    span: location.span(),
                },
                location,
            );
            return (Type::Bound(target), Io::READ);
        }

        let constructors = self.ctx.ty(target).constructors.clone();
        let arg_types_taken = std::mem::take(&mut arg_types);
        let args_null_taken = std::mem::take(&mut args_null);
        if constructors.is_empty() {
            if !arg_types_taken.is_empty() {
                let provided = self.provided_types(&arg_types_taken);
                self.error(
                    SemanticError::NoMatchingOverload {
                        name: "Constructor".into(),
                        provided,
                        span: location.span(),
                    },
                    location,
                );
            }
            self.tables.refs.insert(
                expr.id,
                Resolved::Constructor {
                    ty: target,
                    function: None,
                },
            );
            return (Type::Bound(target), Io::READ);
        }

        match resolve_overload(self.ctx, &constructors, &arg_types_taken, &args_null_taken) {
            OverloadOutcome::Selected {
                function,
                conversions,
            } => {
                self.tables.refs.insert(
                    expr.id,
                    Resolved::Constructor {
                        ty: target,
                        function: Some(function),
                    },
                );
                if let ExprKind::New { args, .. } = &mut expr.kind {
                    let mut taken = std::mem::take(args);
                    for (arg, conversion) in taken.iter_mut().zip(&conversions) {
                        if let Some(kind) = conversion {
                            self.wrap_cast_with_kind(arg, *kind);
                        }
                    }
                    *args = taken;
                }
                (Type::Bound(target), Io::READ)
            }
            OverloadOutcome::NoMatch => {
                let provided = self.provided_types(&arg_types_taken);
                self.error(
                    SemanticError::NoMatchingOverload {
                        name: "Constructor".into(),
                        provided,
                        span: location.span(),
                    },
                    location,
                );
                (Type::Bound(target), Io::READ)
            }
            OverloadOutcome::Ambiguous => {
                self.error(
                    SemanticError::AmbiguousOverload {
                        name: "Constructor".into(),
                        span: location.span(),
                    },
                    location,
                );
                (Type::Bound(target), Io::READ)
            }
        }
    }

    fn type_initializer(&mut self, expr: &mut Expr, location: &CodeLocation) -> (Type, Io) {
        let base_ty = match &mut expr.kind {
            ExprKind::Initializer { base, .. } => self.type_expr(base, Io::READ),
            _ => unreachable!(),
        };
        let target = match base_ty {
            Type::Bound(id) => id,
            _ => return (base_ty, Io::READ),
        };
        let candidates = self
            .ctx
            .find_functions_on(target, "Add", false, self.dependencies);
        if candidates.is_empty() {
            let name = self.ctx.ty(target).name.clone();
            self.error(
                SemanticError::UnknownMember {
                    name: "Add".into(),
                    type_name: name,
                    span: location.span(),
                },
                location,
            );
            return (Type::Bound(target), Io::READ);
        }

        if let ExprKind::Initializer { values, .. } = &mut expr.kind {
            let mut taken = std::mem::take(values);
            for value in taken.iter_mut() {
                let is_null = matches!(value.kind, ExprKind::Literal(LiteralValue::Null));
                let ty = self.type_expr(value, Io::READ);
                match resolve_overload(self.ctx, &candidates, &[ty], &[is_null]) {
                    OverloadOutcome::Selected {
                        function,
                        conversions,
                    } => {
                        self.tables.initializer_adds.insert(value.id, function);
                        if let Some(Some(kind)) = conversions.first() {
                            self.wrap_cast_with_kind(value, *kind);
                        }
                    }
                    _ => {
                        let location = value.location.clone();
                        let provided = self
                            .tables
                            .result_type
                            .get(&value.id)
                            .map(|t| self.ctx.type_to_string(t))
                            .unwrap_or_default();
                        self.error(
                            SemanticError::NoMatchingOverload {
                                name: "Add".into(),
                                provided,
                                span: location.span(),
                            },
                            &location,
                        );
                    }
                }
            }
            if let ExprKind::Initializer { values, .. } = &mut expr.kind {
                *values = taken;
            }
        }
        (Type::Bound(target), Io::READ)
    }

    // ----- conversions -----

    /// Ensure `expr` produces `to`, inserting an explicit cast node when an
    /// implicit conversion applies, or reporting a mismatch.
    fn convert(&mut self, expr: &mut Expr, to: &Type) {
        let from = self
            .tables
            .result_type
            .get(&expr.id)
            .cloned()
            .unwrap_or(Type::Any);
        if &from == to {
            return;
        }
        let is_null = matches!(expr.kind, ExprKind::Literal(LiteralValue::Null));
        if is_null {
            // Null adopts the target type with no runtime work.
            self.tables.result_type.insert(expr.id, to.clone());
            return;
        }
        if from == Type::Any {
            return;
        }
        match implicit_conversion(self.ctx, &from, to, false) {
            Some(Conversion::Exact) => {}
            Some(Conversion::Implicit(kind)) => self.wrap_cast_with_kind(expr, kind),
            None => {
                let location = expr.location.clone();
                let expected = self.ctx.type_to_string(to);
                let found = self.ctx.type_to_string(&from);
                self.error(
                    SemanticError::TypeMismatch {
                        expected,
                        found,
                        span: location.span(),
                    },
                    &location,
                );
            }
        }
    }

    /// Wrap an already-typed expression in a synthetic cast node carrying a
    /// precomputed conversion.
    fn wrap_cast_with_kind(&mut self, expr: &mut Expr, kind: CastKind) {
        let from = self
            .tables
            .result_type
            .get(&expr.id)
            .cloned()
            .unwrap_or(Type::Any);
        let to = self.cast_result_type(&from, kind);
        let id = self.ids.fresh();
        let location = expr.location.clone();
        let target = SyntaxTypeNode::simple(self.ctx.type_to_string(&to), location.clone());
        let inner = std::mem::replace(
            expr,
            Expr::new(id, location.clone(), ExprKind::Error),
        );
        expr.kind = ExprKind::TypeCast {
            operand: Box::new(inner),
            target,
        };
        self.tables.casts.insert(id, kind);
        self.tables.result_type.insert(id, to);
        self.tables.io.insert(id, Io::READ);
        self.tables.io_usage.insert(id, Io::READ);
        self.tables.locations.insert(id, location);
    }

    fn cast_result_type(&self, from: &Type, kind: CastKind) -> Type {
        let core = self.ctx.core_types();
        match kind {
            CastKind::IntegerToReal => Type::Bound(core.real),
            CastKind::RealToInteger => Type::Bound(core.integer),
            CastKind::IntegerToEnum => from.clone(),
            CastKind::Downcast(target) | CastKind::FromAny(target) => Type::Bound(target),
            CastKind::ToAny => Type::Any,
            CastKind::Identity => from.clone(),
        }
    }

    // ----- helpers -----

    fn resolve_type(&mut self, node: &SyntaxTypeNode) -> Option<Type> {
        resolve_written_type(self.ctx, node, self.diagnostics)
    }

    fn alloc_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        if self.next_slot > self.high_water {
            self.high_water = self.next_slot;
        }
        slot
    }

    fn provided_types(&self, types: &[Type]) -> String {
        types
            .iter()
            .map(|t| self.ctx.type_to_string(t))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn invalid_binary(&mut self, op: BinaryOp, lhs: &Type, rhs: &Type, location: &CodeLocation) {
        if *lhs == Type::Any || *rhs == Type::Any {
            return;
        }
        let lhs_name = self.ctx.type_to_string(lhs);
        let rhs_name = self.ctx.type_to_string(rhs);
        self.error(
            SemanticError::InvalidBinaryOperands {
                op: op.as_str().into(),
                lhs: lhs_name,
                rhs: rhs_name,
                span: location.span(),
            },
            location,
        );
    }

    fn void_as_value(&mut self, location: &CodeLocation) {
        self.error(
            SemanticError::VoidUsedAsValue {
                span: location.span(),
            },
            location,
        );
    }

    fn error(&mut self, error: SemanticError, location: &CodeLocation) {
        self.diagnostics.sema_error(error, location.clone());
    }
}

/// Resolve a written type against the context. Template mentions were all
/// instantiated during pass 2, so instantiation here only consults the
/// memoization cache (or builds another native instantiation).
pub(crate) fn resolve_written_type(
    ctx: &mut Context,
    node: &SyntaxTypeNode,
    diagnostics: &mut Diagnostics,
) -> Option<Type> {
    if node.is_ref {
        let mut inner = node.clone();
        inner.is_ref = false;
        return match resolve_written_type(ctx, &inner, diagnostics)? {
            Type::Bound(id) => Some(Type::Indirect(id)),
            other => Some(other),
        };
    }
    if node.arguments.is_empty() {
        return match node.name.as_str() {
            "Void" => Some(Type::Void),
            "Any" => Some(Type::Any),
            name => {
                if let Some(id) = ctx.find_type(name) {
                    Some(Type::Bound(id))
                } else {
                    let error = if ctx.type_exists(name) {
                        SemanticError::TemplateNotInstantiated {
                            name: name.to_string(),
                            span: node.location.span(),
                        }
                    } else {
                        SemanticError::UnknownType {
                            name: name.to_string(),
                            span: node.location.span(),
                        }
                    };
                    diagnostics.sema_error(error, node.location.clone());
                    None
                }
            }
        };
    }

    let mut arguments = Vec::with_capacity(node.arguments.len());
    for argument in &node.arguments {
        arguments.push(resolve_written_type(ctx, argument, diagnostics)?);
    }
    // Script template instantiations are memoized under their full name.
    let full_name = ctx.template_full_name(&node.name, &arguments);
    if let Some(&cached) = ctx.template_cache.get(&full_name) {
        return Some(Type::Bound(cached));
    }
    match instantiate_template(ctx, &node.name, &arguments) {
        Ok(id) => Some(Type::Bound(id)),
        Err(TemplateError::NotATemplate(name)) => {
            diagnostics.sema_error(
                SemanticError::UnknownType {
                    name,
                    span: node.location.span(),
                },
                node.location.clone(),
            );
            None
        }
        Err(TemplateError::ArgumentCount {
            expected, found, ..
        }) => {
            diagnostics.sema_error(
                SemanticError::TemplateArgumentCount {
                    expected,
                    found,
                    span: node.location.span(),
                },
                node.location.clone(),
            );
            None
        }
    }
}
