// src/sema/rewrite.rs
//! Tree rewriting utilities shared by the analysis passes: id renumbering
//! for cloned subtrees, formal-parameter substitution for template
//! instantiation, location decoration, and a few structural scans.

use crate::frontend::ast::*;
use crate::frontend::CodeLocation;

/// Give every expression in a cloned subtree a fresh id so side tables never
/// see the same id twice.
pub fn renumber_expr(expr: &mut Expr, ids: &mut NodeIdGen) {
    expr.id = ids.fresh();
    match &mut expr.kind {
        ExprKind::Literal(_)
        | ExprKind::Identifier(_)
        | ExprKind::This
        | ExprKind::StaticType(_)
        | ExprKind::TempRef(_)
        | ExprKind::Error => {}
        ExprKind::StringInterpolant(pieces) | ExprKind::Multi(pieces) => {
            for piece in pieces {
                renumber_expr(piece, ids);
            }
        }
        ExprKind::MemberAccess { base, .. } => renumber_expr(base, ids),
        ExprKind::FunctionCall { callee, args } => {
            renumber_expr(callee, ids);
            for arg in args {
                renumber_expr(arg, ids);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            renumber_expr(lhs, ids);
            renumber_expr(rhs, ids);
        }
        ExprKind::Unary { operand, .. } => renumber_expr(operand, ids),
        ExprKind::Indexer { base, indices } => {
            renumber_expr(base, ids);
            for index in indices {
                renumber_expr(index, ids);
            }
        }
        ExprKind::TypeCast { operand, .. } => renumber_expr(operand, ids),
        ExprKind::New { args, .. } => {
            for arg in args {
                renumber_expr(arg, ids);
            }
        }
        ExprKind::Initializer { base, values } => {
            renumber_expr(base, ids);
            for value in values {
                renumber_expr(value, ids);
            }
        }
        ExprKind::LetTemp { value, .. } => renumber_expr(value, ids),
    }
}

pub fn renumber_statements(statements: &mut [Statement], ids: &mut NodeIdGen) {
    for statement in statements {
        renumber_statement(statement, ids);
    }
}

fn renumber_statement(statement: &mut Statement, ids: &mut NodeIdGen) {
    visit_statement(statement, &mut |expr| renumber_expr(expr, ids), &mut |_| {});
}

/// Walk one statement, applying `on_expr` to every top-level expression it
/// owns (not recursing into the expressions themselves) and `on_type` to
/// every syntax type mention, recursing through nested statements.
fn visit_statement(
    statement: &mut Statement,
    on_expr: &mut impl FnMut(&mut Expr),
    on_type: &mut impl FnMut(&mut SyntaxTypeNode),
) {
    match statement {
        Statement::Expression(expr) => on_expr(expr),
        Statement::Var(var) => {
            if let Some(ty) = &mut var.ty {
                on_type(ty);
            }
            on_expr(&mut var.initializer);
        }
        Statement::If(parts) => {
            for part in parts {
                if let Some(condition) = &mut part.condition {
                    on_expr(condition);
                }
                for inner in &mut part.body {
                    visit_statement(inner, on_expr, on_type);
                }
            }
        }
        Statement::While {
            condition, body, ..
        } => {
            on_expr(condition);
            for inner in body {
                visit_statement(inner, on_expr, on_type);
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
                visit_statement(init, on_expr, on_type);
            }
            if let Some(condition) = condition {
                on_expr(condition);
            }
            if let Some(increment) = increment {
                on_expr(increment);
            }
            for inner in body {
                visit_statement(inner, on_expr, on_type);
            }
        }
        Statement::Loop { body, .. } | Statement::Scope { body, .. } => {
            for inner in body {
                visit_statement(inner, on_expr, on_type);
            }
        }
        Statement::Break(_) | Statement::Continue(_) => {}
        Statement::Return { value, .. } => {
            if let Some(value) = value {
                on_expr(value);
            }
        }
        Statement::Throw { value, .. } | Statement::Delete { value, .. } => on_expr(value),
    }
}

/// Replace every mention of a template's formal parameter name with the
/// actual argument's type name, recursing into nested template arguments.
pub fn substitute_type(node: &mut SyntaxTypeNode, substitute: &impl Fn(&str) -> Option<String>) {
    if node.arguments.is_empty() {
        if let Some(replacement) = substitute(&node.name) {
            node.name = replacement;
        }
    }
    for argument in &mut node.arguments {
        substitute_type(argument, substitute);
    }
}

fn substitute_in_expr(expr: &mut Expr, substitute: &impl Fn(&str) -> Option<String>) {
    match &mut expr.kind {
        ExprKind::StaticType(node) => substitute_type(node, substitute),
        ExprKind::TypeCast { operand, target } => {
            substitute_type(target, substitute);
            substitute_in_expr(operand, substitute);
        }
        ExprKind::New { ty, args } => {
            substitute_type(ty, substitute);
            for arg in args {
                substitute_in_expr(arg, substitute);
            }
        }
        ExprKind::StringInterpolant(pieces) | ExprKind::Multi(pieces) => {
            for piece in pieces {
                substitute_in_expr(piece, substitute);
            }
        }
        ExprKind::MemberAccess { base, .. } => substitute_in_expr(base, substitute),
        ExprKind::FunctionCall { callee, args } => {
            substitute_in_expr(callee, substitute);
            for arg in args {
                substitute_in_expr(arg, substitute);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            substitute_in_expr(lhs, substitute);
            substitute_in_expr(rhs, substitute);
        }
        ExprKind::Unary { operand, .. } | ExprKind::LetTemp { value: operand, .. } => {
            substitute_in_expr(operand, substitute)
        }
        ExprKind::Indexer { base, indices } => {
            substitute_in_expr(base, substitute);
            for index in indices {
                substitute_in_expr(index, substitute);
            }
        }
        ExprKind::Initializer { base, values } => {
            substitute_in_expr(base, substitute);
            for value in values {
                substitute_in_expr(value, substitute);
            }
        }
        ExprKind::Literal(_)
        | ExprKind::Identifier(_)
        | ExprKind::This
        | ExprKind::TempRef(_)
        | ExprKind::Error => {}
    }
}

/// Apply formal-parameter substitution to a whole cloned class body.
pub fn substitute_class(class: &mut ClassNode, substitute: &impl Fn(&str) -> Option<String>) {
    if let Some(base) = &mut class.base {
        substitute_type(base, substitute);
    }
    for sends in &mut class.sends {
        substitute_type(&mut sends.event_type, substitute);
    }
    for variable in &mut class.variables {
        substitute_type(&mut variable.ty, substitute);
        if let Some(initializer) = &mut variable.initializer {
            substitute_in_expr(initializer, substitute);
        }
        if let Some(property) = &mut variable.property {
            for body in [&mut property.get, &mut property.set].into_iter().flatten() {
                for statement in body.iter_mut() {
                    visit_statement(
                        statement,
                        &mut |expr| substitute_in_expr(expr, substitute),
                        &mut |ty| substitute_type(ty, substitute),
                    );
                }
            }
        }
    }
    let all_functions = class
        .functions
        .iter_mut()
        .chain(class.constructors.iter_mut())
        .chain(class.destructor.iter_mut());
    for function in all_functions {
        for param in &mut function.params {
            substitute_type(&mut param.ty, substitute);
        }
        if let Some(return_type) = &mut function.return_type {
            substitute_type(return_type, substitute);
        }
        for statement in &mut function.body {
            visit_statement(
                statement,
                &mut |expr| substitute_in_expr(expr, substitute),
                &mut |ty| substitute_type(ty, substitute),
            );
        }
    }
}

/// Stamp the enclosing class/function names onto every location in a body
/// so diagnostics and stack traces can print them.
pub fn decorate_statements(statements: &mut [Statement], class_name: &str, function_name: &str) {
    let decorate = |location: &mut CodeLocation| {
        location.class_name = Some(class_name.to_string());
        location.function_name = Some(function_name.to_string());
    };
    for statement in statements {
        decorate_statement(statement, &decorate);
    }
}

fn decorate_statement(statement: &mut Statement, decorate: &impl Fn(&mut CodeLocation)) {
    match statement {
        Statement::While { location, .. }
        | Statement::For { location, .. }
        | Statement::Loop { location, .. }
        | Statement::Scope { location, .. }
        | Statement::Return { location, .. }
        | Statement::Throw { location, .. }
        | Statement::Delete { location, .. }
        | Statement::Break(location)
        | Statement::Continue(location) => decorate(location),
        Statement::Var(var) => decorate(&mut var.location),
        Statement::If(parts) => {
            for part in parts {
                decorate(&mut part.location);
            }
        }
        Statement::Expression(_) => {}
    }
    visit_statement(
        statement,
        &mut |expr| decorate_expr(expr, decorate),
        &mut |_| {},
    );
}

fn decorate_expr(expr: &mut Expr, decorate: &impl Fn(&mut CodeLocation)) {
    decorate(&mut expr.location);
    match &mut expr.kind {
        ExprKind::StringInterpolant(pieces) | ExprKind::Multi(pieces) => {
            for piece in pieces {
                decorate_expr(piece, decorate);
            }
        }
        ExprKind::MemberAccess { base, .. } => decorate_expr(base, decorate),
        ExprKind::FunctionCall { callee, args } => {
            decorate_expr(callee, decorate);
            for arg in args {
                decorate_expr(arg, decorate);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            decorate_expr(lhs, decorate);
            decorate_expr(rhs, decorate);
        }
        ExprKind::Unary { operand, .. } | ExprKind::LetTemp { value: operand, .. } => {
            decorate_expr(operand, decorate)
        }
        ExprKind::Indexer { base, indices } => {
            decorate_expr(base, decorate);
            for index in indices {
                decorate_expr(index, decorate);
            }
        }
        ExprKind::TypeCast { operand, .. } => decorate_expr(operand, decorate),
        ExprKind::New { args, .. } => {
            for arg in args {
                decorate_expr(arg, decorate);
            }
        }
        ExprKind::Initializer { base, values } => {
            decorate_expr(base, decorate);
            for value in values {
                decorate_expr(value, decorate);
            }
        }
        ExprKind::Literal(_)
        | ExprKind::Identifier(_)
        | ExprKind::This
        | ExprKind::StaticType(_)
        | ExprKind::TempRef(_)
        | ExprKind::Error => {}
    }
}

/// Collect every type mention with template arguments, from signatures and
/// bodies alike, so instantiation can run before member collection.
pub fn collect_template_mentions(class: &mut ClassNode, out: &mut Vec<SyntaxTypeNode>) {
    let mut on_type = |ty: &mut SyntaxTypeNode| {
        if !ty.arguments.is_empty() {
            out.push(ty.clone());
        }
    };
    if let Some(base) = &mut class.base {
        on_type(base);
    }
    for variable in &mut class.variables {
        on_type(&mut variable.ty);
    }
    let mut mentions = Vec::new();
    let mut statement_mentions = Vec::new();
    let all_functions = class
        .functions
        .iter_mut()
        .chain(class.constructors.iter_mut())
        .chain(class.destructor.iter_mut());
    for function in all_functions {
        for param in &mut function.params {
            if !param.ty.arguments.is_empty() {
                mentions.push(param.ty.clone());
            }
        }
        if let Some(return_type) = &mut function.return_type {
            if !return_type.arguments.is_empty() {
                mentions.push(return_type.clone());
            }
        }
        for statement in &mut function.body {
            visit_statement(
                statement,
                &mut |expr| collect_expr_type_mentions(expr, &mut mentions),
                &mut |ty| {
                    if !ty.arguments.is_empty() {
                        statement_mentions.push(ty.clone());
                    }
                },
            );
        }
    }
    mentions.append(&mut statement_mentions);
    out.append(&mut mentions);
}

fn collect_expr_type_mentions(expr: &mut Expr, out: &mut Vec<SyntaxTypeNode>) {
    let mut on_type = |ty: &SyntaxTypeNode| {
        if !ty.arguments.is_empty() {
            out.push(ty.clone());
        }
    };
    match &mut expr.kind {
        ExprKind::TypeCast { operand, target } => {
            on_type(target);
            collect_expr_type_mentions(operand, out);
        }
        ExprKind::New { ty, args } => {
            on_type(ty);
            for arg in args {
                collect_expr_type_mentions(arg, out);
            }
        }
        ExprKind::StaticType(node) => on_type(node),
        ExprKind::StringInterpolant(pieces) | ExprKind::Multi(pieces) => {
            for piece in pieces {
                collect_expr_type_mentions(piece, out);
            }
        }
        ExprKind::MemberAccess { base, .. } => collect_expr_type_mentions(base, out),
        ExprKind::FunctionCall { callee, args } => {
            collect_expr_type_mentions(callee, out);
            for arg in args {
                collect_expr_type_mentions(arg, out);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_expr_type_mentions(lhs, out);
            collect_expr_type_mentions(rhs, out);
        }
        ExprKind::Unary { operand, .. } | ExprKind::LetTemp { value: operand, .. } => {
            collect_expr_type_mentions(operand, out)
        }
        ExprKind::Indexer { base, indices } => {
            collect_expr_type_mentions(base, out);
            for index in indices {
                collect_expr_type_mentions(index, out);
            }
        }
        ExprKind::Initializer { base, values } => {
            collect_expr_type_mentions(base, out);
            for value in values {
                collect_expr_type_mentions(value, out);
            }
        }
        ExprKind::Literal(_)
        | ExprKind::Identifier(_)
        | ExprKind::This
        | ExprKind::TempRef(_)
        | ExprKind::Error => {}
    }
}

/// Does the body contain a `break` that would leave this loop?
/// Nested loops keep their breaks to themselves.
pub fn contains_break(statements: &[Statement]) -> bool {
    statements.iter().any(|statement| match statement {
        Statement::Break(_) => true,
        Statement::If(parts) => parts.iter().any(|p| contains_break(&p.body)),
        Statement::Scope { body, .. } => contains_break(body),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renumber_gives_fresh_ids() {
        let mut ids = NodeIdGen::default();
        let original = ids.fresh();
        let mut expr = Expr::new(
            original,
            CodeLocation::default(),
            ExprKind::Unary {
                op: UnaryOp::Negate,
                operand: Box::new(Expr::new(
                    ids.fresh(),
                    CodeLocation::default(),
                    ExprKind::Literal(LiteralValue::Integer(1)),
                )),
            },
        );
        renumber_expr(&mut expr, &mut ids);
        assert_ne!(expr.id, original);
    }

    #[test]
    fn substitution_replaces_formal_names() {
        let mut node = SyntaxTypeNode {
            name: "Array".into(),
            arguments: vec![SyntaxTypeNode::simple("T", CodeLocation::default())],
            is_ref: false,
            location: CodeLocation::default(),
        };
        substitute_type(&mut node, &|name| {
            (name == "T").then(|| "Integer".to_string())
        });
        assert_eq!(node.arguments[0].name, "Integer");
        assert_eq!(node.name, "Array");
    }

    #[test]
    fn break_in_nested_loop_does_not_count() {
        let inner_break = Statement::Break(CodeLocation::default());
        let nested = Statement::Loop {
            body: vec![inner_break],
            location: CodeLocation::default(),
        };
        assert!(!contains_break(&[nested]));
        assert!(contains_break(&[Statement::Break(CodeLocation::default())]));
    }
}
