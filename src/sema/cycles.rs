// src/sema/cycles.rs
//! Structural cycle detection: inheritance chains and value-type field
//! composition. Both must be acyclic before sizes or layouts exist.

use crate::binding::{Context, CopyMode, Type, TypeId};
use crate::errors::{Diagnostics, SemanticError};
use rustc_hash::FxHashSet;

/// True if walking base links from `start` revisits `start`. Called as each
/// base is resolved, so a cycle is reported on the declaration that closes
/// it.
pub fn inheritance_cycle(ctx: &Context, start: TypeId) -> bool {
    let mut seen = FxHashSet::default();
    let mut current = ctx.ty(start).base;
    while let Some(id) = current {
        if id == start || !seen.insert(id) {
            return true;
        }
        current = ctx.ty(id).base;
    }
    false
}

/// Report every type whose value-type fields transitively contain the type
/// itself. Such a type would have infinite size, so this must run before
/// layout finalization.
pub fn check_composition_cycles(
    ctx: &Context,
    types: &[TypeId],
    diagnostics: &mut Diagnostics,
) {
    for &id in types {
        if contains_by_value(ctx, id, id, &mut FxHashSet::default()) {
            let bound = ctx.ty(id);
            diagnostics.sema_error(
                SemanticError::CompositionCycle {
                    name: bound.name.clone(),
                    span: bound.location.span(),
                },
                bound.location.clone(),
            );
        }
    }
}

/// Does `current` reach `target` through value-type field composition?
/// Reference-type fields are handles and break the chain.
fn contains_by_value(
    ctx: &Context,
    current: TypeId,
    target: TypeId,
    visiting: &mut FxHashSet<TypeId>,
) -> bool {
    if !visiting.insert(current) {
        return false;
    }
    for field in &ctx.ty(current).fields {
        if let Type::Bound(field_type) = field.ty {
            if ctx.ty(field_type).copy_mode != CopyMode::ValueType {
                continue;
            }
            if field_type == target || contains_by_value(ctx, field_type, target, visiting) {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BoundType, Field};
    use crate::frontend::CodeLocation;

    fn value_type(name: &str) -> BoundType {
        BoundType::new(name, CopyMode::ValueType, 0)
    }

    fn field(name: &str, ty: TypeId) -> Field {
        Field {
            name: name.into(),
            ty: Type::Bound(ty),
            offset: 0,
            is_static: false,
            location: CodeLocation::default(),
            attributes: Vec::new(),
        }
    }

    #[test]
    fn mutual_value_fields_form_a_cycle() {
        let mut ctx = Context::empty();
        let a = ctx.add_type(value_type("A"));
        let b = ctx.add_type(value_type("B"));
        ctx.ty_mut(a).fields.push(field("Other", b));
        ctx.ty_mut(b).fields.push(field("Other", a));

        let mut diagnostics = Diagnostics::tolerant();
        check_composition_cycles(&ctx, &[a, b], &mut diagnostics);
        assert_eq!(diagnostics.errors.len(), 2);
    }

    #[test]
    fn reference_fields_break_the_chain() {
        let mut ctx = Context::empty();
        let a = ctx.add_type(value_type("A"));
        let b = ctx.add_type(BoundType::new("B", CopyMode::ReferenceType, 0));
        ctx.ty_mut(a).fields.push(field("Ref", b));
        ctx.ty_mut(b).fields.push(field("Back", a));

        let mut diagnostics = Diagnostics::new();
        check_composition_cycles(&ctx, &[a, b], &mut diagnostics);
        assert!(!diagnostics.has_errors());
    }

    #[test]
    fn self_value_field_is_a_cycle() {
        let mut ctx = Context::empty();
        let a = ctx.add_type(value_type("A"));
        ctx.ty_mut(a).fields.push(field("Inner", a));

        let mut diagnostics = Diagnostics::new();
        check_composition_cycles(&ctx, &[a], &mut diagnostics);
        assert!(diagnostics.has_errors());
    }

    #[test]
    fn inheritance_cycle_detected() {
        let mut ctx = Context::empty();
        let a = ctx.add_type(BoundType::new("A", CopyMode::ReferenceType, 0));
        let b = ctx.add_type(BoundType::new("B", CopyMode::ReferenceType, 0));
        ctx.ty_mut(b).base = Some(a);
        assert!(!inheritance_cycle(&ctx, b));
        ctx.ty_mut(a).base = Some(b);
        assert!(inheritance_cycle(&ctx, a));
    }
}
