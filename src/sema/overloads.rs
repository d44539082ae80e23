// src/sema/overloads.rs
//! Implicit conversions and overload resolution. The rules here are the
//! single source of truth: call sites insert exactly the casts chosen here,
//! and the interpreter never re-derives a conversion.

use crate::binding::{Context, CopyMode, FunctionId, Type};
use crate::codegen::CastKind;

/// How an argument type relates to a parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    Exact,
    Implicit(CastKind),
}

impl Conversion {
    pub fn cast(self) -> Option<CastKind> {
        match self {
            Conversion::Exact => None,
            Conversion::Implicit(kind) => Some(kind),
        }
    }
}

/// The implicit conversion from `from` to `to`, if one exists.
/// `from_is_null` marks a null literal, which converts to any handle type.
pub fn implicit_conversion(
    ctx: &Context,
    from: &Type,
    to: &Type,
    from_is_null: bool,
) -> Option<Conversion> {
    if from == to {
        return Some(Conversion::Exact);
    }
    let core = ctx.core_types();
    if from_is_null {
        // Null fits any reference, delegate, or Any slot.
        let ok = matches!(to, Type::Delegate(_) | Type::Any)
            || matches!(to, Type::Bound(id)
                if ctx.ty(*id).copy_mode == CopyMode::ReferenceType);
        if ok {
            return Some(Conversion::Implicit(CastKind::Identity));
        }
    }
    match (from, to) {
        (Type::Bound(f), Type::Bound(t)) => {
            if *f == core.integer && *t == core.real {
                return Some(Conversion::Implicit(CastKind::IntegerToReal));
            }
            // Enum values read as Integer.
            if ctx.ty(*f).is_enum() && *t == core.integer {
                return Some(Conversion::Implicit(CastKind::Identity));
            }
            // Upcast along the inheritance chain.
            if ctx.is_subtype(*f, *t) {
                return Some(Conversion::Implicit(CastKind::Identity));
            }
            None
        }
        (_, Type::Any) => Some(Conversion::Implicit(CastKind::ToAny)),
        _ => None,
    }
}

/// An explicit `as` cast from `from` to `to`. Everything implicit is also
/// explicit; the reverse directions are runtime-checked or lossy.
pub fn explicit_conversion(ctx: &Context, from: &Type, to: &Type) -> Option<CastKind> {
    if let Some(conversion) = implicit_conversion(ctx, from, to, false) {
        return Some(match conversion {
            Conversion::Exact => CastKind::Identity,
            Conversion::Implicit(kind) => kind,
        });
    }
    let core = ctx.core_types();
    match (from, to) {
        (Type::Bound(f), Type::Bound(t)) => {
            if *f == core.real && *t == core.integer {
                return Some(CastKind::RealToInteger);
            }
            if *f == core.integer && ctx.ty(*t).is_enum() {
                return Some(CastKind::IntegerToEnum);
            }
            // Downcast, checked at runtime.
            if ctx.is_subtype(*t, *f) {
                return Some(CastKind::Downcast(*t));
            }
            None
        }
        (Type::Any, Type::Bound(t)) => Some(CastKind::FromAny(*t)),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverloadOutcome {
    Selected {
        function: FunctionId,
        /// Per-argument cast to insert; `None` where the type already
        /// matches exactly.
        conversions: Vec<Option<CastKind>>,
    },
    NoMatch,
    Ambiguous,
}

/// Pick one overload for the given argument types. An all-exact match wins
/// outright; otherwise the viable candidate needing the fewest conversions
/// wins if it is unique. Deterministic: candidate order breaks no ties, ties
/// are ambiguity errors.
pub fn resolve_overload(
    ctx: &Context,
    candidates: &[FunctionId],
    arg_types: &[Type],
    args_null: &[bool],
) -> OverloadOutcome {
    let mut viable: Vec<(FunctionId, Vec<Option<CastKind>>, usize)> = Vec::new();

    for &candidate in candidates {
        let delegate = ctx.delegate(ctx.function(candidate).delegate);
        if delegate.params.len() != arg_types.len() {
            continue;
        }
        let mut conversions = Vec::with_capacity(arg_types.len());
        let mut cost = 0usize;
        let mut ok = true;
        for (index, param) in delegate.params.iter().enumerate() {
            let is_null = args_null.get(index).copied().unwrap_or(false);
            match implicit_conversion(ctx, &arg_types[index], &param.ty, is_null) {
                Some(Conversion::Exact) => conversions.push(None),
                Some(Conversion::Implicit(kind)) => {
                    conversions.push(Some(kind));
                    cost += 1;
                }
                None => {
                    ok = false;
                    break;
                }
            }
        }
        if !ok {
            continue;
        }
        if cost == 0 {
            return OverloadOutcome::Selected {
                function: candidate,
                conversions,
            };
        }
        viable.push((candidate, conversions, cost));
    }

    let best = match viable.iter().map(|(_, _, cost)| *cost).min() {
        Some(best) => best,
        None => return OverloadOutcome::NoMatch,
    };
    let mut at_best = viable.into_iter().filter(|(_, _, cost)| *cost == best);
    let first = at_best.next();
    match (first, at_best.next()) {
        (Some((function, conversions, _)), None) => OverloadOutcome::Selected {
            function,
            conversions,
        },
        (Some(_), Some(_)) => OverloadOutcome::Ambiguous,
        (None, _) => OverloadOutcome::NoMatch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{DelegateParam, DelegateType, FunctionFlags, LibraryBuilder};
    use crate::frontend::CodeLocation;

    fn setup() -> (Context, FunctionId, FunctionId) {
        let mut ctx = Context::new();
        let core = ctx.core_types();
        let mut builder = LibraryBuilder::new("test");
        let integer = Type::Bound(core.integer);
        let real = Type::Bound(core.real);
        let take_integer = builder.add_function(
            &mut ctx,
            None,
            "F",
            DelegateType {
                params: vec![DelegateParam {
                    name: "x".into(),
                    ty: integer,
                }],
                return_type: Type::Void,
            },
            FunctionFlags::default(),
            None,
            CodeLocation::default(),
        );
        let take_real = builder.add_function(
            &mut ctx,
            None,
            "F",
            DelegateType {
                params: vec![DelegateParam {
                    name: "x".into(),
                    ty: real,
                }],
                return_type: Type::Void,
            },
            FunctionFlags::default(),
            None,
            CodeLocation::default(),
        );
        (ctx, take_integer, take_real)
    }

    #[test]
    fn exact_match_beats_conversion() {
        let (ctx, take_integer, take_real) = setup();
        let core = ctx.core_types();
        let outcome = resolve_overload(
            &ctx,
            &[take_real, take_integer],
            &[Type::Bound(core.integer)],
            &[false],
        );
        assert_eq!(
            outcome,
            OverloadOutcome::Selected {
                function: take_integer,
                conversions: vec![None],
            }
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let (ctx, take_integer, take_real) = setup();
        let core = ctx.core_types();
        let args = [Type::Bound(core.integer)];
        let first = resolve_overload(&ctx, &[take_integer, take_real], &args, &[false]);
        for _ in 0..3 {
            let again = resolve_overload(&ctx, &[take_integer, take_real], &args, &[false]);
            assert_eq!(first, again);
        }
    }

    #[test]
    fn no_candidate_matches() {
        let (ctx, take_integer, take_real) = setup();
        let core = ctx.core_types();
        let outcome = resolve_overload(
            &ctx,
            &[take_integer, take_real],
            &[Type::Bound(core.boolean)],
            &[false],
        );
        assert_eq!(outcome, OverloadOutcome::NoMatch);
    }

    #[test]
    fn integer_widens_to_real() {
        let (ctx, _, take_real) = setup();
        let core = ctx.core_types();
        let outcome = resolve_overload(
            &ctx,
            &[take_real],
            &[Type::Bound(core.integer)],
            &[false],
        );
        assert_eq!(
            outcome,
            OverloadOutcome::Selected {
                function: take_real,
                conversions: vec![Some(CastKind::IntegerToReal)],
            }
        );
    }
}
