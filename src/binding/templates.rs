// src/binding/templates.rs
//! Template instantiation. Templates are registered by name with an
//! instantiator callback; each distinct argument list produces one concrete
//! `BoundType`, memoized by its fully-qualified name so repeated mentions of
//! `Array[Integer]` share a single type.

use crate::binding::context::Context;
use crate::binding::types::{Type, TypeId};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("'{0}' is not a template type")]
    NotATemplate(String),
    #[error("template '{name}' takes {expected} argument(s) but {found} were given")]
    ArgumentCount {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Instantiate `base[arguments]`, reusing a cached instantiation when the
/// same argument list was seen before.
pub fn instantiate_template(
    ctx: &mut Context,
    base: &str,
    arguments: &[Type],
) -> Result<TypeId, TemplateError> {
    let full_name = ctx.template_full_name(base, arguments);
    if let Some(&cached) = ctx.template_cache.get(&full_name) {
        return Ok(cached);
    }

    let (param_count, handler) = match ctx.templates.get(base) {
        Some(instantiator) => (instantiator.param_count, instantiator.handler.clone()),
        None => return Err(TemplateError::NotATemplate(base.to_string())),
    };
    if arguments.len() != param_count {
        return Err(TemplateError::ArgumentCount {
            name: base.to_string(),
            expected: param_count,
            found: arguments.len(),
        });
    }

    let id = handler(ctx, &full_name, arguments);
    ctx.ty_mut(id).template_base = Some(base.to_string());
    ctx.template_cache.insert(full_name, id);
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::library::LibraryBuilder;
    use crate::binding::types::{BoundType, CopyMode};
    use std::rc::Rc;

    fn register_pair_template(ctx: &mut Context, builder: &mut LibraryBuilder) {
        builder.add_template_instantiator(
            ctx,
            "Pair",
            2,
            Rc::new(|ctx, full_name, _arguments| {
                ctx.add_type(BoundType::new(full_name, CopyMode::ReferenceType, 2))
            }),
        );
    }

    #[test]
    fn instantiation_is_memoized() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        let integer = ctx.add_type(BoundType::new("Integer", CopyMode::ValueType, 1));
        register_pair_template(&mut ctx, &mut builder);

        let args = [Type::Bound(integer), Type::Bound(integer)];
        let a = instantiate_template(&mut ctx, "Pair", &args).unwrap();
        let b = instantiate_template(&mut ctx, "Pair", &args).unwrap();
        assert_eq!(a, b);
        assert_eq!(ctx.ty(a).name, "Pair[Integer, Integer]");
        assert_eq!(ctx.ty(a).template_base.as_deref(), Some("Pair"));
    }

    #[test]
    fn wrong_argument_count_is_rejected() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        let integer = ctx.add_type(BoundType::new("Integer", CopyMode::ValueType, 1));
        register_pair_template(&mut ctx, &mut builder);

        let err = instantiate_template(&mut ctx, "Pair", &[Type::Bound(integer)]).unwrap_err();
        assert_eq!(
            err,
            TemplateError::ArgumentCount {
                name: "Pair".into(),
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn unknown_template_is_rejected() {
        let mut ctx = Context::empty();
        let err = instantiate_template(&mut ctx, "Nope", &[]).unwrap_err();
        assert_eq!(err, TemplateError::NotATemplate("Nope".into()));
    }
}
