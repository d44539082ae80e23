// src/binding/library.rs
//! Libraries group the types and functions produced by one compilation or
//! one native binding pass. A builder accumulates declarations, validates
//! them, and seals the result into an immutable `Library`.

use crate::binding::context::Context;
use crate::binding::types::*;
use crate::frontend::{CodeEntry, CodeLocation};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::rc::Rc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindingError {
    #[error("a type named '{0}' is already bound in this context")]
    DuplicateType(String),
    #[error("type '{type_name}' already has a member named '{member}'")]
    DuplicateMember { type_name: String, member: String },
    #[error("type '{0}' is not part of this library")]
    UnknownType(String),
    #[error("base type chain of '{0}' forms a cycle")]
    BaseCycle(String),
    #[error("cannot inherit from sealed type '{0}'")]
    SealedBase(String),
}

/// An immutable, shareable compilation product.
pub struct Library {
    pub name: String,
    pub types: Vec<TypeId>,
    pub functions: Vec<FunctionId>,
    /// Source entries this library was compiled from; empty for native
    /// libraries. Kept for breakpoint resolution and stack traces.
    pub entries: Vec<CodeEntry>,
    /// Members attached to types owned by *other* libraries, keyed by the
    /// extended type.
    extension_functions: FxHashMap<TypeId, FxHashMap<String, SmallVec<[FunctionId; 2]>>>,
}

pub type LibraryRef = Rc<Library>;

impl Library {
    pub fn find_extension_functions(&self, type_id: TypeId, name: &str) -> Option<&[FunctionId]> {
        self.extension_functions
            .get(&type_id)?
            .get(name)
            .map(|v| v.as_slice())
    }

    pub fn owns_type(&self, id: TypeId) -> bool {
        self.types.contains(&id)
    }
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("name", &self.name)
            .field("types", &self.types.len())
            .field("functions", &self.functions.len())
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// Accumulates declarations for one library. Duplicates are rejected at
/// add time; layout (field offsets against base chains) is finalized by
/// `create_library`.
pub struct LibraryBuilder {
    name: String,
    types: Vec<TypeId>,
    functions: Vec<FunctionId>,
    entries: Vec<CodeEntry>,
    extension_functions: FxHashMap<TypeId, FxHashMap<String, SmallVec<[FunctionId; 2]>>>,
}

impl LibraryBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            functions: Vec::new(),
            entries: Vec::new(),
            extension_functions: FxHashMap::default(),
        }
    }

    pub fn add_code_entry(&mut self, entry: CodeEntry) {
        self.entries.push(entry);
    }

    /// Bind a new type. Fails if the name is taken anywhere in the context.
    pub fn add_bound_type(
        &mut self,
        ctx: &mut Context,
        ty: BoundType,
    ) -> Result<TypeId, BindingError> {
        if ctx.type_exists(&ty.name) {
            return Err(BindingError::DuplicateType(ty.name));
        }
        let id = ctx.add_type(ty);
        self.types.push(id);
        Ok(id)
    }

    pub fn set_base(
        &mut self,
        ctx: &mut Context,
        derived: TypeId,
        base: TypeId,
    ) -> Result<(), BindingError> {
        if ctx.ty(base).sealed {
            return Err(BindingError::SealedBase(ctx.ty(base).name.clone()));
        }
        ctx.ty_mut(derived).base = Some(base);
        Ok(())
    }

    /// Add a stored member variable. Instance fields get the next slot in
    /// the owning type (base-chain adjustment happens at seal time); static
    /// fields get a context-global static index.
    pub fn add_field(
        &mut self,
        ctx: &mut Context,
        owner: TypeId,
        name: impl Into<String>,
        ty: Type,
        is_static: bool,
        location: CodeLocation,
    ) -> Result<u32, BindingError> {
        let name = name.into();
        if ctx.ty(owner).has_member(&name, is_static) {
            return Err(BindingError::DuplicateMember {
                type_name: ctx.ty(owner).name.clone(),
                member: name,
            });
        }
        let offset = if is_static {
            ctx.allocate_static()
        } else {
            let bound = ctx.ty(owner);
            bound.fields.len() as u32
        };
        let field = Field {
            name,
            ty,
            offset,
            is_static,
            location,
            attributes: Vec::new(),
        };
        let bound = ctx.ty_mut(owner);
        if is_static {
            bound.static_fields.push(field);
        } else {
            bound.fields.push(field);
            bound.size = bound.fields.len() as u32;
        }
        Ok(offset)
    }

    /// Add a get/set property. The accessor functions must already be
    /// registered (scripted or native).
    pub fn add_getter_setter(
        &mut self,
        ctx: &mut Context,
        owner: TypeId,
        property: GetterSetter,
    ) -> Result<(), BindingError> {
        if ctx.ty(owner).has_member(&property.name, property.is_static) {
            return Err(BindingError::DuplicateMember {
                type_name: ctx.ty(owner).name.clone(),
                member: property.name,
            });
        }
        ctx.ty_mut(owner).properties.push(property);
        Ok(())
    }

    /// Register a function in the context and attach it to its owner's
    /// overload set. Also used for scripted functions; pass `native: None`
    /// and fill in compiled code later.
    pub fn add_function(
        &mut self,
        ctx: &mut Context,
        owner: Option<TypeId>,
        name: impl Into<String>,
        delegate: DelegateType,
        flags: FunctionFlags,
        native: Option<NativeFn>,
        location: CodeLocation,
    ) -> FunctionId {
        let name = name.into();
        let delegate_id = ctx.add_delegate(delegate.clone());
        let mut function = Function {
            name: name.clone(),
            owner,
            delegate: delegate_id,
            flags,
            location,
            code: None,
            required_stack: 0,
            native,
            owning_property: None,
            return_offset: None,
            param_offsets: Vec::new(),
            this_offset: None,
        };
        function.assign_stack_offsets(&delegate);
        let id = ctx.add_function(function);
        self.functions.push(id);
        if let Some(owner) = owner {
            let bound = ctx.ty_mut(owner);
            let map = if flags.is_static {
                &mut bound.static_functions
            } else {
                &mut bound.functions
            };
            map.entry(name).or_default().push(id);
        }
        id
    }

    /// Convenience wrapper for native bindings.
    #[allow(clippy::too_many_arguments)]
    pub fn add_native_function(
        &mut self,
        ctx: &mut Context,
        owner: TypeId,
        name: &str,
        params: Vec<DelegateParam>,
        return_type: Type,
        is_static: bool,
        handler: NativeFn,
    ) -> FunctionId {
        self.add_function(
            ctx,
            Some(owner),
            name,
            DelegateType {
                params,
                return_type,
            },
            FunctionFlags {
                is_static,
                ..Default::default()
            },
            Some(handler),
            CodeLocation::native(),
        )
    }

    pub fn add_constructor(
        &mut self,
        ctx: &mut Context,
        owner: TypeId,
        params: Vec<DelegateParam>,
        native: Option<NativeFn>,
        location: CodeLocation,
    ) -> FunctionId {
        let id = self.add_function(
            ctx,
            Some(owner),
            "Constructor",
            DelegateType {
                params,
                return_type: Type::Void,
            },
            FunctionFlags::default(),
            native,
            location,
        );
        // Constructors live in their own overload list, not the named map.
        let bound = ctx.ty_mut(owner);
        bound.functions.remove("Constructor");
        bound.constructors.push(id);
        id
    }

    pub fn add_destructor(
        &mut self,
        ctx: &mut Context,
        owner: TypeId,
        native: Option<NativeFn>,
        location: CodeLocation,
    ) -> FunctionId {
        let id = self.add_function(
            ctx,
            Some(owner),
            "Destructor",
            DelegateType {
                params: Vec::new(),
                return_type: Type::Void,
            },
            FunctionFlags::default(),
            native,
            location,
        );
        let bound = ctx.ty_mut(owner);
        bound.functions.remove("Destructor");
        bound.destructor = Some(id);
        id
    }

    /// Attach a function to a type owned by another library.
    pub fn add_extension_function(
        &mut self,
        ctx: &mut Context,
        extended: TypeId,
        name: &str,
        delegate: DelegateType,
        flags: FunctionFlags,
        native: Option<NativeFn>,
    ) -> FunctionId {
        let delegate_id = ctx.add_delegate(delegate.clone());
        let mut function = Function {
            name: name.to_string(),
            owner: Some(extended),
            delegate: delegate_id,
            flags,
            location: CodeLocation::native(),
            code: None,
            required_stack: 0,
            native,
            owning_property: None,
            return_offset: None,
            param_offsets: Vec::new(),
            this_offset: None,
        };
        function.assign_stack_offsets(&delegate);
        let id = ctx.add_function(function);
        self.functions.push(id);
        self.extension_functions
            .entry(extended)
            .or_default()
            .entry(name.to_string())
            .or_default()
            .push(id);
        id
    }

    pub fn add_template_instantiator(
        &mut self,
        ctx: &mut Context,
        name: &str,
        param_count: usize,
        handler: crate::binding::context::TemplateHandler,
    ) {
        ctx.templates.insert(
            name.to_string(),
            crate::binding::context::TemplateInstantiator {
                param_count,
                handler,
            },
        );
    }

    /// Seal the library. Finalizes instance layout: every derived type's
    /// field offsets are shifted past its base chain and its size becomes
    /// the full inherited size. Types are processed base-first; a base
    /// inside this library that never resolves means a cycle.
    pub fn create_library(self, ctx: &mut Context) -> Result<LibraryRef, BindingError> {
        let mut pending: Vec<TypeId> = self.types.clone();
        let in_library: rustc_hash::FxHashSet<TypeId> = self.types.iter().copied().collect();
        let mut done: rustc_hash::FxHashSet<TypeId> = rustc_hash::FxHashSet::default();

        while !pending.is_empty() {
            let before = pending.len();
            pending.retain(|&id| {
                let base = ctx.ty(id).base;
                let ready = match base {
                    Some(base_id) => !in_library.contains(&base_id) || done.contains(&base_id),
                    None => true,
                };
                if !ready {
                    return true;
                }
                if let Some(base_id) = base {
                    let base_size = ctx.ty(base_id).size;
                    let bound = ctx.ty_mut(id);
                    for field in &mut bound.fields {
                        field.offset += base_size;
                    }
                    bound.size += base_size;
                }
                done.insert(id);
                false
            });
            if pending.len() == before {
                let stuck = ctx.ty(pending[0]).name.clone();
                return Err(BindingError::BaseCycle(stuck));
            }
        }

        Ok(Rc::new(Library {
            name: self.name,
            types: self.types,
            functions: self.functions,
            entries: self.entries,
            extension_functions: self.extension_functions,
        }))
    }
}

/// A linked set of libraries that an executable state runs against. The
/// core library is always a member.
#[derive(Debug, Clone)]
pub struct Module {
    pub libraries: Vec<LibraryRef>,
}

impl Module {
    pub fn new(ctx: &Context) -> Self {
        Self {
            libraries: vec![ctx.core_library()],
        }
    }

    pub fn add(&mut self, library: LibraryRef) {
        self.libraries.push(library);
    }

    /// The code entry a location's hash refers to, searched across all
    /// member libraries.
    pub fn find_entry(&self, code_hash: u64) -> Option<&CodeEntry> {
        self.libraries
            .iter()
            .flat_map(|l| l.entries.iter())
            .find(|e| e.code_hash == code_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location() -> CodeLocation {
        CodeLocation::default()
    }

    #[test]
    fn duplicate_type_rejected() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        builder
            .add_bound_type(&mut ctx, BoundType::new("Foo", CopyMode::ReferenceType, 0))
            .unwrap();
        let err = builder
            .add_bound_type(&mut ctx, BoundType::new("Foo", CopyMode::ReferenceType, 0))
            .unwrap_err();
        assert_eq!(err, BindingError::DuplicateType("Foo".into()));
    }

    #[test]
    fn duplicate_member_rejected() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        let foo = builder
            .add_bound_type(&mut ctx, BoundType::new("Foo", CopyMode::ReferenceType, 0))
            .unwrap();
        builder
            .add_field(&mut ctx, foo, "X", Type::Bound(foo), false, location())
            .unwrap();
        let err = builder
            .add_field(&mut ctx, foo, "X", Type::Bound(foo), false, location())
            .unwrap_err();
        assert!(matches!(err, BindingError::DuplicateMember { .. }));
    }

    #[test]
    fn derived_layout_starts_past_base() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        let base = builder
            .add_bound_type(&mut ctx, BoundType::new("Base", CopyMode::ReferenceType, 0))
            .unwrap();
        let derived = builder
            .add_bound_type(
                &mut ctx,
                BoundType::new("Derived", CopyMode::ReferenceType, 0),
            )
            .unwrap();
        builder.set_base(&mut ctx, derived, base).unwrap();
        builder
            .add_field(&mut ctx, base, "A", Type::Bound(base), false, location())
            .unwrap();
        builder
            .add_field(&mut ctx, base, "B", Type::Bound(base), false, location())
            .unwrap();
        builder
            .add_field(&mut ctx, derived, "C", Type::Bound(base), false, location())
            .unwrap();
        builder.create_library(&mut ctx).unwrap();

        assert_eq!(ctx.ty(base).size, 2);
        assert_eq!(ctx.ty(derived).size, 3);
        assert_eq!(ctx.ty(derived).find_field("C").unwrap().offset, 2);
    }

    #[test]
    fn static_fields_use_global_indices() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        let foo = builder
            .add_bound_type(&mut ctx, BoundType::new("Foo", CopyMode::ReferenceType, 0))
            .unwrap();
        let a = builder
            .add_field(&mut ctx, foo, "A", Type::Bound(foo), true, location())
            .unwrap();
        let b = builder
            .add_field(&mut ctx, foo, "B", Type::Bound(foo), true, location())
            .unwrap();
        assert_eq!((a, b), (0, 1));
        assert_eq!(ctx.static_count(), 2);
        assert_eq!(ctx.ty(foo).size, 0);
    }

    #[test]
    fn sealed_base_rejected() {
        let mut ctx = Context::empty();
        let mut builder = LibraryBuilder::new("test");
        let mut sealed = BoundType::new("Sealed", CopyMode::ReferenceType, 0);
        sealed.sealed = true;
        let base = builder.add_bound_type(&mut ctx, sealed).unwrap();
        let derived = builder
            .add_bound_type(
                &mut ctx,
                BoundType::new("Derived", CopyMode::ReferenceType, 0),
            )
            .unwrap();
        let err = builder.set_base(&mut ctx, derived, base).unwrap_err();
        assert_eq!(err, BindingError::SealedBase("Sealed".into()));
    }
}
