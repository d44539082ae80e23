// src/binding/context.rs
//! The session context: one append-only universe of types, delegates, and
//! functions shared by every library compiled in this session. Passed
//! explicitly into the compiler and VM entry points; constructed once before
//! any compilation and torn down after the last executable state.

use crate::binding::types::*;
use crate::binding::LibraryRef;
use rustc_hash::FxHashMap;
use std::rc::Rc;

/// Handler invoked to build a concrete type from template arguments.
pub type TemplateHandler = Rc<dyn Fn(&mut Context, &str, &[Type]) -> TypeId>;

/// A registered template: expected argument count plus the instantiator.
pub struct TemplateInstantiator {
    pub param_count: usize,
    pub handler: TemplateHandler,
}

/// Ids of the always-present core types.
#[derive(Debug, Clone, Copy)]
pub struct CoreTypes {
    pub integer: TypeId,
    pub real: TypeId,
    pub boolean: TypeId,
    pub string: TypeId,
    pub exception: TypeId,
}

pub struct Context {
    types: Vec<BoundType>,
    delegates: Vec<DelegateType>,
    functions: Vec<Function>,
    /// Global name lookup; duplicate registration is rejected.
    pub(crate) type_names: FxHashMap<String, TypeId>,
    /// Memoized template instantiations keyed by fully-qualified name.
    pub(crate) template_cache: FxHashMap<String, TypeId>,
    pub(crate) templates: FxHashMap<String, TemplateInstantiator>,
    core_types: Option<CoreTypes>,
    core_library: Option<LibraryRef>,
    statics_allocated: u32,
}

impl Context {
    /// Create a context with the core library (Integer, Real, Boolean,
    /// String, Exception, Array, Console) already bound.
    pub fn new() -> Self {
        let mut ctx = Self::empty();
        let core = crate::runtime::core::build_core(&mut ctx);
        ctx.core_library = Some(core);
        ctx
    }

    /// A context with nothing bound; used by the core library builder and
    /// some unit tests.
    pub(crate) fn empty() -> Self {
        Self {
            types: Vec::new(),
            delegates: Vec::new(),
            functions: Vec::new(),
            type_names: FxHashMap::default(),
            template_cache: FxHashMap::default(),
            templates: FxHashMap::default(),
            core_types: None,
            core_library: None,
            statics_allocated: 0,
        }
    }

    /// Reserve one static value slot. Indices are global across all
    /// libraries in the session; the executable state sizes its static
    /// memory from `static_count`.
    pub fn allocate_static(&mut self) -> u32 {
        let index = self.statics_allocated;
        self.statics_allocated += 1;
        index
    }

    pub fn static_count(&self) -> u32 {
        self.statics_allocated
    }

    pub fn core_types(&self) -> CoreTypes {
        self.core_types
            .expect("core library must be built before use")
    }

    pub(crate) fn set_core_types(&mut self, core: CoreTypes) {
        self.core_types = Some(core);
    }

    pub fn core_library(&self) -> LibraryRef {
        self.core_library
            .clone()
            .expect("core library must be built before use")
    }

    // ----- arenas -----

    pub fn add_type(&mut self, ty: BoundType) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.type_names.insert(ty.name.clone(), id);
        self.types.push(ty);
        id
    }

    pub fn ty(&self, id: TypeId) -> &BoundType {
        &self.types[id.0 as usize]
    }

    pub fn ty_mut(&mut self, id: TypeId) -> &mut BoundType {
        &mut self.types[id.0 as usize]
    }

    pub fn add_delegate(&mut self, delegate: DelegateType) -> DelegateId {
        // Structurally-equal signatures share one id.
        if let Some(existing) = self
            .delegates
            .iter()
            .position(|d| d.same_signature(&delegate))
        {
            return DelegateId(existing as u32);
        }
        let id = DelegateId(self.delegates.len() as u32);
        self.delegates.push(delegate);
        id
    }

    pub fn delegate(&self, id: DelegateId) -> &DelegateType {
        &self.delegates[id.0 as usize]
    }

    pub fn add_function(&mut self, function: Function) -> FunctionId {
        let id = FunctionId(self.functions.len() as u32);
        self.functions.push(function);
        id
    }

    pub fn function(&self, id: FunctionId) -> &Function {
        &self.functions[id.0 as usize]
    }

    pub fn function_mut(&mut self, id: FunctionId) -> &mut Function {
        &mut self.functions[id.0 as usize]
    }

    // ----- lookup -----

    pub fn find_type(&self, name: &str) -> Option<TypeId> {
        self.type_names.get(name).copied()
    }

    pub fn type_exists(&self, name: &str) -> bool {
        self.type_names.contains_key(name) || self.templates.contains_key(name)
    }

    /// Walk the base chain: is `sub` the same as or derived from `base`?
    pub fn is_subtype(&self, sub: TypeId, base: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(id) = current {
            if id == base {
                return true;
            }
            current = self.ty(id).base;
        }
        false
    }

    /// Find instance or static function overloads, walking up the base
    /// chain, then scanning the extension-member tables of the given
    /// dependency libraries.
    pub fn find_functions_on(
        &self,
        type_id: TypeId,
        name: &str,
        is_static: bool,
        dependencies: &[LibraryRef],
    ) -> Vec<FunctionId> {
        let mut current = Some(type_id);
        while let Some(id) = current {
            if let Some(found) = self.ty(id).find_functions(name, is_static) {
                return found.to_vec();
            }
            for library in dependencies {
                if let Some(found) = library.find_extension_functions(id, name) {
                    return found.to_vec();
                }
            }
            current = self.ty(id).base;
        }
        Vec::new()
    }

    // ----- naming -----

    /// Human-readable type name for diagnostics ("Array[Integer]",
    /// "delegate (Integer) : Void").
    pub fn type_to_string(&self, ty: &Type) -> String {
        match ty {
            Type::Void => "Void".to_string(),
            Type::Any => "Any".to_string(),
            Type::Bound(id) => self.ty(*id).name.clone(),
            Type::Indirect(id) => format!("ref {}", self.ty(*id).name),
            Type::Delegate(id) => {
                let delegate = self.delegate(*id);
                let params: Vec<String> = delegate
                    .params
                    .iter()
                    .map(|p| self.type_to_string(&p.ty))
                    .collect();
                format!(
                    "delegate ({}) : {}",
                    params.join(", "),
                    self.type_to_string(&delegate.return_type)
                )
            }
        }
    }

    /// Fully-qualified name for a template instantiation: "Array[Integer]".
    pub fn template_full_name(&self, base: &str, arguments: &[Type]) -> String {
        let args: Vec<String> = arguments.iter().map(|a| self.type_to_string(a)).collect();
        format!("{}[{}]", base, args.join(", "))
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::CodeLocation;

    #[test]
    fn delegates_are_deduplicated() {
        let mut ctx = Context::empty();
        let t = ctx.add_type(BoundType::new("T", CopyMode::ReferenceType, 0));
        let sig = DelegateType {
            params: vec![DelegateParam {
                name: "x".into(),
                ty: Type::Bound(t),
            }],
            return_type: Type::Void,
        };
        let a = ctx.add_delegate(sig.clone());
        let b = ctx.add_delegate(sig);
        assert_eq!(a, b);
    }

    #[test]
    fn subtype_walks_base_chain() {
        let mut ctx = Context::empty();
        let base = ctx.add_type(BoundType::new("Base", CopyMode::ReferenceType, 0));
        let mut derived_type = BoundType::new("Derived", CopyMode::ReferenceType, 0);
        derived_type.base = Some(base);
        derived_type.location = CodeLocation::default();
        let derived = ctx.add_type(derived_type);

        assert!(ctx.is_subtype(derived, base));
        assert!(ctx.is_subtype(base, base));
        assert!(!ctx.is_subtype(base, derived));
    }

    #[test]
    fn template_full_name_formats_arguments() {
        let mut ctx = Context::empty();
        let integer = ctx.add_type(BoundType::new("Integer", CopyMode::ValueType, 1));
        let name = ctx.template_full_name("Array", &[Type::Bound(integer)]);
        assert_eq!(name, "Array[Integer]");
    }
}
