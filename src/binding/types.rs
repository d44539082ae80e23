// src/binding/types.rs
//! The reflection type model: bound types, delegate signatures, functions,
//! and properties. All live in arenas owned by the `Context` and are
//! addressed by plain ids, so libraries can share one append-only type
//! universe.

use crate::frontend::ast::LiteralValue;
use crate::frontend::CodeLocation;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FunctionId(pub u32);

/// Whether assignment copies the value or shares a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMode {
    ValueType,
    ReferenceType,
}

/// Which handle manager stores instances of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManagerKind {
    Heap,
    Stack,
    Pointer,
    String,
}

/// A resolved type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Void,
    Any,
    Bound(TypeId),
    Delegate(DelegateId),
    /// A reference to a value type (`ref` qualifier).
    Indirect(TypeId),
}

impl Type {
    pub fn as_bound(&self) -> Option<TypeId> {
        match self {
            Type::Bound(id) | Type::Indirect(id) => Some(*id),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Type::Void)
    }
}

/// An attribute recorded on a bound declaration.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name: String,
    pub arguments: Vec<LiteralValue>,
}

/// A directly-stored member variable.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: Type,
    /// Slot offset into the object for instance fields; index into the
    /// library's static memory for static fields.
    pub offset: u32,
    pub is_static: bool,
    pub location: CodeLocation,
    pub attributes: Vec<Attribute>,
}

/// A property backed by get/set functions rather than storage.
#[derive(Debug, Clone)]
pub struct GetterSetter {
    pub name: String,
    pub ty: Type,
    pub is_static: bool,
    pub get: Option<FunctionId>,
    pub set: Option<FunctionId>,
    pub location: CodeLocation,
}

/// A `sends` declaration surfaced in reflection metadata.
#[derive(Debug, Clone)]
pub struct SendsEvent {
    pub name: String,
    pub event_type: Type,
}

/// One named value of an enum or flags type.
#[derive(Debug, Clone)]
pub struct EnumValue {
    pub name: String,
    pub value: i64,
}

/// A reflection-registered class, struct, enum, or flags type.
#[derive(Debug)]
pub struct BoundType {
    pub name: String,
    pub copy_mode: CopyMode,
    /// Instance size in value slots.
    pub size: u32,
    pub base: Option<TypeId>,
    pub fields: Vec<Field>,
    pub static_fields: Vec<Field>,
    pub properties: Vec<GetterSetter>,
    pub functions: FxHashMap<String, SmallVec<[FunctionId; 2]>>,
    pub static_functions: FxHashMap<String, SmallVec<[FunctionId; 2]>>,
    pub constructors: Vec<FunctionId>,
    pub destructor: Option<FunctionId>,
    pub attributes: Vec<Attribute>,
    pub sends: Vec<SendsEvent>,
    pub sealed: bool,
    pub creatable_in_script: bool,
    pub manager: ManagerKind,
    pub enum_values: Vec<EnumValue>,
    pub is_flags: bool,
    pub location: CodeLocation,
    /// For instantiated templates, the base template name ("Array").
    pub template_base: Option<String>,
}

impl BoundType {
    pub fn new(name: impl Into<String>, copy_mode: CopyMode, size: u32) -> Self {
        let manager = match copy_mode {
            CopyMode::ValueType => ManagerKind::Stack,
            CopyMode::ReferenceType => ManagerKind::Heap,
        };
        Self {
            name: name.into(),
            copy_mode,
            size,
            base: None,
            fields: Vec::new(),
            static_fields: Vec::new(),
            properties: Vec::new(),
            functions: FxHashMap::default(),
            static_functions: FxHashMap::default(),
            constructors: Vec::new(),
            destructor: None,
            attributes: Vec::new(),
            sends: Vec::new(),
            sealed: false,
            creatable_in_script: true,
            manager,
            enum_values: Vec::new(),
            is_flags: false,
            location: CodeLocation::default(),
            template_base: None,
        }
    }

    pub fn is_enum(&self) -> bool {
        !self.enum_values.is_empty() || self.is_flags
    }

    pub fn find_field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn find_static_field(&self, name: &str) -> Option<&Field> {
        self.static_fields.iter().find(|f| f.name == name)
    }

    pub fn find_property(&self, name: &str, is_static: bool) -> Option<&GetterSetter> {
        self.properties
            .iter()
            .find(|p| p.name == name && p.is_static == is_static)
    }

    pub fn find_functions(&self, name: &str, is_static: bool) -> Option<&[FunctionId]> {
        let map = if is_static {
            &self.static_functions
        } else {
            &self.functions
        };
        map.get(name).map(|v| v.as_slice())
    }

    /// True when a member with this name exists in the given namespace
    /// (static or instance), regardless of member kind.
    pub fn has_member(&self, name: &str, is_static: bool) -> bool {
        if is_static {
            self.find_static_field(name).is_some()
                || self.find_property(name, true).is_some()
                || self.static_functions.contains_key(name)
        } else {
            self.find_field(name).is_some()
                || self.find_property(name, false).is_some()
                || self.functions.contains_key(name)
        }
    }
}

/// An ordered parameter of a delegate signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateParam {
    pub name: String,
    pub ty: Type,
}

/// A function signature type: ordered parameters plus a return type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateType {
    pub params: Vec<DelegateParam>,
    pub return_type: Type,
}

impl DelegateType {
    /// Signatures match when parameter types and return type are equal
    /// (parameter names are documentation only).
    pub fn same_signature(&self, other: &DelegateType) -> bool {
        self.return_type == other.return_type
            && self.params.len() == other.params.len()
            && self
                .params
                .iter()
                .zip(&other.params)
                .all(|(a, b)| a.ty == b.ty)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionFlags {
    pub is_static: bool,
    pub is_virtual: bool,
    pub is_override: bool,
    pub is_hidden: bool,
}

/// The native implementation of a bound function.
pub type NativeFn = Rc<dyn Fn(&mut crate::runtime::Call)>;

/// A callable: scripted (compiled opcodes) or native (function pointer),
/// uniformly described for reflection.
pub struct Function {
    pub name: String,
    pub owner: Option<TypeId>,
    pub delegate: DelegateId,
    pub flags: FunctionFlags,
    pub location: CodeLocation,
    /// Compiled code for scripted functions.
    pub code: Option<crate::codegen::CompiledCode>,
    /// Total frame slots needed (return, params, this, locals, temps).
    pub required_stack: u32,
    pub native: Option<NativeFn>,
    /// Set on get/set functions generated for a property.
    pub owning_property: Option<String>,
    pub return_offset: Option<u32>,
    pub param_offsets: Vec<u32>,
    pub this_offset: Option<u32>,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("owner", &self.owner)
            .field("flags", &self.flags)
            .field("native", &self.native.is_some())
            .field("required_stack", &self.required_stack)
            .finish()
    }
}

impl Function {
    /// Stack layout: return slot(s) first, then parameters in declaration
    /// order, then `this` for instance functions. Locals and temps are
    /// appended by the code generator.
    pub fn assign_stack_offsets(&mut self, delegate: &DelegateType) {
        let mut offset = 0u32;
        self.return_offset = if delegate.return_type.is_void() {
            None
        } else {
            let slot = offset;
            offset += 1;
            Some(slot)
        };
        self.param_offsets = delegate
            .params
            .iter()
            .map(|_| {
                let slot = offset;
                offset += 1;
                slot
            })
            .collect();
        self.this_offset = if self.flags.is_static || self.owner.is_none() {
            None
        } else {
            let slot = offset;
            offset += 1;
            Some(slot)
        };
        if self.required_stack < offset {
            self.required_stack = offset;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_offsets_return_params_this() {
        let delegate = DelegateType {
            params: vec![
                DelegateParam {
                    name: "a".into(),
                    ty: Type::Bound(TypeId(0)),
                },
                DelegateParam {
                    name: "b".into(),
                    ty: Type::Bound(TypeId(0)),
                },
            ],
            return_type: Type::Bound(TypeId(0)),
        };
        let mut function = Function {
            name: "F".into(),
            owner: Some(TypeId(1)),
            delegate: DelegateId(0),
            flags: FunctionFlags::default(),
            location: CodeLocation::default(),
            code: None,
            required_stack: 0,
            native: None,
            owning_property: None,
            return_offset: None,
            param_offsets: Vec::new(),
            this_offset: None,
        };
        function.assign_stack_offsets(&delegate);
        assert_eq!(function.return_offset, Some(0));
        assert_eq!(function.param_offsets, vec![1, 2]);
        assert_eq!(function.this_offset, Some(3));
        assert_eq!(function.required_stack, 4);
    }

    #[test]
    fn void_static_has_no_return_or_this() {
        let delegate = DelegateType {
            params: vec![],
            return_type: Type::Void,
        };
        let mut function = Function {
            name: "F".into(),
            owner: Some(TypeId(1)),
            delegate: DelegateId(0),
            flags: FunctionFlags {
                is_static: true,
                ..Default::default()
            },
            location: CodeLocation::default(),
            code: None,
            required_stack: 0,
            native: None,
            owning_property: None,
            return_offset: None,
            param_offsets: Vec::new(),
            this_offset: None,
        };
        function.assign_stack_offsets(&delegate);
        assert_eq!(function.return_offset, None);
        assert_eq!(function.this_offset, None);
        assert_eq!(function.required_stack, 0);
    }

    #[test]
    fn same_signature_ignores_names() {
        let a = DelegateType {
            params: vec![DelegateParam {
                name: "x".into(),
                ty: Type::Bound(TypeId(0)),
            }],
            return_type: Type::Void,
        };
        let b = DelegateType {
            params: vec![DelegateParam {
                name: "y".into(),
                ty: Type::Bound(TypeId(0)),
            }],
            return_type: Type::Void,
        };
        assert!(a.same_signature(&b));
    }
}
