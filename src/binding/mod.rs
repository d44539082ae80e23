// src/binding/mod.rs
//! Reflection and native binding: the type universe, libraries, templates,
//! and identifier canonicalization.

mod context;
mod fix;
pub mod library;
pub mod templates;
pub mod types;

pub use context::{Context, CoreTypes, TemplateHandler, TemplateInstantiator};
pub use fix::{fix_identifier, IdentifierCase};
pub use library::{BindingError, Library, LibraryBuilder, LibraryRef, Module};
pub use templates::{instantiate_template, TemplateError};
pub use types::{
    Attribute, BoundType, CopyMode, DelegateId, DelegateParam, DelegateType, EnumValue, Field,
    Function, FunctionFlags, FunctionId, GetterSetter, ManagerKind, NativeFn, SendsEvent, Type,
    TypeId,
};
