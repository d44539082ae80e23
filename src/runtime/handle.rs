// src/runtime/handle.rs
//! Handles and runtime values. A handle is plain data: which manager stores
//! the object, a slot index, and the generation the slot had when the handle
//! was created. Dereferencing a handle whose generation no longer matches
//! yields nothing instead of touching reclaimed memory.

use crate::binding::{FunctionId, ManagerKind, TypeId};

/// Slot index of the null handle.
pub const NULL_SLOT: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct HandleFlags {
    /// Reference counting is skipped entirely (pointer-manager handles and
    /// objects the host owns).
    pub no_reference_counting: bool,
}

/// A reference to a managed object.
#[derive(Debug, Clone, Copy)]
pub struct Handle {
    pub stored_type: TypeId,
    pub manager: ManagerKind,
    pub slot: u32,
    pub generation: u32,
    pub flags: HandleFlags,
}

impl Handle {
    pub fn null() -> Handle {
        Handle {
            stored_type: TypeId(u32::MAX),
            manager: ManagerKind::Heap,
            slot: NULL_SLOT,
            generation: 0,
            flags: HandleFlags::default(),
        }
    }

    pub fn is_null(&self) -> bool {
        self.slot == NULL_SLOT
    }
}

/// Handles are the same object when their slot data matches. The manager
/// kind does not participate in equality; a handle re-created for the same
/// slot always compares equal to the original.
impl PartialEq for Handle {
    fn eq(&self, other: &Handle) -> bool {
        self.slot == other.slot && self.generation == other.generation
    }
}

impl Eq for Handle {}

impl std::hash::Hash for Handle {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

/// A bound function packaged with its receiver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DelegateValue {
    pub function: FunctionId,
    pub this: Option<Handle>,
}

/// One frame slot, static slot, or object field.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    /// Uninitialized or void; also what a null literal loads before it is
    /// stored into a typed slot.
    #[default]
    Empty,
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Handle(Handle),
    Delegate(DelegateValue),
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            Value::Handle(h) => Some(*h),
            _ => None,
        }
    }

    /// Null for comparison purposes: an empty slot or a null handle.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::Handle(h) => h.is_null(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_handle_is_null() {
        assert!(Handle::null().is_null());
        assert!(Value::Handle(Handle::null()).is_null());
        assert!(Value::Empty.is_null());
        assert!(!Value::Integer(0).is_null());
    }

    #[test]
    fn equality_ignores_manager_kind() {
        let mut a = Handle::null();
        a.slot = 3;
        a.generation = 7;
        a.manager = ManagerKind::Heap;
        let mut b = a;
        b.manager = ManagerKind::String;
        assert_eq!(a, b);
        b.generation = 8;
        assert_ne!(a, b);
    }
}
