// src/runtime/managers.rs
//! Handle managers: the storage backends objects live in. Each manager owns
//! a slot arena with per-slot generation stamps; freeing a slot bumps its
//! generation so every outstanding handle to the old occupant dereferences
//! to `None` from then on.

use crate::binding::{ManagerKind, TypeId};
use crate::runtime::handle::{Handle, HandleFlags, Value};
use hashbrown::HashMap;
use std::any::Any;

/// The stored representation of one object: a slot per field, plus opaque
/// native data for natively-backed types (Array storage and the like).
pub struct ObjectData {
    pub ty: TypeId,
    pub fields: Vec<Value>,
    pub native: Option<Box<dyn Any>>,
}

impl ObjectData {
    pub fn new(ty: TypeId, size: u32) -> ObjectData {
        ObjectData {
            ty,
            fields: vec![Value::Empty; size as usize],
            native: None,
        }
    }
}

impl std::fmt::Debug for ObjectData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectData")
            .field("ty", &self.ty)
            .field("fields", &self.fields.len())
            .field("native", &self.native.is_some())
            .finish()
    }
}

struct HeapSlot {
    generation: u32,
    refs: u32,
    /// Set while the destructor chain runs, so a release that hits zero
    /// inside the object's own destructor does not restart the chain.
    destructing: bool,
    object: Option<ObjectData>,
}

/// The default manager for reference types. Plain non-atomic reference
/// counts; a slot is reclaimed when its count reaches zero or the object is
/// explicitly deleted.
#[derive(Default)]
pub struct HeapManager {
    slots: Vec<HeapSlot>,
    free: Vec<u32>,
    /// Cleared during teardown so destructors cannot resurrect objects.
    pub allocation_enabled: bool,
}

impl HeapManager {
    pub fn new() -> HeapManager {
        HeapManager {
            slots: Vec::new(),
            free: Vec::new(),
            allocation_enabled: true,
        }
    }

    /// Allocate an object with one reference. `None` when allocation is
    /// disabled; the caller reports the failure and yields a null handle.
    pub fn allocate(&mut self, ty: TypeId, size: u32) -> Option<Handle> {
        if !self.allocation_enabled {
            return None;
        }
        let object = ObjectData::new(ty, size);
        let slot = match self.free.pop() {
            Some(slot) => {
                let entry = &mut self.slots[slot as usize];
                entry.object = Some(object);
                entry.refs = 1;
                entry.destructing = false;
                slot
            }
            None => {
                let slot = self.slots.len() as u32;
                self.slots.push(HeapSlot {
                    generation: 1,
                    refs: 1,
                    destructing: false,
                    object: Some(object),
                });
                slot
            }
        };
        Some(Handle {
            stored_type: ty,
            manager: ManagerKind::Heap,
            slot,
            generation: self.slots[slot as usize].generation,
            flags: HandleFlags::default(),
        })
    }

    fn live_slot(&self, handle: Handle) -> Option<&HeapSlot> {
        let entry = self.slots.get(handle.slot as usize)?;
        (entry.generation == handle.generation && entry.object.is_some()).then_some(entry)
    }

    pub fn get(&self, handle: Handle) -> Option<&ObjectData> {
        self.live_slot(handle)?.object.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ObjectData> {
        let entry = self.slots.get_mut(handle.slot as usize)?;
        if entry.generation != handle.generation {
            return None;
        }
        entry.object.as_mut()
    }

    pub fn ref_count(&self, handle: Handle) -> u32 {
        self.live_slot(handle).map(|s| s.refs).unwrap_or(0)
    }

    pub fn add_reference(&mut self, handle: Handle) {
        if handle.flags.no_reference_counting {
            return;
        }
        if let Some(entry) = self.slots.get_mut(handle.slot as usize) {
            if entry.generation == handle.generation && entry.object.is_some() {
                entry.refs += 1;
            }
        }
    }

    /// Drop one reference. Returns true when the count reached zero; the
    /// caller runs the destructor chain and then calls `free`.
    pub fn release(&mut self, handle: Handle) -> bool {
        if handle.flags.no_reference_counting {
            return false;
        }
        if let Some(entry) = self.slots.get_mut(handle.slot as usize) {
            if entry.generation == handle.generation && entry.object.is_some() && entry.refs > 0 {
                entry.refs -= 1;
                return entry.refs == 0;
            }
        }
        false
    }

    /// Claim the object for destruction. True on the first claim; later
    /// claims (a zero-crossing inside its own destructor) return false.
    pub fn mark_destructing(&mut self, handle: Handle) -> bool {
        if let Some(entry) = self.slots.get_mut(handle.slot as usize) {
            if entry.generation == handle.generation
                && entry.object.is_some()
                && !entry.destructing
            {
                entry.destructing = true;
                return true;
            }
        }
        false
    }

    pub fn is_destructing(&self, handle: Handle) -> bool {
        self.live_slot(handle).is_some_and(|s| s.destructing)
    }

    /// Reclaim the slot. Outstanding handles become stale.
    pub fn free(&mut self, handle: Handle) {
        if let Some(entry) = self.slots.get_mut(handle.slot as usize) {
            if entry.generation == handle.generation && entry.object.is_some() {
                entry.object = None;
                entry.refs = 0;
                entry.destructing = false;
                entry.generation = entry.generation.wrapping_add(1);
                self.free.push(handle.slot);
            }
        }
    }

    /// Every still-allocated object, for teardown and leak reporting.
    pub fn live_objects(&self) -> Vec<(Handle, u32)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(slot, entry)| {
                let object = entry.object.as_ref()?;
                Some((
                    Handle {
                        stored_type: object.ty,
                        manager: ManagerKind::Heap,
                        slot: slot as u32,
                        generation: entry.generation,
                        flags: HandleFlags::default(),
                    },
                    entry.refs,
                ))
            })
            .collect()
    }
}

/// Storage for value types. Validity is gated by a scope generation; when a
/// scope is invalidated every handle created inside it goes stale at once.
#[derive(Default)]
pub struct StackManager {
    generation: u32,
    objects: Vec<(u32, ObjectData)>,
}

impl StackManager {
    pub fn new() -> StackManager {
        StackManager {
            generation: 1,
            objects: Vec::new(),
        }
    }

    pub fn allocate(&mut self, ty: TypeId, size: u32) -> Handle {
        let slot = self.objects.len() as u32;
        self.objects.push((self.generation, ObjectData::new(ty, size)));
        Handle {
            stored_type: ty,
            manager: ManagerKind::Stack,
            slot,
            generation: self.generation,
            flags: HandleFlags {
                no_reference_counting: true,
            },
        }
    }

    pub fn get(&self, handle: Handle) -> Option<&ObjectData> {
        let (generation, object) = self.objects.get(handle.slot as usize)?;
        (*generation == handle.generation).then_some(object)
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ObjectData> {
        let (generation, object) = self.objects.get_mut(handle.slot as usize)?;
        (*generation == handle.generation).then_some(object)
    }

    /// Invalidate everything allocated in the current scope.
    pub fn invalidate_scope(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        self.objects.clear();
    }
}

/// Raw host-owned objects. The host registers and unregisters them; the
/// runtime never reference-counts or reclaims these.
#[derive(Default)]
pub struct PointerManager {
    slots: Vec<Option<ObjectData>>,
}

impl PointerManager {
    pub fn new() -> PointerManager {
        PointerManager::default()
    }

    pub fn register(&mut self, object: ObjectData) -> Handle {
        let ty = object.ty;
        let slot = self.slots.len() as u32;
        self.slots.push(Some(object));
        Handle {
            stored_type: ty,
            manager: ManagerKind::Pointer,
            slot,
            generation: 1,
            flags: HandleFlags {
                no_reference_counting: true,
            },
        }
    }

    pub fn unregister(&mut self, handle: Handle) -> Option<ObjectData> {
        self.slots.get_mut(handle.slot as usize)?.take()
    }

    pub fn get(&self, handle: Handle) -> Option<&ObjectData> {
        self.slots.get(handle.slot as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: Handle) -> Option<&mut ObjectData> {
        self.slots.get_mut(handle.slot as usize)?.as_mut()
    }
}

struct StringNode {
    text: String,
    refs: u32,
}

/// Interned, reference-counted string storage. Equal text shares one node.
pub struct StringManager {
    string_type: TypeId,
    nodes: Vec<Option<StringNode>>,
    free: Vec<u32>,
    interned: HashMap<String, u32>,
}

impl StringManager {
    pub fn new(string_type: TypeId) -> StringManager {
        StringManager {
            string_type,
            nodes: Vec::new(),
            free: Vec::new(),
            interned: HashMap::new(),
        }
    }

    pub fn intern(&mut self, text: &str) -> Handle {
        let slot = match self.interned.get(text) {
            Some(&slot) => {
                if let Some(node) = self.nodes[slot as usize].as_mut() {
                    node.refs += 1;
                }
                slot
            }
            None => {
                let node = StringNode {
                    text: text.to_string(),
                    refs: 1,
                };
                let slot = match self.free.pop() {
                    Some(slot) => {
                        self.nodes[slot as usize] = Some(node);
                        slot
                    }
                    None => {
                        self.nodes.push(Some(node));
                        (self.nodes.len() - 1) as u32
                    }
                };
                self.interned.insert(text.to_string(), slot);
                slot
            }
        };
        Handle {
            stored_type: self.string_type,
            manager: ManagerKind::String,
            slot,
            generation: 1,
            flags: HandleFlags::default(),
        }
    }

    pub fn text(&self, handle: Handle) -> Option<&str> {
        self.nodes
            .get(handle.slot as usize)?
            .as_ref()
            .map(|n| n.text.as_str())
    }

    pub fn add_reference(&mut self, handle: Handle) {
        if let Some(Some(node)) = self.nodes.get_mut(handle.slot as usize) {
            node.refs += 1;
        }
    }

    pub fn release(&mut self, handle: Handle) {
        let slot = handle.slot as usize;
        let emptied = match self.nodes.get_mut(slot) {
            Some(Some(node)) => {
                node.refs = node.refs.saturating_sub(1);
                node.refs == 0
            }
            _ => false,
        };
        if emptied {
            if let Some(node) = self.nodes[slot].take() {
                self.interned.remove(&node.text);
                self.free.push(handle.slot);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_heap_handle_dereferences_to_none() {
        let mut heap = HeapManager::new();
        let handle = heap.allocate(TypeId(0), 2).unwrap();
        assert!(heap.get(handle).is_some());
        heap.free(handle);
        assert!(heap.get(handle).is_none());

        // The slot is recycled under a new generation; the old handle must
        // stay stale.
        let again = heap.allocate(TypeId(0), 2).unwrap();
        assert_eq!(again.slot, handle.slot);
        assert_ne!(again.generation, handle.generation);
        assert!(heap.get(handle).is_none());
        assert!(heap.get(again).is_some());
    }

    #[test]
    fn release_to_zero_reports_reclaim() {
        let mut heap = HeapManager::new();
        let handle = heap.allocate(TypeId(0), 0).unwrap();
        heap.add_reference(handle);
        assert_eq!(heap.ref_count(handle), 2);
        assert!(!heap.release(handle));
        assert!(heap.release(handle));
    }

    #[test]
    fn destruction_claim_is_one_shot_per_object() {
        let mut heap = HeapManager::new();
        let handle = heap.allocate(TypeId(0), 0).unwrap();
        assert!(heap.mark_destructing(handle));
        assert!(heap.is_destructing(handle));
        assert!(!heap.mark_destructing(handle));
        heap.free(handle);

        // A recycled slot starts unclaimed again.
        let again = heap.allocate(TypeId(0), 0).unwrap();
        assert_eq!(again.slot, handle.slot);
        assert!(!heap.is_destructing(again));
        assert!(heap.mark_destructing(again));
    }

    #[test]
    fn disabled_heap_refuses_allocation() {
        let mut heap = HeapManager::new();
        heap.allocation_enabled = false;
        assert!(heap.allocate(TypeId(0), 1).is_none());
    }

    #[test]
    fn scope_invalidation_kills_stack_handles() {
        let mut stack = StackManager::new();
        let handle = stack.allocate(TypeId(0), 1);
        assert!(stack.get(handle).is_some());
        stack.invalidate_scope();
        assert!(stack.get(handle).is_none());
    }

    #[test]
    fn equal_strings_share_one_node() {
        let mut strings = StringManager::new(TypeId(0));
        let a = strings.intern("hello");
        let b = strings.intern("hello");
        assert_eq!(a.slot, b.slot);
        assert_eq!(strings.text(a), Some("hello"));

        strings.release(a);
        assert_eq!(strings.text(b), Some("hello"));
        strings.release(b);
        assert_eq!(strings.text(b), None);
    }
}
