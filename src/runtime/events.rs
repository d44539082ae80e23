// src/runtime/events.rs
//! The event registry: connections from (sender object, event name) to
//! receiver callbacks. Dispatch snapshots the subscription list first, so a
//! callback that connects or disconnects during delivery never perturbs the
//! batch in flight.

use crate::binding::FunctionId;
use crate::runtime::handle::Handle;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Subscription {
    pub receiver: Handle,
    pub function: FunctionId,
}

#[derive(Debug, Default)]
pub struct EventRegistry {
    connections: FxHashMap<(Handle, String), Vec<Subscription>>,
}

impl EventRegistry {
    pub fn new() -> EventRegistry {
        EventRegistry::default()
    }

    pub fn connect(&mut self, sender: Handle, name: &str, receiver: Handle, function: FunctionId) {
        let list = self
            .connections
            .entry((sender, name.to_string()))
            .or_default();
        let subscription = Subscription { receiver, function };
        if !list.contains(&subscription) {
            list.push(subscription);
        }
    }

    pub fn disconnect(&mut self, sender: Handle, name: &str, receiver: Handle) {
        if let Some(list) = self.connections.get_mut(&(sender, name.to_string())) {
            list.retain(|s| s.receiver != receiver);
        }
    }

    /// Subscriptions for one event, copied out so the caller can invoke
    /// them while the registry is mutated underneath.
    pub fn subscriptions(&self, sender: Handle, name: &str) -> Vec<Subscription> {
        self.connections
            .get(&(sender, name.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    /// Remove every connection involving a dying object, as sender or
    /// receiver.
    pub fn remove_object(&mut self, object: Handle) {
        self.connections.retain(|(sender, _), list| {
            if *sender == object {
                return false;
            }
            list.retain(|s| s.receiver != object);
            !list.is_empty()
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{ManagerKind, TypeId};
    use crate::runtime::handle::HandleFlags;

    fn handle(slot: u32) -> Handle {
        Handle {
            stored_type: TypeId(0),
            manager: ManagerKind::Heap,
            slot,
            generation: 1,
            flags: HandleFlags::default(),
        }
    }

    #[test]
    fn duplicate_connections_collapse() {
        let mut events = EventRegistry::new();
        events.connect(handle(0), "Update", handle(1), FunctionId(3));
        events.connect(handle(0), "Update", handle(1), FunctionId(3));
        assert_eq!(events.subscriptions(handle(0), "Update").len(), 1);
    }

    #[test]
    fn dead_object_is_scrubbed_from_both_sides() {
        let mut events = EventRegistry::new();
        events.connect(handle(0), "Update", handle(1), FunctionId(0));
        events.connect(handle(2), "Update", handle(0), FunctionId(1));
        events.remove_object(handle(0));
        assert!(events.subscriptions(handle(0), "Update").is_empty());
        assert!(events.subscriptions(handle(2), "Update").is_empty());
    }

    #[test]
    fn disconnect_leaves_other_receivers() {
        let mut events = EventRegistry::new();
        events.connect(handle(0), "Update", handle(1), FunctionId(0));
        events.connect(handle(0), "Update", handle(2), FunctionId(0));
        events.disconnect(handle(0), "Update", handle(1));
        let left = events.subscriptions(handle(0), "Update");
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].receiver, handle(2));
    }
}
