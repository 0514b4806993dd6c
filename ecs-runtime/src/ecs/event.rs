// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Event queues
//!
//! Events are fire-and-forget values grouped by type. They are emitted
//! from systems through the command buffer (or directly on the world) and
//! drained by whichever system consumes them.

use crate::ecs::identity::{EventId, IdentityRegistry, TypeKey};
use std::any::Any;
use std::cell::RefCell;

/// Marker trait for event types
pub trait Event: 'static {}

/// Per-type FIFO queues of pending events
#[derive(Default)]
pub struct Events {
    registry: IdentityRegistry<EventId>,
    queues: Vec<RefCell<Box<dyn Any>>>,
}

impl Events {
    /// Create an empty set of queues
    pub fn new() -> Self {
        Self::default()
    }

    fn queue_index<E: Event>(&self) -> Option<usize> {
        self.registry.id_of::<E>().map(|id| id.raw() as usize)
    }

    /// Append an event to the queue of its type
    pub fn send<E: Event>(&mut self, event: E) {
        let id = self.registry.intern(TypeKey::of::<E>());
        let index = id.raw() as usize;
        if index == self.queues.len() {
            self.queues.push(RefCell::new(Box::new(Vec::<E>::new())));
        }
        if let Some(queue) = self.queues[index].get_mut().downcast_mut::<Vec<E>>() {
            queue.push(event);
        }
    }

    /// Take every pending event of type `E`, oldest first
    ///
    /// Works through a shared reference so systems can consume events
    /// while they hold the world immutably.
    pub fn drain<E: Event>(&self) -> Vec<E> {
        let Some(index) = self.queue_index::<E>() else {
            return Vec::new();
        };
        let Ok(mut queue) = self.queues[index].try_borrow_mut() else {
            return Vec::new();
        };
        queue
            .downcast_mut::<Vec<E>>()
            .map(std::mem::take)
            .unwrap_or_default()
    }

    /// Number of pending events of type `E`
    pub fn len<E: Event>(&self) -> usize {
        let Some(index) = self.queue_index::<E>() else {
            return 0;
        };
        self.queues[index]
            .try_borrow()
            .ok()
            .and_then(|queue| queue.downcast_ref::<Vec<E>>().map(Vec::len))
            .unwrap_or(0)
    }

    /// Drop every pending event of every type
    pub fn clear(&mut self) {
        self.queues.clear();
        self.registry = IdentityRegistry::new();
    }
}
