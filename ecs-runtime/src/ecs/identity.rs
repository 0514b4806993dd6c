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
//! Type identity registry
//!
//! Every component, resource and event type is interned the first time it
//! is referenced and receives a dense integer identity. Storage and filter
//! matching key on these integers rather than on `TypeId` comparisons.

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Dense identity handed out by an [`IdentityRegistry`]
pub trait IdentityIndex: Copy + Eq + Ord + Hash + fmt::Debug {
    /// Build the identity for a dense index
    fn from_index(index: u32) -> Self;

    /// Dense index of this identity
    fn index(self) -> usize;
}

macro_rules! identity_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(u32);

        impl $name {
            /// Build the identity for a dense index
            pub const fn from_index(index: u32) -> Self {
                $name(index)
            }

            /// Raw dense index
            pub const fn raw(self) -> u32 {
                self.0
            }
        }

        impl IdentityIndex for $name {
            fn from_index(index: u32) -> Self {
                $name(index)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

identity_type!(
    /// Interned identity of a component type
    ComponentId
);
identity_type!(
    /// Interned identity of a resource type
    ResourceId
);
identity_type!(
    /// Interned identity of an event type
    EventId
);

/// Runtime key for a Rust type: its `TypeId` plus a printable name
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    type_id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for the type `T`
    pub fn of<T: 'static>() -> Self {
        TypeKey {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Underlying `TypeId`
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Strip the module path from a `std::any::type_name` string
pub(crate) fn short_type_name(name: &'static str) -> &'static str {
    // Generic arguments may contain paths of their own; only strip the outer one.
    let outer = name.split('<').next().unwrap_or(name);
    match outer.rfind("::") {
        Some(pos) => &name[pos + 2..],
        None => name,
    }
}

/// Interning table from Rust types to dense identities
#[derive(Debug)]
pub struct IdentityRegistry<I: IdentityIndex> {
    ids: HashMap<TypeId, I>,
    keys: Vec<TypeKey>,
}

impl<I: IdentityIndex> IdentityRegistry<I> {
    /// Create an empty registry
    pub fn new() -> Self {
        IdentityRegistry {
            ids: HashMap::new(),
            keys: Vec::new(),
        }
    }

    /// Return the identity of `key`, assigning the next one on first use
    pub fn intern(&mut self, key: TypeKey) -> I {
        if let Some(&id) = self.ids.get(&key.type_id) {
            return id;
        }
        let id = I::from_index(self.keys.len() as u32);
        self.ids.insert(key.type_id, id);
        self.keys.push(key);
        tracing::trace!(type_name = key.name, index = id.index(), "interned type");
        id
    }

    /// Identity of an already interned type
    pub fn get(&self, type_id: TypeId) -> Option<I> {
        self.ids.get(&type_id).copied()
    }

    /// Identity of `T`, if it has been interned
    pub fn id_of<T: 'static>(&self) -> Option<I> {
        self.get(TypeId::of::<T>())
    }

    /// Key registered for an identity
    pub fn key(&self, id: I) -> Option<TypeKey> {
        self.keys.get(id.index()).copied()
    }

    /// Printable name of an identity
    pub fn name(&self, id: I) -> &'static str {
        self.key(id).map(|key| key.short_name()).unwrap_or("<unregistered>")
    }

    /// Number of interned types
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Check if nothing has been interned yet
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate identities in registration order
    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        (0..self.keys.len() as u32).map(I::from_index)
    }
}

impl<I: IdentityIndex> Default for IdentityRegistry<I> {
    fn default() -> Self {
        Self::new()
    }
}
