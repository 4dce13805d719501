// Copyright 2024 Saptak Santra
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

//! Built-in component payloads.
//!
//! Components carry no static Rust type; the core only ever sees their
//! declared byte size (see `archetype::Column`). The handful of payloads
//! below are themselves ordinary components, laid out as `#[repr(C)]`
//! POD structs so they can be viewed as the raw byte cells the rest of the
//! system deals in, via `bytemuck`.

use bytemuck::{Pod, Zeroable};

use crate::entity::ComponentId;

/// Attached to every entity created by `World::new_component`, recording
/// the declared element size (in bytes) of the component it names.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ComponentDecl {
    pub size: u64,
}

impl ComponentDecl {
    pub fn new(size: usize) -> Self {
        Self { size: size as u64 }
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }
}

/// Attached alongside `ComponentDecl`: an index into the world's interned
/// name table, rather than inline string bytes (columns are fixed-size).
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct NameRef {
    pub string_id: u32,
}

/// Observer descriptor: which components an observer requires, and
/// whether it is currently enabled. Attached to the observer's own entity
/// so observers are ordinary data, inspectable like anything else.
///
/// Bounded to a fixed arity so the struct stays `Pod`-eligible as a column
/// cell; `len` tracks how many of `components` are actually in use.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
pub struct ObserverDecl {
    pub components: [u64; Self::MAX_COMPONENTS],
    pub len: u32,
    pub enabled: u32,
}

impl ObserverDecl {
    pub const MAX_COMPONENTS: usize = 8;

    pub fn new(components: &[ComponentId], enabled: bool) -> Self {
        assert!(
            components.len() <= Self::MAX_COMPONENTS,
            "observer requires too many components (max {})",
            Self::MAX_COMPONENTS
        );
        let mut slots = [0u64; Self::MAX_COMPONENTS];
        for (slot, c) in slots.iter_mut().zip(components) {
            *slot = c.index();
        }
        Self {
            components: slots,
            len: components.len() as u32,
            enabled: enabled as u32,
        }
    }

    pub fn components(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.components[..self.len as usize]
            .iter()
            .map(|&idx| crate::entity::EntityId(idx))
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled != 0
    }
}

/// Byte size of a `Pod` component payload, for registering its column.
pub fn pod_size<T: Pod>() -> usize {
    std::mem::size_of::<T>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn component_decl_roundtrips_through_bytes() {
        let decl = ComponentDecl::new(16);
        let bytes = bytemuck::bytes_of(&decl);
        let back: &ComponentDecl = bytemuck::from_bytes(bytes);
        assert_eq!(back.size(), 16);
    }

    #[test]
    fn observer_decl_holds_its_components() {
        let comps = [crate::entity::EntityId(3), crate::entity::EntityId(7)];
        let decl = ObserverDecl::new(&comps, true);
        let got: Vec<_> = decl.components().collect();
        assert_eq!(got, comps);
        assert!(decl.is_enabled());
    }
}
