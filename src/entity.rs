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

//! Entity identifiers, component ids, and the entity → row index.
//!
//! `EntityId` is a plain monotonic counter, not a generational/recyclable
//! handle: the core never reuses an id once allocated (see the crate's
//! Non-goals). A `ComponentId` is just an `EntityId` that additionally
//! carries a `ComponentDecl` component.

use rustc_hash::FxHashMap;

use crate::registry::TypeId;

/// Opaque 64-bit entity identifier, monotonically allocated from a
/// per-world counter. Never recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct EntityId(pub(crate) u64);

impl EntityId {
    /// The reserved id meaning "no entity". Never returned by `World::new`.
    pub const NONE: EntityId = EntityId(0);

    pub fn index(self) -> u64 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({})", self.0)
    }
}

/// A `ComponentId` is an `EntityId` used in the component-set position of a
/// `TypeId`. Kept as a distinct alias so call sites read intentionally.
pub type ComponentId = EntityId;

/// Monotonic allocator for `EntityId`s, owned by the `World`.
#[derive(Debug)]
pub struct EntityAllocator {
    next: u64,
}

impl EntityAllocator {
    pub fn new() -> Self {
        // 0 is reserved as EntityId::NONE.
        Self { next: 1 }
    }

    pub fn alloc(&mut self) -> EntityId {
        let id = self.next;
        assert!(id != 0, "entity id counter wrapped around to zero");
        self.next = self
            .next
            .checked_add(1)
            .expect("entity id space exhausted");
        EntityId(id)
    }

    /// Allocate `count` contiguous ids, returning the first.
    pub fn alloc_n(&mut self, count: usize) -> EntityId {
        let first = self.next;
        assert!(first != 0, "entity id counter wrapped around to zero");
        self.next = self
            .next
            .checked_add(count as u64)
            .expect("entity id space exhausted");
        EntityId(first)
    }
}

impl Default for EntityAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Entity location within a table: `(type_id, row)`.
///
/// The source implementation packs this pair into a single 64-bit word;
/// kept as two fields here, which the design notes explicitly allow. The
/// all-zero value (`TypeId::NIL`, row `0`) is the sentinel meaning "this
/// entity is vacated in the active stage", distinct from the entity being
/// absent from the index entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Row {
    pub type_id: TypeId,
    pub row: usize,
}

impl Row {
    pub const VACATED: Row = Row {
        type_id: TypeId::NIL,
        row: 0,
    };

    pub fn is_vacated(self) -> bool {
        self.type_id.is_nil()
    }
}

/// Dense mapping from `EntityId` to its current `Row`.
///
/// Two instances exist in a `World`: the canonical index and, while an
/// iteration cycle is in progress, a shadow owned by the active `Stage`.
#[derive(Debug, Default)]
pub struct EntityIndex {
    map: FxHashMap<EntityId, Row>,
}

impl EntityIndex {
    pub fn new() -> Self {
        Self {
            map: FxHashMap::default(),
        }
    }

    pub fn get(&self, entity: EntityId) -> Option<Row> {
        self.map.get(&entity).copied()
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.map.contains_key(&entity)
    }

    pub fn insert(&mut self, entity: EntityId, row: Row) {
        self.map.insert(entity, row);
    }

    pub fn remove(&mut self, entity: EntityId) -> Option<Row> {
        self.map.remove(&entity)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn clear(&mut self) {
        self.map.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (EntityId, Row)> + '_ {
        self.map.iter().map(|(&e, &r)| (e, r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocator_is_monotonic_and_never_repeats() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.alloc();
        let b = alloc.alloc();
        assert_ne!(a, b);
        assert!(a.index() < b.index());
    }

    #[test]
    fn alloc_n_returns_contiguous_block() {
        let mut alloc = EntityAllocator::new();
        let first = alloc.alloc_n(10);
        let next = alloc.alloc();
        assert_eq!(next.index(), first.index() + 10);
    }

    #[test]
    fn vacated_row_is_distinct_from_absent() {
        let mut idx = EntityIndex::new();
        let e = EntityId(1);
        assert!(idx.get(e).is_none());
        idx.insert(e, Row::VACATED);
        assert_eq!(idx.get(e), Some(Row::VACATED));
        assert!(idx.contains(e));
    }
}
