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

//! The staging layer: a scratch overlay that absorbs structural writes
//! made while the world is iterating, so tables currently being scanned by
//! a system are never mutated out from under it.

use rustc_hash::FxHashMap;

use crate::archetype::Table;
use crate::entity::{EntityId, EntityIndex, Row};
use crate::registry::TypeId;

/// Per-iteration overlay: a shadow entity index, shadow tables keyed by
/// `TypeId`, and the pending add/remove/delete bookkeeping the merge
/// phase drains at the end of a cycle.
#[derive(Default)]
pub struct Stage {
    pub(crate) entity_index: EntityIndex,
    pub(crate) shadow_tables: FxHashMap<TypeId, Table>,
    /// Components queued by `add()` for an entity, merged (unioned) if
    /// `add` is called more than once on the same entity in one cycle.
    pub(crate) add_stage: FxHashMap<EntityId, TypeId>,
    /// Components queued by `remove()`, same union-on-repeat behavior.
    pub(crate) remove_stage: FxHashMap<EntityId, TypeId>,
    /// Everything removed from an entity so far this cycle — carried
    /// through to the merge so observers still see the removed
    /// components' last values at merge time (§5's ordering guarantee:
    /// staged removals win over simultaneous adds already committed
    /// canonically).
    pub(crate) remove_merge: FxHashMap<EntityId, TypeId>,
    pub(crate) delete_stage: Vec<EntityId>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entity_index.is_empty()
            && self.add_stage.is_empty()
            && self.remove_stage.is_empty()
            && self.delete_stage.is_empty()
    }

    /// Shadow row for `entity`, if this stage has touched it yet.
    pub fn row(&self, entity: EntityId) -> Option<Row> {
        self.entity_index.get(entity)
    }

    pub fn reset(&mut self) {
        self.entity_index.clear();
        self.shadow_tables.clear();
        self.add_stage.clear();
        self.remove_stage.clear();
        self.remove_merge.clear();
        self.delete_stage.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stage_is_empty() {
        let stage = Stage::new();
        assert!(stage.is_empty());
        assert!(stage.row(EntityId(1)).is_none());
    }

    #[test]
    fn reset_clears_everything() {
        let mut stage = Stage::new();
        stage.delete_stage.push(EntityId(1));
        stage.entity_index.insert(EntityId(2), Row::VACATED);
        assert!(!stage.is_empty());
        stage.reset();
        assert!(stage.is_empty());
    }
}
