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

//! The notification dispatcher: three `TypeId`-indexed observer maps
//! (`on_add`, `on_remove`, `on_set`), and the logic that walks a map entry
//! and hands each matching observer a view of the rows that triggered it.
//!
//! Observers are matched by exact `TypeId`: an observer registered for a
//! set of components fires only when a commit's `to_add`/`to_remove`/`set`
//! target interns to that same `TypeId`. A fuller "any subset" match is
//! outside what this crate's notification model commits to.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::entity::EntityId;
use crate::registry::TypeId;

/// Which of the three notification kinds a dispatch belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Add,
    Remove,
    Set,
}

/// A single dispatch: which observer fired, for what reason, against what
/// rows of which table.
pub struct DispatchContext<'a> {
    pub observer: EntityId,
    pub kind: NotifyKind,
    pub trigger_type: TypeId,
    pub table_type: TypeId,
    pub column_indices: &'a [usize],
    pub offset: usize,
    pub limit: usize,
}

/// User hook invoked once per matching observer per dispatch. The core
/// does not interpret the callback's effects beyond honouring `in_progress`
/// for any re-entrant commits it makes through `world`.
pub trait ObserverExecutor: Send + Sync {
    fn handle(&mut self, world: &mut crate::world::World, ctx: &DispatchContext<'_>);
}

/// `TypeId -> ordered observer list`, one such map per notification kind.
#[derive(Debug, Default)]
pub struct ObserverSet {
    on_add: FxHashMap<TypeId, SmallVec<[EntityId; 4]>>,
    on_remove: FxHashMap<TypeId, SmallVec<[EntityId; 4]>>,
    on_set: FxHashMap<TypeId, SmallVec<[EntityId; 4]>>,
}

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    fn map_for(&self, kind: NotifyKind) -> &FxHashMap<TypeId, SmallVec<[EntityId; 4]>> {
        match kind {
            NotifyKind::Add => &self.on_add,
            NotifyKind::Remove => &self.on_remove,
            NotifyKind::Set => &self.on_set,
        }
    }

    fn map_for_mut(&mut self, kind: NotifyKind) -> &mut FxHashMap<TypeId, SmallVec<[EntityId; 4]>> {
        match kind {
            NotifyKind::Add => &mut self.on_add,
            NotifyKind::Remove => &mut self.on_remove,
            NotifyKind::Set => &mut self.on_set,
        }
    }

    /// Register `observer` to fire on `kind` events whose trigger type is
    /// exactly `type_id`. Returns `false` (no-op) if already registered for
    /// this exact `(kind, type_id)` pair — registering an observer kind
    /// twice for the same type is a silent idempotent no-op, not an error.
    pub fn register(&mut self, kind: NotifyKind, type_id: TypeId, observer: EntityId) -> bool {
        let list = self.map_for_mut(kind).entry(type_id).or_default();
        if list.contains(&observer) {
            false
        } else {
            list.push(observer);
            true
        }
    }

    pub fn unregister(&mut self, kind: NotifyKind, type_id: TypeId, observer: EntityId) {
        if let Some(list) = self.map_for_mut(kind).get_mut(&type_id) {
            list.retain(|&o| o != observer);
        }
    }

    /// Observers registered for `(kind, type_id)`, in registration order.
    pub fn observers_for(&self, kind: NotifyKind, type_id: TypeId) -> &[EntityId] {
        self.map_for(kind)
            .get(&type_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    pub fn count(&self, kind: NotifyKind, type_id: TypeId) -> usize {
        self.observers_for(kind, type_id).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tid(n: u32) -> TypeId {
        TypeId(n)
    }

    #[test]
    fn register_is_idempotent_per_observer() {
        let mut set = ObserverSet::new();
        assert!(set.register(NotifyKind::Add, tid(1), EntityId(5)));
        assert!(!set.register(NotifyKind::Add, tid(1), EntityId(5)));
        assert_eq!(set.count(NotifyKind::Add, tid(1)), 1);
    }

    #[test]
    fn kinds_are_independent() {
        let mut set = ObserverSet::new();
        set.register(NotifyKind::Add, tid(1), EntityId(1));
        set.register(NotifyKind::Remove, tid(1), EntityId(2));
        assert_eq!(set.observers_for(NotifyKind::Add, tid(1)), &[EntityId(1)]);
        assert_eq!(set.observers_for(NotifyKind::Remove, tid(1)), &[EntityId(2)]);
        assert!(set.observers_for(NotifyKind::Set, tid(1)).is_empty());
    }

    #[test]
    fn unregister_removes_only_that_observer() {
        let mut set = ObserverSet::new();
        set.register(NotifyKind::Add, tid(1), EntityId(1));
        set.register(NotifyKind::Add, tid(1), EntityId(2));
        set.unregister(NotifyKind::Add, tid(1), EntityId(1));
        assert_eq!(set.observers_for(NotifyKind::Add, tid(1)), &[EntityId(2)]);
    }
}
