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

//! Type registry: interns canonical, sorted component-id sets behind a
//! stable `TypeId`, and provides the set algebra (`merge`, `contains`,
//! `index_of`) the mutation engine and public API build on.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::entity::ComponentId;

/// Inline capacity for a type's component list before it spills to the heap.
/// Matches the bundle arity the teacher repo bounds itself to.
pub const TYPICAL_TYPE_ARITY: usize = 8;

pub type ComponentList = SmallVec<[ComponentId; TYPICAL_TYPE_ARITY]>;

/// Opaque handle for a canonical, duplicate-free, sorted list of
/// `ComponentId`s. `NIL` (`0`) is the empty type: no table, no row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub const NIL: TypeId = TypeId(0);

    pub fn is_nil(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn index(self) -> usize {
        debug_assert!(!self.is_nil(), "TypeId::NIL has no table slot");
        (self.0 - 1) as usize
    }
}

/// Interns component sets behind monotonic `TypeId`s and implements the
/// set algebra (`merge`, `contains`, `index_of`) all structural changes
/// route through.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    by_components: FxHashMap<ComponentList, TypeId>,
    components_of: Vec<ComponentList>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            by_components: FxHashMap::default(),
            components_of: Vec::new(),
        }
    }

    /// Component list for a `TypeId`. Empty for `TypeId::NIL`.
    pub fn components(&self, type_id: TypeId) -> &[ComponentId] {
        if type_id.is_nil() {
            &[]
        } else {
            &self.components_of[type_id.index()]
        }
    }

    /// Intern an arbitrary (possibly unsorted, possibly duplicate-bearing)
    /// component list, returning its canonical `TypeId`. Sorting regardless
    /// of input order is what makes the interning canonical: any
    /// permutation of the same set maps to the same id.
    pub fn intern(&mut self, components: &[ComponentId]) -> TypeId {
        let mut sorted: ComponentList = components.iter().copied().collect();
        sorted.sort_unstable();
        sorted.dedup();
        self.intern_sorted(sorted)
    }

    fn intern_sorted(&mut self, sorted: ComponentList) -> TypeId {
        if sorted.is_empty() {
            return TypeId::NIL;
        }
        if let Some(&id) = self.by_components.get(&sorted) {
            return id;
        }
        self.components_of.push(sorted.clone());
        let id = TypeId(self.components_of.len() as u32);
        self.by_components.insert(sorted, id);
        id
    }

    /// `union(base, to_add)` then `difference(_, to_remove)`, re-interned.
    /// `to_add`/`to_remove` may be `TypeId::NIL`, treated as the empty set.
    pub fn merge(&mut self, base: TypeId, to_add: TypeId, to_remove: TypeId) -> TypeId {
        let added = sorted_union(self.components(base), self.components(to_add));
        let remove_list = self.components(to_remove);
        let result: ComponentList = if remove_list.is_empty() {
            added
        } else {
            sorted_difference(&added, remove_list)
        };
        self.intern_sorted(result)
    }

    /// 0-based column position of `component` within `type_id`'s sorted
    /// list, via binary search, or `None` if absent.
    pub fn index_of(&self, type_id: TypeId, component: ComponentId) -> Option<usize> {
        self.components(type_id)
            .binary_search(&component)
            .ok()
    }

    /// Set containment: does `super_` carry the components of `sub`?
    /// `match_all = true` requires every component of `sub`; `false`
    /// requires at least one. Prefab-chain extension is the caller's
    /// responsibility (see `World::has`/`World::has_any`), since it needs
    /// the prefab relation and entity index, not just set algebra.
    pub fn contains(&self, super_: TypeId, sub: TypeId, match_all: bool) -> bool {
        let super_list = self.components(super_);
        let sub_list = self.components(sub);
        if sub_list.is_empty() {
            return true;
        }
        if match_all {
            sub_list
                .iter()
                .all(|c| super_list.binary_search(c).is_ok())
        } else {
            sub_list
                .iter()
                .any(|c| super_list.binary_search(c).is_ok())
        }
    }

    /// Number of interned non-nil types.
    pub fn len(&self) -> usize {
        self.components_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components_of.is_empty()
    }
}

/// Sorted-merge union: walk both lists in parallel, advancing the side
/// with the smaller id, taking both on a tie. O(|a| + |b|), no hashing.
fn sorted_union(a: &[ComponentId], b: &[ComponentId]) -> ComponentList {
    let mut out = ComponentList::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

/// Sorted-merge difference: `a` minus everything present in `b`.
fn sorted_difference(a: &[ComponentId], b: &[ComponentId]) -> ComponentList {
    let mut out = ComponentList::with_capacity(a.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;

    fn id(n: u64) -> ComponentId {
        EntityId(n)
    }

    #[test]
    fn intern_is_canonical_regardless_of_input_order() {
        let mut reg = TypeRegistry::new();
        let a = reg.intern(&[id(3), id(1), id(2)]);
        let b = reg.intern(&[id(1), id(2), id(3)]);
        let c = reg.intern(&[id(2), id(3), id(1), id(1)]);
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(reg.components(a), &[id(1), id(2), id(3)][..]);
    }

    #[test]
    fn empty_set_interns_to_nil() {
        let mut reg = TypeRegistry::new();
        assert_eq!(reg.intern(&[]), TypeId::NIL);
    }

    #[test]
    fn merge_adds_then_removes() {
        let mut reg = TypeRegistry::new();
        let base = reg.intern(&[id(1), id(2)]);
        let to_add = reg.intern(&[id(3)]);
        let to_remove = reg.intern(&[id(1)]);
        let merged = reg.merge(base, to_add, to_remove);
        assert_eq!(reg.components(merged), &[id(2), id(3)][..]);
    }

    #[test]
    fn merge_with_nil_add_and_remove_is_identity() {
        let mut reg = TypeRegistry::new();
        let base = reg.intern(&[id(5), id(6)]);
        let merged = reg.merge(base, TypeId::NIL, TypeId::NIL);
        assert_eq!(merged, base);
    }

    #[test]
    fn index_of_matches_sorted_position() {
        let mut reg = TypeRegistry::new();
        let t = reg.intern(&[id(10), id(20), id(30)]);
        assert_eq!(reg.index_of(t, id(20)), Some(1));
        assert_eq!(reg.index_of(t, id(99)), None);
    }

    #[test]
    fn contains_match_all_vs_any() {
        let mut reg = TypeRegistry::new();
        let super_ = reg.intern(&[id(1), id(2), id(3)]);
        let both = reg.intern(&[id(1), id(2)]);
        let one_missing = reg.intern(&[id(2), id(9)]);
        assert!(reg.contains(super_, both, true));
        assert!(!reg.contains(super_, one_missing, true));
        assert!(reg.contains(super_, one_missing, false));
    }
}
