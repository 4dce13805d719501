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

//! Archetype (`Table`) storage: structure-of-arrays columns keyed by a
//! canonical `TypeId`, with row allocation and swap-removal.
//!
//! Unlike the source this crate evolved from, columns have no static Rust
//! type: a component is a declared byte size, and every column is a flat
//! `Vec<u8>`. Transfer between tables is always a `memcpy`, never a typed
//! move, which is what makes prefab inheritance and staged merge able to
//! operate without knowing anything about component layout.

use crate::entity::{ComponentId, EntityId};
use crate::registry::TypeId;

/// Type-erased, dense column of fixed-size elements.
pub struct Column {
    data: Vec<u8>,
    element_size: usize,
}

impl Column {
    pub fn new(element_size: usize) -> Self {
        Self {
            data: Vec::new(),
            element_size,
        }
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn len(&self) -> usize {
        if self.element_size == 0 {
            0
        } else {
            self.data.len() / self.element_size
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append one zero-filled element, returning its row index.
    pub fn push_zeroed(&mut self) -> usize {
        let row = self.len();
        self.data.resize(self.data.len() + self.element_size, 0);
        row
    }

    /// Append `n` zero-filled elements, returning the first row index.
    pub fn push_n_zeroed(&mut self, n: usize) -> usize {
        let row = self.len();
        self.data.resize(self.data.len() + self.element_size * n, 0);
        row
    }

    pub fn reserve_rows(&mut self, additional: usize) {
        self.data.reserve(additional * self.element_size);
    }

    pub fn get(&self, row: usize) -> Option<&[u8]> {
        let offset = row * self.element_size;
        self.data.get(offset..offset + self.element_size)
    }

    pub fn get_mut(&mut self, row: usize) -> Option<&mut [u8]> {
        let offset = row * self.element_size;
        self.data.get_mut(offset..offset + self.element_size)
    }

    /// Overwrite the cell at `row` with `bytes`. `bytes.len()` must equal
    /// `element_size`; this is the boundary checked by `World::set`.
    pub fn write(&mut self, row: usize, bytes: &[u8]) {
        let cell = self.get_mut(row).expect("row out of bounds");
        cell.copy_from_slice(bytes);
    }

    /// Swap-remove the element at `row`: move the last element into its
    /// place (if it wasn't already last) and truncate by one element.
    pub fn swap_remove(&mut self, row: usize) {
        let last = self.len() - 1;
        if row != last {
            let (head, tail) = self.data.split_at_mut(last * self.element_size);
            let dst = &mut head[row * self.element_size..(row + 1) * self.element_size];
            dst.copy_from_slice(&tail[..self.element_size]);
        }
        self.data.truncate(last * self.element_size);
    }
}

/// Archetype: owns one column per component in its `TypeId`, plus a dense
/// `entities` array that plays the role of the spec's row-0 entity column.
pub struct Table {
    type_id: TypeId,
    /// Canonical, sorted component list — same order as the registry's.
    components: Vec<ComponentId>,
    entities: Vec<EntityId>,
    columns: Vec<Column>,
}

impl Table {
    pub fn new(type_id: TypeId, components: Vec<ComponentId>, sizes: &[usize]) -> Self {
        assert_eq!(components.len(), sizes.len());
        let columns = sizes.iter().map(|&s| Column::new(s)).collect();
        Self {
            type_id,
            components,
            entities: Vec::new(),
            columns,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// 0-based column index for `component`, via binary search over the
    /// table's (canonically sorted) component list.
    pub fn column_index(&self, component: ComponentId) -> Option<usize> {
        self.components.binary_search(&component).ok()
    }

    pub fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    pub fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    pub fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn reserve_rows(&mut self, additional: usize) {
        self.entities.reserve(additional);
        for column in &mut self.columns {
            column.reserve_rows(additional);
        }
    }

    /// Append an uninitialised row for `entity`. Column cells are
    /// zero-filled; callers (the mutation engine, prefab inheritance, or
    /// `set`) are responsible for populating them.
    pub fn insert(&mut self, entity: EntityId) -> usize {
        let row = self.entities.len();
        self.entities.push(entity);
        for column in &mut self.columns {
            column.push_zeroed();
        }
        row
    }

    /// Append `n` rows in one shot, with contiguous entity ids starting at
    /// `first_entity`. Returns the first row index.
    pub fn grow(&mut self, n: usize, first_entity: EntityId) -> usize {
        let first_row = self.entities.len();
        self.entities.reserve(n);
        for i in 0..n {
            self.entities.push(EntityId(first_entity.index() + i as u64));
        }
        for column in &mut self.columns {
            column.push_n_zeroed(n);
        }
        first_row
    }

    /// Swap-remove `row`. Returns the entity that was moved into `row`
    /// from the end of the table, if any (the caller must fix up that
    /// entity's index entry).
    pub fn delete(&mut self, row: usize) -> Option<EntityId> {
        debug_assert!(row < self.entities.len());
        self.entities.swap_remove(row);
        for column in &mut self.columns {
            column.swap_remove(row);
        }
        if row < self.entities.len() {
            Some(self.entities[row])
        } else {
            None
        }
    }
}

/// Copy the overlapping columns of one row into another table's row using
/// the sorted-merge algorithm: walk both component lists in parallel,
/// `memcpy` on a match, advance the side with the smaller component id.
/// O(|src| + |dst|), no hashing.
pub fn copy_row_sorted_merge(src: &Table, src_row: usize, dst: &mut Table, dst_row: usize) {
    let src_components = src.components();
    let dst_components = dst.components().to_vec();
    let (mut i, mut j) = (0, 0);
    while i < src_components.len() && j < dst_components.len() {
        match src_components[i].cmp(&dst_components[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                let bytes = src.column(i).get(src_row).expect("src row in bounds");
                let bytes = bytes.to_vec();
                dst.column_mut(j).write(dst_row, &bytes);
                i += 1;
                j += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(n: u64) -> ComponentId {
        EntityId(n)
    }

    #[test]
    fn insert_and_column_alignment() {
        let mut t = Table::new(TypeId::NIL, vec![cid(1), cid(2)], &[4, 8]);
        let r0 = t.insert(EntityId(100));
        let r1 = t.insert(EntityId(101));
        assert_eq!(r0, 0);
        assert_eq!(r1, 1);
        assert_eq!(t.len(), 2);
        for i in 0..t.components().len() {
            assert_eq!(t.column(i).len(), t.len());
        }
    }

    #[test]
    fn swap_remove_updates_last_row() {
        let mut t = Table::new(TypeId::NIL, vec![cid(1)], &[4]);
        let e0 = EntityId(10);
        let e1 = EntityId(11);
        t.insert(e0);
        t.insert(e1);
        t.column_mut(0).write(0, &1i32.to_ne_bytes());
        t.column_mut(0).write(1, &2i32.to_ne_bytes());

        let swapped = t.delete(0);
        assert_eq!(swapped, Some(e1));
        assert_eq!(t.len(), 1);
        assert_eq!(t.entities()[0], e1);
        assert_eq!(t.column(0).get(0).unwrap(), &2i32.to_ne_bytes());
    }

    #[test]
    fn grow_assigns_contiguous_entities() {
        let mut t = Table::new(TypeId::NIL, vec![], &[]);
        let first = t.grow(5, EntityId(7));
        assert_eq!(first, 0);
        assert_eq!(t.entities(), &[7, 8, 9, 10, 11].map(EntityId));
    }

    #[test]
    fn sorted_merge_copies_only_overlap() {
        let mut src = Table::new(TypeId::NIL, vec![cid(1), cid(2)], &[4, 4]);
        let mut dst = Table::new(TypeId::NIL, vec![cid(2), cid(3)], &[4, 4]);
        src.insert(EntityId(1));
        src.column_mut(0).write(0, &111i32.to_ne_bytes());
        src.column_mut(1).write(0, &222i32.to_ne_bytes());
        dst.insert(EntityId(1));

        copy_row_sorted_merge(&src, 0, &mut dst, 0);

        assert_eq!(dst.column(0).get(0).unwrap(), &222i32.to_ne_bytes());
        assert_eq!(dst.column(1).get(0).unwrap(), &0i32.to_ne_bytes());
    }
}
