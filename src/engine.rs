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

//! The mutation engine: `commit_w_family`, the single choke point every
//! structural change (`new`, `add`, `remove`, `delete`, the merge phase)
//! routes through. Everything else in the crate that moves an entity
//! between tables calls into here.

use crate::entity::{EntityId, Row};
use crate::observer::NotifyKind;
use crate::registry::TypeId;
use crate::world::World;

/// Move `entity` from whatever table it currently occupies (as seen by the
/// active index) to `target_type`, notifying observers for `to_add` and
/// `to_remove` along the way and applying prefab inheritance for `to_add`.
///
/// `target_type` is computed by the caller via `TypeRegistry::merge`;
/// `to_add`/`to_remove` are carried through only for notification scope and
/// prefab lookup, not to recompute the target.
///
/// Returns the entity's new `Row`.
pub fn commit_w_family(
    world: &mut World,
    entity: EntityId,
    target_type: TypeId,
    to_add: TypeId,
    to_remove: TypeId,
) -> Row {
    let iterating = world.in_progress;

    // Step 1: choose the active index and read the entity's current row
    // through it. During iteration, an entity untouched so far this cycle
    // has no shadow entry yet — its current row is still the canonical one,
    // but a `first_touch` mutation must not disturb canonical storage.
    let (current, first_touch) = if iterating {
        match world.stage.entity_index.get(entity) {
            Some(row) => (row, false),
            None => (
                world.entity_index.get(entity).unwrap_or(Row::VACATED),
                true,
            ),
        }
    } else {
        (world.entity_index.get(entity).unwrap_or(Row::VACATED), false)
    };

    // Step 2: no-op if already at the target type.
    if current.type_id == target_type {
        return current;
    }

    let old_type = current.type_id;
    let old_row = current.row;

    // Step 3: resolve/create the target table and insert a fresh row, in
    // canonical storage if not iterating, in the stage's shadow storage
    // (creating the shadow table on first use) if iterating.
    let new_row_index = if target_type.is_nil() {
        None
    } else if iterating {
        Some(world.shadow_table_mut(target_type).insert(entity))
    } else {
        Some(world.canonical_table_mut(target_type).insert(entity))
    };

    if !old_type.is_nil() {
        // Step 4a: post-merge on_remove only fires outside iteration — the
        // merge phase re-invokes this function with `iterating = false`,
        // which is when removals staged mid-cycle actually notify.
        if !iterating {
            dispatch(world, NotifyKind::Remove, old_type, old_row, 1, to_remove);
        }

        // Step 4b: copy the overlap from the old row into the new one,
        // reading from wherever the old row currently lives (canonical on
        // first touch, the stage's shadow table otherwise) and writing into
        // wherever the new row was just created.
        if let Some(new_row_index) = new_row_index {
            let old_bytes = if first_touch {
                world.canonical_table_snapshot(old_type, old_row)
            } else {
                world.shadow_table_snapshot(old_type, old_row)
            };
            if iterating {
                let dst = world.shadow_table_mut(target_type);
                write_columns(dst, new_row_index, &old_bytes);
            } else {
                let dst = world.canonical_table_mut(target_type);
                write_columns(dst, new_row_index, &old_bytes);
            }
        }

        // Step 4c: delete the old row, but only from storage we are
        // allowed to mutate right now. Canonical storage is read-only for
        // structural changes while iterating; a first-touch old row always
        // lives there, so it is left alone until the merge phase handles it.
        if !iterating {
            if let Some(swapped) = world.canonical_table_mut(old_type).delete(old_row) {
                world.entity_index.insert(swapped, Row { type_id: old_type, row: old_row });
            }
        } else if !first_touch {
            if let Some(swapped) = world.shadow_table_mut(old_type).delete(old_row) {
                world.stage.entity_index.insert(swapped, Row { type_id: old_type, row: old_row });
            }
        }
    }

    if let Some(new_row_index) = new_row_index {
        let new_row = Row {
            type_id: target_type,
            row: new_row_index,
        };

        // Step 5: write the new row into the active index, then fire
        // pre-merge on_add notifications (forcing `in_progress` for the
        // duration, and triggering an immediate merge if this call came
        // from outside iteration and something fired), then apply prefab
        // inheritance for the newly added components.
        if iterating {
            world.stage.entity_index.insert(entity, new_row);
        } else {
            world.entity_index.insert(entity, new_row);
        }

        let fired = dispatch(world, NotifyKind::Add, target_type, new_row_index, 1, to_add);
        if !iterating && fired {
            world.merge();
        }

        world.apply_prefab_inheritance(entity, target_type, to_add, new_row);
        world.schedule_dirty = true;
        new_row
    } else {
        // Step 6: target is nil. While iterating, leave a vacated marker so
        // a later read during the same cycle knows the entity has no row;
        // outside iteration, just drop the index entry.
        if iterating {
            world.stage.entity_index.insert(entity, Row::VACATED);
        } else {
            world.entity_index.remove(entity);
        }
        world.schedule_dirty = true;
        Row::VACATED
    }
}

/// Bulk variant for `World::new_n`: grows a table by `count` rows in one
/// shot and fires exactly one `on_add` dispatch spanning the whole range,
/// rather than `count` individual ones.
pub fn commit_bulk_new(world: &mut World, type_id: TypeId, count: usize, first_entity: EntityId) -> usize {
    let first_row = if world.in_progress {
        world.shadow_table_mut(type_id).grow(count, first_entity)
    } else {
        world.canonical_table_mut(type_id).grow(count, first_entity)
    };
    for i in 0..count {
        let entity = EntityId(first_entity.index() + i as u64);
        let row = Row {
            type_id,
            row: first_row + i,
        };
        if world.in_progress {
            world.stage.entity_index.insert(entity, row);
        } else {
            world.entity_index.insert(entity, row);
        }
    }
    dispatch(world, NotifyKind::Add, type_id, first_row, count, type_id);
    world.schedule_dirty = true;
    first_row
}

fn write_columns(dst_table: &mut crate::archetype::Table, dst_row: usize, bytes_by_component: &[(EntityId, Vec<u8>)]) {
    for (component, bytes) in bytes_by_component {
        if let Some(col) = dst_table.column_index(*component) {
            dst_table.column_mut(col).write(dst_row, bytes);
        }
    }
}

/// Dispatch `kind` notifications for `trigger_type` against `[offset,
/// offset + limit)` of `table_type`. Returns whether any observer fired.
pub fn dispatch(
    world: &mut World,
    kind: NotifyKind,
    table_type: TypeId,
    offset: usize,
    limit: usize,
    trigger_type: TypeId,
) -> bool {
    if trigger_type.is_nil() {
        return false;
    }
    let observers: smallvec::SmallVec<[EntityId; 4]> = world
        .observers
        .observers_for(kind, trigger_type)
        .iter()
        .copied()
        .collect();
    if observers.is_empty() {
        return false;
    }

    let prev_in_progress = world.in_progress;
    if kind == NotifyKind::Add {
        world.in_progress = true;
    }

    let mut fired = false;
    for observer in observers {
        let Some(decl) = world.observer_decl(observer) else {
            continue;
        };
        if !decl.is_enabled() {
            continue;
        }
        let column_indices: smallvec::SmallVec<[usize; 8]> = decl
            .components()
            .map(|c| world.registry.index_of(table_type, c).unwrap_or(usize::MAX))
            .collect();

        let ctx = crate::observer::DispatchContext {
            observer,
            kind,
            trigger_type,
            table_type,
            column_indices: &column_indices,
            offset,
            limit,
        };

        if let Some(mut executor) = world.take_executor() {
            executor.handle(world, &ctx);
            world.set_executor(executor);
        }
        fired = true;
    }

    if kind == NotifyKind::Add {
        world.in_progress = prev_in_progress;
    }
    fired
}
