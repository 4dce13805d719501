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

//! `World`: the public entity API (§4.7) and the glue that holds the type
//! registry, canonical tables, the active stage, and the observer set
//! together. Every structural operation bottoms out in
//! [`crate::engine::commit_w_family`]; `World` itself owns the storage
//! `engine` reaches into and the bootstrap of the three built-in
//! components every world needs before `new_component` can run.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::archetype::Table;
use crate::component::{ComponentDecl, NameRef, ObserverDecl};
use crate::engine;
use crate::entity::{ComponentId, EntityAllocator, EntityId, EntityIndex, Row};
use crate::error::{EcsError, Result};
use crate::observer::{NotifyKind, ObserverExecutor, ObserverSet};
use crate::registry::TypeId;
use crate::registry::TypeRegistry;
use crate::stage::Stage;

/// The three built-in components every world bootstraps before any call to
/// `new_component` is possible (that call itself attaches `ComponentDecl`
/// and `NameRef` to the components it mints).
struct Builtins {
    component_decl: ComponentId,
    name_ref: ComponentId,
    observer_decl: ComponentId,
}

pub struct World {
    pub(crate) allocator: EntityAllocator,
    pub(crate) registry: TypeRegistry,
    pub(crate) tables: FxHashMap<TypeId, Table>,
    pub(crate) entity_index: EntityIndex,
    pub(crate) stage: Stage,
    pub(crate) observers: ObserverSet,
    pub(crate) in_progress: bool,
    pub(crate) schedule_dirty: bool,
    pub(crate) component_sizes: FxHashMap<ComponentId, usize>,
    pub(crate) prefab_relations: FxHashMap<TypeId, EntityId>,
    executor: Option<Box<dyn ObserverExecutor>>,
    builtins: Builtins,
    names: Vec<String>,
    name_lookup: FxHashMap<String, ComponentId>,
}

impl World {
    pub fn new() -> Self {
        let mut allocator = EntityAllocator::new();
        let mut registry = TypeRegistry::new();
        let mut tables = FxHashMap::default();
        let mut entity_index = EntityIndex::new();
        let mut component_sizes = FxHashMap::default();

        // Bootstrap the three built-ins directly: they must exist before
        // `new_component` (which attaches them to everything it mints) can
        // run at all.
        let component_decl = allocator.alloc();
        let name_ref = allocator.alloc();
        let observer_decl = allocator.alloc();
        component_sizes.insert(component_decl, std::mem::size_of::<ComponentDecl>());
        component_sizes.insert(name_ref, std::mem::size_of::<NameRef>());
        component_sizes.insert(observer_decl, std::mem::size_of::<ObserverDecl>());

        let decl_type = registry.intern(&[component_decl, name_ref]);
        let decl_sizes = [std::mem::size_of::<ComponentDecl>(), std::mem::size_of::<NameRef>()];
        for id in [component_decl, name_ref, observer_decl] {
            let table = tables
                .entry(decl_type)
                .or_insert_with(|| Table::new(decl_type, registry.components(decl_type).to_vec(), &decl_sizes));
            let row = table.insert(id);
            entity_index.insert(id, Row { type_id: decl_type, row });
        }

        let mut world = Self {
            allocator,
            registry,
            tables,
            entity_index,
            stage: Stage::new(),
            observers: ObserverSet::new(),
            in_progress: false,
            schedule_dirty: false,
            component_sizes,
            prefab_relations: FxHashMap::default(),
            executor: None,
            builtins: Builtins {
                component_decl,
                name_ref,
                observer_decl,
            },
            names: Vec::new(),
            name_lookup: FxHashMap::default(),
        };

        world.write_builtin_decl(component_decl, std::mem::size_of::<ComponentDecl>(), "ComponentDecl");
        world.write_builtin_decl(name_ref, std::mem::size_of::<NameRef>(), "NameRef");
        world.write_builtin_decl(observer_decl, std::mem::size_of::<ObserverDecl>(), "ObserverDecl");

        debug!(component_decl = ?component_decl, name_ref = ?name_ref, observer_decl = ?observer_decl, "world bootstrapped");
        world
    }

    fn write_builtin_decl(&mut self, id: ComponentId, size: usize, name: &str) {
        let row = self.entity_index.get(id).expect("bootstrap entity registered");
        let string_id = self.intern_name(name);
        let table = self.tables.get_mut(&row.type_id).expect("bootstrap table exists");
        let decl_col = table.column_index(self.builtins.component_decl).expect("decl column");
        table.column_mut(decl_col).write(row.row, bytemuck::bytes_of(&ComponentDecl::new(size)));
        let name_col = table.column_index(self.builtins.name_ref).expect("name column");
        table.column_mut(name_col).write(row.row, bytemuck::bytes_of(&NameRef { string_id }));
    }

    /// Appends `name` to the name arena, returning its `string_id`. Callers
    /// are responsible for deduplicating by name first (`new_component`
    /// does, via `name_lookup`) — this always allocates a fresh slot.
    fn intern_name(&mut self, name: &str) -> u32 {
        let idx = self.names.len() as u32;
        self.names.push(name.to_string());
        idx
    }

    // ---- active-index plumbing used by `engine` --------------------------

    pub(crate) fn canonical_table_mut(&mut self, type_id: TypeId) -> &mut Table {
        let registry = &self.registry;
        let sizes = &self.component_sizes;
        self.tables.entry(type_id).or_insert_with(|| {
            let components = registry.components(type_id).to_vec();
            let col_sizes: Vec<usize> = components
                .iter()
                .map(|c| *sizes.get(c).unwrap_or_else(|| panic!("unregistered component {c}")))
                .collect();
            trace!(type_id = type_id.0, "creating canonical table");
            Table::new(type_id, components, &col_sizes)
        })
    }

    pub(crate) fn shadow_table_mut(&mut self, type_id: TypeId) -> &mut Table {
        let registry = &self.registry;
        let sizes = &self.component_sizes;
        self.stage.shadow_tables.entry(type_id).or_insert_with(|| {
            let components = registry.components(type_id).to_vec();
            let col_sizes: Vec<usize> = components
                .iter()
                .map(|c| *sizes.get(c).unwrap_or_else(|| panic!("unregistered component {c}")))
                .collect();
            trace!(type_id = type_id.0, "creating shadow table");
            Table::new(type_id, components, &col_sizes)
        })
    }

    pub(crate) fn canonical_table_snapshot(&self, type_id: TypeId, row: usize) -> Vec<(ComponentId, Vec<u8>)> {
        table_snapshot(self.tables.get(&type_id), row)
    }

    pub(crate) fn shadow_table_snapshot(&self, type_id: TypeId, row: usize) -> Vec<(ComponentId, Vec<u8>)> {
        table_snapshot(self.stage.shadow_tables.get(&type_id), row)
    }

    pub(crate) fn take_executor(&mut self) -> Option<Box<dyn ObserverExecutor>> {
        self.executor.take()
    }

    pub(crate) fn set_executor(&mut self, executor: Box<dyn ObserverExecutor>) {
        self.executor = Some(executor);
    }

    pub fn set_observer_executor(&mut self, executor: Box<dyn ObserverExecutor>) {
        self.executor = Some(executor);
    }

    pub(crate) fn observer_decl(&self, observer: EntityId) -> Option<ObserverDecl> {
        let row = self.entity_index.get(observer)?;
        let table = self.tables.get(&row.type_id)?;
        let col = table.column_index(self.builtins.observer_decl)?;
        let bytes = table.column(col).get(row.row)?;
        Some(*bytemuck::from_bytes::<ObserverDecl>(bytes))
    }

    /// Effective `(type_id, row)` for `entity`: the stage shadow if it has
    /// been touched this cycle, falling back to canonical — this is the
    /// "active index" read order §5 and §9's corrected open question both
    /// describe.
    pub(crate) fn effective_row(&self, entity: EntityId) -> Option<Row> {
        if self.in_progress {
            if let Some(row) = self.stage.entity_index.get(entity) {
                return Some(row);
            }
        }
        self.entity_index.get(entity)
    }

    /// Effective `TypeId` of `entity` honoring the active stage (§4.7's
    /// `type_of`).
    pub fn type_of(&self, entity: EntityId) -> TypeId {
        self.effective_row(entity).map(|r| r.type_id).unwrap_or(TypeId::NIL)
    }

    /// Is `entity` known to the index at all (has it been created and not
    /// yet fully deleted)? Named per the corrected `ecs_empty` open
    /// question in the design notes: this answers "known", not "has no
    /// components".
    pub fn is_known(&self, entity: EntityId) -> bool {
        self.entity_index.contains(entity) || (self.in_progress && self.stage.entity_index.contains(entity))
    }

    // ---- public entity API (§4.7) -----------------------------------------

    pub fn spawn(&mut self, type_id: TypeId) -> EntityId {
        let entity = self.allocator.alloc();
        if self.in_progress {
            self.stage.entity_index.insert(entity, Row::VACATED);
        } else {
            self.entity_index.insert(entity, Row::VACATED);
        }
        if !type_id.is_nil() {
            engine::commit_w_family(self, entity, type_id, type_id, TypeId::NIL);
        }
        entity
    }

    /// Allocate `count` contiguous ids and grow `type_id`'s table by one
    /// shot, firing a single bulk `on_add`.
    pub fn spawn_n(&mut self, type_id: TypeId, count: usize) -> Vec<EntityId> {
        assert!(!type_id.is_nil(), "new_n requires a non-nil type");
        assert!(count > 0, "new_n requires count > 0");
        let first = self.allocator.alloc_n(count);
        engine::commit_bulk_new(self, type_id, count, first);
        (0..count).map(|i| EntityId(first.index() + i as u64)).collect()
    }

    pub fn clone_entity(&mut self, source: EntityId, copy_value: bool) -> EntityId {
        let source_type = self.type_of(source);
        let entity = self.allocator.alloc();
        if self.in_progress {
            self.stage.entity_index.insert(entity, Row::VACATED);
        } else {
            self.entity_index.insert(entity, Row::VACATED);
        }
        if !source_type.is_nil() {
            engine::commit_w_family(self, entity, source_type, source_type, TypeId::NIL);
        }
        if copy_value && !source_type.is_nil() {
            let source_row = self.effective_row(source).expect("source entity must have a row");
            let new_row = self.effective_row(entity).expect("just committed");
            let bytes = if self.in_progress && self.stage.entity_index.get(source).is_some() {
                self.shadow_table_snapshot(source_row.type_id, source_row.row)
            } else {
                self.canonical_table_snapshot(source_row.type_id, source_row.row)
            };
            if self.in_progress {
                let dst = self.shadow_table_mut(new_row.type_id);
                for (component, data) in &bytes {
                    if let Some(col) = dst.column_index(*component) {
                        dst.column_mut(col).write(new_row.row, data);
                    }
                }
            } else {
                let dst = self.canonical_table_mut(new_row.type_id);
                for (component, data) in &bytes {
                    if let Some(col) = dst.column_index(*component) {
                        dst.column_mut(col).write(new_row.row, data);
                    }
                }
            }
            engine::dispatch(self, NotifyKind::Set, new_row.type_id, new_row.row, 1, source_type);
        }
        entity
    }

    pub fn delete(&mut self, entity: EntityId) {
        if !self.is_known(entity) {
            return; // idempotent no-op per §7
        }
        if self.in_progress {
            if !self.stage.delete_stage.contains(&entity) {
                self.stage.delete_stage.push(entity);
            }
        } else {
            let current = self.type_of(entity);
            engine::commit_w_family(self, entity, TypeId::NIL, TypeId::NIL, current);
            self.entity_index.remove(entity);
        }
    }

    pub fn add(&mut self, entity: EntityId, type_id: TypeId) {
        let current = self.type_of(entity);
        let target = self.registry.merge(current, type_id, TypeId::NIL);
        engine::commit_w_family(self, entity, target, type_id, TypeId::NIL);
        if self.in_progress {
            let prior = self.stage.add_stage.get(&entity).copied().unwrap_or(TypeId::NIL);
            let merged = self.registry.merge(prior, type_id, TypeId::NIL);
            self.stage.add_stage.insert(entity, merged);
        }
    }

    pub fn remove(&mut self, entity: EntityId, type_id: TypeId) {
        let current = self.type_of(entity);
        let target = self.registry.merge(current, TypeId::NIL, type_id);
        engine::commit_w_family(self, entity, target, TypeId::NIL, type_id);
        if self.in_progress {
            let prior = self.stage.remove_stage.get(&entity).copied().unwrap_or(TypeId::NIL);
            let merged = self.registry.merge(prior, type_id, TypeId::NIL);
            self.stage.remove_stage.insert(entity, merged);

            let prior_merge = self.stage.remove_merge.get(&entity).copied().unwrap_or(TypeId::NIL);
            let merged_merge = self.registry.merge(prior_merge, type_id, TypeId::NIL);
            self.stage.remove_merge.insert(entity, merged_merge);
        }
    }

    /// Drains `add_stage[entity]`/`remove_stage[entity]` (if any were
    /// accumulated by prior `add`/`remove` calls this cycle) and re-applies
    /// them. Since `add`/`remove` already commit immediately, this is
    /// normally a no-op by the time it runs (the engine's own idempotency
    /// check on matching target types), but is exposed because the public
    /// contract names it as a distinct operation callers may invoke.
    pub fn commit(&mut self, entity: EntityId) {
        let pending_add = self.stage.add_stage.remove(&entity).unwrap_or(TypeId::NIL);
        let pending_remove = self.stage.remove_stage.remove(&entity).unwrap_or(TypeId::NIL);
        if pending_add.is_nil() && pending_remove.is_nil() {
            return;
        }
        let current = self.type_of(entity);
        let target = self.registry.merge(current, pending_add, pending_remove);
        if self.in_progress {
            let prior_merge = self.stage.remove_merge.get(&entity).copied().unwrap_or(TypeId::NIL);
            let merged_merge = self.registry.merge(prior_merge, pending_remove, TypeId::NIL);
            self.stage.remove_merge.insert(entity, merged_merge);
        }
        engine::commit_w_family(self, entity, target, pending_add, pending_remove);
    }

    /// `type_id` must name exactly one component. Adds it first if the
    /// entity lacks it, then writes `bytes` into the cell and dispatches
    /// `on_set`.
    pub fn set(&mut self, entity: EntityId, type_id: TypeId, bytes: &[u8]) {
        let component = self.single_component(type_id);
        let declared_size = *self
            .component_sizes
            .get(&component)
            .unwrap_or_else(|| panic!("set: unknown component {component}"));
        assert_eq!(
            bytes.len(),
            declared_size,
            "set: payload size {} does not match declared size {} for component {component}",
            bytes.len(),
            declared_size
        );

        if !self.registry.contains(self.type_of(entity), type_id, true) {
            self.add(entity, type_id);
        }

        let row = self.effective_row(entity).expect("set: entity has no row after add");
        let use_shadow = self.in_progress && self.stage.entity_index.get(entity).is_some();
        if use_shadow {
            let table = self.shadow_table_mut(row.type_id);
            let col = table.column_index(component).expect("set: component column missing");
            table.column_mut(col).write(row.row, bytes);
        } else {
            let table = self.canonical_table_mut(row.type_id);
            let col = table.column_index(component).expect("set: component column missing");
            table.column_mut(col).write(row.row, bytes);
        }
        engine::dispatch(self, NotifyKind::Set, row.type_id, row.row, 1, type_id);
    }

    /// `type_id` must name exactly one component. Searches the active
    /// stage (while iterating), then canonical storage, then the prefab
    /// chain. `None` if absent anywhere.
    pub fn get(&self, entity: EntityId, type_id: TypeId) -> Option<Vec<u8>> {
        let component = self.single_component(type_id);
        let row = self.effective_row(entity)?;

        if let Some(index) = self.registry.index_of(row.type_id, component) {
            let table = if self.in_progress && self.stage.entity_index.get(entity).is_some() {
                self.stage.shadow_tables.get(&row.type_id)
            } else {
                self.tables.get(&row.type_id)
            };
            if let Some(bytes) = table.and_then(|t| t.column(index).get(row.row)) {
                return Some(bytes.to_vec());
            }
        }

        // Fall through to the prefab chain.
        let mut chain_type = row.type_id;
        loop {
            let Some((_, prefab)) = self.prefab_for_type(chain_type) else {
                return None;
            };
            let Some(prefab_row) = self.entity_index.get(prefab) else {
                return None;
            };
            if let Some(index) = self.registry.index_of(prefab_row.type_id, component) {
                if let Some(bytes) = self
                    .tables
                    .get(&prefab_row.type_id)
                    .and_then(|t| t.column(index).get(prefab_row.row))
                {
                    return Some(bytes.to_vec());
                }
            }
            chain_type = prefab_row.type_id;
        }
    }

    pub fn has(&self, entity: EntityId, type_id: TypeId, match_prefab: bool) -> bool {
        self.contains_effective(entity, type_id, true, match_prefab)
    }

    pub fn has_any(&self, entity: EntityId, type_id: TypeId, match_prefab: bool) -> bool {
        self.contains_effective(entity, type_id, false, match_prefab)
    }

    fn contains_effective(&self, entity: EntityId, type_id: TypeId, match_all: bool, match_prefab: bool) -> bool {
        let effective = self.type_of(entity);
        if self.registry.contains(effective, type_id, match_all) {
            return true;
        }
        if !match_prefab {
            return false;
        }
        let mut chain_type = effective;
        while let Some((_, prefab)) = self.prefab_for_type(chain_type) {
            let Some(prefab_row) = self.entity_index.get(prefab) else {
                break;
            };
            if self.registry.contains(prefab_row.type_id, type_id, match_all) {
                return true;
            }
            chain_type = prefab_row.type_id;
        }
        false
    }

    /// Finds a prefab relation whose key type is a subset of `type_id`.
    /// Relations are keyed by the marker component set that triggers
    /// inheritance (e.g. `{marker}`), not by the full composed type of the
    /// entity that carries the marker (e.g. `{marker, pos}`), so this is a
    /// containment scan rather than an exact-key lookup.
    fn prefab_for_type(&self, type_id: TypeId) -> Option<(TypeId, EntityId)> {
        self.prefab_relations
            .iter()
            .find(|(&rel_type, _)| self.registry.contains(type_id, rel_type, true))
            .map(|(&rel_type, &prefab)| (rel_type, prefab))
    }

    /// Interned by name; returns the existing id if `name` was already
    /// registered. Otherwise mints a fresh component entity carrying
    /// `ComponentDecl{size}` and `NameRef{name}`.
    pub fn new_component(&mut self, name: &str, size: usize) -> ComponentId {
        if let Some(&existing) = self.name_lookup.get(name) {
            return existing;
        }
        let entity = self.allocator.alloc();
        self.component_sizes.insert(entity, size);

        let decl_type = self.registry.intern(&[self.builtins.component_decl, self.builtins.name_ref]);
        if self.in_progress {
            self.stage.entity_index.insert(entity, Row::VACATED);
        } else {
            self.entity_index.insert(entity, Row::VACATED);
        }
        engine::commit_w_family(self, entity, decl_type, decl_type, TypeId::NIL);

        let row = self.effective_row(entity).expect("just committed");
        let string_id = self.intern_name(name);
        self.name_lookup.insert(name.to_string(), entity);

        let table = if self.in_progress {
            self.shadow_table_mut(row.type_id)
        } else {
            self.canonical_table_mut(row.type_id)
        };
        let decl_col = table.column_index(self.builtins.component_decl).expect("decl column");
        table.column_mut(decl_col).write(row.row, bytemuck::bytes_of(&ComponentDecl::new(size)));
        let name_col = table.column_index(self.builtins.name_ref).expect("name column");
        table.column_mut(name_col).write(row.row, bytemuck::bytes_of(&NameRef { string_id }));

        entity
    }

    fn single_component(&self, type_id: TypeId) -> ComponentId {
        let components = self.registry.components(type_id);
        assert_eq!(
            components.len(),
            1,
            "operation requires a type naming exactly one component, got {}",
            components.len()
        );
        components[0]
    }

    // ---- registration hooks (expansion) ------------------------------------

    pub fn add_prefab_relation(&mut self, type_id: TypeId, prefab: EntityId) {
        self.prefab_relations.insert(type_id, prefab);
    }

    pub fn prefab_of(&self, type_id: TypeId) -> Option<EntityId> {
        self.prefab_relations.get(&type_id).copied()
    }

    /// Attaches `observer` to one of the three per-kind inverted indices.
    /// Registering the same `(kind, type_id, observer)` pair twice is a
    /// silent no-op.
    pub fn register_observer(&mut self, kind: NotifyKind, type_id: TypeId, observer: EntityId) -> Result<()> {
        if type_id.is_nil() || self.registry.components(type_id).iter().any(|c| !self.component_sizes.contains_key(c)) {
            return Err(EcsError::UnknownObserverType);
        }
        self.observers.register(kind, type_id, observer);
        Ok(())
    }

    /// Mints an entity carrying an `ObserverDecl{components, enabled}`, the
    /// only route by which `dispatch` will actually find and invoke an
    /// observer entity registered via [`World::register_observer`].
    pub fn declare_observer(&mut self, components: &[ComponentId], enabled: bool) -> EntityId {
        let decl = ObserverDecl::new(components, enabled);
        let observer_decl_type = self.registry.intern(&[self.builtins.observer_decl]);
        let entity = self.spawn(observer_decl_type);
        self.set(entity, observer_decl_type, bytemuck::bytes_of(&decl));
        entity
    }

    pub(crate) fn apply_prefab_inheritance(&mut self, _entity: EntityId, target_type: TypeId, to_add: TypeId, new_row: Row) {
        if to_add.is_nil() {
            return;
        }
        let mut chain_type = target_type;
        loop {
            let Some((_, prefab)) = self.prefab_for_type(chain_type) else {
                break;
            };
            let Some(prefab_row) = self.entity_index.get(prefab) else {
                break;
            };
            for component in self.registry.components(to_add).to_vec() {
                let Some(src_index) = self.registry.index_of(prefab_row.type_id, component) else {
                    continue;
                };
                let bytes = self
                    .tables
                    .get(&prefab_row.type_id)
                    .and_then(|t| t.column(src_index).get(prefab_row.row))
                    .map(|b| b.to_vec());
                if let Some(bytes) = bytes {
                    let dst_table = if self.in_progress {
                        self.stage.shadow_tables.get_mut(&new_row.type_id)
                    } else {
                        self.tables.get_mut(&new_row.type_id)
                    };
                    if let Some(dst_table) = dst_table {
                        if let Some(dst_index) = dst_table.column_index(component) {
                            dst_table.column_mut(dst_index).write(new_row.row, &bytes);
                        }
                    }
                }
            }
            chain_type = prefab_row.type_id;
        }
    }

    pub fn take_schedule_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.schedule_dirty, false)
    }

    // ---- iteration / merge --------------------------------------------------

    /// Runs `f` with `in_progress` set, then merges the stage back into the
    /// canonical store. The entry point an external scheduler calls once
    /// per tick around the systems it runs.
    pub fn run_staged<F: FnOnce(&mut World)>(&mut self, f: F) {
        let was_in_progress = self.in_progress;
        self.in_progress = true;
        f(self);
        if !was_in_progress {
            self.merge();
        }
        self.in_progress = was_in_progress;
    }

    /// Drains the stage into the canonical store per §5's merge protocol.
    pub(crate) fn merge(&mut self) {
        debug!(
            staged_entities = self.stage.entity_index.len(),
            pending_deletes = self.stage.delete_stage.len(),
            "merge start"
        );
        let staged: Vec<(EntityId, Row)> = self.stage.entity_index.iter().collect();
        for (entity, staged_row) in staged {
            let canonical_type = self.entity_index.get(entity).map(|r| r.type_id).unwrap_or(TypeId::NIL);
            let remove_merge_type = self.stage.remove_merge.get(&entity).copied().unwrap_or(TypeId::NIL);
            let unioned = self.registry.merge(canonical_type, staged_row.type_id, TypeId::NIL);
            let target = self.registry.merge(unioned, TypeId::NIL, remove_merge_type);

            engine_commit_outside_iteration(self, entity, target, TypeId::NIL, remove_merge_type);

            if !staged_row.type_id.is_nil() {
                let bytes = table_snapshot(self.stage.shadow_tables.get(&staged_row.type_id), staged_row.row);
                if let Some(new_row) = self.entity_index.get(entity) {
                    if !new_row.type_id.is_nil() {
                        let dst = self.canonical_table_mut(new_row.type_id);
                        for (component, data) in &bytes {
                            if let Some(col) = dst.column_index(*component) {
                                dst.column_mut(col).write(new_row.row, data);
                            }
                        }
                    }
                }
            }
        }

        let deletes = std::mem::take(&mut self.stage.delete_stage);
        for entity in deletes {
            let current = self.entity_index.get(entity).map(|r| r.type_id).unwrap_or(TypeId::NIL);
            if !current.is_nil() {
                engine_commit_outside_iteration(self, entity, TypeId::NIL, TypeId::NIL, current);
            }
            self.entity_index.remove(entity);
        }

        self.stage.reset();
        debug!("merge end");
    }
}

/// `commit_w_family` assumes `world.in_progress` reflects whether we are
/// inside an iteration cycle; the merge phase always runs with it forced
/// false regardless of the outer `run_staged` call that triggered it.
fn engine_commit_outside_iteration(world: &mut World, entity: EntityId, target: TypeId, to_add: TypeId, to_remove: TypeId) {
    let was_in_progress = world.in_progress;
    world.in_progress = false;
    engine::commit_w_family(world, entity, target, to_add, to_remove);
    world.in_progress = was_in_progress;
}

fn table_snapshot(table: Option<&Table>, row: usize) -> Vec<(ComponentId, Vec<u8>)> {
    let Some(table) = table else { return Vec::new() };
    table
        .components()
        .iter()
        .enumerate()
        .filter_map(|(i, &component)| table.column(i).get(row).map(|bytes| (component, bytes.to_vec())))
        .collect()
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> (World, TypeId, TypeId) {
        let mut world = World::new();
        let pos = world.new_component("Pos", 8);
        let vel = world.new_component("Vel", 8);
        let pos_type = world.registry.intern(&[pos]);
        let vel_type = world.registry.intern(&[vel]);
        (world, pos_type, vel_type)
    }

    #[test]
    fn scenario_set_get_round_trip() {
        let (mut world, pos_type, vel_type) = setup();
        let both = world.registry.merge(pos_type, vel_type, TypeId::NIL);
        let e = world.spawn(both);
        world.set(e, pos_type, &1f64.to_ne_bytes());
        world.set(e, vel_type, &2f64.to_ne_bytes());
        assert_eq!(world.get(e, pos_type).unwrap(), 1f64.to_ne_bytes());
        assert_eq!(world.get(e, vel_type).unwrap(), 2f64.to_ne_bytes());
    }

    #[test]
    fn scenario_add_preserves_existing_value() {
        let (mut world, pos_type, vel_type) = setup();
        let e = world.spawn(pos_type);
        world.set(e, pos_type, &7f64.to_ne_bytes());
        world.add(e, vel_type);
        assert_eq!(world.get(e, pos_type).unwrap(), 7f64.to_ne_bytes());
        assert!(world.has(e, vel_type, false));
    }

    #[test]
    fn scenario_swap_remove_fixes_up_index() {
        let (mut world, pos_type, _vel_type) = setup();
        let e1 = world.spawn(pos_type);
        let e2 = world.spawn(pos_type);
        world.set(e2, pos_type, &42f64.to_ne_bytes());
        world.delete(e1);
        assert_eq!(world.get(e2, pos_type).unwrap(), 42f64.to_ne_bytes());
        assert_eq!(world.type_of(e2), pos_type);
    }

    #[test]
    fn scenario_staged_add_visible_to_self_only_before_merge() {
        let (mut world, _pos_type, vel_type) = setup();
        let e = world.spawn(TypeId::NIL);
        world.run_staged(|w| {
            w.add(e, vel_type);
            assert!(w.has(e, vel_type, false));
        });
        assert!(world.has(e, vel_type, false));
    }

    #[test]
    fn scenario_prefab_default_inheritance() {
        let (mut world, pos_type, _vel_type) = setup();
        let prefab = world.spawn(pos_type);
        world.set(prefab, pos_type, &9f64.to_ne_bytes());
        let prefab_marker = world.new_component("IsChildOfP", 0);
        let prefab_marker_type = world.registry.intern(&[prefab_marker]);
        world.add_prefab_relation(prefab_marker_type, prefab);

        let child = world.spawn(TypeId::NIL);
        world.add(child, prefab_marker_type);
        world.add(child, pos_type);
        assert_eq!(world.get(child, pos_type).unwrap(), 9f64.to_ne_bytes());
    }

    #[test]
    fn new_component_is_idempotent_by_name() {
        let mut world = World::new();
        let a = world.new_component("Health", 4);
        let b = world.new_component("Health", 4);
        assert_eq!(a, b);
    }

    #[test]
    fn is_known_distinguishes_created_from_never_created() {
        let mut world = World::new();
        let e = world.spawn(TypeId::NIL);
        assert!(world.is_known(e));
        assert!(!world.is_known(EntityId(999_999)));
        world.delete(e);
        assert!(!world.is_known(e));
    }
}
