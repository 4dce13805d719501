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

//! `archetype_ecs` - a dynamically-typed, archetype/table-oriented ECS
//! core.
//!
//! Components carry no static Rust type: they are entities themselves,
//! identified by `ComponentId` and declared with a byte size. Types are
//! interned sets of components (`TypeId`); tables are archetype storage
//! keyed by `TypeId`. Structural changes made while the world is iterating
//! are staged into a shadow layer and merged back in at the end of the
//! cycle (see `stage` and `engine`).

pub mod archetype;
pub mod component;
pub mod engine;
pub mod entity;
pub mod error;
pub mod observer;
pub mod prelude;
pub mod registry;
pub mod stage;
pub mod world;

pub use entity::{ComponentId, EntityId};
pub use error::{EcsError, Result};
pub use observer::{DispatchContext, NotifyKind, ObserverExecutor, ObserverSet};
pub use registry::TypeId;
pub use world::World;

#[cfg(test)]
mod tests;
