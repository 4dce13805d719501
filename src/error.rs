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

//! Error types.
//!
//! Most contract violations described in the data model (invalid
//! parameters, unknown `TypeId`s, a `TypeId` that does not name an entity)
//! are treated as programmer errors and signalled with a panic at the call
//! site, matching the core's `commit_w_family` and public API conventions.
//! `EcsError` covers the one case a caller can reasonably recover from at
//! runtime: registering an observer against a type it can never actually
//! see.

use std::fmt;

/// ECS error type.
#[derive(Debug, Clone)]
pub enum EcsError {
    /// An observer was registered for a `(kind, TypeId)` pair whose
    /// `TypeId` is nil or names a component never declared via
    /// `new_component`.
    UnknownObserverType,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::UnknownObserverType => write!(f, "observer type is not a declared component set"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias.
pub type Result<T> = std::result::Result<T, EcsError>;
