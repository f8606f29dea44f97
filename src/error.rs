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

//! Error types

use std::fmt;

/// ECS error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcsError {
    /// Operation on an entity whose generation no longer matches, or on `invalid`.
    StaleHandle,

    /// `get`/`remove` on a component the entity does not carry.
    ComponentMissing,

    /// `create` called with two initializers for the same component type.
    ComponentDuplicate,

    /// A view was constructed with a conflicting reference set: the same
    /// component appears twice, or both `&C` and `&mut C` for one `C`.
    AliasingViolation,

    /// Chunk allocation failed; the registry remains consistent (no partial row).
    AllocationFailure,
}

impl fmt::Display for EcsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EcsError::StaleHandle => write!(f, "stale or invalid entity handle"),
            EcsError::ComponentMissing => write!(f, "entity does not carry this component"),
            EcsError::ComponentDuplicate => {
                write!(f, "two initializers supplied for the same component type")
            }
            EcsError::AliasingViolation => {
                write!(f, "view aliases the same component both shared and exclusively")
            }
            EcsError::AllocationFailure => write!(f, "chunk allocation failed"),
        }
    }
}

impl std::error::Error for EcsError {}

/// Result type alias
pub type Result<T> = std::result::Result<T, EcsError>;
