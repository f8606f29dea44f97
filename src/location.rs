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

//! Entity location map: entity id -> (archetype, chunk, row).

use crate::archetype::ArchetypeId;

/// Where a single entity's row currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityLocation {
    pub archetype: ArchetypeId,
    pub chunk: usize,
    pub row: usize,
}

/// Dense map from entity id to its current location.
///
/// Indexed directly by `EntityHandle::id`; a freed id's slot is `None` until
/// the id is handed back out by the entity pool.
#[derive(Debug, Default)]
pub struct EntityLocationMap {
    slots: Vec<Option<EntityLocation>>,
}

impl EntityLocationMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> Option<EntityLocation> {
        self.slots.get(id as usize).copied().flatten()
    }

    pub fn set(&mut self, id: u32, location: EntityLocation) {
        let idx = id as usize;
        if idx >= self.slots.len() {
            self.slots.resize(idx + 1, None);
        }
        self.slots[idx] = Some(location);
    }

    /// Patch only the (chunk, row) of an already-located entity, e.g. after a
    /// swap-remove moved it within the same archetype.
    pub fn set_row(&mut self, id: u32, chunk: usize, row: usize) {
        if let Some(slot) = self.slots.get_mut(id as usize).and_then(Option::as_mut) {
            slot.chunk = chunk;
            slot.row = row;
        }
    }

    pub fn clear_slot(&mut self, id: u32) {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = None;
        }
    }
}
