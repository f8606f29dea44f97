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

//! Entity handles and the generational entity pool.
//!
//! An [`EntityHandle`] is a `(id, generation)` pair. The pool recycles freed
//! ids with a bumped generation so a stale handle can never alias a live one.

use crate::error::{EcsError, Result};

/// A generational entity handle: `(id, generation)`.
///
/// Ordering compares `id` first, then `generation`, matching the reference
/// `co_ecs`/`cobalt::ecs` entity type this crate's model is grounded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityHandle {
    pub id: u32,
    pub generation: u32,
}

impl EntityHandle {
    /// The sentinel handle. Never returned by [`EntityPool::create`].
    pub const INVALID: EntityHandle = EntityHandle {
        id: u32::MAX,
        generation: u32::MAX,
    };

    /// True iff this handle is not the sentinel.
    ///
    /// Note this only checks against the sentinel value; whether a *non-sentinel*
    /// handle still refers to a live entity is answered by [`EntityPool::alive`].
    pub fn valid(&self) -> bool {
        *self != EntityHandle::INVALID
    }
}

impl Default for EntityHandle {
    fn default() -> Self {
        EntityHandle::INVALID
    }
}

/// Generational allocator for entity ids.
///
/// Maintains a dense vector of generations indexed by id, plus a free-list of
/// reusable ids. `create` pops from the free-list when non-empty, otherwise
/// appends a fresh generation-0 slot.
#[derive(Debug, Default)]
pub struct EntityPool {
    generations: Vec<u32>,
    on_free_list: Vec<bool>,
    free_list: Vec<u32>,
}

impl EntityPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle: a recycled id with its bumped generation, or a
    /// brand-new id at generation 0.
    pub fn create(&mut self) -> EntityHandle {
        if let Some(id) = self.free_list.pop() {
            self.on_free_list[id as usize] = false;
            EntityHandle {
                id,
                generation: self.generations[id as usize],
            }
        } else {
            let id = self.generations.len() as u32;
            self.generations.push(0);
            self.on_free_list.push(false);
            EntityHandle { id, generation: 0 }
        }
    }

    /// Recycle a handle: bump its generation and return the id to the
    /// free-list. Fails with [`EcsError::StaleHandle`] if the handle's
    /// generation does not match the live generation for that id.
    pub fn recycle(&mut self, handle: EntityHandle) -> Result<()> {
        if !self.alive(handle) {
            return Err(EcsError::StaleHandle);
        }
        let idx = handle.id as usize;
        self.generations[idx] = self.generations[idx].wrapping_add(1);
        self.on_free_list[idx] = true;
        self.free_list.push(handle.id);
        Ok(())
    }

    /// True iff `handle`'s generation matches the live generation for its id
    /// and the id is not currently sitting on the free-list.
    pub fn alive(&self, handle: EntityHandle) -> bool {
        if !handle.valid() {
            return false;
        }
        let idx = handle.id as usize;
        idx < self.generations.len()
            && self.generations[idx] == handle.generation
            && !self.on_free_list[idx]
    }

    /// Number of ids ever allocated (including currently-recycled ones).
    pub fn capacity(&self) -> usize {
        self.generations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_yields_distinct_live_handles() {
        let mut pool = EntityPool::new();
        let h1 = pool.create();
        let h2 = pool.create();
        assert_ne!(h1, h2);
        assert!(pool.alive(h1));
        assert!(pool.alive(h2));
    }

    #[test]
    fn recycle_bumps_generation_and_invalidates_old_handle() {
        let mut pool = EntityPool::new();
        let h1 = pool.create();
        let _h2 = pool.create();
        pool.recycle(h1).unwrap();
        assert!(!pool.alive(h1));

        let h3 = pool.create();
        assert_eq!(h3.id, h1.id);
        assert_eq!(h3.generation, h1.generation + 1);
        assert!(pool.alive(h3));
    }

    #[test]
    fn recycle_stale_handle_is_an_error() {
        let mut pool = EntityPool::new();
        let h1 = pool.create();
        pool.recycle(h1).unwrap();
        assert_eq!(pool.recycle(h1), Err(EcsError::StaleHandle));
    }

    #[test]
    fn invalid_sentinel_is_never_alive() {
        let pool = EntityPool::new();
        assert!(!EntityHandle::INVALID.valid());
        assert!(!pool.alive(EntityHandle::INVALID));
    }

    #[test]
    fn ordering_compares_id_first_then_generation() {
        let low_id_high_gen = EntityHandle { id: 0, generation: 1 };
        let high_id_low_gen = EntityHandle { id: 1, generation: 0 };
        assert!(low_id_high_gen < high_id_low_gen);
    }
}
