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

//! [`Registry`]: the entity/component/archetype facade.
//!
//! `&Registry` grants shared access (any number of [`crate::view::View`]s),
//! `&mut Registry` grants exclusive access (structural changes: create,
//! destroy, set, remove). The borrow checker enforces this split at compile
//! time; there is no runtime lock on the registry itself.

use smallvec::SmallVec;

use crate::archetype::RowSlot;
use crate::chunk::DEFAULT_CHUNK_BYTES;
use crate::component::{component_id, Bundle, Component, MAX_BUNDLE_COMPONENTS};
use crate::entity::{EntityHandle, EntityPool};
use crate::error::{EcsError, Result};
use crate::graph::ArchetypeGraph;
use crate::location::{EntityLocation, EntityLocationMap};

/// Central store of entities, components, and archetypes.
pub struct Registry {
    entities: EntityPool,
    locations: EntityLocationMap,
    graph: ArchetypeGraph,
    live_count: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_BYTES)
    }

    /// Like [`Registry::new`], but every archetype created by this registry
    /// packs its chunks to `chunk_bytes` instead of the 16 KiB default.
    pub fn with_chunk_size(chunk_bytes: usize) -> Self {
        Self {
            entities: EntityPool::new(),
            locations: EntityLocationMap::new(),
            graph: ArchetypeGraph::new(chunk_bytes),
            live_count: 0,
        }
    }

    pub fn alive(&self, entity: EntityHandle) -> bool {
        self.entities.alive(entity)
    }

    /// Number of currently-live entities.
    pub fn entity_count(&self) -> usize {
        self.live_count
    }

    /// Number of distinct archetypes ever created by this registry (includes
    /// the empty archetype and any now-empty ones still kept for reuse).
    pub fn archetype_count(&self) -> usize {
        self.graph.len()
    }

    fn require_alive(&self, entity: EntityHandle) -> Result<EntityLocation> {
        if !self.entities.alive(entity) {
            return Err(EcsError::StaleHandle);
        }
        Ok(self
            .locations
            .get(entity.id)
            .expect("a live entity always has a location"))
    }

    /// Create an entity carrying every component in `bundle`.
    ///
    /// Fails with [`EcsError::ComponentDuplicate`] if `bundle` names the same
    /// component type twice (e.g. a `(Position, Position)` bundle), and with
    /// [`EcsError::AllocationFailure`] if the destination archetype's chunk
    /// allocation fails; in both cases no entity is created.
    pub fn create<B: Bundle>(&mut self, bundle: B) -> Result<EntityHandle> {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("registry.create", archetype_count = self.graph.len()).entered();

        let ids = B::component_ids();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(EcsError::ComponentDuplicate);
        }

        let archetype_id = self.graph.find_or_create(&ids);
        let entity = self.entities.create();
        let archetype = self.graph.get_mut(archetype_id);
        let slot = match archetype.reserve_row(entity) {
            Ok(slot) => slot,
            Err(err) => {
                // Roll back the id allocation; nothing else was touched.
                self.entities.recycle(entity).expect("just-created handle is alive");
                return Err(err);
            }
        };

        let ptrs: SmallVec<[*mut u8; MAX_BUNDLE_COMPONENTS]> = ids
            .iter()
            .map(|&id| unsafe {
                archetype
                    .column_ptr_mut(slot, id)
                    .expect("archetype was created with exactly this bundle's components")
            })
            .collect();
        unsafe {
            bundle.write(&ptrs);
        }

        self.locations.set(
            entity.id,
            EntityLocation {
                archetype: archetype_id,
                chunk: slot.chunk,
                row: slot.row,
            },
        );
        self.live_count += 1;
        Ok(entity)
    }

    /// Destroy `entity`, dropping every component it carries.
    pub fn destroy(&mut self, entity: EntityHandle) -> Result<()> {
        #[cfg(feature = "profiling")]
        let _span = tracing::info_span!("registry.destroy", entity_id = entity.id).entered();

        let location = self.require_alive(entity)?;
        self.entities.recycle(entity)?;

        let archetype = self.graph.get_mut(location.archetype);
        let slot = RowSlot {
            chunk: location.chunk,
            row: location.row,
        };
        if let Some(moved) = archetype.swap_erase(slot) {
            self.locations.set_row(moved.id, slot.chunk, slot.row);
        }
        self.locations.clear_slot(entity.id);
        self.live_count -= 1;
        Ok(())
    }

    pub fn has<C: Component>(&self, entity: EntityHandle) -> Result<bool> {
        let location = self.require_alive(entity)?;
        Ok(self.graph.get(location.archetype).has_component(component_id::<C>()))
    }

    pub fn get<C: Component>(&self, entity: EntityHandle) -> Result<&C> {
        let location = self.require_alive(entity)?;
        let archetype = self.graph.get(location.archetype);
        let slot = RowSlot {
            chunk: location.chunk,
            row: location.row,
        };
        let ptr = unsafe { archetype.column_ptr(slot, component_id::<C>()) }.ok_or(EcsError::ComponentMissing)?;
        Ok(unsafe { &*(ptr as *const C) })
    }

    pub fn get_mut<C: Component>(&mut self, entity: EntityHandle) -> Result<&mut C> {
        let location = self.require_alive(entity)?;
        let archetype = self.graph.get_mut(location.archetype);
        let slot = RowSlot {
            chunk: location.chunk,
            row: location.row,
        };
        let ptr = unsafe { archetype.column_ptr_mut(slot, component_id::<C>()) }.ok_or(EcsError::ComponentMissing)?;
        Ok(unsafe { &mut *(ptr as *mut C) })
    }

    /// Set `entity`'s `C` component to `value`, overwriting it in place if
    /// already present, otherwise moving the entity to the archetype that
    /// adds `C`.
    pub fn set<C: Component>(&mut self, entity: EntityHandle, value: C) -> Result<()> {
        let location = self.require_alive(entity)?;
        let id = component_id::<C>();
        let slot = RowSlot {
            chunk: location.chunk,
            row: location.row,
        };

        if self.graph.get(location.archetype).has_component(id) {
            let archetype = self.graph.get_mut(location.archetype);
            let ptr = unsafe { archetype.column_ptr_mut(slot, id) }.expect("has_component just confirmed this");
            unsafe {
                *(ptr as *mut C) = value;
            }
            return Ok(());
        }

        let dst_id = self.graph.traverse_add(location.archetype, id);
        let (src, dst) = self.graph.get_pair_mut(location.archetype, dst_id);
        let result = src.move_to(slot, dst, |dst_arch, dst_slot| {
            let ptr = unsafe { dst_arch.column_ptr_mut(dst_slot, id) }.expect("dst archetype carries the added component");
            unsafe {
                std::ptr::write(ptr as *mut C, value);
            }
        });

        match result {
            Ok((new_slot, moved)) => {
                if let Some(moved_entity) = moved {
                    self.locations.set_row(moved_entity.id, slot.chunk, slot.row);
                }
                self.locations.set(
                    entity.id,
                    EntityLocation {
                        archetype: dst_id,
                        chunk: new_slot.chunk,
                        row: new_slot.row,
                    },
                );
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Remove `entity`'s `C` component, moving it to the archetype without
    /// `C`. Fails with [`EcsError::ComponentMissing`] if it doesn't carry one.
    pub fn remove<C: Component>(&mut self, entity: EntityHandle) -> Result<()> {
        let location = self.require_alive(entity)?;
        let id = component_id::<C>();
        if !self.graph.get(location.archetype).has_component(id) {
            return Err(EcsError::ComponentMissing);
        }

        let slot = RowSlot {
            chunk: location.chunk,
            row: location.row,
        };
        let dst_id = self.graph.traverse_remove(location.archetype, id);
        let (src, dst) = self.graph.get_pair_mut(location.archetype, dst_id);
        let (new_slot, moved) = src.move_to(slot, dst, |_, _| {})?;

        if let Some(moved_entity) = moved {
            self.locations.set_row(moved_entity.id, slot.chunk, slot.row);
        }
        self.locations.set(
            entity.id,
            EntityLocation {
                archetype: dst_id,
                chunk: new_slot.chunk,
                row: new_slot.row,
            },
        );
        Ok(())
    }

    pub(crate) fn graph(&self) -> &ArchetypeGraph {
        &self.graph
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn create_then_get_round_trips_the_bundle() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 1.0, y: 2.0 },)).unwrap();
        assert_eq!(*reg.get::<Position>(e).unwrap(), Position { x: 1.0, y: 2.0 });
        assert_eq!(reg.entity_count(), 1);
    }

    #[test]
    fn create_rejects_duplicate_component_types_in_one_bundle() {
        let mut reg = Registry::new();
        let err = reg.create((Position { x: 0.0, y: 0.0 }, Position { x: 1.0, y: 1.0 }));
        assert_eq!(err.unwrap_err(), EcsError::ComponentDuplicate);
        assert_eq!(reg.entity_count(), 0);
    }

    #[test]
    fn destroy_invalidates_the_handle() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();
        reg.destroy(e).unwrap();
        assert!(!reg.alive(e));
        assert_eq!(reg.get::<Position>(e), Err(EcsError::StaleHandle));
        assert_eq!(reg.entity_count(), 0);
    }

    #[test]
    fn destroy_relocates_the_last_entity_in_the_archetype() {
        let mut reg = Registry::new();
        let a = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();
        let b = reg.create((Position { x: 9.0, y: 9.0 },)).unwrap();
        reg.destroy(a).unwrap();
        assert!(reg.alive(b));
        assert_eq!(*reg.get::<Position>(b).unwrap(), Position { x: 9.0, y: 9.0 });
    }

    #[test]
    fn set_moves_entity_into_a_new_archetype_on_first_add() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 1.0, y: 1.0 },)).unwrap();
        reg.set(e, Velocity { dx: 0.5, dy: 0.5 }).unwrap();
        assert_eq!(*reg.get::<Position>(e).unwrap(), Position { x: 1.0, y: 1.0 });
        assert_eq!(*reg.get::<Velocity>(e).unwrap(), Velocity { dx: 0.5, dy: 0.5 });
        assert_eq!(reg.archetype_count(), 3); // empty, (Position,), (Position, Velocity)
    }

    #[test]
    fn set_overwrites_in_place_when_component_already_present() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 1.0, y: 1.0 },)).unwrap();
        let archetypes_before = reg.archetype_count();
        reg.set(e, Position { x: 5.0, y: 5.0 }).unwrap();
        assert_eq!(*reg.get::<Position>(e).unwrap(), Position { x: 5.0, y: 5.0 });
        assert_eq!(reg.archetype_count(), archetypes_before);
    }

    #[test]
    fn remove_moves_entity_out_and_drops_the_component() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 1.0, y: 1.0 }, Velocity { dx: 1.0, dy: 1.0 })).unwrap();
        reg.remove::<Velocity>(e).unwrap();
        assert!(!reg.has::<Velocity>(e).unwrap());
        assert!(reg.has::<Position>(e).unwrap());
    }

    #[test]
    fn remove_missing_component_is_an_error() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();
        assert_eq!(reg.remove::<Velocity>(e), Err(EcsError::ComponentMissing));
    }

    #[test]
    fn stale_handle_after_recycle_is_rejected() {
        let mut reg = Registry::new();
        let e = reg.create((Position { x: 0.0, y: 0.0 },)).unwrap();
        reg.destroy(e).unwrap();
        let e2 = reg.create((Position { x: 1.0, y: 1.0 },)).unwrap();
        assert_eq!(e2.id, e.id);
        assert_ne!(e2.generation, e.generation);
        assert_eq!(reg.get::<Position>(e), Err(EcsError::StaleHandle));
    }
}
