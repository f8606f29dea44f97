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

//! Archetypes: one chunked, struct-of-arrays table per distinct component set.

use rustc_hash::FxHashMap;

use crate::chunk::{Chunk, ChunkLayout};
use crate::component::{component_info, ComponentId};
use crate::entity::EntityHandle;
use crate::error::Result;

/// Stable index of an archetype within an [`crate::graph::ArchetypeGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArchetypeId(pub usize);

/// A single (chunk index, row index) slot within some archetype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowSlot {
    pub chunk: usize,
    pub row: usize,
}

/// One table of entities sharing an identical, sorted component set.
///
/// Rows are packed into fixed-capacity [`Chunk`]s. Every chunk but possibly
/// the last is full; `swap_erase` preserves this by always pulling the
/// archetype's last live row (not merely the last row of the same chunk)
/// into a vacated slot, popping the last chunk once it drains to zero rows.
pub struct Archetype {
    id: ArchetypeId,
    components: Vec<ComponentId>,
    layout: ChunkLayout,
    chunks: Vec<Chunk>,
    pub(crate) add_edges: FxHashMap<ComponentId, ArchetypeId>,
    pub(crate) remove_edges: FxHashMap<ComponentId, ArchetypeId>,
}

impl Archetype {
    /// `components` must already be sorted and deduplicated: the canonical
    /// form every lookup (`ArchetypeGraph::find_or_create`) relies on.
    pub fn new(id: ArchetypeId, components: Vec<ComponentId>, chunk_bytes: usize) -> Self {
        let layout = ChunkLayout::compute(&components, chunk_bytes);
        Self {
            id,
            components,
            layout,
            chunks: Vec::new(),
            add_edges: FxHashMap::default(),
            remove_edges: FxHashMap::default(),
        }
    }

    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    pub fn components(&self) -> &[ComponentId] {
        &self.components
    }

    pub fn has_component(&self, component: ComponentId) -> bool {
        self.components.binary_search(&component).is_ok()
    }

    pub fn column_offset(&self, component: ComponentId) -> Option<usize> {
        self.layout.column_offset(component)
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn len(&self) -> usize {
        let full = self.chunks.len().saturating_sub(1) * self.layout.capacity;
        full + self.chunks.last().map_or(0, Chunk::len)
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.iter().all(Chunk::is_empty)
    }

    pub fn entity_at(&self, slot: RowSlot) -> EntityHandle {
        self.chunks[slot.chunk].entity_at(slot.row)
    }

    /// Byte pointer to `component`'s column at `slot`, or `None` if this
    /// archetype doesn't carry that component.
    ///
    /// # Safety
    /// The returned pointer is valid for `component_info(component).size`
    /// bytes and must be read only as that component's type.
    pub unsafe fn column_ptr(&self, slot: RowSlot, component: ComponentId) -> Option<*const u8> {
        let offset = self.column_offset(component)?;
        let info = component_info(component);
        Some(self.chunks[slot.chunk].column_ptr(offset, info.size, slot.row))
    }

    /// # Safety
    /// Same as [`Archetype::column_ptr`].
    pub unsafe fn column_ptr_mut(&mut self, slot: RowSlot, component: ComponentId) -> Option<*mut u8> {
        let offset = self.column_offset(component)?;
        let info = component_info(component);
        Some(self.chunks[slot.chunk].column_ptr_mut(offset, info.size, slot.row))
    }

    /// Run `f` against every `(chunk_index, &Chunk)` pair holding live rows,
    /// the iteration unit views are built around.
    pub fn each_chunk(&self, mut f: impl FnMut(usize, &Chunk)) {
        for (i, chunk) in self.chunks.iter().enumerate() {
            if !chunk.is_empty() {
                f(i, chunk);
            }
        }
    }

    pub fn each_chunk_mut(&mut self, mut f: impl FnMut(usize, &mut Chunk)) {
        for (i, chunk) in self.chunks.iter_mut().enumerate() {
            if !chunk.is_empty() {
                f(i, chunk);
            }
        }
    }

    /// Reserve a fresh row for `entity`, allocating a new chunk if the last
    /// one is full or none exist yet. Returns the slot; no component column
    /// is initialized.
    pub fn reserve_row(&mut self, entity: EntityHandle) -> Result<RowSlot> {
        if let Some(last) = self.chunks.last_mut() {
            if let Some(row) = last.reserve_row(&self.layout, entity) {
                return Ok(RowSlot {
                    chunk: self.chunks.len() - 1,
                    row,
                });
            }
        }
        let mut chunk = Chunk::new(&self.layout)?;
        let row = chunk
            .reserve_row(&self.layout, entity)
            .expect("a freshly allocated chunk always has room for at least one row");
        self.chunks.push(chunk);
        Ok(RowSlot {
            chunk: self.chunks.len() - 1,
            row,
        })
    }

    /// Drop the row at `slot`, then preserve the "every chunk but the last is
    /// full" invariant by relocating the archetype's last live row into the
    /// vacated slot (unless `slot` already was the last live row). Returns
    /// the entity that moved, if any; the caller must update that entity's
    /// location to `slot`.
    pub fn swap_erase(&mut self, slot: RowSlot) -> Option<EntityHandle> {
        self.chunks[slot.chunk].drop_row(&self.layout, slot.row);
        self.relocate_last_into(slot)
    }

    /// Relocate the archetype's last live row into the now-vacant `slot`,
    /// shrinking (and possibly popping) the last chunk. Callers are
    /// responsible for having already dropped (or moved out) whatever was at
    /// `slot`.
    fn relocate_last_into(&mut self, slot: RowSlot) -> Option<EntityHandle> {
        let last_chunk_idx = self.chunks.len() - 1;
        let last_row = self.chunks[last_chunk_idx].len() - 1;

        let moved = if slot.chunk == last_chunk_idx && slot.row == last_row {
            None
        } else if slot.chunk == last_chunk_idx {
            let chunk = &mut self.chunks[slot.chunk];
            unsafe {
                std::ptr::copy_nonoverlapping(chunk.entity_ptr(last_row), chunk.entity_ptr_mut(slot.row), 1);
            }
            for col in &self.layout.columns {
                let info = component_info(col.component);
                unsafe {
                    let src = chunk.column_ptr(col.offset, info.size, last_row);
                    let dst = chunk.column_ptr_mut(col.offset, info.size, slot.row);
                    std::ptr::copy_nonoverlapping(src, dst, info.size);
                }
            }
            Some(chunk.entity_at(slot.row))
        } else {
            let (left, right) = self.chunks.split_at_mut(last_chunk_idx);
            let src_chunk = &right[0];
            let dst_chunk = &mut left[slot.chunk];
            src_chunk.relocate_row_into(&self.layout, last_row, dst_chunk, slot.row);
            Some(dst_chunk.entity_at(slot.row))
        };

        self.chunks[last_chunk_idx].truncate_last();
        if self.chunks.len() > 1 && self.chunks[last_chunk_idx].is_empty() {
            let mut popped = self.chunks.pop().expect("just checked len > 1");
            unsafe {
                popped.deallocate();
            }
        }
        moved
    }

    /// Move the row at `slot` into `dst`, copying every component the two
    /// archetypes share and leaving components unique to `dst` for `init` to
    /// fill in, then erasing the row from `self`.
    ///
    /// `dst`'s row is reserved (and may allocate) before `self` is touched,
    /// so an allocation failure leaves `self` completely unmodified.
    pub fn move_to(
        &mut self,
        slot: RowSlot,
        dst: &mut Archetype,
        init: impl FnOnce(&mut Archetype, RowSlot),
    ) -> Result<(RowSlot, Option<EntityHandle>)> {
        let entity = self.entity_at(slot);
        let dst_slot = dst.reserve_row(entity)?;

        for col in &self.layout.columns {
            if let Some(dst_offset) = dst.layout.column_offset(col.component) {
                let info = component_info(col.component);
                unsafe {
                    let src = self.chunks[slot.chunk].column_ptr(col.offset, info.size, slot.row);
                    let dst_ptr = dst.chunks[dst_slot.chunk].column_ptr_mut(dst_offset, info.size, dst_slot.row);
                    std::ptr::copy_nonoverlapping(src, dst_ptr, info.size);
                }
            }
        }

        init(dst, dst_slot);

        // Components present only in `self` still need drop glue; swap_erase
        // handles that (it calls drop_row before relocating anything).
        let moved = self.swap_erase_no_drop_shared(slot, dst);
        Ok((dst_slot, moved))
    }

    /// Like `swap_erase`, but skips drop glue for components that were just
    /// moved into `dst` by `move_to` (they're logically relocated, not
    /// dropped) while still dropping components unique to `self`.
    fn swap_erase_no_drop_shared(&mut self, slot: RowSlot, dst: &Archetype) -> Option<EntityHandle> {
        for col in &self.layout.columns {
            if dst.layout.column_offset(col.component).is_some() {
                continue;
            }
            let info = component_info(col.component);
            if let Some(drop_fn) = info.drop {
                unsafe {
                    let ptr = self.chunks[slot.chunk].column_ptr_mut(col.offset, info.size, slot.row);
                    drop_fn(ptr);
                }
            }
        }
        self.relocate_last_into(slot)
    }
}

impl Drop for Archetype {
    fn drop(&mut self) {
        for chunk in &mut self.chunks {
            for row in 0..chunk.len() {
                chunk.drop_row(&self.layout, row);
            }
            unsafe {
                chunk.deallocate();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::component_id;

    #[derive(Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }

    fn handle(id: u32) -> EntityHandle {
        EntityHandle { id, generation: 0 }
    }

    fn small_archetype() -> Archetype {
        let id = component_id::<Position>();
        // Small chunk_bytes forces multiple chunks with only a couple of rows
        // each, so cross-chunk swap_erase is actually exercised.
        let per_row = std::mem::size_of::<EntityHandle>() + std::mem::size_of::<Position>();
        Archetype::new(ArchetypeId(0), vec![id], per_row * 2)
    }

    #[test]
    fn reserve_row_spills_into_a_new_chunk_once_full() {
        let mut arch = small_archetype();
        let mut slots = Vec::new();
        for i in 0..5 {
            slots.push(arch.reserve_row(handle(i)).unwrap());
        }
        assert!(arch.chunk_count() >= 2, "5 rows at capacity 2 needs >= 2 chunks");
        assert_eq!(arch.len(), 5);
    }

    #[test]
    fn swap_erase_across_chunks_preserves_every_chunk_but_last_full() {
        let mut arch = small_archetype();
        let mut slots = Vec::new();
        for i in 0..5 {
            slots.push(arch.reserve_row(handle(i)).unwrap());
        }
        // Remove the first row (in the first chunk); the true last row (in
        // the last chunk) should be relocated into its place.
        let moved = arch.swap_erase(slots[0]);
        assert!(moved.is_some());
        assert_eq!(arch.len(), 4);
        for i in 0..arch.chunk_count().saturating_sub(1) {
            let mut count = 0;
            arch.each_chunk(|idx, chunk| {
                if idx == i {
                    count = chunk.len();
                }
            });
            assert!(count > 0, "no chunk before the last should be left empty");
        }
    }

    #[test]
    fn swap_erase_of_the_sole_row_leaves_an_empty_archetype() {
        let mut arch = small_archetype();
        let slot = arch.reserve_row(handle(0)).unwrap();
        let moved = arch.swap_erase(slot);
        assert_eq!(moved, None);
        assert_eq!(arch.len(), 0);
        assert!(arch.is_empty());
    }
}
