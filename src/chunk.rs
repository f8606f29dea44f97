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

//! Chunks: fixed-capacity, struct-of-arrays slabs of archetype rows.
//!
//! A chunk packs an entity-handle column followed by one column per
//! component, each column aligned to its component's alignment, inside a
//! single raw allocation sized to `chunk_bytes` (default 16 KiB). Capacity
//! `N` is computed once per archetype (see [`ChunkLayout::compute`]) and
//! every chunk of that archetype shares it.
//!
//! `Chunk` itself holds no [`Drop`] impl: dropping live component values and
//! deallocating the backing buffer both need the [`ChunkLayout`], which a
//! chunk does not own (the owning `Archetype` does, and is the only place a
//! `Vec<Chunk>` is ever populated or torn down). `Archetype`'s own `Drop`
//! impl walks chunk + layout together to clean up; see `archetype.rs`.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use crate::component::{component_info, ComponentId};
use crate::entity::EntityHandle;
use crate::error::{EcsError, Result};
use crate::utils::align_to;

/// Default chunk byte budget (16 KiB), per spec.
pub const DEFAULT_CHUNK_BYTES: usize = 16 * 1024;

/// Byte offset and owning component for one column within a chunk.
#[derive(Debug, Clone, Copy)]
pub struct ColumnLayout {
    pub component: ComponentId,
    pub offset: usize,
}

/// Shared layout description for every chunk belonging to one archetype.
#[derive(Debug)]
pub struct ChunkLayout {
    pub capacity: usize,
    pub columns: Vec<ColumnLayout>,
    pub buf_align: usize,
    pub buf_size: usize,
}

fn entity_bytes(n: usize) -> usize {
    n * std::mem::size_of::<EntityHandle>()
}

fn bytes_needed(n: usize, components: &[(ComponentId, usize, usize)]) -> usize {
    let mut cursor = entity_bytes(n);
    for &(_, size, align) in components {
        cursor = align_to(cursor, align.max(1));
        cursor += size * n;
    }
    cursor
}

impl ChunkLayout {
    /// Compute the layout for an archetype whose (already-sorted) component
    /// set is `components`, given a `chunk_bytes` budget.
    ///
    /// Finds the largest `N` such that
    /// `entity_column_bytes(N) + Σ pad_to_align(component_i) + N·size_of(component_i) ≤ chunk_bytes`,
    /// via binary search since `bytes_needed` is monotonic non-decreasing in `N`.
    pub fn compute(components: &[ComponentId], chunk_bytes: usize) -> Self {
        let infos: Vec<(ComponentId, usize, usize)> = components
            .iter()
            .map(|&id| {
                let info = component_info(id);
                (id, info.size, info.align.max(1))
            })
            .collect();

        let mut lo = 0usize;
        let mut hi = chunk_bytes.max(1);
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if bytes_needed(mid, &infos) <= chunk_bytes {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        // A single oversized component can make even N=1 exceed the budget;
        // guarantee forward progress rather than a permanently zero-capacity
        // archetype.
        let capacity = lo.max(1);

        let mut buf_align = std::mem::align_of::<EntityHandle>();
        let mut cursor = entity_bytes(capacity);
        let mut columns = Vec::with_capacity(infos.len());
        for &(id, size, align) in &infos {
            buf_align = buf_align.max(align);
            cursor = align_to(cursor, align);
            columns.push(ColumnLayout {
                component: id,
                offset: cursor,
            });
            cursor += size * capacity;
        }

        Self {
            capacity,
            columns,
            buf_align,
            buf_size: cursor.max(1),
        }
    }

    pub fn column_offset(&self, component: ComponentId) -> Option<usize> {
        self.columns
            .iter()
            .find(|c| c.component == component)
            .map(|c| c.offset)
    }
}

/// A fixed-capacity, raw, aligned slab of rows.
///
/// Never reallocates. Bounds/typed access is provided by `Archetype`, which
/// holds the matching [`ChunkLayout`].
pub struct Chunk {
    data: NonNull<u8>,
    layout: Layout,
    len: usize,
}

// SAFETY: a chunk's only contents are entity handles and values of types
// bounded by `Component: Send + Sync`; `NonNull` opts out of both by
// default purely because it's a raw pointer, not because what it points to
// is thread-hostile.
unsafe impl Send for Chunk {}
unsafe impl Sync for Chunk {}

impl Chunk {
    pub fn new(chunk_layout: &ChunkLayout) -> Result<Self> {
        let layout = Layout::from_size_align(chunk_layout.buf_size, chunk_layout.buf_align)
            .map_err(|_| EcsError::AllocationFailure)?;
        // SAFETY: layout.size() > 0 is guaranteed by ChunkLayout::compute (entity
        // column alone contributes at least one EntityHandle's worth of bytes).
        let data = unsafe { alloc::alloc(layout) };
        let data = NonNull::new(data).ok_or(EcsError::AllocationFailure)?;
        Ok(Self {
            data,
            layout,
            len: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn entity_byte_offset(row: usize) -> usize {
        row * std::mem::size_of::<EntityHandle>()
    }

    /// # Safety
    /// `row` must be `< chunk_layout.capacity`.
    pub unsafe fn entity_ptr(&self, row: usize) -> *const EntityHandle {
        self.data.as_ptr().add(Self::entity_byte_offset(row)) as *const EntityHandle
    }

    /// # Safety
    /// `row` must be `< chunk_layout.capacity`.
    pub unsafe fn entity_ptr_mut(&mut self, row: usize) -> *mut EntityHandle {
        self.data.as_ptr().add(Self::entity_byte_offset(row)) as *mut EntityHandle
    }

    pub fn entity_at(&self, row: usize) -> EntityHandle {
        assert!(row < self.len, "row out of bounds");
        unsafe { *self.entity_ptr(row) }
    }

    /// # Safety
    /// `offset + size` must lie within the allocation and `row` must be in
    /// bounds for the owning layout's capacity.
    pub unsafe fn column_ptr(&self, offset: usize, size: usize, row: usize) -> *const u8 {
        self.data.as_ptr().add(offset + row * size)
    }

    /// # Safety
    /// Same as [`Chunk::column_ptr`].
    pub unsafe fn column_ptr_mut(&mut self, offset: usize, size: usize, row: usize) -> *mut u8 {
        self.data.as_ptr().add(offset + row * size)
    }

    /// Reserve the next row for `entity` without initializing any component
    /// column. Returns `None` ([`chunk_full`] in spec vocabulary) if the
    /// chunk is already at `chunk_layout.capacity`.
    pub fn reserve_row(&mut self, chunk_layout: &ChunkLayout, entity: EntityHandle) -> Option<usize> {
        if self.len >= chunk_layout.capacity {
            return None;
        }
        let row = self.len;
        unsafe {
            std::ptr::write(self.entity_ptr_mut(row), entity);
        }
        self.len += 1;
        Some(row)
    }

    /// Run drop glue for every component at `row` without touching `len` or
    /// moving any bytes. Used when the row being vacated will be overwritten
    /// by a relocated row rather than by shrinking this chunk (the
    /// cross-chunk path in `Archetype::swap_erase`).
    pub fn drop_row(&mut self, chunk_layout: &ChunkLayout, row: usize) {
        assert!(row < self.len, "row out of bounds");
        for col in &chunk_layout.columns {
            let info = component_info(col.component);
            if let Some(drop_fn) = info.drop {
                unsafe {
                    let ptr = self.column_ptr_mut(col.offset, info.size, row);
                    drop_fn(ptr);
                }
            }
        }
    }

    /// Copy (not drop) the entity and every component byte at `row_from` in
    /// `self` onto `row_to` in `dst`. `dst`'s row must already have been
    /// reserved (e.g. via [`Chunk::reserve_row`] or because it's a live row
    /// being vacated) and hold no value that still needs dropping.
    pub fn relocate_row_into(&self, chunk_layout: &ChunkLayout, row_from: usize, dst: &mut Chunk, row_to: usize) {
        unsafe {
            std::ptr::copy_nonoverlapping(self.entity_ptr(row_from), dst.entity_ptr_mut(row_to), 1);
        }
        for col in &chunk_layout.columns {
            let info = component_info(col.component);
            unsafe {
                let src = self.column_ptr(col.offset, info.size, row_from);
                let dst_ptr = dst.column_ptr_mut(col.offset, info.size, row_to);
                std::ptr::copy_nonoverlapping(src, dst_ptr, info.size);
            }
        }
    }

    /// Shrink `len` by one, representing that the last row's bytes have
    /// already been moved out (via [`Chunk::relocate_row_into`]) or already
    /// dropped in place. Does not run drop glue.
    pub fn truncate_last(&mut self) {
        debug_assert!(self.len > 0, "truncate_last on an empty chunk");
        self.len -= 1;
    }

    /// Drop components at `row`, then if it wasn't the last occupied row,
    /// relocate the last row's bytes (entity + every column) into `row`.
    /// Returns the entity that was relocated, if any.
    pub fn swap_remove(&mut self, chunk_layout: &ChunkLayout, row: usize) -> Option<EntityHandle> {
        assert!(row < self.len, "row out of bounds");
        self.drop_row(chunk_layout, row);

        let last = self.len - 1;
        let moved = if row != last {
            unsafe {
                std::ptr::copy_nonoverlapping(self.entity_ptr(last), self.entity_ptr_mut(row), 1);
            }
            for col in &chunk_layout.columns {
                let info = component_info(col.component);
                unsafe {
                    let src = self.column_ptr(col.offset, info.size, last);
                    let dst = self.column_ptr_mut(col.offset, info.size, row);
                    std::ptr::copy_nonoverlapping(src, dst, info.size);
                }
            }
            Some(self.entity_at(row))
        } else {
            None
        };
        self.len -= 1;
        moved
    }

    /// Deallocate the backing buffer without running any component drop
    /// glue. The caller (the owning `Archetype`'s `Drop` impl) is
    /// responsible for having already dropped every live row.
    ///
    /// # Safety
    /// Must be called at most once, and no pointers into this chunk may be
    /// used afterwards.
    pub unsafe fn deallocate(&mut self) {
        alloc::dealloc(self.data.as_ptr(), self.layout);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[test]
    fn capacity_respects_chunk_byte_budget() {
        let id = crate::component::component_id::<Position>();
        let layout = ChunkLayout::compute(&[id], 1024);
        let per_row = std::mem::size_of::<EntityHandle>() + std::mem::size_of::<Position>();
        assert!(layout.capacity * per_row <= 1024 + layout.buf_align);
        assert!(layout.capacity > 0);
    }

    #[test]
    fn push_and_read_back_row() {
        let id = crate::component::component_id::<Position>();
        let layout = ChunkLayout::compute(&[id], DEFAULT_CHUNK_BYTES);
        let mut chunk = Chunk::new(&layout).unwrap();
        let entity = EntityHandle { id: 7, generation: 0 };
        let row = chunk.reserve_row(&layout, entity).unwrap();
        let offset = layout.column_offset(id).unwrap();
        unsafe {
            let ptr = chunk.column_ptr_mut(offset, std::mem::size_of::<Position>(), row) as *mut Position;
            std::ptr::write(ptr, Position { x: 1.0, y: 2.0 });
        }
        assert_eq!(chunk.entity_at(row), entity);
        unsafe {
            let ptr = chunk.column_ptr(offset, std::mem::size_of::<Position>(), row) as *const Position;
            assert_eq!((*ptr).x, 1.0);
            assert_eq!((*ptr).y, 2.0);
        }
        unsafe {
            chunk.deallocate();
        }
    }

    #[test]
    fn swap_remove_of_last_row_touches_nothing_else() {
        let id = crate::component::component_id::<Position>();
        let layout = ChunkLayout::compute(&[id], DEFAULT_CHUNK_BYTES);
        let mut chunk = Chunk::new(&layout).unwrap();
        let e0 = EntityHandle { id: 0, generation: 0 };
        let e1 = EntityHandle { id: 1, generation: 0 };
        let r0 = chunk.reserve_row(&layout, e0).unwrap();
        let _r1 = chunk.reserve_row(&layout, e1).unwrap();

        let moved = chunk.swap_remove(&layout, 1);
        assert_eq!(moved, None, "removing the last row moves nothing");
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.entity_at(r0), e0);
        unsafe {
            chunk.deallocate();
        }
    }

    #[test]
    fn swap_remove_of_non_last_row_relocates_the_last() {
        let id = crate::component::component_id::<Position>();
        let layout = ChunkLayout::compute(&[id], DEFAULT_CHUNK_BYTES);
        let mut chunk = Chunk::new(&layout).unwrap();
        let e0 = EntityHandle { id: 0, generation: 0 };
        let e1 = EntityHandle { id: 1, generation: 0 };
        chunk.reserve_row(&layout, e0).unwrap();
        chunk.reserve_row(&layout, e1).unwrap();

        let moved = chunk.swap_remove(&layout, 0);
        assert_eq!(moved, Some(e1));
        assert_eq!(chunk.len(), 1);
        assert_eq!(chunk.entity_at(0), e1);
        unsafe {
            chunk.deallocate();
        }
    }
}
