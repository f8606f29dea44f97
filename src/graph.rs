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

//! The archetype graph: canonical-signature dedup plus cached add/remove edges.

use rustc_hash::FxHashMap;

use crate::archetype::{Archetype, ArchetypeId};
use crate::component::ComponentId;

/// Owns every archetype that has ever existed and the edges between them.
///
/// Archetype 0 is always the empty archetype (no components), created
/// eagerly so a freshly-created entity with no components has somewhere to
/// live.
pub struct ArchetypeGraph {
    archetypes: Vec<Archetype>,
    by_signature: FxHashMap<Box<[ComponentId]>, ArchetypeId>,
    chunk_bytes: usize,
}

impl ArchetypeGraph {
    pub fn new(chunk_bytes: usize) -> Self {
        let mut graph = Self {
            archetypes: Vec::new(),
            by_signature: FxHashMap::default(),
            chunk_bytes,
        };
        graph.find_or_create(&[]);
        graph
    }

    pub fn empty_archetype(&self) -> ArchetypeId {
        ArchetypeId(0)
    }

    pub fn get(&self, id: ArchetypeId) -> &Archetype {
        &self.archetypes[id.0]
    }

    pub fn get_mut(&mut self, id: ArchetypeId) -> &mut Archetype {
        &mut self.archetypes[id.0]
    }

    /// Mutable access to two distinct archetypes at once, for moving a row
    /// from one to the other. Panics if `a == b`.
    pub fn get_pair_mut(&mut self, a: ArchetypeId, b: ArchetypeId) -> (&mut Archetype, &mut Archetype) {
        assert_ne!(a, b, "get_pair_mut requires two distinct archetypes");
        let (lo, hi) = if a.0 < b.0 { (a.0, b.0) } else { (b.0, a.0) };
        let (left, right) = self.archetypes.split_at_mut(hi);
        if a.0 < b.0 {
            (&mut left[lo], &mut right[0])
        } else {
            (&mut right[0], &mut left[lo])
        }
    }

    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Archetype> {
        self.archetypes.iter()
    }

    /// Canonicalize `components` (sort, dedup) and return the archetype with
    /// exactly that signature, creating it if this is the first time it's
    /// been seen.
    pub fn find_or_create(&mut self, components: &[ComponentId]) -> ArchetypeId {
        let mut sorted: Vec<ComponentId> = components.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        let key: Box<[ComponentId]> = sorted.clone().into_boxed_slice();

        if let Some(&id) = self.by_signature.get(&key) {
            return id;
        }

        let id = ArchetypeId(self.archetypes.len());
        self.archetypes.push(Archetype::new(id, sorted, self.chunk_bytes));
        self.by_signature.insert(key, id);
        id
    }

    /// The archetype reached from `from` by adding `component`, via the
    /// cached edge if present, otherwise computed and cached for next time.
    pub fn traverse_add(&mut self, from: ArchetypeId, component: ComponentId) -> ArchetypeId {
        if let Some(&to) = self.archetypes[from.0].add_edges.get(&component) {
            return to;
        }
        let mut signature = self.archetypes[from.0].components().to_vec();
        signature.push(component);
        let to = self.find_or_create(&signature);
        self.archetypes[from.0].add_edges.insert(component, to);
        self.archetypes[to.0].remove_edges.insert(component, from);
        to
    }

    /// The archetype reached from `from` by removing `component`, via the
    /// cached edge if present, otherwise computed and cached for next time.
    /// Returns `from` unchanged if it doesn't carry `component`.
    pub fn traverse_remove(&mut self, from: ArchetypeId, component: ComponentId) -> ArchetypeId {
        if !self.archetypes[from.0].has_component(component) {
            return from;
        }
        if let Some(&to) = self.archetypes[from.0].remove_edges.get(&component) {
            return to;
        }
        let signature: Vec<ComponentId> = self.archetypes[from.0]
            .components()
            .iter()
            .copied()
            .filter(|&c| c != component)
            .collect();
        let to = self.find_or_create(&signature);
        self.archetypes[from.0].remove_edges.insert(component, to);
        self.archetypes[to.0].add_edges.insert(component, from);
        to
    }
}
