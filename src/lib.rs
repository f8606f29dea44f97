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

//! Archetype ECS: chunked, struct-of-arrays entity/component storage.
//!
//! Entities are grouped into archetypes by their exact component set; each
//! archetype packs its rows into fixed-size (16 KiB by default) chunks. See
//! [`Registry`] for the main entry point and [`view`] for iterating over
//! entities that carry a given set of components.

pub mod archetype;
pub mod chunk;
pub mod component;
pub mod entity;
pub mod error;
pub mod graph;
pub mod location;
pub mod registry;
pub mod utils;
pub mod view;

pub mod prelude;

pub use archetype::{Archetype, ArchetypeId};
pub use chunk::DEFAULT_CHUNK_BYTES;
pub use component::{Bundle, Component, ComponentId};
pub use entity::EntityHandle;
pub use error::{EcsError, Result};
pub use registry::Registry;
pub use view::{Fetch, SharedFetch, View};
