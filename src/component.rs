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

//! Component metadata registry, the `Component`/`Bundle` traits.
//!
//! Every distinct component type is assigned a stable, process-wide
//! [`ComponentId`] the first time it is mentioned (`component_id::<T>()`).
//! The assignment is a one-shot per-type initialization backed by a
//! function-local `OnceLock`, so concurrent first-use from multiple threads
//! is serialized without the caller doing anything.

use std::mem::{align_of, needs_drop, size_of};
use std::ptr;
use std::sync::OnceLock;

use parking_lot::Mutex;
use smallvec::{smallvec, SmallVec};

/// Maximum number of components supported by a single `Bundle`.
pub const MAX_BUNDLE_COMPONENTS: usize = 8;

/// Marker trait for components. Components must be `'static` (no borrowed
/// data) and `Send + Sync` since a registry may be shared across threads.
pub trait Component: 'static + Send + Sync {}

impl<T: 'static + Send + Sync> Component for T {}

/// Stable, process-wide id for a distinct component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub(crate) u32);

/// Per-component metadata: size, alignment, and an optional drop glue
/// function for types that need destructors run.
///
/// Components are assumed trivially relocatable (movable by `memcpy`) unless
/// they need drop glue, matching the default in the system this crate's
/// layout is grounded on (`cobalt::asl::is_relocatable`).
#[derive(Clone, Copy)]
pub struct ComponentInfo {
    pub size: usize,
    pub align: usize,
    pub drop: Option<unsafe fn(*mut u8)>,
}

fn metadata_table() -> &'static Mutex<Vec<ComponentInfo>> {
    static TABLE: OnceLock<Mutex<Vec<ComponentInfo>>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(Vec::new()))
}

/// Assign (or recall) the [`ComponentId`] for `T`.
///
/// The `OnceLock` below is declared inside a generic function, so every
/// monomorphization of `component_id::<T>` gets its own static cell: one id
/// per type, computed once, regardless of how many threads race to call it
/// first.
pub fn component_id<T: Component>() -> ComponentId {
    static ID: OnceLock<ComponentId> = OnceLock::new();
    *ID.get_or_init(|| {
        let mut table = metadata_table().lock();
        let id = ComponentId(table.len() as u32);
        table.push(ComponentInfo {
            size: size_of::<T>(),
            align: align_of::<T>().max(1),
            drop: if needs_drop::<T>() {
                Some(|ptr| unsafe { ptr::drop_in_place(ptr as *mut T) })
            } else {
                None
            },
        });
        id
    })
}

/// Look up metadata for a previously-assigned id.
pub fn component_info(id: ComponentId) -> ComponentInfo {
    metadata_table().lock()[id.0 as usize]
}

/// A bundle of components spawned onto one entity at once.
///
/// Implemented for tuples of 1 to [`MAX_BUNDLE_COMPONENTS`] components.
pub trait Bundle: Send + Sync + 'static {
    /// Component ids in bundle (tuple) order — `write` supplies pointers in
    /// this same order.
    fn component_ids() -> SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]>
    where
        Self: Sized;

    /// Move each component into the pointer at the matching index.
    ///
    /// # Safety
    /// `ptrs[i]` must be valid, suitably aligned storage for the `i`th
    /// component in `component_ids()` order, and must not be read before
    /// this call completes (they are uninitialized until written).
    unsafe fn write(self, ptrs: &[*mut u8]);
}

macro_rules! impl_bundle {
    ($($T:ident),*) => {
        impl<$($T: Component),*> Bundle for ($($T,)*) {
            fn component_ids() -> SmallVec<[ComponentId; MAX_BUNDLE_COMPONENTS]> {
                smallvec![$(component_id::<$T>()),*]
            }

            #[allow(non_snake_case)]
            unsafe fn write(self, ptrs: &[*mut u8]) {
                let ($($T,)*) = self;
                let mut i = 0;
                $(
                    std::ptr::write(ptrs[i] as *mut $T, $T);
                    i += 1;
                )*
                let _ = i;
            }
        }
    };
}

impl_bundle!(A);
impl_bundle!(A, B);
impl_bundle!(A, B, C);
impl_bundle!(A, B, C, D);
impl_bundle!(A, B, C, D, E);
impl_bundle!(A, B, C, D, E, F);
impl_bundle!(A, B, C, D, E, F, G);
impl_bundle!(A, B, C, D, E, F, G, H);
