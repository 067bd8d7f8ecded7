// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Model table shared by the foreground components
//!
//! The table is the single owner of every loaded model and allocates model
//! ids from its own counter; components receive it explicitly.

use crate::error::{ProcessingError, Result};
use crate::subset::{Subset, SubsetKey};
use crate::visibility::CoordinateIndex;
use ifc_batch_geometry::{KernelModel, MergedMesh, ModelGeometry, ModelId};
use rustc_hash::FxHashMap;

/// Everything owned by one loaded model
#[derive(Debug)]
pub struct ModelState {
    pub kernel_model: KernelModel,
    pub geometry: ModelGeometry,
    /// Merged renderable mesh, absent for models without geometry
    pub mesh: Option<MergedMesh>,
    pub(crate) subsets: FxHashMap<SubsetKey, Subset>,
    pub(crate) coordinates: Option<CoordinateIndex>,
}

impl ModelState {
    pub fn new(kernel_model: KernelModel, geometry: ModelGeometry, mesh: Option<MergedMesh>) -> Self {
        Self {
            kernel_model,
            geometry,
            mesh,
            subsets: FxHashMap::default(),
            coordinates: None,
        }
    }

    /// Keys of the subsets currently held by this model
    pub fn subset_keys(&self) -> Vec<SubsetKey> {
        self.subsets.keys().cloned().collect()
    }
}

/// Loaded models by id
#[derive(Debug, Default)]
pub struct ModelTable {
    models: FxHashMap<ModelId, ModelState>,
    next_id: ModelId,
}

impl ModelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the next model id; ids are never reused
    pub fn allocate_id(&mut self) -> ModelId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn insert(&mut self, id: ModelId, state: ModelState) {
        self.models.insert(id, state);
    }

    pub fn get(&self, id: ModelId) -> Result<&ModelState> {
        self.models.get(&id).ok_or(ProcessingError::UnknownModel(id))
    }

    pub fn get_mut(&mut self, id: ModelId) -> Result<&mut ModelState> {
        self.models.get_mut(&id).ok_or(ProcessingError::UnknownModel(id))
    }

    pub fn remove(&mut self, id: ModelId) -> Option<ModelState> {
        self.models.remove(&id)
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    /// Snapshot of the loaded ids, safe to iterate while removing
    pub fn ids(&self) -> Vec<ModelId> {
        let mut ids: Vec<ModelId> = self.models.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
