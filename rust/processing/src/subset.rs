// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Named selection subsets
//!
//! A subset slot is identified by (material override or default, custom id,
//! model). Each slot holds an id set and one standalone mesh built from the
//! model's buckets. Pure additions to a default-material slot only merge
//! the new ids' geometry into the existing mesh; anything else rebuilds.

use crate::context::ModelTable;
use crate::error::{ProcessingError, Result};
use ifc_batch_geometry::{ElementId, Material, MergedMesh, ModelId};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Subset mesh, shared with the scene that displays it
pub type SharedMesh = Arc<MergedMesh>;

/// A material replacing the bucket materials of a subset.
///
/// `id` is its identity for slot keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialOverride {
    pub id: String,
    pub material: Material,
}

/// Receiver of subset meshes (the render scene)
pub trait SceneGraph: Send {
    /// Show `mesh` for `key`, replacing whatever was shown for it
    fn attach(&mut self, key: &SubsetKey, mesh: SharedMesh);

    fn detach(&mut self, key: &SubsetKey);
}

/// Scene that displays nothing
#[derive(Debug, Default)]
pub struct DetachedScene;

impl SceneGraph for DetachedScene {
    fn attach(&mut self, _key: &SubsetKey, _mesh: SharedMesh) {}

    fn detach(&mut self, _key: &SubsetKey) {}
}

/// Identity of one subset slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubsetKey {
    pub material: Option<String>,
    pub custom_id: String,
    pub model_id: ModelId,
}

impl SubsetKey {
    pub fn new(model_id: ModelId, material: Option<&MaterialOverride>, custom_id: Option<&str>) -> Self {
        Self {
            material: material.map(|m| m.id.clone()),
            custom_id: custom_id.unwrap_or_default().to_string(),
            model_id,
        }
    }
}

impl fmt::Display for SubsetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} - {}",
            self.material.as_deref().unwrap_or("DEFAULT"),
            self.custom_id,
            self.model_id
        )
    }
}

/// Subset request as received from callers; the required fields are
/// optional here so that a missing one is reported instead of defaulted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsetConfig {
    pub model_id: Option<ModelId>,
    pub ids: Option<Vec<ElementId>>,
    pub material: Option<MaterialOverride>,
    pub custom_id: Option<String>,
    pub remove_previous: Option<bool>,
}

impl SubsetConfig {
    /// Request with every required field set
    pub fn new(model_id: ModelId, ids: impl IntoIterator<Item = ElementId>, remove_previous: bool) -> Self {
        Self {
            model_id: Some(model_id),
            ids: Some(ids.into_iter().collect()),
            remove_previous: Some(remove_previous),
            ..Self::default()
        }
    }

    pub fn with_material(mut self, material: MaterialOverride) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_custom_id(mut self, custom_id: impl Into<String>) -> Self {
        self.custom_id = Some(custom_id.into());
        self
    }

    fn validate(self) -> Result<SubsetRequest> {
        let model_id = self
            .model_id
            .ok_or_else(|| ProcessingError::Config("subset requires a model id".into()))?;
        let ids = self
            .ids
            .ok_or_else(|| ProcessingError::Config("subset requires an id list".into()))?;
        if ids.is_empty() {
            return Err(ProcessingError::Config("subset id list is empty".into()));
        }
        let remove_previous = self
            .remove_previous
            .ok_or_else(|| ProcessingError::Config("subset requires removePrevious".into()))?;

        let key = SubsetKey::new(model_id, self.material.as_ref(), self.custom_id.as_deref());
        Ok(SubsetRequest {
            key,
            ids: ids.into_iter().collect(),
            material: self.material,
            remove_previous,
        })
    }
}

struct SubsetRequest {
    key: SubsetKey,
    ids: FxHashSet<ElementId>,
    material: Option<MaterialOverride>,
    remove_previous: bool,
}

/// One occupied slot
#[derive(Debug, Clone, Default)]
pub struct Subset {
    pub ids: FxHashSet<ElementId>,
    /// `None` when none of the ids has geometry
    pub mesh: Option<SharedMesh>,
}

/// What `create_subset` did
#[derive(Debug, Clone)]
pub enum SubsetOutcome {
    /// Ids were already covered; nothing changed
    Unchanged(Option<SharedMesh>),
    /// New ids were merged into the existing mesh
    Extended(Option<SharedMesh>),
    /// The slot was built from scratch
    Rebuilt(Option<SharedMesh>),
}

impl SubsetOutcome {
    pub fn mesh(&self) -> Option<&SharedMesh> {
        match self {
            Self::Unchanged(mesh) | Self::Extended(mesh) | Self::Rebuilt(mesh) => mesh.as_ref(),
        }
    }
}

/// Creates, grows and removes subset slots, keeping the scene in step
pub struct SubsetManager {
    scene: Box<dyn SceneGraph>,
}

impl SubsetManager {
    pub fn new(scene: Box<dyn SceneGraph>) -> Self {
        Self { scene }
    }

    pub fn create_subset(&mut self, models: &mut ModelTable, config: SubsetConfig) -> Result<SubsetOutcome> {
        let request = config.validate()?;
        let model = models.get_mut(request.key.model_id)?;

        let mut ids = request.ids;
        if let Some(existing) = model.subsets.get_mut(&request.key) {
            let covered = if request.remove_previous {
                existing.ids == ids
            } else {
                ids.is_subset(&existing.ids)
            };
            if covered {
                tracing::trace!(key = %request.key, "Subset already covers requested ids");
                return Ok(SubsetOutcome::Unchanged(existing.mesh.clone()));
            }

            if !request.remove_previous && request.material.is_none() {
                let added: FxHashSet<ElementId> = ids.difference(&existing.ids).copied().collect();
                let mut mesh = existing.mesh.as_deref().cloned().unwrap_or_default();
                if let Some(addition) = model.geometry.build_subset_mesh(&added, None) {
                    mesh.extend(&addition);
                }

                tracing::debug!(key = %request.key, added = added.len(), "Extending subset");
                existing.ids.extend(added);
                existing.mesh = (!mesh.is_empty()).then(|| Arc::new(mesh));
                match &existing.mesh {
                    Some(mesh) => self.scene.attach(&request.key, Arc::clone(mesh)),
                    None => self.scene.detach(&request.key),
                }
                return Ok(SubsetOutcome::Extended(existing.mesh.clone()));
            }

            if !request.remove_previous {
                ids.extend(existing.ids.iter().copied());
            }
        }

        let mesh = model
            .geometry
            .build_subset_mesh(&ids, request.material.as_ref().map(|m| &m.material))
            .map(Arc::new);

        tracing::debug!(
            key = %request.key,
            ids = ids.len(),
            empty = mesh.is_none(),
            "Rebuilding subset"
        );

        if model.subsets.contains_key(&request.key) {
            self.scene.detach(&request.key);
        }
        if let Some(mesh) = &mesh {
            self.scene.attach(&request.key, Arc::clone(mesh));
        }
        model.subsets.insert(
            request.key,
            Subset {
                ids,
                mesh: mesh.clone(),
            },
        );

        Ok(SubsetOutcome::Rebuilt(mesh))
    }

    /// Current mesh of a slot
    pub fn get_subset(&self, models: &ModelTable, key: &SubsetKey) -> Option<SharedMesh> {
        models
            .get(key.model_id)
            .ok()?
            .subsets
            .get(key)
            .and_then(|s| s.mesh.clone())
    }

    /// Ids held by a slot
    pub fn subset_ids(&self, models: &ModelTable, key: &SubsetKey) -> Option<FxHashSet<ElementId>> {
        Some(models.get(key.model_id).ok()?.subsets.get(key)?.ids.clone())
    }

    /// Detach and delete a slot; missing slots are ignored
    pub fn remove_subset(&mut self, models: &mut ModelTable, key: &SubsetKey) {
        let Ok(model) = models.get_mut(key.model_id) else {
            return;
        };
        if let Some(subset) = model.subsets.remove(key) {
            if subset.mesh.is_some() {
                self.scene.detach(key);
            }
            tracing::debug!(key = %key, "Removed subset");
        }
    }

    /// Remove every slot of a model
    pub fn clear_subsets(&mut self, models: &mut ModelTable, model_id: ModelId) {
        let keys = match models.get(model_id) {
            Ok(model) => model.subset_keys(),
            Err(_) => return,
        };
        for key in keys {
            self.remove_subset(models, &key);
        }
    }
}
