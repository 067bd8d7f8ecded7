// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Foreground facade over the model table

use crate::context::{ModelState, ModelTable};
use crate::error::{ProcessingError, Result};
use crate::properties::{ModelRef, PropertyBackend, PropertySource, SpatialNode};
use crate::subset::{SceneGraph, SharedMesh, SubsetConfig, SubsetKey, SubsetManager, SubsetOutcome};
use crate::visibility::VisibilityManager;
use ifc_batch_geometry::{
    Aggregator, ElementId, ElementType, GeometryFilter, GeometryKernel, KernelModel, MergedMesh, ModelGeometry,
    ModelId,
};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// Loads models through a kernel and hosts their subsets and visibility
pub struct IfcManager {
    kernel: Arc<dyn GeometryKernel>,
    models: ModelTable,
    subsets: SubsetManager,
    filter: GeometryFilter,
    property_sources: FxHashMap<PropertyBackend, Arc<dyn PropertySource>>,
}

impl IfcManager {
    pub fn new(kernel: Arc<dyn GeometryKernel>, scene: Box<dyn SceneGraph>) -> Self {
        Self {
            kernel,
            models: ModelTable::new(),
            subsets: SubsetManager::new(scene),
            filter: GeometryFilter::default(),
            property_sources: FxHashMap::default(),
        }
    }

    pub fn models(&self) -> &ModelTable {
        &self.models
    }

    pub fn model(&self, id: ModelId) -> Result<&ModelState> {
        self.models.get(id)
    }

    pub fn model_mut(&mut self, id: ModelId) -> Result<&mut ModelState> {
        self.models.get_mut(id)
    }

    pub fn filter(&self) -> &GeometryFilter {
        &self.filter
    }

    /// Include or exclude an element category in later loads
    pub fn set_optional_category(&mut self, element_type: ElementType, include: bool) {
        self.filter.set_optional_category(element_type, include);
    }

    /// Aggregate a kernel model in this context and register it
    pub fn load_model(
        &mut self,
        kernel_model: KernelModel,
        on_progress: impl FnMut(usize, usize),
    ) -> Result<ModelId> {
        let geometry = Aggregator::new(self.kernel.as_ref(), &self.filter).aggregate(kernel_model, on_progress)?;
        let mesh = geometry.build_merged_mesh();
        let id = self.models.allocate_id();
        self.adopt_model(id, kernel_model, geometry, mesh);
        Ok(id)
    }

    /// Reserve an id for a model aggregated elsewhere
    pub fn reserve_model_id(&mut self) -> ModelId {
        self.models.allocate_id()
    }

    /// Register geometry built outside this context under a reserved id
    pub fn adopt_model(
        &mut self,
        id: ModelId,
        kernel_model: KernelModel,
        geometry: ModelGeometry,
        mesh: Option<MergedMesh>,
    ) {
        tracing::info!(
            model_id = id,
            kernel_model = kernel_model.0,
            buckets = geometry.buckets().len(),
            vertices = mesh.as_ref().map_or(0, MergedMesh::vertex_count),
            "Model loaded"
        );
        self.models.insert(id, ModelState::new(kernel_model, geometry, mesh));
    }

    /// Release a model: its subsets leave the scene first, then buckets,
    /// snapshot and mesh are dropped.
    pub fn close_model(&mut self, id: ModelId) -> Result<()> {
        if !self.models.contains(id) {
            return Err(ProcessingError::UnknownModel(id));
        }
        self.subsets.clear_subsets(&mut self.models, id);
        self.models.remove(id);
        tracing::info!(model_id = id, "Model closed");
        Ok(())
    }

    /// Release every model
    pub fn dispose(&mut self) {
        for id in self.models.ids() {
            self.subsets.clear_subsets(&mut self.models, id);
            self.models.remove(id);
        }
        tracing::debug!("All models released");
    }

    pub fn create_subset(&mut self, config: SubsetConfig) -> Result<SubsetOutcome> {
        self.subsets.create_subset(&mut self.models, config)
    }

    pub fn get_subset(&self, key: &SubsetKey) -> Option<SharedMesh> {
        self.subsets.get_subset(&self.models, key)
    }

    pub fn subset_ids(&self, key: &SubsetKey) -> Option<rustc_hash::FxHashSet<ElementId>> {
        self.subsets.subset_ids(&self.models, key)
    }

    pub fn remove_subset(&mut self, key: &SubsetKey) {
        self.subsets.remove_subset(&mut self.models, key);
    }

    pub fn index_coordinates(&mut self, model_id: ModelId) -> Result<()> {
        VisibilityManager::index_coordinates(&mut self.models, model_id)
    }

    pub fn hide_items(&mut self, model_id: ModelId, ids: &[ElementId]) -> Result<()> {
        VisibilityManager::hide(&mut self.models, model_id, ids)
    }

    pub fn show_items(&mut self, model_id: ModelId, ids: &[ElementId]) -> Result<()> {
        VisibilityManager::show(&mut self.models, model_id, ids)
    }

    pub fn hide_all_items(&mut self, model_id: ModelId) -> Result<()> {
        VisibilityManager::hide_all(&mut self.models, model_id)
    }

    pub fn show_all_items(&mut self, model_id: ModelId) -> Result<()> {
        VisibilityManager::show_all(&mut self.models, model_id)
    }

    /// Element owning a face of the model mesh
    pub fn element_of_face(&self, model_id: ModelId, face: usize) -> Result<Option<ElementId>> {
        Ok(self.models.get(model_id)?.mesh.as_ref().and_then(|m| m.element_of_face(face)))
    }

    pub fn register_property_source(&mut self, backend: PropertyBackend, source: Arc<dyn PropertySource>) {
        self.property_sources.insert(backend, source);
    }

    fn property_source(&self, backend: PropertyBackend, model_id: ModelId) -> Result<(&dyn PropertySource, ModelRef)> {
        let model = ModelRef {
            id: model_id,
            kernel: self.models.get(model_id)?.kernel_model,
        };
        let source = self
            .property_sources
            .get(&backend)
            .ok_or_else(|| ProcessingError::Config(format!("no {:?} property source registered", backend)))?;
        Ok((source.as_ref(), model))
    }

    pub fn item_properties(
        &self,
        backend: PropertyBackend,
        model_id: ModelId,
        id: ElementId,
        recursive: bool,
    ) -> Result<Option<Value>> {
        let (source, model) = self.property_source(backend, model_id)?;
        source.item_properties(model, id, recursive)
    }

    pub fn spatial_structure(&self, backend: PropertyBackend, model_id: ModelId) -> Result<SpatialNode> {
        let (source, model) = self.property_source(backend, model_id)?;
        source.spatial_structure(model)
    }

    pub fn items_of_type(
        &self,
        backend: PropertyBackend,
        model_id: ModelId,
        element_type: ElementType,
    ) -> Result<Vec<ElementId>> {
        let (source, model) = self.property_source(backend, model_id)?;
        source.items_of_type(model, element_type)
    }
}

impl Drop for IfcManager {
    fn drop(&mut self) {
        self.dispose();
    }
}
