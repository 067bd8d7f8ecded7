// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fragment aggregation by exact material color
//!
//! Fragments are extracted, placed and id-stamped, then binned into one
//! bucket per RGBA color. Inside a bucket geometry is keyed by owning
//! element; further pieces of the same element are appended, never
//! replaced. Once the stream ends, buckets are merged into one mesh with
//! one material group per bucket.

use crate::error::Result;
use crate::kernel::{FlatMesh, GeometryFilter, GeometryKernel, KernelModel};
use crate::material::{ColorKey, Material, Rgba};
use crate::mesh::{Mesh, MergedMesh};
use crate::transform::{extract_fragment, matrix_from_column_major};
use crate::ElementId;
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of progress notifications over a full stream
const PROGRESS_STEPS: usize = 10;

/// Fragments sharing one exact color
#[derive(Debug, Clone, PartialEq)]
pub struct MaterialBucket {
    pub material: Material,
    /// One merged fragment per owning element
    pub geometries: BTreeMap<ElementId, Mesh>,
}

impl MaterialBucket {
    pub fn new(material: Material) -> Self {
        Self {
            material,
            geometries: BTreeMap::new(),
        }
    }

    /// Add geometry for an element, appending to what it already has here
    pub fn insert(&mut self, element_id: ElementId, mesh: Mesh) {
        match self.geometries.get_mut(&element_id) {
            Some(existing) => existing.merge(&mesh),
            None => {
                self.geometries.insert(element_id, mesh);
            }
        }
    }

    /// All fragments of the bucket as one mesh
    pub fn merged(&self) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.merge_all(self.geometries.values());
        mesh
    }

    /// Fragments of the listed elements only
    pub fn merged_for(&self, ids: &FxHashSet<ElementId>) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.merge_all(
            self.geometries
                .iter()
                .filter(|(id, _)| ids.contains(id))
                .map(|(_, m)| m),
        );
        mesh
    }

    pub fn vertex_count(&self) -> usize {
        self.geometries.values().map(Mesh::vertex_count).sum()
    }
}

/// Aggregation counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStats {
    pub elements: usize,
    pub fragments: usize,
    pub buckets: usize,
    pub vertices: usize,
    pub triangles: usize,
}

/// Per-model bucket map, in first-seen color order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelGeometry {
    buckets: Vec<MaterialBucket>,
    index: FxHashMap<ColorKey, usize>,
    pub(crate) fragments: usize,
}

impl ModelGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place an extracted fragment into the bucket of its exact color
    pub fn add_fragment(&mut self, color: Rgba, element_id: ElementId, mesh: Mesh) {
        let slot = match self.index.get(&color.key()) {
            Some(&slot) => slot,
            None => {
                self.buckets.push(MaterialBucket::new(Material::from_color(color)));
                self.index.insert(color.key(), self.buckets.len() - 1);
                self.buckets.len() - 1
            }
        };
        self.buckets[slot].insert(element_id, mesh);
        self.fragments += 1;
    }

    /// Take over a bucket rebuilt from transferred data
    pub fn adopt_bucket(&mut self, bucket: MaterialBucket) {
        let key = bucket.material.color.key();
        match self.index.get(&key) {
            Some(&slot) => {
                for (id, mesh) in bucket.geometries {
                    self.buckets[slot].insert(id, mesh);
                }
            }
            None => {
                self.index.insert(key, self.buckets.len());
                self.buckets.push(bucket);
            }
        }
    }

    #[inline]
    pub fn buckets(&self) -> &[MaterialBucket] {
        &self.buckets
    }

    pub fn bucket(&self, color: Rgba) -> Option<&MaterialBucket> {
        self.index.get(&color.key()).map(|&slot| &self.buckets[slot])
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Every bucket fragment belonging to one element
    pub fn item_geometry(&self, element_id: ElementId) -> Vec<(&Material, &Mesh)> {
        self.buckets
            .iter()
            .filter_map(|b| b.geometries.get(&element_id).map(|m| (&b.material, m)))
            .collect()
    }

    pub fn contains_element(&self, element_id: ElementId) -> bool {
        self.buckets.iter().any(|b| b.geometries.contains_key(&element_id))
    }

    /// Merge each bucket, then all buckets, into the model's renderable mesh
    pub fn build_merged_mesh(&self) -> Option<MergedMesh> {
        let per_bucket: Vec<Mesh> = self.buckets.par_iter().map(MaterialBucket::merged).collect();
        let merged = MergedMesh::from_parts(
            self.buckets.iter().map(|b| &b.material).zip(per_bucket.iter()),
        );
        (!merged.is_empty()).then_some(merged)
    }

    /// Mesh made of the listed elements only; `material` replaces every
    /// bucket material when given. Empty selections yield `None`.
    pub fn build_subset_mesh(
        &self,
        ids: &FxHashSet<ElementId>,
        material: Option<&Material>,
    ) -> Option<MergedMesh> {
        let per_bucket: Vec<Mesh> = self.buckets.par_iter().map(|b| b.merged_for(ids)).collect();

        let mut merged = MergedMesh::new();
        for (bucket, mesh) in self.buckets.iter().zip(per_bucket.iter()) {
            merged.append(material.unwrap_or(&bucket.material), mesh);
        }
        (!merged.is_empty()).then_some(merged)
    }

    pub fn stats(&self) -> ModelStats {
        let mut elements = FxHashSet::default();
        let mut stats = ModelStats {
            fragments: self.fragments,
            buckets: self.buckets.len(),
            ..ModelStats::default()
        };
        for bucket in &self.buckets {
            for (id, mesh) in &bucket.geometries {
                elements.insert(*id);
                stats.vertices += mesh.vertex_count();
                stats.triangles += mesh.triangle_count();
            }
        }
        stats.elements = elements.len();
        stats
    }
}

/// Drives the kernel for one model and bins what it returns
pub struct Aggregator<'a, K: GeometryKernel + ?Sized> {
    kernel: &'a K,
    filter: &'a GeometryFilter,
}

impl<'a, K: GeometryKernel + ?Sized> Aggregator<'a, K> {
    pub fn new(kernel: &'a K, filter: &'a GeometryFilter) -> Self {
        Self { kernel, filter }
    }

    /// Stream every fragment of `model` into a fresh bucket map.
    ///
    /// `on_progress(processed, total)` is called about every tenth of the
    /// element list and once at the end.
    pub fn aggregate(
        &self,
        model: KernelModel,
        mut on_progress: impl FnMut(usize, usize),
    ) -> Result<ModelGeometry> {
        let types = self.filter.apply(self.kernel.geometry_types(model)?);
        let flat_meshes = self.kernel.enumerate_fragments(model, &types)?;
        let total = flat_meshes.len();

        tracing::debug!(
            model = model.0,
            types = types.len(),
            elements = total,
            "Aggregating model fragments"
        );

        let mut geometry = ModelGeometry::new();
        let step = total.div_ceil(PROGRESS_STEPS).max(1);
        let mut processed = 0;

        for chunk in flat_meshes.chunks(step) {
            let extracted: Vec<Vec<(Rgba, ElementId, Mesh)>> = chunk
                .par_iter()
                .map(|flat| self.extract_flat_mesh(model, flat))
                .collect::<Result<_>>()?;

            for (color, element_id, mesh) in extracted.into_iter().flatten() {
                geometry.add_fragment(color, element_id, mesh);
            }

            processed += chunk.len();
            on_progress(processed, total);
        }

        if total == 0 {
            on_progress(0, 0);
        }

        let stats = geometry.stats();
        tracing::info!(
            model = model.0,
            elements = stats.elements,
            fragments = stats.fragments,
            buckets = stats.buckets,
            vertices = stats.vertices,
            "Aggregation complete"
        );

        Ok(geometry)
    }

    /// Extract every placed fragment of one element
    pub fn extract_flat_mesh(
        &self,
        model: KernelModel,
        flat: &FlatMesh,
    ) -> Result<Vec<(Rgba, ElementId, Mesh)>> {
        flat.geometries
            .iter()
            .map(|placed| {
                let buffers = self.kernel.fetch_fragment_buffers(model, placed.geometry)?;
                let transform = matrix_from_column_major(&placed.transform);
                let mesh = extract_fragment(&buffers, &transform, flat.element_id)?;
                Ok((placed.color, flat.element_id, mesh))
            })
            .collect()
    }
}
