// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Serialization boundary
//!
//! Two directions live here:
//! - foreign, index-accessed collections (a size plus a per-index getter, the
//!   shape kernel bindings hand out) become owned `Vec`s exactly once;
//! - in-memory geometry is flattened into plain transferable structures and
//!   rebuilt from them on the receiving side, with buffer lengths checked.

use crate::aggregator::{MaterialBucket, ModelGeometry};
use crate::error::{Error, Result};
use crate::material::Material;
use crate::mesh::{MaterialGroup, Mesh, MergedMesh};
use crate::ElementId;
use serde::{Deserialize, Serialize};

/// A collection owned by a foreign runtime, reachable only by index
pub trait ForeignCollection {
    type Item;

    fn size(&self) -> usize;

    fn get(&self, index: usize) -> Self::Item;
}

/// Copy a foreign collection into an owned sequence
pub fn to_vec<C: ForeignCollection + ?Sized>(collection: &C) -> Vec<C::Item> {
    let size = collection.size();
    let mut items = Vec::with_capacity(size);
    for i in 0..size {
        items.push(collection.get(i));
    }
    items
}

/// Copy a foreign collection, converting each element on the way
pub fn to_vec_with<C, T>(collection: &C, mut convert: impl FnMut(C::Item) -> T) -> Vec<T>
where
    C: ForeignCollection + ?Sized,
{
    (0..collection.size()).map(|i| convert(collection.get(i))).collect()
}

/// Plain form of a [`Mesh`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedMesh {
    pub positions: Vec<f32>,
    pub normals: Vec<f32>,
    pub indices: Vec<u32>,
    pub element_ids: Vec<ElementId>,
}

impl From<&Mesh> for SerializedMesh {
    fn from(mesh: &Mesh) -> Self {
        Self {
            positions: mesh.positions.clone(),
            normals: mesh.normals.clone(),
            indices: mesh.indices.clone(),
            element_ids: mesh.element_ids.clone(),
        }
    }
}

impl SerializedMesh {
    /// Rebuild the mesh, rejecting inconsistent buffers
    pub fn reconstruct(self) -> Result<Mesh> {
        if self.positions.len() % 3 != 0 || self.normals.len() != self.positions.len() {
            return Err(Error::Malformed(format!(
                "{} position floats with {} normal floats",
                self.positions.len(),
                self.normals.len()
            )));
        }
        let vertex_count = self.positions.len() / 3;
        if self.element_ids.len() != vertex_count {
            return Err(Error::Malformed(format!(
                "{} element ids for {} vertices",
                self.element_ids.len(),
                vertex_count
            )));
        }
        if self.indices.len() % 3 != 0 || self.indices.iter().any(|&i| i as usize >= vertex_count) {
            return Err(Error::Malformed("index buffer does not match vertices".into()));
        }

        Ok(Mesh {
            positions: self.positions,
            normals: self.normals,
            indices: self.indices,
            element_ids: self.element_ids,
        })
    }
}

/// Plain form of a [`MergedMesh`]; groups are `[start, count, material_index]`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedMergedMesh {
    pub mesh: SerializedMesh,
    pub materials: Vec<Material>,
    pub groups: Vec<[u32; 3]>,
}

impl From<&MergedMesh> for SerializedMergedMesh {
    fn from(merged: &MergedMesh) -> Self {
        Self {
            mesh: SerializedMesh::from(&merged.mesh),
            materials: merged.materials.clone(),
            groups: merged
                .groups
                .iter()
                .map(|g| [g.start, g.count, g.material_index as u32])
                .collect(),
        }
    }
}

impl SerializedMergedMesh {
    pub fn reconstruct(self) -> Result<MergedMesh> {
        let mesh = self.mesh.reconstruct()?;
        let index_count = mesh.indices.len() as u64;

        let mut groups = Vec::with_capacity(self.groups.len());
        for [start, count, material_index] in self.groups {
            if start as u64 + count as u64 > index_count || material_index as usize >= self.materials.len() {
                return Err(Error::Malformed(format!(
                    "group [{}, {}, {}] outside of {} indices / {} materials",
                    start,
                    count,
                    material_index,
                    index_count,
                    self.materials.len()
                )));
            }
            groups.push(MaterialGroup {
                start,
                count,
                material_index: material_index as usize,
            });
        }

        Ok(MergedMesh::from_raw(mesh, self.materials, groups))
    }
}

/// Plain form of one bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializedBucket {
    pub material: Material,
    pub items: Vec<(ElementId, SerializedMesh)>,
}

/// Everything the foreground needs to adopt a model aggregated elsewhere
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedModel {
    pub buckets: Vec<SerializedBucket>,
    /// Fragment count seen during aggregation
    #[serde(default)]
    pub fragments: usize,
    pub mesh: Option<SerializedMergedMesh>,
}

impl SerializedModel {
    pub fn new(geometry: &ModelGeometry, mesh: Option<&MergedMesh>) -> Self {
        Self {
            buckets: geometry
                .buckets()
                .iter()
                .map(|bucket| SerializedBucket {
                    material: bucket.material.clone(),
                    items: bucket
                        .geometries
                        .iter()
                        .map(|(&id, mesh)| (id, SerializedMesh::from(mesh)))
                        .collect(),
                })
                .collect(),
            fragments: geometry.fragments,
            mesh: mesh.map(SerializedMergedMesh::from),
        }
    }

    pub fn reconstruct(self) -> Result<(ModelGeometry, Option<MergedMesh>)> {
        let mut geometry = ModelGeometry::default();
        for bucket in self.buckets {
            let mut rebuilt = MaterialBucket::new(bucket.material);
            for (id, mesh) in bucket.items {
                rebuilt.insert(id, mesh.reconstruct()?);
            }
            geometry.adopt_bucket(rebuilt);
        }
        geometry.fragments = self.fragments;
        let mesh = self.mesh.map(SerializedMergedMesh::reconstruct).transpose()?;
        Ok((geometry, mesh))
    }
}

/// Geometry of one element across all its buckets
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SerializedItemGeometry {
    pub element_id: ElementId,
    pub parts: Vec<(Material, SerializedMesh)>,
}

impl SerializedItemGeometry {
    pub fn new(geometry: &ModelGeometry, element_id: ElementId) -> Self {
        Self {
            element_id,
            parts: geometry
                .item_geometry(element_id)
                .into_iter()
                .map(|(material, mesh)| (material.clone(), SerializedMesh::from(mesh)))
                .collect(),
        }
    }

    pub fn reconstruct(self) -> Result<Vec<(Material, Mesh)>> {
        self.parts
            .into_iter()
            .map(|(material, mesh)| Ok((material, mesh.reconstruct()?)))
            .collect()
    }
}
