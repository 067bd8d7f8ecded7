// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Element visibility on the merged model mesh
//!
//! Hiding zeroes the coordinates of an element's vertices, showing copies
//! them back from a snapshot taken before the first change. Indices and
//! vertex count never change, so element ids and material groups stay valid.

use crate::context::{ModelState, ModelTable};
use crate::error::Result;
use ifc_batch_geometry::{ElementId, MergedMesh, ModelId};
use rayon::prelude::*;
use rustc_hash::FxHashMap;

/// Element id → coordinate offsets, plus the pristine coordinates
#[derive(Debug, Clone, Default)]
pub struct CoordinateIndex {
    offsets: FxHashMap<ElementId, Vec<usize>>,
    snapshot: Vec<f32>,
}

impl CoordinateIndex {
    /// Index every vertex of `mesh` by owning element and snapshot its positions
    pub fn build(mesh: &MergedMesh) -> Self {
        let offsets = mesh
            .mesh
            .element_ids
            .par_iter()
            .enumerate()
            .fold(FxHashMap::default, |mut map: FxHashMap<ElementId, Vec<usize>>, (vertex, &id)| {
                map.entry(id).or_default().push(vertex * 3);
                map
            })
            .reduce(FxHashMap::default, |mut a, b| {
                for (id, mut offs) in b {
                    a.entry(id).or_default().append(&mut offs);
                }
                a
            });

        Self {
            offsets,
            snapshot: mesh.mesh.positions.clone(),
        }
    }

    /// Coordinate offsets of one element, if it has any vertex
    pub fn offsets(&self, id: ElementId) -> Option<&[usize]> {
        self.offsets.get(&id).map(Vec::as_slice)
    }

    pub fn hide(&self, mesh: &mut MergedMesh, ids: &[ElementId]) {
        let positions = &mut mesh.mesh.positions;
        for id in ids {
            let Some(offsets) = self.offsets.get(id) else {
                tracing::trace!(element = id, "Not indexed, nothing to hide");
                continue;
            };
            for &offset in offsets {
                positions[offset..offset + 3].fill(0.0);
            }
        }
        mesh.mark_positions_dirty();
    }

    pub fn show(&self, mesh: &mut MergedMesh, ids: &[ElementId]) {
        let positions = &mut mesh.mesh.positions;
        for id in ids {
            let Some(offsets) = self.offsets.get(id) else {
                tracing::trace!(element = id, "Not indexed, nothing to show");
                continue;
            };
            for &offset in offsets {
                positions[offset..offset + 3].copy_from_slice(&self.snapshot[offset..offset + 3]);
            }
        }
        mesh.mark_positions_dirty();
    }

    pub fn hide_all(&self, mesh: &mut MergedMesh) {
        mesh.mesh.positions.fill(0.0);
        mesh.mark_positions_dirty();
    }

    pub fn show_all(&self, mesh: &mut MergedMesh) {
        mesh.mesh.positions.copy_from_slice(&self.snapshot);
        mesh.mark_positions_dirty();
    }
}

/// Hide/show entry points over the model table
pub struct VisibilityManager;

impl VisibilityManager {
    /// Build the coordinate index of a model. The snapshot is taken once;
    /// later calls keep the existing one.
    pub fn index_coordinates(models: &mut ModelTable, model_id: ModelId) -> Result<()> {
        Self::indexed(models.get_mut(model_id)?);
        Ok(())
    }

    pub fn hide(models: &mut ModelTable, model_id: ModelId, ids: &[ElementId]) -> Result<()> {
        Self::apply(models, model_id, |index, mesh| index.hide(mesh, ids))
    }

    pub fn show(models: &mut ModelTable, model_id: ModelId, ids: &[ElementId]) -> Result<()> {
        Self::apply(models, model_id, |index, mesh| index.show(mesh, ids))
    }

    pub fn hide_all(models: &mut ModelTable, model_id: ModelId) -> Result<()> {
        Self::apply(models, model_id, |index, mesh| index.hide_all(mesh))
    }

    pub fn show_all(models: &mut ModelTable, model_id: ModelId) -> Result<()> {
        Self::apply(models, model_id, |index, mesh| index.show_all(mesh))
    }

    fn apply(
        models: &mut ModelTable,
        model_id: ModelId,
        op: impl FnOnce(&CoordinateIndex, &mut MergedMesh),
    ) -> Result<()> {
        let model = models.get_mut(model_id)?;
        Self::indexed(model);
        if let (Some(index), Some(mesh)) = (model.coordinates.as_ref(), model.mesh.as_mut()) {
            op(index, mesh);
        }
        Ok(())
    }

    fn indexed(model: &mut ModelState) {
        if model.coordinates.is_some() {
            return;
        }
        if let Some(mesh) = &model.mesh {
            let index = CoordinateIndex::build(mesh);
            tracing::debug!(elements = index.offsets.len(), vertices = mesh.vertex_count(), "Indexed coordinates");
            model.coordinates = Some(index);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ifc_batch_geometry::{Material, Mesh, Point3, Rgba, Vector3};

    fn mesh() -> MergedMesh {
        let mut mesh = Mesh::new();
        for (i, id) in [1, 1, 2, 2, 3].into_iter().enumerate() {
            mesh.add_vertex(Point3::new(i as f64 + 1.0, 2.0, 3.0), Vector3::z(), id);
        }
        mesh.add_triangle(0, 1, 2);
        mesh.add_triangle(2, 3, 4);
        let material = Material::from_color(Rgba::new(1.0, 1.0, 1.0, 1.0));
        MergedMesh::from_parts([(&material, &mesh)])
    }

    #[test]
    fn test_offsets_cover_every_vertex() {
        let index = CoordinateIndex::build(&mesh());
        let mut first = index.offsets(1).unwrap().to_vec();
        first.sort_unstable();
        assert_eq!(first, vec![0, 3]);
        assert_eq!(index.offsets(3), Some(&[12usize][..]));
        assert!(index.offsets(4).is_none());
    }

    #[test]
    fn test_hide_then_show_restores() {
        let mut merged = mesh();
        let pristine = merged.mesh.positions.clone();
        let index = CoordinateIndex::build(&merged);

        index.hide(&mut merged, &[2, 42]);
        assert_eq!(&merged.mesh.positions[6..12], &[0.0; 6]);
        assert_eq!(&merged.mesh.positions[0..6], &pristine[0..6]);
        assert!(merged.take_positions_dirty());

        index.show(&mut merged, &[2]);
        assert_eq!(merged.mesh.positions, pristine);
        assert_eq!(merged.mesh.indices, vec![0, 1, 2, 2, 3, 4]);
    }

    #[test]
    fn test_hide_all_show_all_identity() {
        let mut merged = mesh();
        let pristine = merged.mesh.positions.clone();
        let index = CoordinateIndex::build(&merged);
        index.hide_all(&mut merged);
        assert!(merged.mesh.positions.iter().all(|&v| v == 0.0));
        index.show_all(&mut merged);
        assert_eq!(merged.mesh.positions, pristine);
    }
}
