// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mesh data structures

use crate::material::Material;
use crate::ElementId;
use nalgebra::{Point3, Vector3};

/// Triangle mesh with a per-vertex owning element id
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex positions (x, y, z)
    pub positions: Vec<f32>,
    /// Vertex normals (nx, ny, nz)
    pub normals: Vec<f32>,
    /// Triangle indices (i0, i1, i2)
    pub indices: Vec<u32>,
    /// Owning element of each vertex
    pub element_ids: Vec<ElementId>,
}

impl Mesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            positions: Vec::new(),
            normals: Vec::new(),
            indices: Vec::new(),
            element_ids: Vec::new(),
        }
    }

    /// Create a mesh with capacity
    pub fn with_capacity(vertex_count: usize, index_count: usize) -> Self {
        Self {
            positions: Vec::with_capacity(vertex_count * 3),
            normals: Vec::with_capacity(vertex_count * 3),
            indices: Vec::with_capacity(index_count),
            element_ids: Vec::with_capacity(vertex_count),
        }
    }

    /// Add a vertex with normal, owned by `element_id`
    #[inline]
    pub fn add_vertex(&mut self, position: Point3<f64>, normal: Vector3<f64>, element_id: ElementId) {
        self.positions.push(position.x as f32);
        self.positions.push(position.y as f32);
        self.positions.push(position.z as f32);

        self.normals.push(normal.x as f32);
        self.normals.push(normal.y as f32);
        self.normals.push(normal.z as f32);

        self.element_ids.push(element_id);
    }

    /// Add a triangle
    #[inline]
    pub fn add_triangle(&mut self, i0: u32, i1: u32, i2: u32) {
        self.indices.push(i0);
        self.indices.push(i1);
        self.indices.push(i2);
    }

    /// Merge another mesh into this one
    #[inline]
    pub fn merge(&mut self, other: &Mesh) {
        if other.is_empty() {
            return;
        }

        let vertex_offset = self.vertex_count() as u32;

        self.positions.reserve(other.positions.len());
        self.normals.reserve(other.normals.len());
        self.indices.reserve(other.indices.len());
        self.element_ids.reserve(other.element_ids.len());

        self.positions.extend_from_slice(&other.positions);
        self.normals.extend_from_slice(&other.normals);
        self.element_ids.extend_from_slice(&other.element_ids);

        self.indices
            .extend(other.indices.iter().map(|&i| i + vertex_offset));
    }

    /// Batch merge multiple meshes at once (more efficient than individual merges)
    #[inline]
    pub fn merge_all<'a>(&mut self, meshes: impl IntoIterator<Item = &'a Mesh> + Clone) {
        let (total_positions, total_indices) = meshes
            .clone()
            .into_iter()
            .fold((0, 0), |(p, i), m| (p + m.positions.len(), i + m.indices.len()));

        self.positions.reserve(total_positions);
        self.normals.reserve(total_positions);
        self.element_ids.reserve(total_positions / 3);
        self.indices.reserve(total_indices);

        for mesh in meshes {
            self.merge(mesh);
        }
    }

    /// Get vertex count
    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Get triangle count
    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Check if mesh is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

impl Default for Mesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Index range of a merged mesh drawn with one material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaterialGroup {
    /// First index of the range
    pub start: u32,
    /// Number of indices in the range
    pub count: u32,
    /// Position in [`MergedMesh::materials`]
    pub material_index: usize,
}

/// Several meshes combined into one buffer set, still drawable
/// multi-material through its groups.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedMesh {
    pub mesh: Mesh,
    pub materials: Vec<Material>,
    pub groups: Vec<MaterialGroup>,
    positions_dirty: bool,
}

impl MergedMesh {
    pub fn new() -> Self {
        Self::default()
    }

    /// Combine per-material meshes in iteration order
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = (&'a Material, &'a Mesh)>) -> Self {
        let mut merged = Self::new();
        for (material, mesh) in parts {
            merged.append(material, mesh);
        }
        merged
    }

    /// Append a mesh drawn with `material`.
    ///
    /// Equal materials share one slot in `materials`; consecutive meshes
    /// with the same material share one group.
    pub fn append(&mut self, material: &Material, mesh: &Mesh) {
        if mesh.is_empty() {
            return;
        }

        let material_index = match self.materials.iter().position(|m| m == material) {
            Some(index) => index,
            None => {
                self.materials.push(material.clone());
                self.materials.len() - 1
            }
        };

        let start = self.mesh.indices.len() as u32;
        self.mesh.merge(mesh);
        self.push_group(MaterialGroup {
            start,
            count: mesh.indices.len() as u32,
            material_index,
        });
    }

    /// Add a group, growing the last one instead when it uses the same
    /// material and ends where `group` starts
    fn push_group(&mut self, group: MaterialGroup) {
        match self.groups.last_mut() {
            Some(last) if last.material_index == group.material_index && last.start + last.count == group.start => {
                last.count += group.count;
            }
            _ => self.groups.push(group),
        }
    }

    /// Append every group of another merged mesh, keeping its materials
    pub fn extend(&mut self, other: &MergedMesh) {
        let index_offset = self.mesh.indices.len() as u32;
        let material_slots: Vec<usize> = other
            .materials
            .iter()
            .map(|material| match self.materials.iter().position(|m| m == material) {
                Some(index) => index,
                None => {
                    self.materials.push(material.clone());
                    self.materials.len() - 1
                }
            })
            .collect();

        self.mesh.merge(&other.mesh);
        for g in &other.groups {
            self.push_group(MaterialGroup {
                start: g.start + index_offset,
                count: g.count,
                material_index: material_slots[g.material_index],
            });
        }
    }

    /// Rebuild from raw parts received from the other side of a transfer
    pub fn from_raw(mesh: Mesh, materials: Vec<Material>, groups: Vec<MaterialGroup>) -> Self {
        Self {
            mesh,
            materials,
            groups,
            positions_dirty: false,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.mesh.is_empty()
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.mesh.vertex_count()
    }

    /// Owning element of a vertex
    #[inline]
    pub fn element_at_vertex(&self, vertex: usize) -> Option<ElementId> {
        self.mesh.element_ids.get(vertex).copied()
    }

    /// Owning element of a triangle, as reported by a pick hit
    #[inline]
    pub fn element_of_face(&self, face: usize) -> Option<ElementId> {
        let vertex = *self.mesh.indices.get(face * 3)?;
        self.element_at_vertex(vertex as usize)
    }

    /// Flag the position buffer for re-upload
    #[inline]
    pub fn mark_positions_dirty(&mut self) {
        self.positions_dirty = true;
    }

    #[inline]
    pub fn positions_dirty(&self) -> bool {
        self.positions_dirty
    }

    /// Read and reset the re-upload flag
    #[inline]
    pub fn take_positions_dirty(&mut self) -> bool {
        std::mem::take(&mut self.positions_dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::material::Rgba;

    fn triangle(element_id: ElementId, z: f64) -> Mesh {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Point3::new(0.0, 0.0, z), Vector3::z(), element_id);
        mesh.add_vertex(Point3::new(1.0, 0.0, z), Vector3::z(), element_id);
        mesh.add_vertex(Point3::new(0.0, 1.0, z), Vector3::z(), element_id);
        mesh.add_triangle(0, 1, 2);
        mesh
    }

    #[test]
    fn test_mesh_creation() {
        let mesh = Mesh::new();
        assert!(mesh.is_empty());
        assert_eq!(mesh.vertex_count(), 0);
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn test_add_vertex() {
        let mut mesh = Mesh::new();
        mesh.add_vertex(Point3::new(1.0, 2.0, 3.0), Vector3::new(0.0, 0.0, 1.0), 7);
        assert_eq!(mesh.vertex_count(), 1);
        assert_eq!(mesh.positions, vec![1.0, 2.0, 3.0]);
        assert_eq!(mesh.normals, vec![0.0, 0.0, 1.0]);
        assert_eq!(mesh.element_ids, vec![7]);
    }

    #[test]
    fn test_merge_offsets_indices() {
        let mut mesh = triangle(1, 0.0);
        mesh.merge(&triangle(2, 1.0));
        assert_eq!(mesh.vertex_count(), 6);
        assert_eq!(mesh.indices, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(mesh.element_ids, vec![1, 1, 1, 2, 2, 2]);
    }


    #[test]
    fn test_merged_groups_and_picking() {
        let red = Material::from_color(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let blue = Material::from_color(Rgba::new(0.0, 0.0, 1.0, 1.0));
        let a = triangle(10, 0.0);
        let b = triangle(20, 1.0);

        let merged = MergedMesh::from_parts([(&red, &a), (&blue, &b)]);
        assert_eq!(merged.vertex_count(), 6);
        assert_eq!(merged.materials.len(), 2);
        assert_eq!(
            merged.groups,
            vec![
                MaterialGroup { start: 0, count: 3, material_index: 0 },
                MaterialGroup { start: 3, count: 3, material_index: 1 },
            ]
        );
        assert_eq!(merged.element_of_face(0), Some(10));
        assert_eq!(merged.element_of_face(1), Some(20));
        assert_eq!(merged.element_of_face(2), None);
    }

    #[test]
    fn test_append_reuses_material_slot() {
        let red = Material::from_color(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let mut merged = MergedMesh::new();
        merged.append(&red, &triangle(1, 0.0));
        merged.append(&red, &triangle(2, 0.0));
        assert_eq!(merged.materials.len(), 1);
        assert_eq!(merged.groups, vec![MaterialGroup { start: 0, count: 6, material_index: 0 }]);
    }

    #[test]
    fn test_extend_joins_group_across_boundary() {
        let red = Material::from_color(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let blue = Material::from_color(Rgba::new(0.0, 0.0, 1.0, 1.0));
        let mut base = MergedMesh::from_parts([(&blue, &triangle(1, 0.0)), (&red, &triangle(2, 0.0))]);
        let other = MergedMesh::from_parts([(&red, &triangle(3, 0.0))]);

        base.extend(&other);
        assert_eq!(base.groups.len(), 2);
        assert_eq!(base.groups[1], MaterialGroup { start: 3, count: 6, material_index: 1 });
        assert_eq!(base.element_of_face(2), Some(3));
    }

    #[test]
    fn test_extend_remaps_groups() {
        let red = Material::from_color(Rgba::new(1.0, 0.0, 0.0, 1.0));
        let blue = Material::from_color(Rgba::new(0.0, 0.0, 1.0, 1.0));
        let mut base = MergedMesh::from_parts([(&red, &triangle(1, 0.0))]);
        let other = MergedMesh::from_parts([(&blue, &triangle(2, 0.0)), (&red, &triangle(3, 0.0))]);

        base.extend(&other);
        assert_eq!(base.vertex_count(), 9);
        assert_eq!(base.materials.len(), 2);
        assert_eq!(base.groups[1], MaterialGroup { start: 3, count: 3, material_index: 1 });
        assert_eq!(base.groups[2], MaterialGroup { start: 6, count: 3, material_index: 0 });
        assert_eq!(base.element_of_face(2), Some(3));
    }

    #[test]
    fn test_dirty_flag() {
        let mut merged = MergedMesh::new();
        assert!(!merged.positions_dirty());
        merged.mark_positions_dirty();
        assert!(merged.take_positions_dirty());
        assert!(!merged.positions_dirty());
    }
}
