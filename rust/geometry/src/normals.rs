// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::mesh::Mesh;
use nalgebra::{Point3, Vector3};

#[inline]
fn vertex(mesh: &Mesh, i: usize) -> Point3<f64> {
    Point3::new(
        mesh.positions[i * 3] as f64,
        mesh.positions[i * 3 + 1] as f64,
        mesh.positions[i * 3 + 2] as f64,
    )
}

/// Calculate smooth vertex normals from the triangle list.
///
/// Area-weighted face normals are accumulated per vertex. Vertices without
/// any non-degenerate face get a zero normal.
pub fn calculate_normals(mesh: &mut Mesh) {
    let vertex_count = mesh.vertex_count();
    if vertex_count == 0 {
        return;
    }

    let mut normals = vec![Vector3::<f64>::zeros(); vertex_count];

    for tri in mesh.indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        let v0 = vertex(mesh, i0);
        let normal = (vertex(mesh, i1) - v0).cross(&(vertex(mesh, i2) - v0));

        normals[i0] += normal;
        normals[i1] += normal;
        normals[i2] += normal;
    }

    mesh.normals.clear();
    mesh.normals.reserve(vertex_count * 3);

    for normal in normals {
        let normalized = normal.try_normalize(1e-12).unwrap_or_else(Vector3::zeros);
        mesh.normals.push(normalized.x as f32);
        mesh.normals.push(normalized.y as f32);
        mesh.normals.push(normalized.z as f32);
    }
}
