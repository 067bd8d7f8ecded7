// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fragment extraction and world placement
//!
//! Kernel vertex buffers interleave a position triple with a normal triple
//! (6 floats per vertex). Extraction splits them, places positions with the
//! fragment's world transform, rotates normals with the matching normal
//! matrix and stamps the owning element id.

use crate::error::{Error, Result};
use crate::kernel::FragmentBuffers;
use crate::mesh::Mesh;
use crate::normals::calculate_normals;
use crate::ElementId;
use nalgebra::{Matrix3, Matrix4, Point3, Vector3};

/// Floats per interleaved vertex (position + normal)
pub const FLOATS_PER_VERTEX: usize = 6;

/// Build a transform from a column-major 4x4 array as the kernel reports it
#[inline]
pub fn matrix_from_column_major(values: &[f64; 16]) -> Matrix4<f64> {
    Matrix4::from_column_slice(values)
}

/// Normal matrix (inverse transpose of the linear part).
/// Falls back to the linear part for degenerate transforms.
fn normal_matrix(transform: &Matrix4<f64>) -> Matrix3<f64> {
    let linear: Matrix3<f64> = transform.fixed_view::<3, 3>(0, 0).into_owned();
    linear
        .try_inverse()
        .map(|inverse| inverse.transpose())
        .unwrap_or(linear)
}

/// Turn raw kernel buffers into a placed, id-stamped mesh
pub fn extract_fragment(
    buffers: &FragmentBuffers,
    transform: &Matrix4<f64>,
    element_id: ElementId,
) -> Result<Mesh> {
    let floats = &buffers.vertex_floats;
    if floats.len() % FLOATS_PER_VERTEX != 0 {
        return Err(Error::InvalidBuffers(format!(
            "vertex buffer of element #{} has {} floats, not a multiple of {}",
            element_id,
            floats.len(),
            FLOATS_PER_VERTEX
        )));
    }
    if buffers.index_ints.len() % 3 != 0 {
        return Err(Error::InvalidBuffers(format!(
            "index buffer of element #{} has {} entries, not whole triangles",
            element_id,
            buffers.index_ints.len()
        )));
    }

    let vertex_count = floats.len() / FLOATS_PER_VERTEX;
    if let Some(&bad) = buffers.index_ints.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(Error::InvalidBuffers(format!(
            "index {} out of range for {} vertices in element #{}",
            bad, vertex_count, element_id
        )));
    }

    let normal_matrix = normal_matrix(transform);
    let mut mesh = Mesh::with_capacity(vertex_count, buffers.index_ints.len());
    let mut missing_normals = false;

    for vertex in floats.chunks_exact(FLOATS_PER_VERTEX) {
        let local = Point3::new(vertex[0] as f64, vertex[1] as f64, vertex[2] as f64);
        let position = transform.transform_point(&local);

        let normal = normal_matrix * Vector3::new(vertex[3] as f64, vertex[4] as f64, vertex[5] as f64);
        let normal = match normal.try_normalize(1e-12) {
            Some(n) => n,
            None => {
                missing_normals = true;
                Vector3::zeros()
            }
        };

        mesh.add_vertex(position, normal, element_id);
    }

    mesh.indices.extend_from_slice(&buffers.index_ints);

    if missing_normals {
        calculate_normals(&mut mesh);
    }

    Ok(mesh)
}
