// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#![allow(dead_code)]

use ifc_batch_geometry::memory::{fan_buffers, IDENTITY};
use ifc_batch_geometry::{ElementId, ElementType, GeometryHandle, KernelModel, MemoryKernel, Mesh, Rgba};
use ifc_batch_processing::{DetachedScene, IfcManager};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const WALL: ElementType = ElementType(2391406946);
pub const RED: Rgba = Rgba::new(0.8, 0.1, 0.1, 1.0);
pub const BLUE: Rgba = Rgba::new(0.1, 0.1, 0.8, 1.0);
pub const GLASS: Rgba = Rgba::new(0.6, 0.8, 0.9, 0.4);

/// Elements 1..=6 spread over three colors, element 2 split across two
pub fn sample_kernel() -> MemoryKernel {
    let model = KernelModel(0);
    let mut kernel = MemoryKernel::new();
    let mut handle = 0;
    let mut add = |kernel: &mut MemoryKernel, id: ElementId, color: Rgba, vertices: usize| {
        handle += 1;
        let mut transform = IDENTITY;
        transform[12] = id as f64 * 10.0;
        kernel.add_fragment(model, id, WALL, GeometryHandle(handle), color, transform, fan_buffers(vertices, handle as f32));
    };
    add(&mut kernel, 1, RED, 3);
    add(&mut kernel, 2, RED, 5);
    add(&mut kernel, 2, BLUE, 4);
    add(&mut kernel, 3, BLUE, 6);
    add(&mut kernel, 4, GLASS, 3);
    add(&mut kernel, 5, RED, 4);
    add(&mut kernel, 6, GLASS, 5);
    kernel
}

pub fn loaded_manager() -> (IfcManager, u32) {
    let mut manager = IfcManager::new(Arc::new(sample_kernel()), Box::new(DetachedScene));
    let id = manager.load_model(KernelModel(0), |_, _| {}).unwrap();
    (manager, id)
}

/// Per-element sorted vertex positions, independent of buffer order
pub fn vertices_by_element(mesh: &Mesh) -> BTreeMap<ElementId, Vec<[u32; 3]>> {
    let mut map: BTreeMap<ElementId, Vec<[u32; 3]>> = BTreeMap::new();
    for (vertex, &id) in mesh.element_ids.iter().enumerate() {
        let p = &mesh.positions[vertex * 3..vertex * 3 + 3];
        map.entry(id).or_default().push([p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]);
    }
    for positions in map.values_mut() {
        positions.sort_unstable();
    }
    map
}
