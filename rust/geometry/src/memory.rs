// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory geometry kernel
//!
//! Holds pre-extracted fragment data, e.g. a JSON dump recorded from a real
//! kernel. Its storage mimics the index-accessed vectors of kernel bindings
//! so the owned-conversion path is the same one a binding adapter takes.

use crate::error::{Error, Result};
use crate::kernel::{
    ElementType, FlatMesh, FragmentBuffers, GeometryHandle, GeometryKernel, KernelModel, PlacedGeometry,
};
use crate::material::Rgba;
use crate::serialize::{to_vec, to_vec_with, ForeignCollection};
use crate::ElementId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// Size + getter view over a slice
struct IndexedVector<'a, T>(&'a [T]);

impl<T: Clone> ForeignCollection for IndexedVector<'_, T> {
    type Item = T;

    fn size(&self) -> usize {
        self.0.len()
    }

    fn get(&self, index: usize) -> T {
        self.0[index].clone()
    }
}

/// One element of a recorded model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedElement {
    pub element_id: ElementId,
    pub element_type: ElementType,
    pub geometries: Vec<PlacedGeometry>,
}

/// One recorded model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordedModel {
    pub elements: Vec<RecordedElement>,
    pub buffers: FxHashMap<u32, FragmentBuffers>,
}

/// Kernel serving recorded models
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryKernel {
    models: FxHashMap<u32, RecordedModel>,
}

impl MemoryKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load recorded models from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Kernel(format!("invalid kernel dump: {}", e)))
    }

    /// Recorded model handles, ascending
    pub fn models(&self) -> Vec<KernelModel> {
        let mut handles: Vec<KernelModel> = self.models.keys().map(|&k| KernelModel(k)).collect();
        handles.sort_unstable_by_key(|h| h.0);
        handles
    }

    pub fn insert_model(&mut self, model: KernelModel, recorded: RecordedModel) {
        self.models.insert(model.0, recorded);
    }

    /// Record a fragment: buffers under `geometry`, placement on `element_id`
    #[allow(clippy::too_many_arguments)]
    pub fn add_fragment(
        &mut self,
        model: KernelModel,
        element_id: ElementId,
        element_type: ElementType,
        geometry: GeometryHandle,
        color: Rgba,
        transform: [f64; 16],
        buffers: FragmentBuffers,
    ) {
        let recorded = self.models.entry(model.0).or_default();
        recorded.buffers.insert(geometry.0, buffers);

        let placed = PlacedGeometry {
            geometry,
            color,
            transform,
        };
        match recorded.elements.iter_mut().find(|e| e.element_id == element_id) {
            Some(element) => element.geometries.push(placed),
            None => recorded.elements.push(RecordedElement {
                element_id,
                element_type,
                geometries: vec![placed],
            }),
        }
    }

    fn model(&self, model: KernelModel) -> Result<&RecordedModel> {
        self.models.get(&model.0).ok_or(Error::UnknownModel(model.0))
    }
}

impl GeometryKernel for MemoryKernel {
    fn geometry_types(&self, model: KernelModel) -> Result<Vec<ElementType>> {
        let mut types: Vec<ElementType> = self.model(model)?.elements.iter().map(|e| e.element_type).collect();
        types.sort_unstable();
        types.dedup();
        Ok(types)
    }

    fn enumerate_fragments(&self, model: KernelModel, types: &[ElementType]) -> Result<Vec<FlatMesh>> {
        let recorded = self.model(model)?;
        let selected: Vec<&RecordedElement> = recorded
            .elements
            .iter()
            .filter(|e| types.contains(&e.element_type))
            .collect();

        Ok(to_vec_with(&IndexedVector(&selected), |element| FlatMesh {
            element_id: element.element_id,
            geometries: to_vec(&IndexedVector(&element.geometries)).into(),
        }))
    }

    fn fetch_fragment_buffers(&self, model: KernelModel, geometry: GeometryHandle) -> Result<FragmentBuffers> {
        self.model(model)?
            .buffers
            .get(&geometry.0)
            .cloned()
            .ok_or_else(|| Error::Kernel(format!("no buffers for geometry #{} in model {}", geometry.0, model.0)))
    }
}

/// Identity transform in column-major order
pub const IDENTITY: [f64; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Interleaved buffers of a triangle fan with `vertices` vertices along x,
/// offset by `z`; handy for recording test models.
pub fn fan_buffers(vertices: usize, z: f32) -> FragmentBuffers {
    let mut vertex_floats = Vec::with_capacity(vertices * 6);
    for i in 0..vertices {
        let angle = i as f32 * 0.5;
        vertex_floats.extend_from_slice(&[angle.cos() * i as f32, angle.sin() * i as f32, z, 0.0, 0.0, 1.0]);
    }
    let index_ints = (2..vertices as u32).flat_map(|i| [0, i - 1, i]).collect();
    FragmentBuffers {
        vertex_floats,
        index_ints,
    }
}
