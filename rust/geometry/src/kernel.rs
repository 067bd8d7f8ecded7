// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Contract of the external geometry-extraction kernel
//!
//! The kernel is a black box: it lists the placed fragments of every element
//! of a given set of types and hands out raw buffers per fragment. Anything
//! foreign it returns is converted to owned data before it crosses this trait.

use crate::error::Result;
use crate::material::Rgba;
use crate::ElementId;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Model handle as known to the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct KernelModel(pub u32);

/// Handle of one fragment's geometry inside the kernel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GeometryHandle(pub u32);

/// Numeric IFC entity type code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementType(pub u32);

impl ElementType {
    pub const OPENING_ELEMENT: Self = Self(3588315303);
    pub const SPACE: Self = Self(3856911033);
}

/// One placed piece of an element's geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacedGeometry {
    pub geometry: GeometryHandle,
    pub color: Rgba,
    /// Column-major world transform
    pub transform: [f64; 16],
}

/// All placed geometry of one element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatMesh {
    pub element_id: ElementId,
    pub geometries: SmallVec<[PlacedGeometry; 4]>,
}

/// Raw buffers of one fragment.
///
/// `vertex_floats` interleaves 3 position floats with 3 normal floats per vertex.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentBuffers {
    pub vertex_floats: Vec<f32>,
    pub index_ints: Vec<u32>,
}

/// Geometry-extraction engine seen from the aggregator
pub trait GeometryKernel: Send + Sync {
    /// Element types of `model` that carry geometry
    fn geometry_types(&self, model: KernelModel) -> Result<Vec<ElementType>>;

    /// Placed fragments of every element whose type is in `types`
    fn enumerate_fragments(&self, model: KernelModel, types: &[ElementType]) -> Result<Vec<FlatMesh>>;

    /// Vertex and index buffers of one fragment
    fn fetch_fragment_buffers(&self, model: KernelModel, geometry: GeometryHandle) -> Result<FragmentBuffers>;
}

/// Optional element categories, applied before fragments are requested.
///
/// Types without an entry are always included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryFilter {
    optional: FxHashMap<ElementType, bool>,
}

impl GeometryFilter {
    /// Include or exclude a category
    pub fn set_optional_category(&mut self, element_type: ElementType, include: bool) {
        self.optional.insert(element_type, include);
    }

    #[inline]
    pub fn admits(&self, element_type: ElementType) -> bool {
        self.optional.get(&element_type).copied().unwrap_or(true)
    }

    /// Drop excluded categories from a kernel type list
    pub fn apply(&self, types: Vec<ElementType>) -> Vec<ElementType> {
        types.into_iter().filter(|t| self.admits(*t)).collect()
    }
}

impl Default for GeometryFilter {
    fn default() -> Self {
        let mut optional = FxHashMap::default();
        optional.insert(ElementType::SPACE, true);
        optional.insert(ElementType::OPENING_ELEMENT, false);
        Self { optional }
    }
}
