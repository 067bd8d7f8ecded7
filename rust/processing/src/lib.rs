// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Foreground model processing: the model table, selection subsets,
//! visibility toggling and property queries on top of aggregated geometry.

pub mod context;
pub mod error;
pub mod manager;
pub mod properties;
pub mod subset;
pub mod visibility;

pub use context::{ModelState, ModelTable};
pub use error::{ProcessingError, Result};
pub use manager::IfcManager;
pub use properties::{
    JsonProperties, KernelProperties, ModelRef, PropertyBackend, PropertyExport, PropertyKernel, PropertySource,
    SpatialNode,
};
pub use subset::{
    DetachedScene, MaterialOverride, SceneGraph, SharedMesh, Subset, SubsetConfig, SubsetKey, SubsetManager,
    SubsetOutcome,
};
pub use visibility::{CoordinateIndex, VisibilityManager};
