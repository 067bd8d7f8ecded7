//! IFC-Batch Geometry
//!
//! Turns placed mesh fragments from an external geometry kernel into
//! render-ready batches: one bucket per exact material color, merged into a
//! single multi-material mesh whose vertices remember their owning element.

pub mod aggregator;
pub mod error;
pub mod kernel;
pub mod material;
pub mod memory;
pub mod mesh;
pub mod normals;
pub mod serialize;
pub mod transform;

// Re-export nalgebra types for convenience
pub use nalgebra::{Matrix4, Point3, Vector3};

/// Id of a model inside this library (not the kernel's handle)
pub type ModelId = u32;

/// Express id of an IFC element
pub type ElementId = u32;

pub use aggregator::{Aggregator, MaterialBucket, ModelGeometry, ModelStats};
pub use error::{Error, Result};
pub use kernel::{
    ElementType, FlatMesh, FragmentBuffers, GeometryFilter, GeometryHandle, GeometryKernel, KernelModel,
    PlacedGeometry,
};
pub use material::{ColorKey, Material, Rgba};
pub use memory::MemoryKernel;
pub use mesh::{MaterialGroup, MergedMesh, Mesh};
pub use normals::calculate_normals;
pub use serialize::{
    ForeignCollection, SerializedItemGeometry, SerializedMergedMesh, SerializedMesh, SerializedModel,
};
