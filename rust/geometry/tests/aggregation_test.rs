// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Aggregation through the kernel contract, end to end
use ifc_batch_geometry::memory::{fan_buffers, IDENTITY};
use ifc_batch_geometry::{
    Aggregator, ElementType, GeometryFilter, GeometryHandle, KernelModel, MemoryKernel, Rgba,
};

const WALL: ElementType = ElementType(2391406946);
const RED: Rgba = Rgba::new(0.8, 0.1, 0.1, 1.0);
const BLUE: Rgba = Rgba::new(0.1, 0.1, 0.8, 1.0);

fn two_element_kernel() -> MemoryKernel {
    let model = KernelModel(0);
    let mut kernel = MemoryKernel::new();
    kernel.add_fragment(model, 1, WALL, GeometryHandle(10), RED, IDENTITY, fan_buffers(3, 0.0));
    kernel.add_fragment(model, 1, WALL, GeometryHandle(11), RED, IDENTITY, fan_buffers(5, 1.0));
    kernel.add_fragment(model, 2, WALL, GeometryHandle(12), BLUE, IDENTITY, fan_buffers(4, 2.0));
    kernel
}

#[test]
fn test_two_elements_two_buckets() {
    let kernel = two_element_kernel();
    let filter = GeometryFilter::default();
    let geometry = Aggregator::new(&kernel, &filter)
        .aggregate(KernelModel(0), |_, _| {})
        .unwrap();

    assert_eq!(geometry.buckets().len(), 2);
    assert_eq!(geometry.bucket(RED).unwrap().geometries[&1].vertex_count(), 8);

    let merged = geometry.build_merged_mesh().unwrap();
    assert_eq!(merged.vertex_count(), 12);
    assert_eq!(merged.groups.len(), 2);

    // Every vertex maps back to its element
    let red_vertices = merged.mesh.element_ids.iter().filter(|&&id| id == 1).count();
    assert_eq!(red_vertices, 8);
    assert_eq!(merged.element_of_face(merged.mesh.triangle_count() - 1), Some(2));
}

#[test]
fn test_openings_are_never_requested() {
    let model = KernelModel(0);
    let mut kernel = two_element_kernel();
    kernel.add_fragment(model, 3, ElementType::OPENING_ELEMENT, GeometryHandle(20), RED, IDENTITY, fan_buffers(6, 0.0));
    kernel.add_fragment(model, 4, ElementType::SPACE, GeometryHandle(21), BLUE, IDENTITY, fan_buffers(3, 0.0));

    let filter = GeometryFilter::default();
    let geometry = Aggregator::new(&kernel, &filter).aggregate(model, |_, _| {}).unwrap();
    assert!(!geometry.contains_element(3));
    assert!(geometry.contains_element(4));

    let mut filter = GeometryFilter::default();
    filter.set_optional_category(ElementType::SPACE, false);
    filter.set_optional_category(ElementType::OPENING_ELEMENT, true);
    let geometry = Aggregator::new(&kernel, &filter).aggregate(model, |_, _| {}).unwrap();
    assert!(geometry.contains_element(3));
    assert!(!geometry.contains_element(4));
}

#[test]
fn test_progress_is_coarse() {
    let model = KernelModel(0);
    let mut kernel = MemoryKernel::new();
    for id in 0..100u32 {
        kernel.add_fragment(model, id, WALL, GeometryHandle(id), RED, IDENTITY, fan_buffers(3, id as f32));
    }

    let filter = GeometryFilter::default();
    let mut calls = Vec::new();
    Aggregator::new(&kernel, &filter)
        .aggregate(model, |done, total| calls.push((done, total)))
        .unwrap();

    assert_eq!(calls.len(), 10);
    assert_eq!(calls.first(), Some(&(10, 100)));
    assert_eq!(calls.last(), Some(&(100, 100)));
}

#[test]
fn test_progress_stays_coarse_for_uneven_counts() {
    let model = KernelModel(0);
    let mut kernel = MemoryKernel::new();
    for id in 0..19u32 {
        kernel.add_fragment(model, id, WALL, GeometryHandle(id), RED, IDENTITY, fan_buffers(3, id as f32));
    }

    let filter = GeometryFilter::default();
    let mut calls = Vec::new();
    Aggregator::new(&kernel, &filter)
        .aggregate(model, |done, total| calls.push((done, total)))
        .unwrap();

    assert_eq!(calls.len(), 10);
    assert_eq!(calls.first(), Some(&(2, 19)));
    assert_eq!(calls.last(), Some(&(19, 19)));
}

#[test]
fn test_missing_buffers_fail_the_model() {
    let model = KernelModel(0);
    let mut kernel = two_element_kernel();
    kernel.add_fragment(model, 5, WALL, GeometryHandle(30), RED, IDENTITY, fan_buffers(3, 0.0));
    let mut broken = ifc_batch_geometry::memory::RecordedModel::default();
    broken.elements = vec![ifc_batch_geometry::memory::RecordedElement {
        element_id: 9,
        element_type: WALL,
        geometries: vec![ifc_batch_geometry::PlacedGeometry {
            geometry: GeometryHandle(99),
            color: RED,
            transform: IDENTITY,
        }],
    }];
    kernel.insert_model(KernelModel(1), broken);

    let filter = GeometryFilter::default();
    assert!(Aggregator::new(&kernel, &filter).aggregate(KernelModel(1), |_, _| {}).is_err());
}
