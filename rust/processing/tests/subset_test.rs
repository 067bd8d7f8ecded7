// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod common;

use common::{loaded_manager, vertices_by_element};
use ifc_batch_geometry::{Material, Rgba};
use ifc_batch_processing::{MaterialOverride, SubsetConfig, SubsetKey, SubsetOutcome};
use std::sync::Arc;

#[test]
fn test_contained_ids_are_a_no_op() {
    let (mut manager, model) = loaded_manager();
    let first = manager.create_subset(SubsetConfig::new(model, [1, 2, 3], false)).unwrap();
    let before = first.mesh().cloned().unwrap();

    let again = manager.create_subset(SubsetConfig::new(model, [3, 1], false)).unwrap();
    assert!(matches!(again, SubsetOutcome::Unchanged(_)));
    assert!(Arc::ptr_eq(again.mesh().unwrap(), &before));

    let key = SubsetKey::new(model, None, None);
    assert_eq!(manager.subset_ids(&key).unwrap().len(), 3);
    assert!(Arc::ptr_eq(&manager.get_subset(&key).unwrap(), &before));
}

#[test]
fn test_additive_matches_direct_build() {
    let orders: [(&[u32], &[u32]); 3] = [(&[1, 2], &[3]), (&[3], &[1, 2]), (&[2], &[1, 3])];

    let (mut direct, model) = loaded_manager();
    let direct = direct.create_subset(SubsetConfig::new(model, [1, 2, 3], true)).unwrap();
    let direct = direct.mesh().unwrap();
    let expected = vertices_by_element(&direct.mesh);

    for (first, second) in orders {
        let (mut manager, model) = loaded_manager();
        manager
            .create_subset(SubsetConfig::new(model, first.iter().copied(), false))
            .unwrap();
        let grown = manager
            .create_subset(SubsetConfig::new(model, second.iter().copied(), false))
            .unwrap();

        assert!(matches!(grown, SubsetOutcome::Extended(_)));
        let grown = grown.mesh().unwrap();
        assert_eq!(vertices_by_element(&grown.mesh), expected);
        let drawn: u32 = grown.groups.iter().map(|g| g.count).sum();
        assert_eq!(drawn as usize, grown.mesh.indices.len());
        for material in &grown.materials {
            assert!(direct.materials.contains(material));
        }
    }

    // Appending the tail of the last bucket lands in the same buffer layout
    let (mut manager, model) = loaded_manager();
    manager.create_subset(SubsetConfig::new(model, [1, 2], false)).unwrap();
    let grown = manager.create_subset(SubsetConfig::new(model, [3], false)).unwrap();
    let grown = grown.mesh().unwrap();
    assert_eq!(grown.materials, direct.materials);
    assert_eq!(grown.groups, direct.groups);
    assert_eq!(grown.mesh, direct.mesh);
}

#[test]
fn test_replace_drops_previous_ids() {
    let (mut manager, model) = loaded_manager();
    manager.create_subset(SubsetConfig::new(model, [1, 2], true)).unwrap();
    let replaced = manager.create_subset(SubsetConfig::new(model, [2], true)).unwrap();

    assert!(matches!(replaced, SubsetOutcome::Rebuilt(_)));
    let elements = vertices_by_element(&replaced.mesh().unwrap().mesh);
    assert_eq!(elements.keys().copied().collect::<Vec<_>>(), vec![2]);
    assert_eq!(
        manager.subset_ids(&SubsetKey::new(model, None, None)).unwrap().into_iter().collect::<Vec<_>>(),
        vec![2]
    );
}

#[test]
fn test_custom_ids_are_separate_slots() {
    let (mut manager, model) = loaded_manager();
    manager.create_subset(SubsetConfig::new(model, [1], true)).unwrap();
    manager
        .create_subset(SubsetConfig::new(model, [4], true).with_custom_id("hover"))
        .unwrap();

    assert!(manager.get_subset(&SubsetKey::new(model, None, None)).is_some());
    let hover = SubsetKey::new(model, None, Some("hover"));
    assert_eq!(manager.subset_ids(&hover).unwrap().len(), 1);

    manager.remove_subset(&hover);
    assert!(manager.get_subset(&hover).is_none());
    assert!(manager.get_subset(&SubsetKey::new(model, None, None)).is_some());
}

#[test]
fn test_override_material_keeps_geometry() {
    let (mut manager, model) = loaded_manager();
    let highlight = MaterialOverride {
        id: "selection".into(),
        material: Material::from_color(Rgba::new(1.0, 0.0, 1.0, 0.6)),
    };
    let outcome = manager
        .create_subset(SubsetConfig::new(model, [2], true).with_material(highlight.clone()))
        .unwrap();
    let mesh = outcome.mesh().unwrap();

    // Element 2 lives in two buckets; both pieces come out as one override group
    assert_eq!(mesh.vertex_count(), 9);
    assert_eq!(mesh.groups.len(), 1);
    assert_eq!(mesh.groups[0].count as usize, mesh.mesh.indices.len());
    assert_eq!(mesh.materials, vec![highlight.material.clone()]);
    assert!(manager
        .get_subset(&SubsetKey::new(model, Some(&highlight), None))
        .is_some());
}

#[test]
fn test_unknown_model_is_rejected() {
    let (mut manager, _) = loaded_manager();
    assert!(manager.create_subset(SubsetConfig::new(42, [1], true)).is_err());
}
