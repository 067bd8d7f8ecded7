// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property queries
//!
//! One capability, two independent sources: a live kernel, or properties
//! exported ahead of time as JSON. The backend is picked per call.

use crate::error::{ProcessingError, Result};
use ifc_batch_geometry::{ElementId, ElementType, KernelModel, ModelId};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reference marker used by kernel property lines: `{"type": 5, "value": id}`
const REF_TYPE: u64 = 5;

/// Nested references deeper than this are left unresolved
const MAX_RESOLVE_DEPTH: usize = 8;

/// Which property source answers a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyBackend {
    #[default]
    Kernel,
    Json,
}

/// Model addressed both ways
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRef {
    pub id: ModelId,
    pub kernel: KernelModel,
}

/// Node of the project → site → building → storey → element tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialNode {
    pub express_id: ElementId,
    #[serde(rename = "type")]
    pub element_type: String,
    #[serde(default)]
    pub children: Vec<SpatialNode>,
}

/// Property queries a backend must answer
pub trait PropertySource: Send + Sync {
    /// Attributes of one item; with `recursive`, references are inlined
    fn item_properties(&self, model: ModelRef, id: ElementId, recursive: bool) -> Result<Option<Value>>;

    fn spatial_structure(&self, model: ModelRef) -> Result<SpatialNode>;

    fn items_of_type(&self, model: ModelRef, element_type: ElementType) -> Result<Vec<ElementId>>;
}

/// Raw line access offered by a kernel
pub trait PropertyKernel: Send + Sync {
    fn line(&self, model: KernelModel, id: ElementId) -> Result<Option<Value>>;

    fn line_ids_with_type(&self, model: KernelModel, element_type: ElementType) -> Result<Vec<ElementId>>;

    fn spatial_structure(&self, model: KernelModel) -> Result<SpatialNode>;
}

/// Inline `{"type": 5, "value": id}` references using `fetch`
fn resolve_refs(
    value: Value,
    depth: usize,
    fetch: &dyn Fn(ElementId) -> Result<Option<Value>>,
) -> Result<Value> {
    if depth >= MAX_RESOLVE_DEPTH {
        return Ok(value);
    }

    match value {
        Value::Object(map) => {
            if map.get("type").and_then(Value::as_u64) == Some(REF_TYPE) {
                if let Some(id) = map.get("value").and_then(Value::as_u64) {
                    return match fetch(id as ElementId)? {
                        Some(line) => resolve_refs(line, depth + 1, fetch),
                        None => Ok(Value::Object(map)),
                    };
                }
            }
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (key, inner) in map {
                resolved.insert(key, resolve_refs(inner, depth, fetch)?);
            }
            Ok(Value::Object(resolved))
        }
        Value::Array(items) => items
            .into_iter()
            .map(|inner| resolve_refs(inner, depth, fetch))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        other => Ok(other),
    }
}

/// Properties read live from the kernel
pub struct KernelProperties<K: PropertyKernel> {
    kernel: K,
}

impl<K: PropertyKernel> KernelProperties<K> {
    pub fn new(kernel: K) -> Self {
        Self { kernel }
    }
}

impl<K: PropertyKernel> PropertySource for KernelProperties<K> {
    fn item_properties(&self, model: ModelRef, id: ElementId, recursive: bool) -> Result<Option<Value>> {
        let Some(line) = self.kernel.line(model.kernel, id)? else {
            return Ok(None);
        };
        if !recursive {
            return Ok(Some(line));
        }
        let fetch = |ref_id: ElementId| self.kernel.line(model.kernel, ref_id);
        resolve_refs(line, 0, &fetch).map(Some)
    }

    fn spatial_structure(&self, model: ModelRef) -> Result<SpatialNode> {
        self.kernel.spatial_structure(model.kernel)
    }

    fn items_of_type(&self, model: ModelRef, element_type: ElementType) -> Result<Vec<ElementId>> {
        self.kernel.line_ids_with_type(model.kernel, element_type)
    }
}

/// Pre-exported properties of one model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyExport {
    /// Lines by express id
    pub items: FxHashMap<ElementId, Value>,
    pub spatial_structure: SpatialNode,
}

/// Properties served from JSON exports
#[derive(Debug, Default)]
pub struct JsonProperties {
    models: FxHashMap<ModelId, PropertyExport>,
}

impl JsonProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, model: ModelId, json: &str) -> Result<()> {
        let export: PropertyExport =
            serde_json::from_str(json).map_err(|e| ProcessingError::Properties(e.to_string()))?;
        self.models.insert(model, export);
        Ok(())
    }

    pub fn unload(&mut self, model: ModelId) {
        self.models.remove(&model);
    }

    fn export(&self, model: ModelId) -> Result<&PropertyExport> {
        self.models
            .get(&model)
            .ok_or_else(|| ProcessingError::Properties(format!("no property export for model {}", model)))
    }
}

impl PropertySource for JsonProperties {
    fn item_properties(&self, model: ModelRef, id: ElementId, recursive: bool) -> Result<Option<Value>> {
        let export = self.export(model.id)?;
        let Some(line) = export.items.get(&id).cloned() else {
            return Ok(None);
        };
        if !recursive {
            return Ok(Some(line));
        }
        let fetch = |ref_id: ElementId| -> Result<Option<Value>> { Ok(export.items.get(&ref_id).cloned()) };
        resolve_refs(line, 0, &fetch).map(Some)
    }

    fn spatial_structure(&self, model: ModelRef) -> Result<SpatialNode> {
        Ok(self.export(model.id)?.spatial_structure.clone())
    }

    fn items_of_type(&self, model: ModelRef, element_type: ElementType) -> Result<Vec<ElementId>> {
        let mut ids: Vec<ElementId> = self
            .export(model.id)?
            .items
            .iter()
            .filter(|(_, line)| line.get("typeCode").and_then(Value::as_u64) == Some(element_type.0 as u64))
            .map(|(&id, _)| id)
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MODEL: ModelRef = ModelRef {
        id: 0,
        kernel: KernelModel(0),
    };

    fn export() -> JsonProperties {
        let mut props = JsonProperties::new();
        let json = json!({
            "items": {
                "1": {"expressID": 1, "typeCode": 100, "Name": "Wall", "OwnerHistory": {"type": 5, "value": 2}},
                "2": {"expressID": 2, "typeCode": 7, "Owner": {"type": 5, "value": 3}},
                "3": {"expressID": 3, "typeCode": 8},
                "4": {"expressID": 4, "typeCode": 100}
            },
            "spatialStructure": {"express_id": 10, "type": "IFCPROJECT", "children": [
                {"express_id": 11, "type": "IFCSITE"}
            ]}
        });
        props.load(0, &json.to_string()).unwrap();
        props
    }

    #[test]
    fn test_flat_and_recursive_lookup() {
        let props = export();
        let flat = props.item_properties(MODEL, 1, false).unwrap().unwrap();
        assert_eq!(flat["OwnerHistory"]["value"], 2);

        let deep = props.item_properties(MODEL, 1, true).unwrap().unwrap();
        assert_eq!(deep["OwnerHistory"]["expressID"], 2);
        assert_eq!(deep["OwnerHistory"]["Owner"]["expressID"], 3);

        assert!(props.item_properties(MODEL, 99, true).unwrap().is_none());
    }

    #[test]
    fn test_items_of_type_and_structure() {
        let props = export();
        assert_eq!(props.items_of_type(MODEL, ElementType(100)).unwrap(), vec![1, 4]);
        let tree = props.spatial_structure(MODEL).unwrap();
        assert_eq!(tree.children[0].element_type, "IFCSITE");
    }

    #[test]
    fn test_missing_export_is_an_error() {
        let props = JsonProperties::new();
        assert!(props.spatial_structure(MODEL).is_err());
    }

    #[test]
    fn test_self_reference_stops_at_depth() {
        let line = json!({"next": {"type": 5, "value": 1}});
        let fetch = |_: ElementId| -> Result<Option<Value>> { Ok(Some(json!({"next": {"type": 5, "value": 1}}))) };
        let resolved = resolve_refs(line, 0, &fetch).unwrap();
        assert!(resolved.to_string().contains("\"type\":5"));
    }
}
