// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Messages exchanged with the background context.
//!
//! Every request and every response travels in an [`Envelope`]. Responses
//! carry the correlation id of their request and one of three shapes:
//! progress, stream item, or final (with a result or an error).

use ifc_batch_geometry::{ElementId, GeometryFilter, KernelModel, ModelId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Strictly increasing per broker, never reused
pub type CorrelationId = u64;

/// Handler family addressed by a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subsystem {
    Geometry,
    Models,
    State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    LoadModel,
    CloseModel,
    StreamAllMeshes,
    GetItemGeometry,
    UpdateFilter,
    Dispose,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub target: Subsystem,
    pub action: Action,
    pub correlation_id: CorrelationId,
    #[serde(default)]
    pub args: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default)]
    pub is_progress: bool,
    #[serde(default)]
    pub is_stream_item: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Envelope {
    pub fn request(target: Subsystem, action: Action, correlation_id: CorrelationId, args: Value) -> Self {
        Self {
            target,
            action,
            correlation_id,
            args,
            result: None,
            is_progress: false,
            is_stream_item: false,
            error: None,
        }
    }

    fn reply(&self) -> Self {
        Self::request(self.target, self.action, self.correlation_id, Value::Null)
    }

    /// Final response carrying `result`
    pub fn respond(&self, result: Value) -> Self {
        Self {
            result: Some(result),
            ..self.reply()
        }
    }

    /// Final response carrying an error
    pub fn fail(&self, error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..self.reply()
        }
    }

    pub fn progress(&self, progress: Progress) -> Self {
        Self {
            result: serde_json::to_value(progress).ok(),
            is_progress: true,
            ..self.reply()
        }
    }

    pub fn stream_item(&self, item: Value) -> Self {
        Self {
            result: Some(item),
            is_stream_item: true,
            ..self.reply()
        }
    }

    /// Neither progress nor stream item
    pub fn is_final(&self) -> bool {
        !self.is_progress && !self.is_stream_item
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub processed: usize,
    pub total: usize,
}

/// Store slot a large result was written to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferKind {
    WholeModel = 0,
    ItemGeometry = 1,
}

/// Final result of a request whose payload went through the transfer store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferNotice {
    pub transfer: TransferKind,
    /// Request that produced the payload
    pub correlation_id: CorrelationId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadModelArgs {
    pub model_id: ModelId,
    pub kernel_model: KernelModel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelArgs {
    pub model_id: ModelId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemGeometryArgs {
    pub model_id: ModelId,
    pub element_id: ElementId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateFilterArgs {
    pub filter: GeometryFilter,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_envelope_wire_shape() {
        let request = Envelope::request(Subsystem::Geometry, Action::LoadModel, 3, json!({"modelId": 0}));
        let wire = serde_json::to_value(&request).unwrap();
        assert_eq!(wire["target"], "geometry");
        assert_eq!(wire["action"], "load_model");
        assert_eq!(wire["correlationId"], 3);
        assert!(wire.get("result").is_none());

        let progress = request.progress(Progress { processed: 5, total: 10 });
        assert!(progress.is_progress && !progress.is_final());
        assert_eq!(progress.correlation_id, 3);
        assert_eq!(progress.result, Some(json!({"processed": 5, "total": 10})));
    }

    #[test]
    fn test_missing_flags_default_to_final() {
        let wire = json!({"target": "models", "action": "close_model", "correlationId": 9, "result": true});
        let envelope: Envelope = serde_json::from_value(wire).unwrap();
        assert!(envelope.is_final());
        assert!(envelope.error.is_none());
    }

    #[test]
    fn test_transfer_kind_discriminants() {
        assert_eq!(TransferKind::WholeModel as u8, 0);
        assert_eq!(TransferKind::ItemGeometry as u8, 1);
    }

    #[test]
    fn test_transfer_notice_names_request() {
        let notice = TransferNotice {
            transfer: TransferKind::WholeModel,
            correlation_id: 12,
        };
        assert_eq!(
            serde_json::to_value(notice).unwrap(),
            json!({"transfer": "whole_model", "correlationId": 12})
        );
    }
}
