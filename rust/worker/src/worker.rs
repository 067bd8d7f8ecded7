// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Background aggregation context
//!
//! Owns its own kernel handle, filter and per-model bucket maps, and answers
//! one request at a time. Heavy work runs on the blocking pool; progress and
//! stream items are posted while it runs, the final response after.

use crate::error::{BrokerError, Result};
use crate::protocol::{
    Action, Envelope, ItemGeometryArgs, LoadModelArgs, ModelArgs, Progress, Subsystem, TransferKind,
    TransferNotice, UpdateFilterArgs,
};
use crate::transfer::TransferStore;
use ifc_batch_geometry::{
    Aggregator, GeometryFilter, GeometryKernel, KernelModel, ModelGeometry, ModelId, SerializedItemGeometry,
    SerializedModel,
};
use ifc_batch_processing::ProcessingError;
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

struct MirrorModel {
    kernel_model: KernelModel,
    geometry: ModelGeometry,
}

pub struct BackgroundContext {
    kernel: Arc<dyn GeometryKernel>,
    store: TransferStore,
    filter: GeometryFilter,
    models: FxHashMap<ModelId, MirrorModel>,
    responses: mpsc::Sender<Envelope>,
}

impl BackgroundContext {
    pub fn new(
        kernel: Arc<dyn GeometryKernel>,
        store: TransferStore,
        filter: GeometryFilter,
        responses: mpsc::Sender<Envelope>,
    ) -> Self {
        Self {
            kernel,
            store,
            filter,
            models: FxHashMap::default(),
            responses,
        }
    }

    pub fn spawn(self, requests: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        tokio::spawn(self.run(requests))
    }

    /// Serve requests until the channel closes or a dispose request arrives
    pub async fn run(mut self, mut requests: mpsc::Receiver<Envelope>) {
        tracing::debug!("Background context started");

        while let Some(request) = requests.recv().await {
            let reply = match self.handle(&request).await {
                Ok(result) => request.respond(result),
                Err(e) => {
                    tracing::warn!(
                        correlation_id = request.correlation_id,
                        action = ?request.action,
                        error = %e,
                        "Request failed"
                    );
                    request.fail(e)
                }
            };
            if self.responses.send(reply).await.is_err() {
                break;
            }
            if request.action == Action::Dispose {
                break;
            }
        }

        tracing::debug!(models = self.models.len(), "Background context stopped");
    }

    async fn handle(&mut self, request: &Envelope) -> Result<Value> {
        match (request.target, request.action) {
            (Subsystem::Geometry, Action::LoadModel) => self.load_model(request).await,
            (Subsystem::Geometry, Action::StreamAllMeshes) => self.stream_all_meshes(request).await,
            (Subsystem::Geometry, Action::GetItemGeometry) => self.item_geometry(request).await,
            (Subsystem::Models, Action::CloseModel) => {
                let args: ModelArgs = serde_json::from_value(request.args.clone())?;
                Ok(Value::Bool(self.models.remove(&args.model_id).is_some()))
            }
            (Subsystem::State, Action::UpdateFilter) => {
                let args: UpdateFilterArgs = serde_json::from_value(request.args.clone())?;
                self.filter = args.filter;
                Ok(Value::Null)
            }
            (Subsystem::State, Action::Dispose) => {
                self.models.clear();
                self.store.clear().await?;
                Ok(Value::Bool(true))
            }
            (target, action) => Err(BrokerError::Unsupported { target, action }),
        }
    }

    fn mirror(&self, model_id: ModelId) -> Result<&MirrorModel> {
        self.models
            .get(&model_id)
            .ok_or(BrokerError::Processing(ProcessingError::UnknownModel(model_id)))
    }

    async fn load_model(&mut self, request: &Envelope) -> Result<Value> {
        let args: LoadModelArgs = serde_json::from_value(request.args.clone())?;
        let kernel = Arc::clone(&self.kernel);
        let filter = self.filter.clone();
        let responses = self.responses.clone();
        let origin = request.clone();

        let (geometry, payload) = tokio::task::spawn_blocking(move || -> Result<_> {
            let geometry = Aggregator::new(kernel.as_ref(), &filter).aggregate(args.kernel_model, |processed, total| {
                let progress = origin.progress(Progress { processed, total });
                if responses.blocking_send(progress).is_err() {
                    tracing::trace!("Response channel closed, progress dropped");
                }
            })?;
            let mesh = geometry.build_merged_mesh();
            let payload = SerializedModel::new(&geometry, mesh.as_ref());
            Ok((geometry, payload))
        })
        .await??;

        let notice = TransferNotice {
            transfer: TransferKind::WholeModel,
            correlation_id: request.correlation_id,
        };
        let notice = self.store.write(notice, &payload).await?;
        self.models.insert(
            args.model_id,
            MirrorModel {
                kernel_model: args.kernel_model,
                geometry,
            },
        );

        Ok(serde_json::to_value(notice)?)
    }

    async fn stream_all_meshes(&mut self, request: &Envelope) -> Result<Value> {
        let args: ModelArgs = serde_json::from_value(request.args.clone())?;
        let kernel_model = self.mirror(args.model_id)?.kernel_model;
        let kernel = Arc::clone(&self.kernel);
        let filter = self.filter.clone();

        let flat_meshes = tokio::task::spawn_blocking(move || {
            let types = filter.apply(kernel.geometry_types(kernel_model)?);
            kernel.enumerate_fragments(kernel_model, &types)
        })
        .await??;

        let count = flat_meshes.len();
        for flat in &flat_meshes {
            let item = request.stream_item(serde_json::to_value(flat)?);
            if self.responses.send(item).await.is_err() {
                return Err(BrokerError::Disconnected);
            }
        }

        tracing::debug!(model_id = args.model_id, elements = count, "Streamed flat meshes");
        Ok(Value::from(count))
    }

    async fn item_geometry(&mut self, request: &Envelope) -> Result<Value> {
        let args: ItemGeometryArgs = serde_json::from_value(request.args.clone())?;
        let payload = SerializedItemGeometry::new(&self.mirror(args.model_id)?.geometry, args.element_id);
        let notice = TransferNotice {
            transfer: TransferKind::ItemGeometry,
            correlation_id: request.correlation_id,
        };
        Ok(serde_json::to_value(self.store.write(notice, &payload).await?)?)
    }
}
