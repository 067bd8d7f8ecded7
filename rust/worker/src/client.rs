// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Foreground handle on the background context

use crate::broker::{RequestBroker, RequestHooks};
use crate::config::OffloadConfig;
use crate::error::Result;
use crate::protocol::{
    Action, ItemGeometryArgs, LoadModelArgs, ModelArgs, Progress, Subsystem, TransferNotice, UpdateFilterArgs,
};
use crate::transfer::TransferStore;
use crate::worker::BackgroundContext;
use futures::stream::BoxStream;
use ifc_batch_geometry::{
    ElementId, FlatMesh, GeometryFilter, GeometryKernel, KernelModel, Material, Mesh, ModelId,
    SerializedItemGeometry, SerializedModel,
};
use ifc_batch_processing::IfcManager;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Runs aggregation in a background context and feeds the results into an
/// [`IfcManager`]. Must be created inside a tokio runtime.
pub struct OffloadClient {
    broker: Arc<RequestBroker>,
    store: TransferStore,
    worker: JoinHandle<()>,
    pump: JoinHandle<()>,
}

impl OffloadClient {
    pub fn spawn(kernel: Arc<dyn GeometryKernel>, config: &OffloadConfig) -> Self {
        let (request_tx, request_rx) = mpsc::channel(config.channel_capacity);
        let (response_tx, mut response_rx) = mpsc::channel(config.channel_capacity);
        let store = TransferStore::new(&config.transfer_dir);

        let worker = BackgroundContext::new(kernel, store.clone(), config.filter(), response_tx).spawn(request_rx);
        let broker = Arc::new(RequestBroker::new(request_tx));

        let pump = tokio::spawn({
            let broker = Arc::clone(&broker);
            async move {
                while let Some(envelope) = response_rx.recv().await {
                    broker.handle_response(envelope);
                }
                broker.reject_all();
            }
        });

        tracing::debug!(transfer_dir = %store.dir().display(), "Offload client started");

        Self {
            broker,
            store,
            worker,
            pump,
        }
    }

    pub fn broker(&self) -> &Arc<RequestBroker> {
        &self.broker
    }

    /// Send a request whose final response is a transfer notice and take
    /// the payload it names
    async fn fetch_transfer<T: DeserializeOwned>(
        &self,
        target: Subsystem,
        action: Action,
        args: Value,
        hooks: RequestHooks,
    ) -> Result<T> {
        let notice = self.broker.request(target, action, args, hooks).await?;
        let notice: TransferNotice = serde_json::from_value(notice)?;
        self.store.take(&notice).await
    }

    /// Aggregate `kernel_model` in the background and register the result
    /// with `manager`. The model id is reserved up front.
    pub async fn load_model(
        &self,
        manager: &mut IfcManager,
        kernel_model: KernelModel,
        on_progress: impl FnMut(Progress) + Send + 'static,
    ) -> Result<ModelId> {
        let model_id = manager.reserve_model_id();
        let args = serde_json::to_value(LoadModelArgs {
            model_id,
            kernel_model,
        })?;

        let hooks = RequestHooks::new().on_progress(on_progress);
        let payload: SerializedModel = self
            .fetch_transfer(Subsystem::Geometry, Action::LoadModel, args, hooks)
            .await?;
        let (geometry, mesh) = payload.reconstruct()?;
        manager.adopt_model(model_id, kernel_model, geometry, mesh);
        Ok(model_id)
    }

    /// Close a model on both sides
    pub async fn close_model(&self, manager: &mut IfcManager, model_id: ModelId) -> Result<()> {
        manager.close_model(model_id)?;
        let args = serde_json::to_value(ModelArgs { model_id })?;
        self.broker
            .request(Subsystem::Models, Action::CloseModel, args, RequestHooks::new())
            .await?;
        Ok(())
    }

    /// Every flat mesh of a loaded model, one stream item per element
    pub fn stream_all_meshes(&self, model_id: ModelId) -> Result<BoxStream<'static, Result<FlatMesh>>> {
        let args = serde_json::to_value(ModelArgs { model_id })?;
        Ok(self
            .broker
            .request_stream(Subsystem::Geometry, Action::StreamAllMeshes, args, |value| {
                Ok(serde_json::from_value(value)?)
            }))
    }

    /// Geometry of one element, per material
    pub async fn item_geometry(&self, model_id: ModelId, element_id: ElementId) -> Result<Vec<(Material, Mesh)>> {
        let args = serde_json::to_value(ItemGeometryArgs { model_id, element_id })?;
        let payload: SerializedItemGeometry = self
            .fetch_transfer(Subsystem::Geometry, Action::GetItemGeometry, args, RequestHooks::new())
            .await?;
        Ok(payload.reconstruct()?)
    }

    /// Replace the category filter used by later background loads
    pub async fn update_filter(&self, filter: &GeometryFilter) -> Result<()> {
        let args = serde_json::to_value(UpdateFilterArgs { filter: filter.clone() })?;
        self.broker
            .request(Subsystem::State, Action::UpdateFilter, args, RequestHooks::new())
            .await?;
        Ok(())
    }

    /// Release background state and wait for both tasks to finish
    pub async fn shutdown(self) -> Result<()> {
        self.broker
            .request(Subsystem::State, Action::Dispose, Value::Null, RequestHooks::new())
            .await?;
        self.worker.await?;
        self.pump.await?;
        tracing::debug!("Offload client stopped");
        Ok(())
    }
}
