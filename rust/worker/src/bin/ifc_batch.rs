// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ifc-batch - replay a recorded kernel dump through the batching pipeline.
//!
//! Loads every model of the dump, in the background context unless
//! `IFC_BATCH_OFFLOAD=false`, and prints one JSON line of counters per model.
//!
//! ```text
//! ifc-batch <kernel-dump.json>
//! ```

use anyhow::{Context, Result};
use ifc_batch_geometry::{ElementType, GeometryKernel, MemoryKernel, ModelStats};
use ifc_batch_processing::{DetachedScene, IfcManager};
use ifc_batch_worker::{init_tracing, OffloadClient, OffloadConfig};
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ModelReport {
    model_id: u32,
    kernel_model: u32,
    #[serde(flatten)]
    stats: ModelStats,
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = OffloadConfig::from_env();
    init_tracing(config.log_json);

    let path = std::env::args()
        .nth(1)
        .context("usage: ifc-batch <kernel-dump.json>")?;
    let dump = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("failed to read {}", path))?;

    tracing::info!(
        path = %path,
        offload = config.offload,
        transfer_dir = %config.transfer_dir.display(),
        worker_threads = config.worker_threads,
        "Starting IFC-Batch replay"
    );

    rayon::ThreadPoolBuilder::new()
        .num_threads(config.worker_threads)
        .build_global()
        .context("failed to build rayon thread pool")?;

    let recorded = Arc::new(MemoryKernel::from_json(&dump)?);
    let kernel: Arc<dyn GeometryKernel> = recorded.clone();

    let mut manager = IfcManager::new(Arc::clone(&kernel), Box::new(DetachedScene));
    manager.set_optional_category(ElementType::SPACE, config.include_spaces);
    manager.set_optional_category(ElementType::OPENING_ELEMENT, config.include_openings);

    let client = config.offload.then(|| OffloadClient::spawn(Arc::clone(&kernel), &config));

    for handle in recorded.models() {
        let model_id = match &client {
            Some(client) => {
                client
                    .load_model(&mut manager, handle, move |p| {
                        tracing::debug!(kernel_model = handle.0, processed = p.processed, total = p.total, "Loading");
                    })
                    .await?
            }
            None => manager.load_model(handle, |processed, total| {
                tracing::debug!(kernel_model = handle.0, processed, total, "Loading");
            })?,
        };

        let report = ModelReport {
            model_id,
            kernel_model: handle.0,
            stats: manager.model(model_id)?.geometry.stats(),
        };
        println!("{}", serde_json::to_string(&report)?);
    }

    if let Some(client) = client {
        client.shutdown().await?;
    }
    manager.dispose();

    Ok(())
}
