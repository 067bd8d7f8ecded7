// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! IFC-Batch offloading
//!
//! Moves model aggregation into a background context. Requests and
//! responses are correlated by id, may carry progress and stream items, and
//! large results travel through a keyed transfer store instead of the
//! channel.

pub mod broker;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transfer;
pub mod worker;

pub use broker::{RequestBroker, RequestHooks, ResponseFuture};
pub use client::OffloadClient;
pub use config::OffloadConfig;
pub use error::{BrokerError, Result};
pub use protocol::{Action, CorrelationId, Envelope, Progress, Subsystem, TransferKind, TransferNotice};
pub use transfer::TransferStore;
pub use worker::BackgroundContext;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the default filter.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,ifc_batch_worker=debug"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.pretty().try_init()
    };
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}
