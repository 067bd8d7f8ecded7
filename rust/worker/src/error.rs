// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Errors crossing the offload boundary.

use crate::protocol::{Action, Subsystem};
use thiserror::Error;

/// Failures seen by a caller of the background context.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Background context failed: {0}")]
    Remote(String),

    #[error("Response hook failed: {0}")]
    Hook(String),

    #[error("Background context is gone")]
    Disconnected,

    #[error("{action:?} is not handled by {target:?}")]
    Unsupported { target: Subsystem, action: Action },

    #[error("Transfer store error: {0}")]
    Transfer(String),

    #[error("Geometry error: {0}")]
    Geometry(#[from] ifc_batch_geometry::Error),

    #[error("Processing error: {0}")]
    Processing(#[from] ifc_batch_processing::ProcessingError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Join error")]
    Join(#[from] tokio::task::JoinError),
}

impl From<cacache::Error> for BrokerError {
    fn from(err: cacache::Error) -> Self {
        BrokerError::Transfer(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
