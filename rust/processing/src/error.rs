// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use ifc_batch_geometry::ModelId;
use thiserror::Error;

/// Result type for foreground model operations
pub type Result<T> = std::result::Result<T, ProcessingError>;

#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model {0} is not loaded")]
    UnknownModel(ModelId),

    #[error("Geometry error: {0}")]
    Geometry(#[from] ifc_batch_geometry::Error),

    #[error("Property query failed: {0}")]
    Properties(String),
}
