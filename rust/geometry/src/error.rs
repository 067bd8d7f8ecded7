// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for geometry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during fragment aggregation
#[derive(Error, Debug)]
pub enum Error {
    #[error("Geometry kernel error: {0}")]
    Kernel(String),

    #[error("Invalid fragment buffers: {0}")]
    InvalidBuffers(String),

    #[error("Unknown model: {0}")]
    UnknownModel(u32),

    #[error("Malformed transferred data: {0}")]
    Malformed(String),
}
