// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Keyed store for results too large to send through the channel.
//!
//! Every payload is keyed by its kind and the correlation id of the request
//! that produced it, so overlapping requests never share a slot. The
//! receiver takes the entry once the final response names it; [`clear`]
//! drops whatever is left.
//!
//! [`clear`]: TransferStore::clear

use crate::error::{BrokerError, Result};
use crate::protocol::{TransferKind, TransferNotice};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Serialize, Deserialize)]
struct TransferPayload<T> {
    kind: TransferKind,
    data: T,
}

/// Disk-backed transfer slots built on cacache
#[derive(Debug, Clone)]
pub struct TransferStore {
    dir: PathBuf,
}

impl TransferStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn key(notice: &TransferNotice) -> String {
        format!("ifc-batch:transfer:{}:{}", notice.transfer as u8, notice.correlation_id)
    }

    /// Store a payload and return the notice that names it
    pub async fn write<T: Serialize>(&self, notice: TransferNotice, data: &T) -> Result<TransferNotice> {
        let bytes = serde_json::to_vec(&TransferPayload {
            kind: notice.transfer,
            data,
        })?;
        cacache::write(&self.dir, Self::key(&notice), &bytes).await?;
        tracing::debug!(
            kind = ?notice.transfer,
            correlation_id = notice.correlation_id,
            size = bytes.len(),
            "Transfer payload written"
        );
        Ok(notice)
    }

    /// Read the payload a notice points at, with the kind tag stripped
    pub async fn read<T: DeserializeOwned>(&self, notice: &TransferNotice) -> Result<T> {
        let bytes = match cacache::read(&self.dir, Self::key(notice)).await {
            Ok(bytes) => bytes,
            Err(cacache::Error::EntryNotFound(_, _)) => {
                return Err(BrokerError::Transfer(format!(
                    "nothing stored for {:?} request {}",
                    notice.transfer, notice.correlation_id
                )))
            }
            Err(e) => return Err(e.into()),
        };
        let payload: TransferPayload<T> = serde_json::from_slice(&bytes)?;
        if payload.kind != notice.transfer {
            return Err(BrokerError::Transfer(format!(
                "slot {:?} holds a {:?} payload",
                notice.transfer, payload.kind
            )));
        }
        Ok(payload.data)
    }

    /// Read a payload and drop its index entry
    pub async fn take<T: DeserializeOwned>(&self, notice: &TransferNotice) -> Result<T> {
        let data = self.read(notice).await?;
        cacache::remove(&self.dir, Self::key(notice)).await?;
        Ok(data)
    }

    pub async fn clear(&self) -> Result<()> {
        cacache::clear(&self.dir).await?;
        Ok(())
    }
}
