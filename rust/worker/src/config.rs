// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Offload configuration loaded from environment variables.

use ifc_batch_geometry::{ElementType, GeometryFilter};
use std::path::PathBuf;

/// Offload configuration.
#[derive(Debug, Clone)]
pub struct OffloadConfig {
    /// Aggregate in the background context instead of the caller's.
    pub offload: bool,
    /// Directory of the transfer store.
    pub transfer_dir: PathBuf,
    /// Include IfcSpace geometry.
    pub include_spaces: bool,
    /// Include IfcOpeningElement geometry.
    pub include_openings: bool,
    /// Capacity of the request and response channels.
    pub channel_capacity: usize,
    /// Number of threads in the rayon pool.
    pub worker_threads: usize,
    /// Emit logs as JSON lines.
    pub log_json: bool,
}

impl OffloadConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            offload: env_flag("IFC_BATCH_OFFLOAD", defaults.offload),
            transfer_dir: std::env::var("IFC_BATCH_TRANSFER_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.transfer_dir),
            include_spaces: env_flag("IFC_BATCH_INCLUDE_SPACES", defaults.include_spaces),
            include_openings: env_flag("IFC_BATCH_INCLUDE_OPENINGS", defaults.include_openings),
            channel_capacity: std::env::var("IFC_BATCH_CHANNEL_CAPACITY")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(defaults.channel_capacity),
            worker_threads: std::env::var("IFC_BATCH_WORKER_THREADS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.worker_threads),
            log_json: std::env::var("IFC_BATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }

    /// Category filter these settings describe
    pub fn filter(&self) -> GeometryFilter {
        let mut filter = GeometryFilter::default();
        filter.set_optional_category(ElementType::SPACE, self.include_spaces);
        filter.set_optional_category(ElementType::OPENING_ELEMENT, self.include_openings);
        filter
    }
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            offload: true,
            transfer_dir: PathBuf::from("./.cache/transfer"),
            include_spaces: true,
            include_openings: false,
            channel_capacity: 256,
            worker_threads: num_cpus::get(),
            log_json: false,
        }
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match std::env::var(name) {
        Ok(v) => matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
