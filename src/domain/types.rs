//! Shared configuration types.
//!
//! These are plain structs built from CLI arguments (see `app`) so that the
//! library entry points never read argv or the environment themselves.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AppError;

pub const DEFAULT_BASE_URL: &str = "https://api.ipums.org";
pub const DEFAULT_COLLECTION: &str = "usa";
/// Version tag used by the v1 extract workflow.
pub const DEFAULT_VERSION: &str = "beta";
pub const DEFAULT_OUT_DIR: &str = "ipums_downloads";

pub const DEFAULT_CHUNK_SIZE: usize = 50_000;

/// Where and how to talk to the extract API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub collection: String,
    pub version: String,
    pub out_dir: PathBuf,
    /// Timeout for submit/status requests.
    pub request_timeout: Duration,
    /// Timeout for a single artifact download.
    pub download_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            version: DEFAULT_VERSION.to_string(),
            out_dir: PathBuf::from(DEFAULT_OUT_DIR),
            request_timeout: Duration::from_secs(60),
            download_timeout: Duration::from_secs(300),
        }
    }
}

/// Polling schedule for `wait_for_extract`.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(15),
            timeout: Duration::from_secs(60 * 60),
        }
    }
}

/// Options for `predict_allmodels`.
#[derive(Debug, Clone)]
pub struct PredictConfig {
    /// Number of full repetitions of the prediction pass.
    pub ndraw: usize,
    /// Seed for the shared chain/draw generator; `None` uses OS entropy.
    pub seed: Option<u64>,
    pub chunk_size: usize,
    pub include_group_specific: bool,
    pub sample_new_groups: bool,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            ndraw: 1,
            seed: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            include_group_specific: true,
            sample_new_groups: false,
        }
    }
}

impl PredictConfig {
    /// Reject contract violations before any model is touched.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.ndraw < 1 {
            return Err(AppError::contract("ndraw must be >= 1"));
        }
        if self.chunk_size < 1 {
            return Err(AppError::contract("chunk_size must be >= 1"));
        }
        Ok(())
    }
}
