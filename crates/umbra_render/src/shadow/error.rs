//! Shadow subsystem errors

use std::path::PathBuf;
use thiserror::Error;

use crate::device::DeviceError;
use crate::resource::TargetStatus;

/// Errors raised while creating or rendering shadow resources
#[derive(Debug, Error)]
pub enum ShadowError {
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Render target '{label}' is incomplete: {status}")]
    IncompleteTarget { label: String, status: TargetStatus },

    #[error("Atlas rendering requested before atlas space was allocated")]
    AtlasNotAllocated,

    #[error("Atlas slot {slot} out of range (capacity {capacity})")]
    AtlasSlotOutOfRange { slot: usize, capacity: usize },

    #[error("Failed to read shadow config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse shadow config: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type ShadowResult<T> = Result<T, ShadowError>;
