// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for driver operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while operating the accelerator.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The register window or UIO descriptor cannot be opened or mapped.
    #[error("device unavailable at {}: {reason}", path.display())]
    DeviceUnavailable {
        /// Device path that was attempted.
        path: PathBuf,
        /// Reason for failure.
        reason: String,
    },

    /// A DDR region could not be acquired.
    #[error("memory initialization failed: {reason}")]
    MemoryInitFailure {
        /// Reason for failure.
        reason: String,
    },

    /// The parsed model does not fit the weights region.
    #[error("insufficient DDR: model needs {required} bytes, region has {available}")]
    InsufficientDdr {
        /// Bytes the staged model requires.
        required: usize,
        /// Bytes the region provides.
        available: usize,
    },

    /// I/O error during device communication.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl DriverError {
    /// Create a device-unavailable error.
    pub fn device_unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DeviceUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create a memory-init error.
    pub fn memory_init(reason: impl Into<String>) -> Self {
        Self::MemoryInitFailure {
            reason: reason.into(),
        }
    }
}
