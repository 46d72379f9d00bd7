// SPDX-License-Identifier: AGPL-3.0-only

//! Error types for container parsing.

use thiserror::Error;

/// Result type alias for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;

/// Errors that can occur while parsing a weight container.
#[derive(Debug, Error)]
pub enum ContainerError {
    /// The file is not a Weft weight container or its geometry is corrupt.
    #[error("bad container: {reason}")]
    BadContainer {
        /// Reason for rejection.
        reason: String,
    },

    /// The file ends before a declared section.
    #[error("truncated container: need {needed} bytes at offset {offset}")]
    Truncated {
        /// Byte offset at which the read was attempted.
        offset: usize,
        /// Bytes the section required.
        needed: usize,
    },

    /// I/O error reading the container file.
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error.
        #[from]
        source: std::io::Error,
    },
}

impl ContainerError {
    /// Create a `BadContainer` error.
    pub fn bad(reason: impl Into<String>) -> Self {
        Self::BadContainer {
            reason: reason.into(),
        }
    }
}
