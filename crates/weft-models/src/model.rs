// SPDX-License-Identifier: AGPL-3.0-only

//! In-memory model representation.

use crate::container;
use crate::error::{ContainerError, Result};
use crate::int4::Int4Block;
use std::fs;
use std::path::Path;

/// Model geometry from the container header.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModelConfig {
    /// Container format version.
    pub version: u32,
    /// Transformer layer count.
    pub num_layers: u32,
    /// Hidden dimension.
    pub hidden_size: u32,
    /// Attention head count.
    pub num_heads: u32,
    /// Vocabulary size.
    pub vocab_size: u32,
    /// Maximum sequence length (position table rows).
    pub max_seq_len: u32,
    /// FFN intermediate dimension.
    pub intermediate_size: u32,
}

/// Weights of a single transformer layer.
///
/// Attention and FFN projections are INT4; layer norms stay f16 for
/// precision. Size relations: the four attention projections are
/// `hidden²` weights each, `ffn_up` is `hidden × intermediate` and
/// `ffn_down` is `intermediate × hidden`.
#[derive(Debug, Clone)]
pub struct LayerWeights {
    /// Layer index within the model.
    pub layer_idx: u32,
    /// Hidden dimension.
    pub hidden_size: u32,
    /// FFN intermediate dimension.
    pub intermediate_size: u32,

    /// Query projection.
    pub q: Int4Block,
    /// Key projection.
    pub k: Int4Block,
    /// Value projection.
    pub v: Int4Block,
    /// Attention output projection.
    pub o: Int4Block,
    /// FFN up projection.
    pub ffn_up: Int4Block,
    /// FFN down projection.
    pub ffn_down: Int4Block,

    /// First layer-norm weight, f16 bits, length `hidden_size`.
    pub ln1_weight: Vec<u16>,
    /// First layer-norm bias, f16 bits.
    pub ln1_bias: Vec<u16>,
    /// Second layer-norm weight, f16 bits.
    pub ln2_weight: Vec<u16>,
    /// Second layer-norm bias, f16 bits.
    pub ln2_bias: Vec<u16>,
}

impl LayerWeights {
    /// Serialized size of this layer in DDR: packed INT4 blocks followed by
    /// the four layer-norm vectors at 2 bytes per element.
    #[must_use]
    pub fn serialized_len(&self) -> usize {
        self.q.byte_len()
            + self.k.byte_len()
            + self.v.byte_len()
            + self.o.byte_len()
            + self.ffn_up.byte_len()
            + self.ffn_down.byte_len()
            + 2 * (self.ln1_weight.len()
                + self.ln1_bias.len()
                + self.ln2_weight.len()
                + self.ln2_bias.len())
    }
}

/// A fully parsed weight container.
#[derive(Debug, Clone, Default)]
pub struct ModelWeights {
    config: ModelConfig,
    /// Token embedding table, f16 bits, `vocab_size * hidden_size`.
    pub token_embeddings: Vec<u16>,
    /// Position embedding table, f16 bits, `max_seq_len * hidden_size`.
    pub position_embeddings: Vec<u16>,
    /// Per-layer weights, ascending layer index.
    pub layers: Vec<LayerWeights>,
    /// Output projection, f16 bits. Empty in v1 containers, which tie the
    /// output head to the token embedding table.
    pub lm_head: Vec<u16>,
    /// Named SHA-256 digests from the checksum trailer. Surfaced, not
    /// enforced.
    pub checksums: Vec<crate::container::ChecksumRecord>,
}

impl ModelWeights {
    /// Load and parse a container file.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError`] if the file cannot be read or is not a
    /// valid container.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("loading weight container: {}", path.display());

        if !path.exists() {
            return Err(ContainerError::Io {
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("{} not found", path.display()),
                ),
            });
        }

        let data = fs::read(path)?;
        Self::from_bytes(data)
    }

    /// Parse a container from bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ContainerError::BadContainer`] on a magic mismatch or
    /// corrupt geometry, [`ContainerError::Truncated`] when a declared
    /// section extends past the end of the data.
    pub fn from_bytes(data: impl Into<bytes::Bytes>) -> Result<Self> {
        container::parse(data.into())
    }

    /// Construct from already-parsed parts (quantization tooling and tests).
    #[must_use]
    pub fn from_parts(
        config: ModelConfig,
        token_embeddings: Vec<u16>,
        position_embeddings: Vec<u16>,
        layers: Vec<LayerWeights>,
        lm_head: Vec<u16>,
    ) -> Self {
        Self {
            config,
            token_embeddings,
            position_embeddings,
            layers,
            lm_head,
            checksums: Vec::new(),
        }
    }

    /// Model geometry.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}
