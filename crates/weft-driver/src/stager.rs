// SPDX-License-Identifier: AGPL-3.0-only

//! Weight staging: copy a parsed model into the DDR weight region.
//!
//! The device reads weights directly from DDR, so the layout must be
//! byte-deterministic. Section order:
//!
//! 1. token embeddings (f16)
//! 2. position embeddings (f16)
//! 3. per layer, ascending index: `q k v o ffn_up ffn_down` packed INT4,
//!    then `ln1_w ln1_b ln2_w ln2_b` as f16
//! 4. lm_head (f16), when the container carries one
//!
//! Layer bases are recorded while writing, so
//! `layer_address(i+1) - layer_address(i)` always equals the serialized
//! size of layer `i`.

use crate::error::{DriverError, Result};
use crate::memory::MemoryRegion;
use weft_models::{LayerWeights, ModelWeights};

/// Addresses of a model staged into DDR.
#[derive(Debug, Clone)]
pub struct StagedModel {
    base_phys: u64,
    embeddings_len: usize,
    layer_bases: Vec<u64>,
    lm_head_phys: u64,
    total_len: usize,
}

impl StagedModel {
    /// Physical base of the token embedding table (the region base).
    #[must_use]
    pub const fn embeddings_address(&self) -> u64 {
        self.base_phys
    }

    /// Physical base of layer `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    #[must_use]
    pub fn layer_address(&self, idx: usize) -> u64 {
        self.layer_bases[idx]
    }

    /// Number of staged layers.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layer_bases.len()
    }

    /// Physical base of the lm_head section (equals the end of the last
    /// layer when the container carries no head).
    #[must_use]
    pub const fn lm_head_address(&self) -> u64 {
        self.lm_head_phys
    }

    /// Combined embedding tables' size in bytes.
    #[must_use]
    pub const fn embeddings_len(&self) -> usize {
        self.embeddings_len
    }

    /// Total staged bytes.
    #[must_use]
    pub const fn total_len(&self) -> usize {
        self.total_len
    }
}

/// DDR bytes `model` needs when staged.
#[must_use]
pub fn required_bytes(model: &ModelWeights) -> usize {
    let embeddings = 2 * (model.token_embeddings.len() + model.position_embeddings.len());
    let layers: usize = model.layers.iter().map(LayerWeights::serialized_len).sum();
    embeddings + layers + 2 * model.lm_head.len()
}

/// Stage `model` into `region`.
///
/// # Errors
///
/// Returns [`DriverError::InsufficientDdr`] when the model does not fit.
pub fn stage(model: &ModelWeights, region: &MemoryRegion) -> Result<StagedModel> {
    let required = required_bytes(model);
    if required > region.len() {
        return Err(DriverError::InsufficientDdr {
            required,
            available: region.len(),
        });
    }

    let base = region.phys_addr();
    let mut writer = RegionWriter {
        region,
        offset: 0,
    };

    writer.put_f16(&model.token_embeddings);
    writer.put_f16(&model.position_embeddings);
    let embeddings_len = writer.offset;

    let mut layer_bases = Vec::with_capacity(model.layers.len());
    for layer in &model.layers {
        layer_bases.push(base + writer.offset as u64);
        writer.put_bytes(&layer.q.data);
        writer.put_bytes(&layer.k.data);
        writer.put_bytes(&layer.v.data);
        writer.put_bytes(&layer.o.data);
        writer.put_bytes(&layer.ffn_up.data);
        writer.put_bytes(&layer.ffn_down.data);
        writer.put_f16(&layer.ln1_weight);
        writer.put_f16(&layer.ln1_bias);
        writer.put_f16(&layer.ln2_weight);
        writer.put_f16(&layer.ln2_bias);
    }

    let lm_head_phys = base + writer.offset as u64;
    writer.put_f16(&model.lm_head);

    debug_assert_eq!(writer.offset, required);
    tracing::info!(
        layers = layer_bases.len(),
        bytes = writer.offset,
        base = format_args!("{base:#x}"),
        "weights staged"
    );

    Ok(StagedModel {
        base_phys: base,
        embeddings_len,
        layer_bases,
        lm_head_phys,
        total_len: required,
    })
}

struct RegionWriter<'a> {
    region: &'a MemoryRegion,
    offset: usize,
}

impl RegionWriter<'_> {
    fn put_bytes(&mut self, data: &[u8]) {
        self.region.write_bytes(self.offset, data);
        self.offset += data.len();
    }

    fn put_f16(&mut self, values: &[u16]) {
        let mut bytes = Vec::with_capacity(values.len() * 2);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        self.put_bytes(&bytes);
    }
}
