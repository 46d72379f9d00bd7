// SPDX-License-Identifier: AGPL-3.0-only

//! Binary parser for `model.pt.bin` weight containers.

use crate::error::{ContainerError, Result};
use crate::int4::Int4Block;
use crate::model::{LayerWeights, ModelConfig, ModelWeights};
use bytes::Bytes;

/// Container magic, ASCII `"WTNT"` little-endian.
pub const CONTAINER_MAGIC: u32 = 0x5754_4E54;

/// One named digest from the checksum trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumRecord {
    /// Section name, e.g. `layer_3_q`.
    pub name: String,
    /// SHA-256 digest of the section bytes.
    pub sha256: [u8; 32],
}

/// Cursor over the container bytes.
///
/// Sub-slices handed out (INT4 payloads) share the backing allocation.
struct Reader {
    data: Bytes,
    pos: usize,
}

impl Reader {
    fn new(data: Bytes) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<Bytes> {
        let end = self
            .pos
            .checked_add(len)
            .ok_or_else(|| ContainerError::bad("section length overflows"))?;
        if end > self.data.len() {
            return Err(ContainerError::Truncated {
                offset: self.pos,
                needed: len,
            });
        }
        let slice = self.data.slice(self.pos..end);
        self.pos = end;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.u32()?))
    }

    fn i8(&mut self) -> Result<i8> {
        let b = self.take(1)?;
        #[allow(clippy::cast_possible_wrap)]
        Ok(b[0] as i8)
    }

    fn f16_vec(&mut self, count: usize) -> Result<Vec<u16>> {
        let len = count
            .checked_mul(2)
            .ok_or_else(|| ContainerError::bad("f16 section length overflows"))?;
        let b = self.take(len)?;
        Ok(b.chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect())
    }

    fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(ContainerError::Truncated {
                offset: pos,
                needed: 0,
            });
        }
        self.pos = pos;
        Ok(())
    }
}

/// Parse a complete container.
pub(crate) fn parse(data: Bytes) -> Result<ModelWeights> {
    let mut r = Reader::new(data);

    let magic = r.u32()?;
    if magic != CONTAINER_MAGIC {
        return Err(ContainerError::bad(format!(
            "invalid magic {magic:#010X}, expected {CONTAINER_MAGIC:#010X}"
        )));
    }

    let config = ModelConfig {
        version: r.u32()?,
        num_layers: r.u32()?,
        hidden_size: r.u32()?,
        num_heads: r.u32()?,
        vocab_size: r.u32()?,
        max_seq_len: r.u32()?,
        intermediate_size: r.u32()?,
    };
    let checksum_offset = r.u32()?;

    tracing::info!(
        version = config.version,
        layers = config.num_layers,
        hidden = config.hidden_size,
        heads = config.num_heads,
        vocab = config.vocab_size,
        "container header parsed"
    );

    let token_count = elem_count(config.vocab_size, config.hidden_size)?;
    let position_count = elem_count(config.max_seq_len, config.hidden_size)?;
    let token_embeddings = r.f16_vec(token_count)?;
    let position_embeddings = r.f16_vec(position_count)?;

    let mut layers = Vec::with_capacity(config.num_layers as usize);
    for layer_idx in 0..config.num_layers {
        layers.push(parse_layer(&mut r, layer_idx, &config)?);
    }

    // v1 containers carry no lm_head section; the head is tied to the token
    // embedding table.
    let lm_head = Vec::new();

    let mut model = ModelWeights::from_parts(
        config,
        token_embeddings,
        position_embeddings,
        layers,
        lm_head,
    );

    if checksum_offset != 0 {
        let records = parse_checksums(&mut r, checksum_offset as usize)?;
        for rec in &records {
            tracing::debug!(
                name = %rec.name,
                digest = %hex_prefix(&rec.sha256),
                "weight section checksum"
            );
        }
        tracing::info!(count = records.len(), "checksum trailer surfaced (not enforced)");
        model.checksums = records;
    }

    Ok(model)
}

fn parse_layer(r: &mut Reader, layer_idx: u32, config: &ModelConfig) -> Result<LayerWeights> {
    let attn_weights = elem_count(config.hidden_size, config.hidden_size)? as u64;
    let ffn_weights = elem_count(config.hidden_size, config.intermediate_size)? as u64;

    let q = parse_block(r, attn_weights)?;
    let k = parse_block(r, attn_weights)?;
    let v = parse_block(r, attn_weights)?;
    let o = parse_block(r, attn_weights)?;
    let ffn_up = parse_block(r, ffn_weights)?;
    let ffn_down = parse_block(r, ffn_weights)?;

    let hidden = config.hidden_size as usize;
    let ln1_weight = r.f16_vec(hidden)?;
    let ln1_bias = r.f16_vec(hidden)?;
    let ln2_weight = r.f16_vec(hidden)?;
    let ln2_bias = r.f16_vec(hidden)?;

    Ok(LayerWeights {
        layer_idx,
        hidden_size: config.hidden_size,
        intermediate_size: config.intermediate_size,
        q,
        k,
        v,
        o,
        ffn_up,
        ffn_down,
        ln1_weight,
        ln1_bias,
        ln2_weight,
        ln2_bias,
    })
}

fn parse_block(r: &mut Reader, num_weights: u64) -> Result<Int4Block> {
    let scale = r.f32()?;
    let zero_point = r.i8()?;
    let byte_len = r.u32()? as usize;

    let expected = Int4Block::packed_len(num_weights);
    if byte_len != expected {
        return Err(ContainerError::bad(format!(
            "INT4 block is {byte_len} bytes, geometry implies {expected}"
        )));
    }

    let data = r.take(byte_len)?;
    Ok(Int4Block {
        scale,
        zero_point,
        num_weights,
        data,
    })
}

fn parse_checksums(r: &mut Reader, offset: usize) -> Result<Vec<ChecksumRecord>> {
    r.seek(offset)?;
    let count = r.u32()?;
    let mut records = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let name_len = r.u32()? as usize;
        let name_bytes = r.take(name_len)?;
        let name = String::from_utf8(name_bytes.to_vec())
            .map_err(|_| ContainerError::bad("checksum record name is not UTF-8"))?;
        let digest = r.take(32)?;
        let mut sha256 = [0u8; 32];
        sha256.copy_from_slice(&digest);
        records.push(ChecksumRecord { name, sha256 });
    }
    Ok(records)
}

fn elem_count(a: u32, b: u32) -> Result<usize> {
    (a as usize)
        .checked_mul(b as usize)
        .ok_or_else(|| ContainerError::bad("tensor element count overflows"))
}

fn hex_prefix(digest: &[u8; 32]) -> String {
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fp16;
    use crate::int4::Int4Builder;

    /// Serialize a tiny synthetic container, mirroring the offline converter.
    fn build_container(config: &ModelConfig, with_checksums: bool) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&CONTAINER_MAGIC.to_le_bytes());
        out.extend_from_slice(&config.version.to_le_bytes());
        out.extend_from_slice(&config.num_layers.to_le_bytes());
        out.extend_from_slice(&config.hidden_size.to_le_bytes());
        out.extend_from_slice(&config.num_heads.to_le_bytes());
        out.extend_from_slice(&config.vocab_size.to_le_bytes());
        out.extend_from_slice(&config.max_seq_len.to_le_bytes());
        out.extend_from_slice(&config.intermediate_size.to_le_bytes());
        let checksum_offset_pos = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());

        let hidden = config.hidden_size as u64;
        let write_f16 = |out: &mut Vec<u8>, count: u64, seed: f32| {
            for i in 0..count {
                #[allow(clippy::cast_precision_loss)]
                let bits = fp16::from_f32(seed + i as f32 * 0.25);
                out.extend_from_slice(&bits.to_le_bytes());
            }
        };

        write_f16(&mut out, u64::from(config.vocab_size) * hidden, 0.5);
        write_f16(&mut out, u64::from(config.max_seq_len) * hidden, -1.0);

        let write_block = |out: &mut Vec<u8>, n: u64, seed: i8| {
            let mut b = Int4Builder::zeroed(n).with_quantization(0.1, 0);
            for i in 0..n {
                #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
                b.set(i, ((i as i64 + i64::from(seed)) % 7) as i8);
            }
            let block = b.freeze();
            out.extend_from_slice(&block.scale.to_le_bytes());
            #[allow(clippy::cast_sign_loss)]
            out.push(block.zero_point as u8);
            out.extend_from_slice(&(block.byte_len() as u32).to_le_bytes());
            out.extend_from_slice(&block.data);
        };

        for layer in 0..config.num_layers {
            let attn = hidden * hidden;
            let ffn = hidden * u64::from(config.intermediate_size);
            #[allow(clippy::cast_possible_truncation)]
            for w in 0..4u8 {
                write_block(&mut out, attn, (layer as u8 + w) as i8);
            }
            write_block(&mut out, ffn, 2);
            write_block(&mut out, ffn, 3);
            for _ in 0..4 {
                write_f16(&mut out, hidden, 1.0);
            }
        }

        if with_checksums {
            let trailer_at = out.len() as u32;
            out.extend_from_slice(&1u32.to_le_bytes());
            let name = b"embeddings";
            out.extend_from_slice(&(name.len() as u32).to_le_bytes());
            out.extend_from_slice(name);
            out.extend_from_slice(&[0xAB; 32]);
            out[checksum_offset_pos..checksum_offset_pos + 4]
                .copy_from_slice(&trailer_at.to_le_bytes());
        }

        out
    }

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            version: 1,
            num_layers: 2,
            hidden_size: 8,
            num_heads: 2,
            vocab_size: 16,
            max_seq_len: 4,
            intermediate_size: 32,
        }
    }

    #[test]
    fn parses_synthetic_container() {
        let config = tiny_config();
        let bytes = build_container(&config, false);
        let model = ModelWeights::from_bytes(bytes).expect("parse");

        assert_eq!(*model.config(), config);
        assert_eq!(model.token_embeddings.len(), 16 * 8);
        assert_eq!(model.position_embeddings.len(), 4 * 8);
        assert_eq!(model.layers.len(), 2);
        assert!(model.lm_head.is_empty());

        let layer = &model.layers[0];
        assert_eq!(layer.q.num_weights, 64);
        assert_eq!(layer.ffn_up.num_weights, 8 * 32);
        assert_eq!(layer.ffn_down.num_weights, 32 * 8);
        assert_eq!(layer.ln1_weight.len(), 8);
        assert_eq!(fp16::to_f32(layer.ln1_weight[0]), 1.0);
    }

    #[test]
    fn parses_checksum_trailer() {
        let bytes = build_container(&tiny_config(), true);
        let model = ModelWeights::from_bytes(bytes).expect("parse");
        assert_eq!(model.layers.len(), 2);
        assert_eq!(model.checksums.len(), 1);
        assert_eq!(model.checksums[0].name, "embeddings");
        assert_eq!(model.checksums[0].sha256, [0xAB; 32]);
    }

    #[test]
    fn trailer_free_container_has_no_checksums() {
        let model = ModelWeights::from_bytes(build_container(&tiny_config(), false)).unwrap();
        assert!(model.checksums.is_empty());
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF, 0, 0, 0, 0];
        let err = ModelWeights::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, ContainerError::BadContainer { .. }), "{err}");
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut bytes = build_container(&tiny_config(), false);
        bytes.truncate(bytes.len() / 2);
        let err = ModelWeights::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Truncated { .. }), "{err}");
    }

    #[test]
    fn rejects_header_only_file() {
        let bytes = build_container(&tiny_config(), false)[..36].to_vec();
        let err = ModelWeights::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, ContainerError::Truncated { .. }), "{err}");
    }

    #[test]
    fn rejects_block_length_mismatch() {
        let config = tiny_config();
        let mut bytes = build_container(&config, false);
        // First block header sits right after the embeddings; corrupt its
        // declared byte length.
        let block_len_at = 36 + (16 * 8 + 4 * 8) * 2 + 5;
        bytes[block_len_at..block_len_at + 4].copy_from_slice(&9999u32.to_le_bytes());
        let err = ModelWeights::from_bytes(bytes).unwrap_err();
        assert!(matches!(err, ContainerError::BadContainer { .. }), "{err}");
    }

    #[test]
    fn layer_serialized_len_matches_geometry() {
        let model = ModelWeights::from_bytes(build_container(&tiny_config(), false)).unwrap();
        let layer = &model.layers[0];
        // 4 × 64-weight blocks (32 B each) + 2 × 256-weight blocks (128 B)
        // + 4 × 8-element f16 vectors (16 B each).
        assert_eq!(layer.serialized_len(), 4 * 32 + 2 * 128 + 4 * 16);
    }
}
