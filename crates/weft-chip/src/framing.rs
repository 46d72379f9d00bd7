// SPDX-License-Identifier: AGPL-3.0-only

//! Bit-exact framing of the wide configuration and status blocks.
//!
//! The HLS core latches `config_in` as a single 1216-bit vector spread over
//! 38 little-endian 32-bit registers. The original firmware `memcpy`'d a C
//! struct into the register block and relied on host endianness and field
//! layout happening to line up. Here every field is placed at its specified
//! bit position explicitly, so the packed image matches what the FPGA expects
//! on any host.
//!
//! Field layout (word index = bit offset / 32, 64-bit fields low word first):
//!
//! | words | field |
//! |-------|-------|
//! | 0–1   | `input_buffer_addr` |
//! | 2–3   | `output_buffer_addr` |
//! | 4–5   | `kv_cache_addr` |
//! | 6     | `stride` |
//! | 7     | `max_tokens` |
//! | 8     | `batch_size` |
//! | 9     | `sequence_length` |
//! | 10    | `num_layers` |
//! | 11    | `hidden_size` |
//! | 12    | `num_heads` |
//! | 13    | `vocab_size` |
//! | 14    | `prompt_length` |
//! | 15    | `task_id` |
//! | 16    | `task_type` |
//! | 17    | `flags` |
//! | 18–37 | reserved |

/// Number of 32-bit words in the packed configuration image.
pub const CONFIG_WORDS: usize = 38;

/// Number of 32-bit words in the packed status image.
pub const STATUS_WORDS: usize = 4;

/// Logical view of the 1216-bit `config_in` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigIn {
    /// DMA address of the token input buffer.
    pub input_buffer_addr: u64,
    /// DMA address of the token output buffer.
    pub output_buffer_addr: u64,
    /// DMA address of the device-resident KV cache.
    pub kv_cache_addr: u64,
    /// Row stride of the KV cache in bytes.
    pub stride: u32,
    /// Hard token budget for a single invocation.
    pub max_tokens: u32,
    /// Batch size (the current core only supports 1).
    pub batch_size: u32,
    /// Maximum sequence length the KV cache is sized for.
    pub sequence_length: u32,
    /// Transformer layer count.
    pub num_layers: u32,
    /// Hidden dimension.
    pub hidden_size: u32,
    /// Attention head count.
    pub num_heads: u32,
    /// Vocabulary size.
    pub vocab_size: u32,
    /// Token count of the staged prompt. Per-task.
    pub prompt_length: u32,
    /// Host-assigned task identifier. Per-task.
    pub task_id: u32,
    /// Task discriminator (0 = generate). Per-task.
    pub task_type: u32,
    /// Feature flag bits.
    pub flags: u32,
}

impl ConfigIn {
    /// Pack into the 38-word register image.
    ///
    /// Words 18..38 are reserved and always zero.
    #[must_use]
    pub fn pack(&self) -> [u32; CONFIG_WORDS] {
        let mut w = [0u32; CONFIG_WORDS];
        put_u64(&mut w, 0, self.input_buffer_addr);
        put_u64(&mut w, 2, self.output_buffer_addr);
        put_u64(&mut w, 4, self.kv_cache_addr);
        w[6] = self.stride;
        w[7] = self.max_tokens;
        w[8] = self.batch_size;
        w[9] = self.sequence_length;
        w[10] = self.num_layers;
        w[11] = self.hidden_size;
        w[12] = self.num_heads;
        w[13] = self.vocab_size;
        w[14] = self.prompt_length;
        w[15] = self.task_id;
        w[16] = self.task_type;
        w[17] = self.flags;
        w
    }

    /// Rebuild the logical view from a packed register image.
    #[must_use]
    pub fn unpack(words: &[u32; CONFIG_WORDS]) -> Self {
        Self {
            input_buffer_addr: get_u64(words, 0),
            output_buffer_addr: get_u64(words, 2),
            kv_cache_addr: get_u64(words, 4),
            stride: words[6],
            max_tokens: words[7],
            batch_size: words[8],
            sequence_length: words[9],
            num_layers: words[10],
            hidden_size: words[11],
            num_heads: words[12],
            vocab_size: words[13],
            prompt_length: words[14],
            task_id: words[15],
            task_type: words[16],
            flags: words[17],
        }
    }
}

/// Word indices whose packed value differs between two images.
///
/// Per-task reconfiguration touches only `prompt_length`, `task_id` and
/// `task_type`; the driver uses this to avoid rewriting all 38 registers.
#[must_use]
pub fn changed_words(old: &[u32; CONFIG_WORDS], new: &[u32; CONFIG_WORDS]) -> Vec<usize> {
    (0..CONFIG_WORDS).filter(|&i| old[i] != new[i]).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn put_u64(words: &mut [u32; CONFIG_WORDS], lo: usize, value: u64) {
    words[lo] = (value & 0xFFFF_FFFF) as u32;
    words[lo + 1] = (value >> 32) as u32;
}

fn get_u64(words: &[u32; CONFIG_WORDS], lo: usize) -> u64 {
    u64::from(words[lo]) | (u64::from(words[lo + 1]) << 32)
}

/// Decoded view of the 128-bit `status_out` block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusOut {
    /// Most recently decoded token id.
    pub current_token: u32,
    /// Cumulative token count for the running invocation.
    pub tokens_generated: u32,
    /// Device fault code, 0 when healthy.
    pub error_code: u32,
    /// Flag bits, see the `is_*` accessors.
    pub flags: u32,
}

impl StatusOut {
    /// Flag bit: the status block is coherent.
    pub const FLAG_VALID: u32 = 1 << 0;
    /// Flag bit: the invocation has finished.
    pub const FLAG_DONE: u32 = 1 << 1;
    /// Flag bit: the core latched a fault.
    pub const FLAG_ERROR: u32 = 1 << 2;

    /// Field-wise decode of the 4-word status image.
    #[must_use]
    pub fn from_words(words: &[u32; STATUS_WORDS]) -> Self {
        Self {
            current_token: words[0],
            tokens_generated: words[1],
            error_code: words[2],
            flags: words[3],
        }
    }

    /// Inverse of [`StatusOut::from_words`].
    #[must_use]
    pub fn to_words(&self) -> [u32; STATUS_WORDS] {
        [
            self.current_token,
            self.tokens_generated,
            self.error_code,
            self.flags,
        ]
    }

    /// Whether the block carries coherent data.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.flags & Self::FLAG_VALID != 0
    }

    /// Whether the invocation has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.flags & Self::FLAG_DONE != 0
    }

    /// Whether the core latched a fault.
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.flags & Self::FLAG_ERROR != 0
    }
}
