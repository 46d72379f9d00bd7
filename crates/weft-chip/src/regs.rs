// SPDX-License-Identifier: AGPL-3.0-only

//! AXI-Lite register map for the Weft accelerator IP.
//!
//! Offsets come from the Vivado HLS register mapping of the synthesized core.
//! The IP exposes a 4 KiB window: a standard `ap_ctrl_hs` control block,
//! interrupt registers, a 38-word (1216-bit) configuration input, and a
//! 4-word (128-bit) status output with its own valid handshake.
//!
//! ```text
//! 0x00        AP_CTRL      start/done/idle/ready handshake
//! 0x04        GIE          global interrupt enable
//! 0x08        IER          per-source interrupt enable
//! 0x0C        ISR          interrupt status, write-1-to-clear
//! 0x10..=0xA4 CONFIG_IN    config_in[1215:0], 38 words, little-endian
//! 0xAC..=0xB8 STATUS_OUT   status_out[127:0], 4 words
//! 0xBC        STATUS_CTRL  status_out_ap_vld in bit 0
//! 0xD4        IRQ_CLEAR    irq_clear_in[31:0]
//! ```

/// Base physical address of the register window (AXI GP0 on the target SoC).
pub const BASE_ADDR: u64 = 0x43C0_0000;

/// Size of the mapped register window in bytes.
pub const WINDOW_SIZE: usize = 4096;

/// Control signals (`ap_start`, `ap_done`, `ap_idle`, `ap_ready`).
pub const AP_CTRL: usize = 0x00;
/// Global interrupt enable.
pub const GIE: usize = 0x04;
/// Per-source interrupt enable.
pub const IER: usize = 0x08;
/// Interrupt status register, write-1-to-clear.
pub const ISR: usize = 0x0C;

/// First word of the configuration input block.
pub const CONFIG_IN_BASE: usize = 0x10;
/// Number of 32-bit words in the configuration input block.
pub const CONFIG_IN_WORDS: usize = 38;

/// First word of the status output block.
pub const STATUS_OUT_BASE: usize = 0xAC;
/// Number of 32-bit words in the status output block.
pub const STATUS_OUT_WORDS: usize = 4;
/// Status handshake register (`status_out_ap_vld` in bit 0).
pub const STATUS_OUT_CTRL: usize = 0xBC;

/// IRQ clear input register.
pub const IRQ_CLEAR: usize = 0xD4;

/// Byte offset of configuration word `n`.
#[must_use]
pub const fn config_word_offset(n: usize) -> usize {
    CONFIG_IN_BASE + n * 4
}

/// Byte offset of status word `n`.
#[must_use]
pub const fn status_word_offset(n: usize) -> usize {
    STATUS_OUT_BASE + n * 4
}

/// `AP_CTRL` bit definitions.
pub mod ctrl {
    /// `ap_start` (R/W, cleared on handshake).
    pub const START: u32 = 0x01;
    /// `ap_done` (R, clear-on-read).
    pub const DONE: u32 = 0x02;
    /// `ap_idle` (R).
    pub const IDLE: u32 = 0x04;
    /// `ap_ready` (R, clear-on-read).
    pub const READY: u32 = 0x08;
    /// `auto_restart` (R/W).
    pub const AUTO_RESTART: u32 = 0x80;
    /// Interrupt line state (R).
    pub const INTERRUPT: u32 = 0x200;
}

/// Interrupt source bits, shared by `IER` and `ISR`.
pub mod irq {
    /// Core finished an invocation.
    pub const AP_DONE: u32 = 0x01;
    /// Core is ready for the next invocation.
    pub const AP_READY: u32 = 0x02;
    /// A decoded token is available in `status_out`.
    pub const TOKEN_READY: u32 = 0x04;
    /// The core latched a fault.
    pub const ERROR: u32 = 0x08;
}

/// `STATUS_OUT_CTRL` bit definitions.
pub mod status_ctrl {
    /// `status_out_ap_vld` — the 4-word status block is coherent.
    pub const AP_VLD: u32 = 0x01;
}
