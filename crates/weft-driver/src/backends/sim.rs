// SPDX-License-Identifier: AGPL-3.0-only

//! Simulated register bus.
//!
//! Substitutes an in-process register file for the AXI-Lite window and
//! models the device's observable status behavior: a `START` write latches a
//! generation, each status poll advances `tokens_generated` by one, and the
//! stream terminates with `EOS_TOKEN` and the `DONE` flag after a bounded
//! token count. The token ids themselves are a deterministic function of the
//! configured `task_id`, so repeated runs of the same task are reproducible.
//!
//! Token fabrication lives only here — the driver above never synthesizes
//! tokens, it reports exactly what the status block says.

use crate::backend::RegisterBus;
use weft_chip::{regs, StatusOut, EOS_TOKEN};

/// Tokens a simulated generation produces before `EOS`.
const DEFAULT_TOKEN_BUDGET: u32 = 12;

/// In-process register file with synthetic status progression.
#[derive(Debug)]
pub struct SimBus {
    regs: Vec<u32>,
    token_budget: u32,
    generating: bool,
    emitted: u32,
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBus {
    /// Fresh register file, device idle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: vec![0u32; regs::WINDOW_SIZE / 4],
            token_budget: DEFAULT_TOKEN_BUDGET,
            generating: false,
            emitted: 0,
        }
    }

    /// Override how many tokens a generation produces before `EOS`.
    #[must_use]
    pub fn with_token_budget(mut self, budget: u32) -> Self {
        self.token_budget = budget;
        self
    }

    fn config_word(&self, n: usize) -> u32 {
        self.regs[regs::config_word_offset(n) / 4]
    }

    /// Advance the synthetic device by one status publication.
    ///
    /// Runs on each read of status word 0, so the 4-word block stays
    /// coherent across the remaining word reads of the same poll.
    fn step(&mut self) {
        if !self.generating {
            return;
        }

        let task_id = self.config_word(15);
        self.emitted += 1;

        let (token, flags) = if self.emitted > self.token_budget {
            self.generating = false;
            (EOS_TOKEN, StatusOut::FLAG_VALID | StatusOut::FLAG_DONE)
        } else {
            // Printable, task-seeded stream: lowercase letters.
            let token = b'a' as u32 + (task_id + self.emitted - 1) % 26;
            (token, StatusOut::FLAG_VALID)
        };

        let status = StatusOut {
            current_token: token,
            tokens_generated: self.emitted,
            error_code: 0,
            flags,
        };
        for (i, word) in status.to_words().iter().enumerate() {
            self.regs[regs::status_word_offset(i) / 4] = *word;
        }
    }
}

impl RegisterBus for SimBus {
    fn read32(&mut self, offset: usize) -> u32 {
        match offset {
            regs::AP_CTRL => {
                if self.generating {
                    regs::ctrl::START
                } else {
                    regs::ctrl::IDLE | regs::ctrl::DONE
                }
            }
            regs::STATUS_OUT_CTRL => regs::status_ctrl::AP_VLD,
            _ => {
                if offset == regs::status_word_offset(0) {
                    self.step();
                }
                self.regs[offset / 4]
            }
        }
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.regs[offset / 4] = value;

        if offset == regs::AP_CTRL {
            if value & regs::ctrl::START != 0 {
                self.generating = true;
                self.emitted = 0;
                tracing::debug!(
                    task_id = self.config_word(15),
                    prompt_len = self.config_word(14),
                    "sim: generation latched"
                );
            } else {
                // AP_CTRL cleared: device returns to idle, stream abandoned.
                self.generating = false;
            }
        }
    }

    fn is_hardware(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(bus: &mut SimBus) -> StatusOut {
        assert_ne!(bus.read32(regs::STATUS_OUT_CTRL) & regs::status_ctrl::AP_VLD, 0);
        let words = [
            bus.read32(regs::status_word_offset(0)),
            bus.read32(regs::status_word_offset(1)),
            bus.read32(regs::status_word_offset(2)),
            bus.read32(regs::status_word_offset(3)),
        ];
        StatusOut::from_words(&words)
    }

    fn start(bus: &mut SimBus, task_id: u32) {
        bus.write32(regs::config_word_offset(15), task_id);
        bus.write32(regs::AP_CTRL, regs::ctrl::START);
    }

    #[test]
    fn idle_until_started() {
        let mut bus = SimBus::new();
        assert_ne!(bus.read32(regs::AP_CTRL) & regs::ctrl::IDLE, 0);
        let s = poll(&mut bus);
        assert_eq!(s.tokens_generated, 0);
    }

    #[test]
    fn start_produces_bounded_stream_then_eos() {
        let mut bus = SimBus::new().with_token_budget(3);
        start(&mut bus, 0);

        let mut tokens = Vec::new();
        loop {
            let s = poll(&mut bus);
            tokens.push(s.current_token);
            if s.is_done() {
                break;
            }
        }
        assert_eq!(tokens.len(), 4);
        assert_eq!(tokens[..3], [u32::from(b'a'), u32::from(b'b'), u32::from(b'c')]);
        assert_eq!(*tokens.last().unwrap(), EOS_TOKEN);
    }

    #[test]
    fn tokens_generated_advances_monotonically() {
        let mut bus = SimBus::new().with_token_budget(5);
        start(&mut bus, 7);
        let mut last = 0;
        for _ in 0..6 {
            let s = poll(&mut bus);
            assert_eq!(s.tokens_generated, last + 1);
            last = s.tokens_generated;
        }
    }

    #[test]
    fn stream_is_task_seeded_and_reproducible() {
        let run = |task_id: u32| {
            let mut bus = SimBus::new().with_token_budget(4);
            start(&mut bus, task_id);
            (0..4).map(|_| poll(&mut bus).current_token).collect::<Vec<_>>()
        };
        assert_eq!(run(9), run(9));
        assert_ne!(run(9), run(10));
    }

    #[test]
    fn clearing_ap_ctrl_abandons_stream() {
        let mut bus = SimBus::new().with_token_budget(50);
        start(&mut bus, 1);
        let _ = poll(&mut bus);
        bus.write32(regs::AP_CTRL, 0);
        assert_ne!(bus.read32(regs::AP_CTRL) & regs::ctrl::IDLE, 0);
        let before = poll(&mut bus).tokens_generated;
        let after = poll(&mut bus).tokens_generated;
        assert_eq!(before, after, "no progress after abandon");
    }
}
