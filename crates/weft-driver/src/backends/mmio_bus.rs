// SPDX-License-Identifier: AGPL-3.0-only

//! Hardware register bus over the mapped AXI-Lite window.

use crate::backend::RegisterBus;
use crate::error::Result;
use crate::mmio::MappedRegion;
use std::sync::Arc;
use weft_chip::regs;

/// Register bus backed by the physical register window.
///
/// The window is shared (`Arc`) with the interrupt service, which touches
/// only the `ISR` offset; the driver owns every other register. Offsets are
/// disjoint, so the two threads never race on a register.
#[derive(Debug)]
pub struct MmioBus {
    window: Arc<MappedRegion>,
}

impl MmioBus {
    /// Map the register window at its default physical base.
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriverError::DeviceUnavailable`] if `/dev/mem`
    /// cannot be opened or mapped.
    pub fn open() -> Result<Self> {
        Self::open_at(regs::BASE_ADDR)
    }

    /// Map the register window at `base` (device-tree overrides).
    ///
    /// # Errors
    ///
    /// Returns [`crate::DriverError::DeviceUnavailable`] if `/dev/mem`
    /// cannot be opened or mapped.
    pub fn open_at(base: u64) -> Result<Self> {
        let window = MappedRegion::map_devmem(base, regs::WINDOW_SIZE)?;
        tracing::info!(base = format_args!("{base:#x}"), "register window mapped");
        Ok(Self {
            window: Arc::new(window),
        })
    }

    /// Shared handle to the window, for the interrupt service.
    #[must_use]
    pub fn window(&self) -> Arc<MappedRegion> {
        Arc::clone(&self.window)
    }
}

impl RegisterBus for MmioBus {
    fn read32(&mut self, offset: usize) -> u32 {
        self.window.read32(offset)
    }

    fn write32(&mut self, offset: usize, value: u32) {
        self.window.write32(offset, value);
    }

    fn is_hardware(&self) -> bool {
        true
    }
}
