// SPDX-License-Identifier: AGPL-3.0-only

//! Host-side driver for the Weft FPGA LLM accelerator.
//!
//! Layering, bottom up:
//!
//! ```text
//! MappedRegion      /dev/mem (or anonymous) mappings, volatile access
//! MemoryManager     the four DMA regions: weights, KV cache, I/O buffers
//! RegisterBus       trait over the AXI-Lite window
//!   MmioBus         real register window
//!   SimBus          in-process register file + synthetic status model
//! stager            deterministic weight layout into the DDR weight region
//! Accelerator       configure / start_inference / poll_status / next_token
//! InterruptService  optional UIO thread: ISR read, callbacks, W1C
//! ```
//!
//! # Quick start (simulation)
//!
//! ```
//! use weft_driver::{Accelerator, MemoryManager, MemoryMode, MemoryPlan, SimBus};
//!
//! # fn main() -> weft_driver::Result<()> {
//! let memory = MemoryManager::init(MemoryMode::Simulated, &MemoryPlan::default())?;
//! let mut accel = Accelerator::new(
//!     Box::new(SimBus::new()),
//!     memory.input(),
//!     memory.output(),
//!     memory.kv_cache(),
//! );
//! accel.configure(128, 2048);
//! accel.start_inference(1, &[104, 105]);
//! while let Some(token) = accel.next_token() {
//!     if token == weft_chip::EOS_TOKEN {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod accelerator;
mod backend;
pub mod backends;
mod error;
mod irq;
mod memory;
pub mod mmio;
pub mod stager;

pub use accelerator::Accelerator;
pub use backend::RegisterBus;
pub use backends::{MmioBus, SimBus};
pub use error::{DriverError, Result};
pub use irq::{Interrupt, InterruptCallback, InterruptService, IrqStats};
pub use memory::{MemoryManager, MemoryMode, MemoryPlan, MemoryRegion, RegionKind, RegionSpec};
pub use stager::{required_bytes, stage, StagedModel};
