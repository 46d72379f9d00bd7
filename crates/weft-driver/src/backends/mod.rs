// SPDX-License-Identifier: AGPL-3.0-only

//! Register bus implementations.

mod mmio_bus;
mod sim;

pub use mmio_bus::MmioBus;
pub use sim::SimBus;
