// SPDX-License-Identifier: AGPL-3.0-only

//! DDR region reservations shared by host and device.
//!
//! The manager acquires the four DMA regions the accelerator is configured
//! with — weight store, KV cache, token input and output buffers — and
//! publishes their physical/virtual address pairs. Regions are mapped from
//! `/dev/mem` on hardware; in simulation they are anonymous host memory
//! carrying the same nominal physical addresses.
//!
//! The legacy firmware's suggested map overlapped the input buffer with the
//! weight store; the plan here is validated for disjointness instead.

use crate::error::{DriverError, Result};
use crate::mmio::MappedRegion;
use std::fmt;
use std::sync::Arc;

/// Which of the four DMA regions a handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// Staged model weights, read-only to the device.
    Weights,
    /// Device-resident KV cache.
    KvCache,
    /// Prompt token input buffer.
    InputBuffer,
    /// Decoded token output buffer.
    OutputBuffer,
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Weights => "weights",
            Self::KvCache => "kv-cache",
            Self::InputBuffer => "input",
            Self::OutputBuffer => "output",
        };
        f.write_str(name)
    }
}

/// One DMA region: kind plus its mapping.
#[derive(Debug)]
pub struct MemoryRegion {
    kind: RegionKind,
    region: MappedRegion,
}

impl MemoryRegion {
    /// Region kind.
    #[must_use]
    pub const fn kind(&self) -> RegionKind {
        self.kind
    }

    /// Physical base address as programmed into the device.
    #[must_use]
    pub const fn phys_addr(&self) -> u64 {
        self.region.phys_addr()
    }

    /// Region length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.region.len()
    }

    /// Whether the region is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.region.is_empty()
    }

    /// Bulk copy into the region.
    ///
    /// # Panics
    ///
    /// Panics if the write would exceed the region.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        self.region.write_bytes(offset, data);
    }

    /// Bulk copy out of the region.
    ///
    /// # Panics
    ///
    /// Panics if the read would exceed the region.
    pub fn read_bytes(&self, offset: usize, buffer: &mut [u8]) {
        self.region.read_bytes(offset, buffer);
    }

    /// Zero the whole region.
    pub fn fill_zero(&self) {
        self.region.fill_zero();
    }
}

/// Placement of one region in the plan.
#[derive(Debug, Clone, Copy)]
pub struct RegionSpec {
    /// Physical base address.
    pub phys: u64,
    /// Length in bytes.
    pub len: usize,
}

/// Physical layout of all four regions.
#[derive(Debug, Clone, Copy)]
pub struct MemoryPlan {
    /// Weight store placement.
    pub weights: RegionSpec,
    /// KV cache placement.
    pub kv_cache: RegionSpec,
    /// Input buffer placement.
    pub input: RegionSpec,
    /// Output buffer placement.
    pub output: RegionSpec,
}

impl Default for MemoryPlan {
    fn default() -> Self {
        Self {
            input: RegionSpec {
                phys: 0x0F00_0000,
                len: 16 * 1024,
            },
            output: RegionSpec {
                phys: 0x0F01_0000,
                len: 16 * 1024,
            },
            weights: RegionSpec {
                phys: 0x1000_0000,
                len: 512 * 1024 * 1024,
            },
            kv_cache: RegionSpec {
                phys: 0x3000_0000,
                len: 512 * 1024 * 1024,
            },
        }
    }
}

/// How regions are backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    /// `/dev/mem` mappings of real DDR.
    Hardware,
    /// Anonymous host memory with nominal physical addresses.
    Simulated,
}

/// Owner of the four DMA regions.
///
/// Handles are shared (`Arc`) so the weight stager and the accelerator can
/// hold them across the engine thread's lifetime; the backing mappings are
/// released when the last holder drops, which the shutdown sequence orders
/// after the engine join.
#[derive(Debug)]
pub struct MemoryManager {
    mode: MemoryMode,
    weights: Arc<MemoryRegion>,
    kv_cache: Arc<MemoryRegion>,
    input: Arc<MemoryRegion>,
    output: Arc<MemoryRegion>,
}

impl MemoryManager {
    /// Acquire all four regions per `plan`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MemoryInitFailure`] if the plan overlaps, is
    /// misaligned, or a mapping fails.
    pub fn init(mode: MemoryMode, plan: &MemoryPlan) -> Result<Self> {
        validate_plan(plan)?;

        let map_one = |kind: RegionKind, spec: &RegionSpec| -> Result<Arc<MemoryRegion>> {
            let region = match mode {
                MemoryMode::Hardware => MappedRegion::map_devmem(spec.phys, spec.len)?,
                MemoryMode::Simulated => MappedRegion::map_anonymous(spec.phys, spec.len)?,
            };
            tracing::info!(
                %kind,
                phys = format_args!("{:#010x}", spec.phys),
                len = spec.len,
                "region acquired"
            );
            Ok(Arc::new(MemoryRegion { kind, region }))
        };

        Ok(Self {
            mode,
            weights: map_one(RegionKind::Weights, &plan.weights)?,
            kv_cache: map_one(RegionKind::KvCache, &plan.kv_cache)?,
            input: map_one(RegionKind::InputBuffer, &plan.input)?,
            output: map_one(RegionKind::OutputBuffer, &plan.output)?,
        })
    }

    /// Backing mode.
    #[must_use]
    pub const fn mode(&self) -> MemoryMode {
        self.mode
    }

    /// Weight store handle.
    #[must_use]
    pub fn weights(&self) -> Arc<MemoryRegion> {
        Arc::clone(&self.weights)
    }

    /// KV cache handle.
    #[must_use]
    pub fn kv_cache(&self) -> Arc<MemoryRegion> {
        Arc::clone(&self.kv_cache)
    }

    /// Input buffer handle.
    #[must_use]
    pub fn input(&self) -> Arc<MemoryRegion> {
        Arc::clone(&self.input)
    }

    /// Output buffer handle.
    #[must_use]
    pub fn output(&self) -> Arc<MemoryRegion> {
        Arc::clone(&self.output)
    }

    /// Log the published memory map.
    pub fn log_map(&self) {
        for r in [&self.weights, &self.kv_cache, &self.input, &self.output] {
            tracing::info!(
                kind = %r.kind(),
                phys = format_args!("{:#010x}", r.phys_addr()),
                len = r.len(),
                "memory map entry"
            );
        }
    }
}

/// DMA alignment every region base and length must satisfy.
const REGION_ALIGN: u64 = 64;

fn validate_plan(plan: &MemoryPlan) -> Result<()> {
    let specs = [
        (RegionKind::Weights, plan.weights),
        (RegionKind::KvCache, plan.kv_cache),
        (RegionKind::InputBuffer, plan.input),
        (RegionKind::OutputBuffer, plan.output),
    ];

    for (kind, spec) in &specs {
        if spec.len == 0 {
            return Err(DriverError::memory_init(format!("{kind} region is empty")));
        }
        if spec.phys % REGION_ALIGN != 0 {
            return Err(DriverError::memory_init(format!(
                "{kind} base {:#x} not {REGION_ALIGN}-byte aligned",
                spec.phys
            )));
        }
        spec.phys
            .checked_add(spec.len as u64)
            .ok_or_else(|| DriverError::memory_init(format!("{kind} region wraps")))?;
    }

    for (i, (kind_a, a)) in specs.iter().enumerate() {
        for (kind_b, b) in &specs[i + 1..] {
            let a_end = a.phys + a.len as u64;
            let b_end = b.phys + b.len as u64;
            if a.phys < b_end && b.phys < a_end {
                return Err(DriverError::memory_init(format!(
                    "{kind_a} and {kind_b} regions overlap"
                )));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_plan() -> MemoryPlan {
        MemoryPlan {
            weights: RegionSpec {
                phys: 0x1000_0000,
                len: 1 << 20,
            },
            kv_cache: RegionSpec {
                phys: 0x1100_0000,
                len: 1 << 20,
            },
            input: RegionSpec {
                phys: 0x1200_0000,
                len: 16 * 1024,
            },
            output: RegionSpec {
                phys: 0x1201_0000,
                len: 16 * 1024,
            },
        }
    }

    #[test]
    fn simulated_init_publishes_plan_addresses() {
        let mm = MemoryManager::init(MemoryMode::Simulated, &small_plan()).unwrap();
        assert_eq!(mm.weights().phys_addr(), 0x1000_0000);
        assert_eq!(mm.kv_cache().phys_addr(), 0x1100_0000);
        assert_eq!(mm.input().len(), 16 * 1024);
        assert_eq!(mm.output().kind(), RegionKind::OutputBuffer);
    }

    #[test]
    fn default_plan_is_valid() {
        assert!(validate_plan(&MemoryPlan::default()).is_ok());
    }

    #[test]
    fn overlapping_plan_is_rejected() {
        let mut plan = small_plan();
        plan.kv_cache.phys = plan.weights.phys + 64;
        let err = MemoryManager::init(MemoryMode::Simulated, &plan).unwrap_err();
        assert!(matches!(err, DriverError::MemoryInitFailure { .. }), "{err}");
    }

    #[test]
    fn misaligned_plan_is_rejected() {
        let mut plan = small_plan();
        plan.input.phys += 4;
        assert!(validate_plan(&plan).is_err());
    }

    #[test]
    fn regions_are_independent() {
        let mm = MemoryManager::init(MemoryMode::Simulated, &small_plan()).unwrap();
        mm.input().write_bytes(0, &[0xAA; 16]);
        let mut buf = [0u8; 16];
        mm.output().read_bytes(0, &mut buf);
        assert_eq!(buf, [0u8; 16]);
        mm.input().read_bytes(0, &mut buf);
        assert_eq!(buf, [0xAA; 16]);
    }
}
