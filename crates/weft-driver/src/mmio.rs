// SPDX-License-Identifier: AGPL-3.0-only

//! Memory-mapped regions: the register window and DMA-visible DDR.
//!
//! One abstraction serves both uses. Register access goes through the
//! volatile `read32`/`write32` pair; DDR staging uses the bulk byte
//! accessors. On hosts without `/dev/mem` access an anonymous mapping
//! stands in, which is what the simulation backend and the test suite run
//! against.

// MMIO register casts: registers are 32-bit aligned by the IP, DDR regions
// are page-aligned by mmap.
#![allow(clippy::cast_ptr_alignment)]

use crate::error::{DriverError, Result};
use rustix::mm::{mmap, mmap_anonymous, munmap, MapFlags, ProtFlags};
use std::fs::OpenOptions;
use std::os::unix::io::AsFd;
use std::ptr::NonNull;

/// A mapped physical region.
#[derive(Debug)]
pub struct MappedRegion {
    ptr: NonNull<u8>,
    len: usize,
    phys: u64,
}

// SAFETY: MappedRegion owns its mapping exclusively; the mapping stays valid
// wherever the value moves (mmap'd memory is process-wide, no thread-local
// state).
unsafe impl Send for MappedRegion {}

// SAFETY: all accessors are bounds-checked. Register reads/writes are
// volatile and target distinct offsets from distinct threads by protocol
// (the engine owns control/config/status, the interrupt service owns ISR).
// Bulk DDR accessors are only used while a single thread holds the region:
// staging before the engine starts, the engine thread afterwards.
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map `len` bytes of physical memory at `phys` through `/dev/mem`.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DeviceUnavailable`] if `/dev/mem` cannot be
    /// opened (needs root or a dedicated group) or the mapping fails.
    pub fn map_devmem(phys: u64, len: usize) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open("/dev/mem")
            .map_err(|e| DriverError::device_unavailable("/dev/mem", e.to_string()))?;

        // SAFETY: fd was just opened; len is non-zero at every call site;
        // MAP_SHARED is required for the device to observe writes; the
        // mapping is unmapped exactly once in Drop.
        let addr = unsafe {
            mmap(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                file.as_fd(),
                phys,
            )
        }
        .map_err(|e| {
            DriverError::device_unavailable("/dev/mem", format!("mmap {phys:#x}+{len:#x}: {e}"))
        })?;

        tracing::info!(phys = format_args!("{phys:#x}"), len, "mapped /dev/mem region");

        Ok(Self {
            ptr: NonNull::new(addr.cast()).expect("mmap returns non-null on success"),
            len,
            phys,
        })
    }

    /// Map an anonymous zero-filled region standing in for physical memory.
    ///
    /// `phys` is the nominal physical address published to callers; no
    /// hardware is behind it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::MemoryInitFailure`] if the mapping fails.
    pub fn map_anonymous(phys: u64, len: usize) -> Result<Self> {
        // SAFETY: anonymous private mapping, unmapped exactly once in Drop.
        let addr = unsafe {
            mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::PRIVATE,
            )
        }
        .map_err(|e| DriverError::memory_init(format!("anonymous mmap of {len:#x}: {e}")))?;

        tracing::debug!(phys = format_args!("{phys:#x}"), len, "mapped anonymous region");

        Ok(Self {
            ptr: NonNull::new(addr.cast()).expect("mmap returns non-null on success"),
            len,
            phys,
        })
    }

    /// Nominal physical address of the region base.
    #[must_use]
    pub const fn phys_addr(&self) -> u64 {
        self.phys
    }

    /// Region length in bytes.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the region is empty (never true for a mapped region).
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Volatile 32-bit register read.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the region.
    #[must_use]
    pub fn read32(&self, offset: usize) -> u32 {
        assert!(offset + 4 <= self.len, "register read out of bounds");
        // SAFETY: bounds checked above; ptr valid for len bytes; registers
        // are 32-bit aligned. Volatile is required, the device changes these
        // values behind the compiler's back.
        unsafe {
            self.ptr.as_ptr().add(offset).cast::<u32>().read_volatile()
        }
    }

    /// Volatile 32-bit register write.
    ///
    /// # Panics
    ///
    /// Panics if `offset + 4` exceeds the region.
    pub fn write32(&self, offset: usize, value: u32) {
        assert!(offset + 4 <= self.len, "register write out of bounds");
        // SAFETY: bounds checked above; ptr valid for len bytes; volatile is
        // required, register writes trigger device side effects.
        unsafe {
            self.ptr
                .as_ptr()
                .add(offset)
                .cast::<u32>()
                .write_volatile(value);
        }
    }

    /// Bulk copy into the region.
    ///
    /// # Panics
    ///
    /// Panics if the write would exceed the region.
    pub fn write_bytes(&self, offset: usize, data: &[u8]) {
        assert!(
            offset.checked_add(data.len()).is_some_and(|end| end <= self.len),
            "region write out of bounds"
        );
        // SAFETY: bounds checked above; source is a live slice; destination
        // is within the mapping; the two cannot overlap (mapping is not
        // reachable as a safe slice).
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.ptr.as_ptr().add(offset), data.len());
        }
    }

    /// Bulk copy out of the region.
    ///
    /// # Panics
    ///
    /// Panics if the read would exceed the region.
    pub fn read_bytes(&self, offset: usize, buffer: &mut [u8]) {
        assert!(
            offset.checked_add(buffer.len()).is_some_and(|end| end <= self.len),
            "region read out of bounds"
        );
        // SAFETY: bounds checked above; see write_bytes.
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.ptr.as_ptr().add(offset),
                buffer.as_mut_ptr(),
                buffer.len(),
            );
        }
    }

    /// Zero the whole region.
    pub fn fill_zero(&self) {
        // SAFETY: ptr valid for len bytes, u8 has no invalid values.
        unsafe {
            std::ptr::write_bytes(self.ptr.as_ptr(), 0, self.len);
        }
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        // SAFETY: ptr/len are exactly what mmap returned; Drop runs once.
        unsafe {
            if let Err(e) = munmap(self.ptr.as_ptr().cast(), self.len) {
                tracing::error!("munmap failed: {e}");
            }
        }
    }
}
