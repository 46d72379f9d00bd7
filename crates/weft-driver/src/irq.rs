// SPDX-License-Identifier: AGPL-3.0-only

//! UIO interrupt service.
//!
//! Optional companion thread to the polling path. It blocks on the UIO
//! descriptor, reads the 4-byte interrupt count the kernel publishes, reads
//! `ISR`, dispatches callbacks for each asserted source and write-1-to-clears
//! them. The poll carries a 1-second timeout so the shutdown flag is observed
//! promptly even on a quiet device.
//!
//! Callbacks run on the service thread and must not block or do long work —
//! they signal the engine through atomics or queues. The service never
//! interprets token data; the driver's status block stays the single source
//! of truth.

use crate::error::{DriverError, Result};
use crate::mmio::MappedRegion;
use rustix::event::{poll, PollFd, PollFlags};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use weft_chip::regs;

/// Interrupt source delivered to callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// Core finished an invocation.
    Done,
    /// Core ready for the next invocation.
    Ready,
    /// A decoded token is available.
    TokenReady,
    /// The core latched a fault.
    Error,
}

/// Non-blocking callback invoked on the service thread.
pub type InterruptCallback = Box<dyn Fn(Interrupt) + Send + Sync + 'static>;

/// Per-source interrupt counters.
#[derive(Debug, Default)]
pub struct IrqStats {
    /// UIO wakeups observed.
    pub total: AtomicU64,
    /// `AP_DONE` assertions.
    pub done: AtomicU64,
    /// `AP_READY` assertions.
    pub ready: AtomicU64,
    /// `TOKEN_READY` assertions.
    pub token: AtomicU64,
    /// `ERROR` assertions.
    pub error: AtomicU64,
}

#[derive(Default)]
struct CallbackSet {
    done: Option<InterruptCallback>,
    ready: Option<InterruptCallback>,
    token: Option<InterruptCallback>,
    error: Option<InterruptCallback>,
}

/// UIO-backed interrupt service.
pub struct InterruptService {
    path: PathBuf,
    uio: Option<File>,
    window: Option<Arc<MappedRegion>>,
    callbacks: CallbackSet,
    running: Arc<AtomicBool>,
    stats: Arc<IrqStats>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for InterruptService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterruptService")
            .field("path", &self.path)
            .field("running", &self.running.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl InterruptService {
    /// Open the UIO device, keeping the register window for ISR access.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DeviceUnavailable`] if the device cannot be
    /// opened.
    pub fn open(path: impl AsRef<Path>, window: Option<Arc<MappedRegion>>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let uio = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| DriverError::device_unavailable(&path, e.to_string()))?;

        tracing::info!(path = %path.display(), "UIO device opened");

        Ok(Self {
            path,
            uio: Some(uio),
            window,
            callbacks: CallbackSet::default(),
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(IrqStats::default()),
            thread: None,
        })
    }

    /// Register the `AP_DONE` callback. Must be set before [`start`].
    ///
    /// [`start`]: InterruptService::start
    pub fn on_done(&mut self, cb: InterruptCallback) {
        self.callbacks.done = Some(cb);
    }

    /// Register the `AP_READY` callback.
    pub fn on_ready(&mut self, cb: InterruptCallback) {
        self.callbacks.ready = Some(cb);
    }

    /// Register the `TOKEN_READY` callback.
    pub fn on_token(&mut self, cb: InterruptCallback) {
        self.callbacks.token = Some(cb);
    }

    /// Register the `ERROR` callback.
    pub fn on_error(&mut self, cb: InterruptCallback) {
        self.callbacks.error = Some(cb);
    }

    /// Shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<IrqStats> {
        Arc::clone(&self.stats)
    }

    /// Enable device interrupts and spawn the service thread.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::DeviceUnavailable`] if called twice or after
    /// [`stop`](InterruptService::stop).
    pub fn start(&mut self) -> Result<()> {
        let uio = self.uio.take().ok_or_else(|| {
            DriverError::device_unavailable(&self.path, "service already started or stopped")
        })?;

        if let Some(window) = &self.window {
            window.write32(regs::GIE, 1);
            window.write32(regs::IER, regs::irq::AP_DONE | regs::irq::AP_READY);
        }

        self.running.store(true, Ordering::Release);

        let running = Arc::clone(&self.running);
        let stats = Arc::clone(&self.stats);
        let window = self.window.clone();
        let callbacks = std::mem::take(&mut self.callbacks);

        self.thread = Some(std::thread::spawn(move || {
            service_loop(&uio, window.as_deref(), &callbacks, &running, &stats);
        }));

        tracing::info!("interrupt service started");
        Ok(())
    }

    /// Stop the thread, disable device interrupts, close the descriptor.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("interrupt service thread panicked");
            }
        }
        if let Some(window) = &self.window {
            window.write32(regs::IER, 0);
            window.write32(regs::GIE, 0);
        }
        // Descriptor was moved into the thread and is closed with it.
        tracing::info!(
            total = self.stats.total.load(Ordering::Relaxed),
            done = self.stats.done.load(Ordering::Relaxed),
            "interrupt service stopped"
        );
    }
}

impl Drop for InterruptService {
    fn drop(&mut self) {
        if self.thread.is_some() {
            self.stop();
        }
    }
}

fn service_loop(
    uio: &File,
    window: Option<&MappedRegion>,
    callbacks: &CallbackSet,
    running: &AtomicBool,
    stats: &IrqStats,
) {
    tracing::debug!("interrupt service thread running");

    while running.load(Ordering::Acquire) {
        let mut fds = [PollFd::new(uio, PollFlags::IN)];
        let ready = match poll(&mut fds, 1000) {
            Ok(n) => n,
            Err(e) => {
                tracing::error!("UIO poll failed: {e}");
                break;
            }
        };
        if ready == 0 {
            continue;
        }

        let mut count = [0u8; 4];
        match rustix::io::read(uio, &mut count) {
            Ok(4) => {}
            Ok(n) => {
                tracing::warn!(bytes = n, "short UIO read");
                continue;
            }
            Err(e) => {
                tracing::error!("UIO read failed: {e}");
                break;
            }
        }
        stats.total.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(count = u32::from_le_bytes(count), "UIO wakeup");

        let Some(window) = window else {
            continue;
        };
        let isr = window.read32(regs::ISR);
        dispatch(isr, callbacks, stats);
        if isr != 0 {
            window.write32(regs::ISR, isr);
        }
    }

    tracing::debug!("interrupt service thread exiting");
}

fn dispatch(isr: u32, callbacks: &CallbackSet, stats: &IrqStats) {
    let sources = [
        (regs::irq::AP_DONE, Interrupt::Done, &callbacks.done, &stats.done),
        (regs::irq::AP_READY, Interrupt::Ready, &callbacks.ready, &stats.ready),
        (regs::irq::TOKEN_READY, Interrupt::TokenReady, &callbacks.token, &stats.token),
        (regs::irq::ERROR, Interrupt::Error, &callbacks.error, &stats.error),
    ];
    for (bit, kind, callback, counter) in sources {
        if isr & bit != 0 {
            counter.fetch_add(1, Ordering::Relaxed);
            if let Some(cb) = callback {
                cb(kind);
            }
        }
    }
}
