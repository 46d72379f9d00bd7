// SPDX-License-Identifier: AGPL-3.0-only

//! Control loop for the Weft accelerator.
//!
//! The shell produces [`Task`]s and [`Command`]s into two [`BoundedQueue`]s;
//! the [`Engine`] consumes them on its own thread, drives the
//! [`weft_driver::Accelerator`], and streams decoded tokens into a
//! [`TokenSink`]. Commands preempt generation at token boundaries.
//!
//! ```text
//! shell ──tasks───▶ ┌────────┐ ──configure/start/poll──▶ device
//! shell ──commands─▶│ Engine │
//!                   └────────┘ ──tokens/markers──▶ sink
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod engine;
mod queue;
mod task;
pub mod tokenizer;

pub use engine::{Engine, EngineConfig, TokenSink};
pub use queue::BoundedQueue;
pub use task::{Command, EngineState, EngineStatus, Task, TaskKind};

/// Default task queue capacity.
pub const TASK_QUEUE_CAPACITY: usize = 100;

/// Default command queue capacity.
pub const COMMAND_QUEUE_CAPACITY: usize = 10;
