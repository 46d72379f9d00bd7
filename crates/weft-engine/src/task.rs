// SPDX-License-Identifier: AGPL-3.0-only

//! Task and command model shared by the shell and the engine.

/// What a task asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Generate text from a prompt.
    Generate,
}

/// One unit of work from the console.
///
/// Created by the shell, consumed exactly once by the engine, dropped when
/// generation ends by any cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// Monotonically increasing id assigned by the shell.
    pub id: u32,
    /// Task kind.
    pub kind: TaskKind,
    /// Prompt text.
    pub prompt: String,
}

impl Task {
    /// New generation task.
    #[must_use]
    pub fn generate(id: u32, prompt: impl Into<String>) -> Self {
        Self {
            id,
            kind: TaskKind::Generate,
            prompt: prompt.into(),
        }
    }
}

/// Out-of-band control signal. Commands preempt tasks: the engine drains
/// them first at top level and between tokens during generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Stop the current generation, keep device state.
    Stop,
    /// Stop the current generation and clear the KV cache.
    Reset,
    /// Terminate the engine.
    Shutdown,
}

/// Engine lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    /// Waiting for work.
    Idle,
    /// Driving a generation.
    Generating,
    /// Terminal: the engine loop is exiting.
    ShuttingDown,
}

/// Mutable engine state. Touched only by the engine thread.
///
/// Invariants: `Generating` implies `current_task_id` is set; `Idle` implies
/// no task and both flags clear; `ShuttingDown` is terminal.
#[derive(Debug)]
pub struct EngineState {
    /// Lifecycle state.
    pub status: EngineStatus,
    /// Task being generated, if any.
    pub current_task_id: Option<u32>,
    /// Cooperative cancel for the running generation.
    pub cancel: bool,
    /// A reset should follow the cancel.
    pub reset_pending: bool,
}

impl Default for EngineState {
    fn default() -> Self {
        Self {
            status: EngineStatus::Idle,
            current_task_id: None,
            cancel: false,
            reset_pending: false,
        }
    }
}

impl EngineState {
    /// Re-establish the `Idle` invariants after a generation ends.
    pub fn return_to_idle(&mut self) {
        self.status = EngineStatus::Idle;
        self.current_task_id = None;
        self.cancel = false;
        self.reset_pending = false;
    }
}
