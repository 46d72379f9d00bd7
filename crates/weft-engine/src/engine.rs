// SPDX-License-Identifier: AGPL-3.0-only

//! Engine control loop.
//!
//! Consumes the task and command queues, drives the accelerator, and
//! streams decoded tokens to the output sink. Commands preempt generation
//! cooperatively: the loop drains one command per token boundary, so a
//! `Stop` lands within one token period plus the poll sleep.

use crate::queue::BoundedQueue;
use crate::task::{Command, EngineState, EngineStatus, Task};
use crate::tokenizer::{detokenize, tokenize};
use std::sync::Arc;
use std::time::Duration;
use weft_chip::EOS_TOKEN;
use weft_driver::Accelerator;

/// Where decoded tokens and status markers go.
///
/// The console shell provides an unbuffered-stdout sink; tests record.
pub trait TokenSink: Send {
    /// Emit `text` verbatim.
    fn emit(&mut self, text: &str);
}

/// Engine tuning knobs.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Token budget per generation.
    pub max_tokens: u32,
    /// Sleep between status polls inside a generation.
    pub poll_interval: Duration,
    /// Sleep when both queues are empty at top level.
    pub idle_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_tokens: 50,
            poll_interval: Duration::from_millis(50),
            idle_interval: Duration::from_millis(100),
        }
    }
}

/// The engine thread's state machine.
pub struct Engine {
    accel: Accelerator,
    tasks: Arc<BoundedQueue<Task>>,
    commands: Arc<BoundedQueue<Command>>,
    sink: Box<dyn TokenSink>,
    state: EngineState,
    config: EngineConfig,
}

impl Engine {
    /// Assemble an engine over its collaborators.
    pub fn new(
        accel: Accelerator,
        tasks: Arc<BoundedQueue<Task>>,
        commands: Arc<BoundedQueue<Command>>,
        sink: Box<dyn TokenSink>,
        config: EngineConfig,
    ) -> Self {
        Self {
            accel,
            tasks,
            commands,
            sink,
            state: EngineState::default(),
            config,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> EngineStatus {
        self.state.status
    }

    /// Task currently generating, if any.
    #[must_use]
    pub fn current_task_id(&self) -> Option<u32> {
        self.state.current_task_id
    }

    /// Run until a `Shutdown` command is observed. This is the engine
    /// thread's body; it resets the device on the way out.
    pub fn run(&mut self) {
        tracing::info!("engine started");

        while self.state.status != EngineStatus::ShuttingDown {
            if let Some(cmd) = self.commands.try_pop() {
                self.handle_idle_command(cmd);
                continue;
            }

            if let Some(task) = self.tasks.try_pop() {
                self.state.current_task_id = Some(task.id);
                self.state.status = EngineStatus::Generating;
                tracing::info!(task_id = task.id, "generation begins");

                self.run_generation(&task);

                if self.state.status == EngineStatus::Generating {
                    self.state.return_to_idle();
                }
            } else {
                std::thread::sleep(self.config.idle_interval);
            }
        }

        self.accel.reset();
        tracing::info!("engine shutdown complete");
    }

    /// Commands arriving while no generation runs.
    fn handle_idle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Shutdown => {
                self.state.status = EngineStatus::ShuttingDown;
            }
            Command::Reset => {
                self.accel.reset();
                self.sink.emit("\n[Memory cleared]\n");
            }
            // Nothing to stop when idle.
            Command::Stop => {}
        }
    }

    /// Drive one generation to a terminal marker.
    ///
    /// Exactly one of `[EOS]`, `[Aborted]`, `[Max tokens reached]` is
    /// emitted before this returns.
    fn run_generation(&mut self, task: &Task) {
        self.state.cancel = false;
        self.state.reset_pending = false;

        let prompt_tokens = tokenize(&task.prompt);
        self.sink.emit("\n[Generating] ");
        self.accel.start_inference(task.id, &prompt_tokens);

        let mut produced = 0;
        while produced < self.config.max_tokens {
            if let Some(cmd) = self.commands.try_pop() {
                match cmd {
                    Command::Shutdown => {
                        self.state.cancel = true;
                        self.state.status = EngineStatus::ShuttingDown;
                        tracing::info!(task_id = task.id, "shutdown during generation");
                    }
                    Command::Reset => {
                        self.state.cancel = true;
                        self.state.reset_pending = true;
                    }
                    Command::Stop => {
                        self.state.cancel = true;
                    }
                }
            }

            if self.state.cancel {
                self.sink.emit("\n[Aborted]\n");
                if self.state.reset_pending {
                    self.accel.reset();
                    self.sink.emit("[Memory cleared]\n");
                    self.state.reset_pending = false;
                }
                return;
            }

            if let Some(token) = self.accel.next_token() {
                if token == EOS_TOKEN {
                    self.sink.emit("\n[EOS]\n");
                    return;
                }
                self.sink.emit(&detokenize(token));
                produced += 1;
            }

            std::thread::sleep(self.config.poll_interval);
        }

        self.sink.emit("\n[Max tokens reached]\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use std::sync::Mutex;
    use weft_driver::{MemoryManager, MemoryMode, MemoryPlan, RegionSpec, SimBus};

    /// Sink recording into shared memory so tests can assert on markers.
    #[derive(Clone, Default)]
    struct RecordingSink(Arc<Mutex<String>>);

    impl TokenSink for RecordingSink {
        fn emit(&mut self, text: &str) {
            self.0.lock().unwrap().push_str(text);
        }
    }

    impl RecordingSink {
        fn contents(&self) -> String {
            self.0.lock().unwrap().clone()
        }
    }

    fn test_memory() -> MemoryManager {
        let plan = MemoryPlan {
            weights: RegionSpec { phys: 0x100_0000, len: 1 << 16 },
            kv_cache: RegionSpec { phys: 0x200_0000, len: 1 << 16 },
            input: RegionSpec { phys: 0x300_0000, len: 1024 },
            output: RegionSpec { phys: 0x400_0000, len: 1024 },
        };
        MemoryManager::init(MemoryMode::Simulated, &plan).unwrap()
    }

    fn fast_config(max_tokens: u32) -> EngineConfig {
        EngineConfig {
            max_tokens,
            poll_interval: Duration::from_millis(1),
            idle_interval: Duration::from_millis(1),
        }
    }

    fn test_engine(token_budget: u32, max_tokens: u32) -> (Engine, RecordingSink, MemoryManager) {
        let memory = test_memory();
        let mut accel = Accelerator::new(
            Box::new(SimBus::new().with_token_budget(token_budget)),
            memory.input(),
            memory.output(),
            memory.kv_cache(),
        );
        accel.configure(128, 2048);

        let sink = RecordingSink::default();
        let engine = Engine::new(
            accel,
            Arc::new(BoundedQueue::new(100)),
            Arc::new(BoundedQueue::new(10)),
            Box::new(sink.clone()),
            fast_config(max_tokens),
        );
        (engine, sink, memory)
    }

    #[test]
    fn generation_ends_with_eos_marker() {
        let (mut engine, sink, _mm) = test_engine(5, 50);
        let task = Task::generate(1, "hi");
        engine.state.current_task_id = Some(task.id);
        engine.state.status = EngineStatus::Generating;
        engine.run_generation(&task);

        let out = sink.contents();
        assert!(out.starts_with("\n[Generating] "), "{out:?}");
        assert!(out.ends_with("\n[EOS]\n"), "{out:?}");
        // Five streamed characters between the markers.
        let body = out
            .trim_start_matches("\n[Generating] ")
            .trim_end_matches("\n[EOS]\n");
        assert_eq!(body.len(), 5);
    }

    #[test]
    fn generation_respects_max_token_budget() {
        let (mut engine, sink, _mm) = test_engine(60, 4);
        engine.run_generation(&Task::generate(1, "hi"));

        let out = sink.contents();
        assert!(out.ends_with("\n[Max tokens reached]\n"), "{out:?}");
    }

    #[test]
    fn stop_aborts_without_clearing_memory() {
        let (mut engine, sink, mm) = test_engine(50, 50);
        mm.kv_cache().write_bytes(0, &[0xAA; 16]);

        engine.commands.try_push(Command::Stop).unwrap();
        engine.run_generation(&Task::generate(2, "a long prompt"));

        let out = sink.contents();
        assert!(out.ends_with("\n[Aborted]\n"), "{out:?}");
        assert!(!out.contains("[Memory cleared]"));

        // KV cache untouched by a plain stop.
        let mut buf = [0u8; 16];
        mm.kv_cache().read_bytes(0, &mut buf);
        assert_eq!(buf, [0xAA; 16]);
    }

    #[test]
    fn reset_aborts_and_clears_memory() {
        let (mut engine, sink, mm) = test_engine(50, 50);
        mm.kv_cache().write_bytes(0, &[0xAA; 16]);

        engine.commands.try_push(Command::Reset).unwrap();
        engine.run_generation(&Task::generate(3, "prompt"));

        let out = sink.contents();
        assert!(out.contains("\n[Aborted]\n"), "{out:?}");
        assert!(out.ends_with("[Memory cleared]\n"), "{out:?}");

        let mut buf = [0u8; 16];
        mm.kv_cache().read_bytes(0, &mut buf);
        assert_eq!(buf, [0u8; 16]);
    }

    #[test]
    fn shutdown_during_generation_terminates_engine() {
        let (mut engine, sink, _mm) = test_engine(50, 50);
        engine.commands.try_push(Command::Shutdown).unwrap();
        engine.run_generation(&Task::generate(4, "prompt"));

        assert_eq!(engine.status(), EngineStatus::ShuttingDown);
        assert!(sink.contents().ends_with("\n[Aborted]\n"));
    }

    #[test]
    fn full_run_processes_task_then_shuts_down() {
        let (mut engine, sink, _mm) = test_engine(3, 50);
        engine.tasks.try_push(Task::generate(1, "hi")).unwrap();

        // Commands drain before tasks at top level, so shutdown is pushed by
        // a second thread once generation output appears.
        let commands = Arc::clone(&engine.commands);
        let watcher_sink = sink.clone();
        let watcher = std::thread::spawn(move || {
            let deadline = std::time::Instant::now() + Duration::from_secs(5);
            while std::time::Instant::now() < deadline {
                if watcher_sink.contents().contains("[EOS]") {
                    commands.try_push(Command::Shutdown).unwrap();
                    return;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            panic!("generation never finished");
        });

        engine.run();
        watcher.join().unwrap();

        assert_eq!(engine.status(), EngineStatus::ShuttingDown);
        assert_eq!(engine.current_task_id(), None);
        let out = sink.contents();
        assert!(out.contains("[Generating] "));
        assert!(out.contains("[EOS]"));
    }

    #[test]
    fn idle_reset_emits_memory_cleared() {
        let (mut engine, sink, _mm) = test_engine(3, 50);
        engine.handle_idle_command(Command::Reset);
        assert_eq!(sink.contents(), "\n[Memory cleared]\n");
        assert_eq!(engine.status(), EngineStatus::Idle);
    }

    #[test]
    fn tasks_have_generate_kind() {
        assert_eq!(Task::generate(1, "x").kind, TaskKind::Generate);
    }
}
