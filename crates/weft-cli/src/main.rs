// SPDX-License-Identifier: AGPL-3.0-only

//! `weft` — interactive console for the Weft FPGA LLM accelerator.
//!
//! ```text
//! USAGE:
//!   weft [--model model.pt.bin] [--hardware] [--uio /dev/uio0] [--max-tokens N]
//!
//! Console:
//!   /quit   shut the engine down
//!   /stop   stop the current generation
//!   /reset  clear the KV cache
//!   <text>  generate a response
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use weft_driver::{
    Accelerator, InterruptService, MemoryManager, MemoryMode, MemoryPlan, MmioBus, RegisterBus,
    SimBus,
};
use weft_engine::{
    BoundedQueue, Command, Engine, EngineConfig, Task, TokenSink, COMMAND_QUEUE_CAPACITY,
    TASK_QUEUE_CAPACITY,
};
use weft_models::ModelWeights;

mod shell;

#[derive(Parser)]
#[command(name = "weft", about = "Weft FPGA LLM accelerator console", version)]
struct Cli {
    /// Weight container to stage into DDR.
    #[arg(long, default_value = "model.pt.bin")]
    model: PathBuf,

    /// Drive the physical device through /dev/mem instead of the simulator.
    #[arg(long)]
    hardware: bool,

    /// UIO device delivering accelerator interrupts (hardware mode only).
    #[arg(long)]
    uio: Option<PathBuf>,

    /// Token budget per generation.
    #[arg(long, default_value_t = 50)]
    max_tokens: u32,
}

/// Unbuffered stdout, so tokens appear as they decode.
struct StdoutSink;

impl TokenSink for StdoutSink {
    fn emit(&mut self, text: &str) {
        print!("{text}");
        let _ = std::io::stdout().flush();
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    println!("Weft inference console");
    println!("  /quit   shutdown    /stop  stop generation");
    println!("  /reset  clear KV    <text> generate");
    println!();

    // Phase 1: memory.
    let mode = if cli.hardware {
        MemoryMode::Hardware
    } else {
        MemoryMode::Simulated
    };
    let memory = MemoryManager::init(mode, &MemoryPlan::default())
        .context("memory initialization failed")?;
    memory.log_map();

    // Phase 2: weights. A missing or invalid container is not fatal — the
    // engine runs in simulation without staged weights.
    let model = match ModelWeights::from_file(&cli.model) {
        Ok(model) => Some(model),
        Err(e) => {
            tracing::warn!("weight load failed: {e}");
            println!("No usable weights at {}: {e}", cli.model.display());
            println!("Continuing without weights (simulation mode).");
            println!("Convert a checkpoint with: convert_weights.py model.pt model.pt.bin");
            None
        }
    };

    if let Some(model) = &model {
        let staged =
            weft_driver::stage(model, &memory.weights()).context("weight staging failed")?;
        println!(
            "Staged {} layers ({} bytes) at {:#010x}",
            staged.layer_count(),
            staged.total_len(),
            staged.embeddings_address()
        );
    }

    // Phase 3: device.
    let (bus, window): (Box<dyn RegisterBus>, _) = if cli.hardware {
        let bus = MmioBus::open().context("register window unavailable")?;
        let window = bus.window();
        (Box::new(bus), Some(window))
    } else {
        (Box::new(SimBus::new()), None)
    };

    let mut accel = Accelerator::new(bus, memory.input(), memory.output(), memory.kv_cache());
    accel.configure(128, 2048);
    if let Some(model) = &model {
        accel.set_model_geometry(model.config());
    }

    let mut irq = match (&cli.uio, cli.hardware) {
        (Some(uio), true) => {
            let mut service = InterruptService::open(uio, window)
                .context("UIO interrupt service unavailable")?;
            service.on_error(Box::new(|_| {
                tracing::error!("accelerator raised the ERROR interrupt");
            }));
            service.start()?;
            Some(service)
        }
        (Some(_), false) => {
            tracing::warn!("--uio ignored without --hardware");
            None
        }
        _ => None,
    };

    let tasks = Arc::new(BoundedQueue::new(TASK_QUEUE_CAPACITY));
    let commands = Arc::new(BoundedQueue::new(COMMAND_QUEUE_CAPACITY));

    let engine_thread = {
        let tasks = Arc::clone(&tasks);
        let commands = Arc::clone(&commands);
        let config = EngineConfig {
            max_tokens: cli.max_tokens,
            poll_interval: Duration::from_millis(50),
            idle_interval: Duration::from_millis(100),
        };
        std::thread::spawn(move || {
            Engine::new(accel, tasks, commands, Box::new(StdoutSink), config).run();
        })
    };

    println!("System ready.");
    run_shell(&tasks, &commands);

    engine_thread
        .join()
        .map_err(|_| anyhow::anyhow!("engine thread panicked"))?;
    if let Some(irq) = &mut irq {
        irq.stop();
    }
    drop(memory);

    println!("Shutdown complete.");
    Ok(())
}

/// Read console lines until `/quit`, feeding the queues.
fn run_shell(tasks: &BoundedQueue<Task>, commands: &BoundedQueue<Command>) {
    let stdin = std::io::stdin();
    let mut next_task_id: u32 = 1;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!("console read failed: {e}");
                break;
            }
        };

        match shell::classify(&line) {
            shell::Input::Empty => {}
            shell::Input::Control(Command::Shutdown) => {
                push_shutdown(commands);
                return;
            }
            shell::Input::Control(cmd) => {
                if commands.try_push(cmd).is_err() {
                    tracing::warn!(?cmd, "command queue full, dropping");
                }
            }
            shell::Input::Prompt(prompt) => {
                let task = Task::generate(next_task_id, prompt);
                if tasks.try_push(task).is_err() {
                    println!("[Warning] Task queue full, dropping request");
                    let _ = std::io::stdout().flush();
                } else {
                    next_task_id += 1;
                }
            }
        }
    }

    // Console EOF also means shutdown.
    push_shutdown(commands);
}

/// The engine must observe `Shutdown` or the join never returns; retry the
/// push until the queue has room.
fn push_shutdown(commands: &BoundedQueue<Command>) {
    while commands.try_push(Command::Shutdown).is_err() {
        std::thread::sleep(Duration::from_millis(10));
    }
}
