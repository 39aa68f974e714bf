use std::error::Error;
use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use shmem_queue::{MessageQueue, QueueConfig, QueueError, Role};

#[derive(clap::Parser)]
#[clap(about = "Creates a shared memory queue and enqueues one message per stdin line")]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmem-writer.toml")]
    config: String,
    /// Keep the region alive after stdin closes until the reader drains it.
    #[clap(long)]
    linger: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct WriterConfig {
    queue: QueueConfig,
    /// Pause between attempts while the queue is full.
    retry_interval_ms: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            queue: QueueConfig::default(),
            retry_interval_ms: 1,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let opts: Opts = Opts::parse();
    let cfg: WriterConfig = confy::load_path(&opts.config)?;
    info!(config = %opts.config, name = %cfg.queue.name, capacity = cfg.queue.capacity, "starting writer");

    let closing = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&closing))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&closing))?;

    let mut queue = MessageQueue::new(&cfg.queue, Role::Creator)?;
    let written = run(&mut queue, &cfg, &closing)?;
    info!(written, "stdin closed");

    if opts.linger {
        linger(&queue, &cfg, &closing)?;
    }
    queue.close();
    Ok(())
}

fn run(queue: &mut MessageQueue, cfg: &WriterConfig, closing: &AtomicBool) -> Result<u64, Box<dyn Error>> {
    let retry_interval = Duration::from_millis(cfg.retry_interval_ms);
    let mut written = 0u64;
    for line in io::stdin().lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        loop {
            if closing.load(Ordering::Relaxed) {
                warn!(written, "interrupted");
                return Ok(written);
            }
            match queue.enqueue(line.as_bytes()) {
                Ok(()) => break,
                Err(QueueError::CapacityExceeded { .. }) => thread::sleep(retry_interval),
                Err(e) => return Err(e.into()),
            }
        }
        written += 1;
    }
    Ok(written)
}

fn linger(queue: &MessageQueue, cfg: &WriterConfig, closing: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let retry_interval = Duration::from_millis(cfg.retry_interval_ms);
    let mut diagnostics = queue.diagnostics()?;
    while !diagnostics.is_empty() && !closing.load(Ordering::Relaxed) {
        thread::sleep(retry_interval);
        diagnostics = queue.diagnostics()?;
    }
    info!(%diagnostics, "releasing region");
    Ok(())
}
