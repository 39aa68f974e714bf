use std::error::Error;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};
use tracing::info;
use tracing_subscriber::EnvFilter;

use shmem_queue::{MessageQueue, QueueConfig, Role};

#[derive(clap::Parser)]
#[clap(about = "Attaches to a shared memory queue and prints every message it dequeues")]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "shmem-reader.toml")]
    config: String,
    /// Exit after this many messages.
    #[clap(short = 'n', long = "count")]
    count: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ReaderConfig {
    queue: QueueConfig,
    /// Pause between polls while the queue is empty.
    poll_interval_ms: u64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            queue: QueueConfig::default(),
            poll_interval_ms: 1,
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .init();

    let opts: Opts = Opts::parse();
    let cfg: ReaderConfig = confy::load_path(&opts.config)?;
    info!(config = %opts.config, name = %cfg.queue.name, capacity = cfg.queue.capacity, "starting reader");

    let closing = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&closing))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&closing))?;

    let mut queue = MessageQueue::new(&cfg.queue, Role::Attacher)?;
    run(&mut queue, &cfg, &opts, &closing)?;
    queue.close();
    Ok(())
}

fn run(
    queue: &mut MessageQueue,
    cfg: &ReaderConfig,
    opts: &Opts,
    closing: &AtomicBool,
) -> Result<(), Box<dyn Error>> {
    let poll_interval = Duration::from_millis(cfg.poll_interval_ms);
    let start = Instant::now();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut received = 0u64;

    while !closing.load(Ordering::Relaxed) {
        if opts.count.map_or(false, |count| received >= count) {
            break;
        }
        match queue.dequeue()? {
            Some(payload) => {
                out.write_all(&payload)?;
                out.write_all(b"\n")?;
                received += 1;
            }
            None => {
                out.flush()?;
                thread::sleep(poll_interval);
            }
        }
    }
    out.flush()?;

    let duration = start.elapsed();
    let diagnostics = queue.diagnostics()?;
    info!(received, ?duration, %diagnostics, "reader finished");
    Ok(())
}
