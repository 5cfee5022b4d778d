use std::path::PathBuf;
use std::process::exit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use log::{error, info};

use threadkit::{DelegateThread, PoolConfig, Result, WorkerPool};

#[derive(Parser)]
#[command(name = "threadkit", version, about = "Drive the worker pool and managed threads")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Push a batch of tasks through a worker pool
    Pool {
        /// Number of tasks to submit
        #[arg(long, default_value_t = 10_000)]
        tasks: u64,
        /// Worker threads (at most 5)
        #[arg(long)]
        threads: Option<usize>,
        /// Queue depth at which submission blocks (at most 1500)
        #[arg(long, value_name = "DEPTH")]
        queue_depth: Option<usize>,
        /// JSON file with pool settings; flags override it
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Run a producer and a consumer thread bound to one shared queue
    Delegate {
        /// How long to keep both threads running
        #[arg(long, default_value_t = 500, value_name = "MILLIS")]
        millis: u64,
    },
}

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        error!("{}", e);
        exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    info!("threadkit {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Pool {
            tasks,
            threads,
            queue_depth,
            config,
        } => {
            let mut pool_config = match config {
                Some(path) => PoolConfig::from_json_file(path)?,
                None => PoolConfig::default(),
            };
            if let Some(threads) = threads {
                pool_config.threads = threads;
            }
            if let Some(depth) = queue_depth {
                pool_config.max_queue_size = depth;
            }
            run_pool(pool_config, tasks)
        }
        Commands::Delegate { millis } => run_delegate(Duration::from_millis(millis)),
    }
}

#[derive(Default)]
struct Job {
    value: u64,
    total: Option<Arc<AtomicU64>>,
}

fn add_job(job: &mut Job) {
    if let Some(total) = &job.total {
        total.fetch_add(job.value, Ordering::Relaxed);
    }
}

fn run_pool(config: PoolConfig, tasks: u64) -> Result<()> {
    let config = config.clamped();
    info!("Pool config {}", serde_json::to_string(&config)?);
    let pool: WorkerPool<Job> = WorkerPool::new(config)?;
    let total = Arc::new(AtomicU64::new(0));

    let started = Instant::now();
    for value in 1..=tasks {
        pool.submit_with(add_job, |job| {
            job.value = value;
            job.total = Some(Arc::clone(&total));
        })?;
    }
    pool.join_all();
    let elapsed = started.elapsed();
    pool.shutdown();

    info!(
        "{} tasks on {} threads in {:?}",
        tasks,
        config.threads,
        elapsed
    );
    println!("completed {} tasks, sum {}", tasks, total.load(Ordering::Relaxed));
    Ok(())
}

/// Host object whose two methods become thread run hooks.
#[derive(Default)]
struct Exchange {
    queue: Mutex<Vec<u64>>,
    produced: AtomicU64,
    consumed: AtomicU64,
}

impl Exchange {
    fn produce(&self) -> i32 {
        let start = self.produced.fetch_add(100, Ordering::Relaxed);
        if let Ok(mut queue) = self.queue.lock() {
            queue.extend(start..start + 100);
        }
        thread::yield_now();
        0
    }

    fn consume(&self) -> i32 {
        let drained = match self.queue.lock() {
            Ok(mut queue) => queue.drain(..).count(),
            Err(_) => return 1,
        };
        self.consumed.fetch_add(drained as u64, Ordering::Relaxed);
        thread::yield_now();
        0
    }
}

fn run_delegate(duration: Duration) -> Result<()> {
    let exchange = Arc::new(Exchange::default());

    let producer: DelegateThread<Exchange> = DelegateThread::new()?;
    let consumer: DelegateThread<Exchange> = DelegateThread::new()?;
    producer.bind(Arc::clone(&exchange), Exchange::produce)?;
    consumer.bind(Arc::clone(&exchange), Exchange::consume)?;

    producer.run(true);
    consumer.run(true);
    thread::sleep(duration);
    producer.stop(true);
    consumer.stop(true);

    // One last pass so nothing produced before the stop is left behind.
    exchange.consume();

    producer.terminate(true);
    consumer.terminate(true);

    println!(
        "produced {}, consumed {}",
        exchange.produced.load(Ordering::Relaxed),
        exchange.consumed.load(Ordering::Relaxed)
    );
    Ok(())
}
