#![deny(missing_docs)]

//! Thread-management primitives for long-running service hosts.
//!
//! Two independent pieces live here: [`ManagedThread`], a native thread
//! driven through a cooperative Stopped / Running / Terminating state
//! machine (with [`DelegateThread`] binding its run hook to a method on a
//! shared object), and [`WorkerPool`], a small fixed set of workers fed
//! through a growable FIFO ring with producer backpressure and recycled
//! parameter blocks.

mod config;
mod error;
/// Thread lifecycle wrapper and native thread backends.
pub mod thread;
/// Bounded worker pool executing submitted tasks.
pub mod thread_pool;

pub use config::{PoolConfig, MAX_QUEUE_SIZE, MAX_THREADS};
pub use error::{Result, ThreadError};
pub use thread::{
    DelegateThread, ManagedThread, Method, Runnable, StdBackend, ThreadBackend, ThreadPriority,
    ThreadState, EXIT_START_FAILED, EXIT_TERMINATED,
};
pub use thread_pool::{Task, TaskAction, WorkerPool};
