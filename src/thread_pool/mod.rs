use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use log::{debug, info, warn};

use crate::config::PoolConfig;
use crate::{Result, ThreadError};

mod buffer_pool;
mod ring;
mod worker;

use self::worker::Shared;

/// How often `join_all` nudges idle workers while waiting for the drain.
const JOIN_NUDGE_INTERVAL: Duration = Duration::from_millis(50);

/// How long `shutdown` waits for a worker exit before signalling again.
const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// The function a task runs with its parameter block.
pub type TaskAction<P> = fn(&mut P);

/// A unit of work: an action plus the parameter block it runs against.
///
/// The block moves from the submitter to exactly one worker and then back
/// to the pool's free list.
pub struct Task<P> {
    pub(crate) action: Option<TaskAction<P>>,
    pub(crate) params: Box<P>,
}

impl<P> Task<P> {
    /// Creates a task with a freshly allocated parameter block.
    pub fn new(action: TaskAction<P>, params: P) -> Self {
        Self {
            action: Some(action),
            params: Box::new(params),
        }
    }

    /// Sets the action to run.
    pub fn set_action(&mut self, action: TaskAction<P>) {
        self.action = Some(action);
    }

    /// Returns the action, if one was set.
    pub fn action(&self) -> Option<TaskAction<P>> {
        self.action
    }

    /// A task is only queued when it has an action.
    pub fn is_valid(&self) -> bool {
        self.action.is_some()
    }

    /// The parameter block.
    pub fn params(&self) -> &P {
        &self.params
    }

    /// The parameter block, for the submitter to fill in.
    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }
}

/// A bounded pool of worker threads fed through a FIFO task queue.
///
/// Producers block in [`submit`](WorkerPool::submit) while the queue holds
/// `max_queue_size` tasks. Parameter blocks are recycled through an internal
/// free list, so steady-state submission does not allocate.
pub struct WorkerPool<P>
where
    P: Default + Send + 'static,
{
    shared: Arc<Shared<P>>,
    workers: Mutex<Vec<(usize, JoinHandle<()>)>>,
    exits: Receiver<usize>,
}

impl<P> WorkerPool<P>
where
    P: Default + Send + 'static,
{
    /// Creates a pool from `config`, clamped to the supported limits.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::Spawn`] if not a single worker thread could be
    /// started. Partial failures are logged and the pool runs with fewer
    /// workers.
    pub fn new(config: PoolConfig) -> Result<Self> {
        let config = config.clamped();
        let shared = Arc::new(Shared::new(config.max_queue_size));
        let (exit_tx, exits) = channel::unbounded();

        let mut workers = Vec::with_capacity(config.threads);
        let mut last_err = None;
        for id in 0..config.threads {
            match worker::spawn_worker(id, Arc::clone(&shared), exit_tx.clone()) {
                Ok(handle) => workers.push((id, handle)),
                Err(e) => {
                    warn!("Failed to spawn pool worker {id}: {e}");
                    last_err = Some(e);
                }
            }
        }

        if workers.is_empty() {
            let err = last_err
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::Other, "no worker threads"));
            return Err(ThreadError::Spawn(err));
        }

        info!(
            "Worker pool started with {} workers, max queue size {}",
            workers.len(),
            config.max_queue_size
        );

        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            exits,
        })
    }

    /// Creates a pool with `threads` workers and a queue bound of
    /// `max_queue_size`.
    pub fn with_limits(threads: usize, max_queue_size: usize) -> Result<Self> {
        Self::new(PoolConfig {
            threads,
            max_queue_size,
        })
    }

    /// Hands out an empty task backed by a recycled parameter block.
    ///
    /// The caller fills the block and sets the action before submitting.
    pub fn acquire_task_storage(&self) -> Task<P> {
        let params = self.shared.lock().buffers.acquire();
        Task {
            action: None,
            params,
        }
    }

    /// Queues `task` for execution, blocking while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::InvalidTask`] if the task has no action, and
    /// [`ThreadError::ShuttingDown`] if the pool stopped accepting work
    /// before the task could be queued.
    pub fn submit(&self, task: Task<P>) -> Result<()> {
        let shared = &*self.shared;

        if task.action.is_none() {
            shared.lock().buffers.release(task.params);
            return Err(ThreadError::InvalidTask);
        }

        let mut state = shared.lock();
        loop {
            if !state.is_working {
                return Err(ThreadError::ShuttingDown);
            }
            if state.queue.len() < state.max_queue_size {
                break;
            }
            state = shared.wait(&shared.queue_has_room, state);
        }

        state.queue.push_back(Some(task));
        state.tasks_remaining += 1;
        // Pass the room signal on to the next blocked producer, if any.
        if state.queue.len() < state.max_queue_size {
            shared.queue_has_room.notify_one();
        }
        shared.work_available.notify_one();
        Ok(())
    }

    /// Acquires storage, lets `fill` write the parameters and submits.
    pub fn submit_with<F>(&self, action: TaskAction<P>, fill: F) -> Result<()>
    where
        F: FnOnce(&mut P),
    {
        let mut task = self.acquire_task_storage();
        fill(task.params_mut());
        task.set_action(action);
        self.submit(task)
    }

    /// Blocks until every submitted task has completed.
    pub fn join_all(&self) {
        let shared = &*self.shared;
        let mut state = shared.lock();
        while state.tasks_remaining != 0 {
            shared.work_available.notify_one();
            state = shared.wait_timeout(&shared.all_drained, state, JOIN_NUDGE_INTERVAL);
        }
    }

    /// Drains outstanding work, stops every worker and frees the queue.
    ///
    /// Calling it again is a no-op. The pool rejects submissions afterwards.
    pub fn shutdown(&self) {
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        if workers.is_empty() {
            return;
        }

        self.join_all();

        self.shared.lock().is_working = false;
        self.shared.queue_has_room.notify_all();

        while !workers.is_empty() {
            self.shared.work_available.notify_all();
            match self.exits.recv_timeout(SHUTDOWN_POLL_INTERVAL) {
                Ok(id) => {
                    if let Some(pos) = workers.iter().position(|(worker, _)| *worker == id) {
                        let (_, handle) = workers.swap_remove(pos);
                        if handle.join().is_err() {
                            warn!("Worker {id} exited abnormally");
                        }
                        debug!("Worker {id} joined, {} remaining", workers.len());
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Every spawned worker reports through its exit guard, so this
                // only fires for a worker that died without running it.
                Err(RecvTimeoutError::Disconnected) => {
                    warn!(
                        "Lost track of worker exits, detaching {} remaining workers",
                        workers.len()
                    );
                    workers.clear();
                }
            }
        }

        let mut state = self.shared.lock();
        let discarded = state.queue.len();
        if discarded > 0 {
            warn!("Discarding {discarded} tasks queued during shutdown");
            state.tasks_remaining -= discarded;
        }
        debug!(
            "Releasing {} cached parameter blocks (free list capacity {})",
            state.buffers.free_len(),
            state.buffers.capacity()
        );
        state.queue.release();
        state.buffers.destroy();
        info!("Worker pool shut down");
    }

    /// Number of tasks submitted but not yet completed.
    pub fn tasks_remaining(&self) -> usize {
        self.shared.lock().tasks_remaining
    }

    /// Number of tasks waiting in the queue.
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// The queue bound producers block on.
    pub fn max_queue_size(&self) -> usize {
        self.shared.lock().max_queue_size
    }

    /// Whether the pool still accepts work.
    pub fn is_working(&self) -> bool {
        self.shared.lock().is_working
    }

    /// Number of live worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of parameter blocks cached for reuse.
    pub fn free_buffers(&self) -> usize {
        self.shared.lock().buffers.free_len()
    }
}

impl<P> Drop for WorkerPool<P>
where
    P: Default + Send + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
