use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;
use log::{debug, error};

use super::buffer_pool::BufferPool;
use super::ring::RingQueue;
use super::Task;

/// Everything the pool lock protects.
pub(crate) struct PoolState<P> {
    pub(crate) is_working: bool,
    pub(crate) max_queue_size: usize,
    pub(crate) tasks_remaining: usize,
    pub(crate) queue: RingQueue<Option<Task<P>>>,
    pub(crate) buffers: BufferPool<P>,
}

/// State shared between the pool handle and its workers: one lock and the
/// three conditions signalled under it.
pub(crate) struct Shared<P> {
    state: Mutex<PoolState<P>>,
    pub(crate) work_available: Condvar,
    pub(crate) queue_has_room: Condvar,
    pub(crate) all_drained: Condvar,
}

impl<P: Default> Shared<P> {
    pub(crate) fn new(max_queue_size: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                is_working: true,
                max_queue_size,
                tasks_remaining: 0,
                queue: RingQueue::new(),
                buffers: BufferPool::new(),
            }),
            work_available: Condvar::new(),
            queue_has_room: Condvar::new(),
            all_drained: Condvar::new(),
        }
    }

    // A panic is never raised while the lock is held, but recover anyway so
    // one bad thread cannot wedge the whole pool.
    pub(crate) fn lock(&self) -> MutexGuard<'_, PoolState<P>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, PoolState<P>>,
    ) -> MutexGuard<'a, PoolState<P>> {
        condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_timeout<'a>(
        &self,
        condvar: &Condvar,
        guard: MutexGuard<'a, PoolState<P>>,
        timeout: Duration,
    ) -> MutexGuard<'a, PoolState<P>> {
        match condvar.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }
}

/// Reports the worker id on the exit channel when the worker thread ends,
/// including by unwinding.
struct ExitNotice {
    id: usize,
    tx: Sender<usize>,
}

impl Drop for ExitNotice {
    fn drop(&mut self) {
        let _ = self.tx.send(self.id);
    }
}

/// Spawns worker `id` on a named thread.
pub(crate) fn spawn_worker<P>(
    id: usize,
    shared: Arc<Shared<P>>,
    exit_tx: Sender<usize>,
) -> io::Result<JoinHandle<()>>
where
    P: Default + Send + 'static,
{
    thread::Builder::new()
        .name(format!("pool-worker-{id}"))
        .spawn(move || {
            let _notice = ExitNotice { id, tx: exit_tx };
            run(id, &shared);
        })
}

/// Worker main loop.
///
/// Only one worker is woken per submission. A worker that finishes a task
/// goes straight back to the queue and only sleeps once it is empty, so a
/// backlog drains without needing one wakeup per task.
fn run<P: Default>(id: usize, shared: &Shared<P>) {
    debug!("Worker {id} started");
    loop {
        let task = {
            let mut state = shared.lock();
            while state.queue.is_empty() && state.is_working {
                state = shared.wait(&shared.work_available, state);
            }
            if !state.is_working {
                debug!("Worker {id}: pool stopped, shutting down");
                return;
            }

            let task = state.queue.pop_front();
            if state.queue.len() + 1 == state.max_queue_size {
                shared.queue_has_room.notify_one();
            }
            task
        };

        let Some(mut task) = task else {
            continue;
        };

        if let Some(action) = task.action {
            let params = &mut *task.params;
            if panic::catch_unwind(AssertUnwindSafe(|| action(params))).is_err() {
                error!("Worker {id} task panicked, continuing");
            }
        }

        let mut state = shared.lock();
        state.tasks_remaining -= 1;
        if state.tasks_remaining == 0 {
            shared.all_drained.notify_all();
        }
        state.buffers.release(task.params);
        if !state.is_working {
            debug!("Worker {id}: pool stopped after task, shutting down");
            return;
        }
    }
}
