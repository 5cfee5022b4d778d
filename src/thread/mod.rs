use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::{Result, ThreadError};

mod backend;
mod delegate;

pub use self::backend::{StdBackend, StdHandle, ThreadBackend, ThreadEntry, ThreadPriority};
pub use self::delegate::{DelegateThread, Method};

/// Exit code when `on_start` refuses to start.
pub const EXIT_START_FAILED: i32 = -1;

/// Exit code when the loop ends because termination was requested.
pub const EXIT_TERMINATED: i32 = -2;

/// How long a stopped thread sleeps between checks for a new request.
const IDLE_INTERVAL: Duration = Duration::from_secs(1);

/// Poll interval while waiting for the thread to reach a state.
const WAIT_INTERVAL: Duration = Duration::from_millis(100);

/// How long `terminate` gives the thread to exit on its own before trying
/// to kill it.
const TERMINATE_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle state of a [`ManagedThread`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Alive but idle; the run hook is not called.
    Stopped,
    /// The run hook is called repeatedly.
    Running,
    /// The thread is exiting or gone. No further transitions happen.
    Terminating,
}

/// Hooks driven by a [`ManagedThread`] on its own thread.
pub trait Runnable: Send + 'static {
    /// Called once before the loop. Returning false ends the thread with
    /// [`EXIT_START_FAILED`].
    fn on_start(&mut self) -> bool {
        true
    }

    /// Called once per iteration while running. Zero continues the loop,
    /// anything else ends the thread with that exit code.
    fn on_run(&mut self) -> i32;

    /// Called with the exit code after the loop ends.
    fn on_exit(&mut self, _code: i32) {}
}

impl<F> Runnable for F
where
    F: FnMut() -> i32 + Send + 'static,
{
    fn on_run(&mut self) -> i32 {
        self()
    }
}

struct States {
    current: ThreadState,
    requested: ThreadState,
    exit_code: Option<i32>,
}

/// State shared between the controlling side and the thread loop.
///
/// Only the loop writes `current`; callers only write `requested`.
struct Control {
    states: Mutex<States>,
    changed: Condvar,
}

impl Control {
    fn new() -> Self {
        Self {
            states: Mutex::new(States {
                current: ThreadState::Stopped,
                requested: ThreadState::Stopped,
                exit_code: None,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, States> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, States>,
        timeout: Duration,
    ) -> MutexGuard<'a, States> {
        match self.changed.wait_timeout(guard, timeout) {
            Ok((guard, _)) => guard,
            Err(poisoned) => poisoned.into_inner().0,
        }
    }

    fn requested(&self) -> ThreadState {
        self.lock().requested
    }

    fn commit(&self, state: ThreadState) {
        self.lock().current = state;
        self.changed.notify_all();
    }

    fn finish(&self, code: i32) {
        let mut states = self.lock();
        states.exit_code = Some(code);
        states.current = ThreadState::Terminating;
        drop(states);
        self.changed.notify_all();
    }

    /// Sleeps while the request is still `Stopped`, at most `timeout`.
    fn idle(&self, timeout: Duration) {
        let states = self.lock();
        if states.requested == ThreadState::Stopped {
            drop(self.wait_timeout(states, timeout));
        }
    }
}

/// Body of every managed thread.
fn thread_main<R: Runnable>(mut runnable: R, control: Arc<Control>) -> i32 {
    if !runnable.on_start() {
        control.finish(EXIT_START_FAILED);
        return EXIT_START_FAILED;
    }

    let mut result = 0;
    let mut seen = ThreadState::Stopped;
    while result == 0 {
        let requested = control.requested();
        if requested != seen {
            seen = requested;
            control.commit(requested);
            continue;
        }

        match requested {
            ThreadState::Stopped => control.idle(IDLE_INTERVAL),
            ThreadState::Terminating => result = EXIT_TERMINATED,
            ThreadState::Running => result = runnable.on_run(),
        }
    }

    runnable.on_exit(result);
    control.finish(result);
    result
}

/// A native thread driven through a Stopped / Running / Terminating state
/// machine.
///
/// The thread starts `Stopped`. [`run`](Self::run) and [`stop`](Self::stop)
/// only record a request; the thread picks it up on its next iteration.
/// `Terminating` is absorbing. Dropping the value terminates and joins the
/// thread.
pub struct ManagedThread<B: ThreadBackend = StdBackend> {
    backend: B,
    handle: Option<B::Handle>,
    id: u64,
    control: Arc<Control>,
}

impl ManagedThread<StdBackend> {
    /// Starts a stopped thread around `runnable` with normal priority.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::Spawn`] if the native thread cannot be
    /// created.
    pub fn new<R: Runnable>(runnable: R) -> Result<Self> {
        Self::with_backend(StdBackend, runnable, ThreadPriority::Normal, None)
    }

    /// Starts a stopped thread with the given priority hint.
    pub fn with_priority<R: Runnable>(runnable: R, priority: ThreadPriority) -> Result<Self> {
        Self::with_backend(StdBackend, runnable, priority, None)
    }

    /// Runs `callback` once on its own thread without tracking it.
    pub fn spawn_detached<F>(callback: F, priority: ThreadPriority) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        Self::spawn_detached_with(&StdBackend, callback, priority)
    }
}

impl<B: ThreadBackend> ManagedThread<B> {
    /// Starts a stopped thread on `backend`.
    pub fn with_backend<R: Runnable>(
        backend: B,
        runnable: R,
        priority: ThreadPriority,
        name: Option<&str>,
    ) -> Result<Self> {
        let control = Arc::new(Control::new());
        let thread_control = Arc::clone(&control);
        let entry: ThreadEntry = Box::new(move || thread_main(runnable, thread_control));

        let (handle, id) = backend
            .create(entry, priority, name)
            .map_err(ThreadError::Spawn)?;

        Ok(Self {
            backend,
            handle: Some(handle),
            id,
            control,
        })
    }

    /// Runs `callback` once on a new thread of `backend` and immediately
    /// releases the handle.
    pub fn spawn_detached_with<F>(backend: &B, callback: F, priority: ThreadPriority) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        let entry: ThreadEntry = Box::new(move || {
            callback();
            0
        });
        let (handle, _) = backend
            .create(entry, priority, None)
            .map_err(ThreadError::Spawn)?;
        backend.release_handle(handle);
        Ok(())
    }

    /// Backend-assigned thread id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The state the thread loop last committed.
    ///
    /// A thread that died without committing is reported as `Terminating`.
    pub fn state(&self) -> ThreadState {
        let mut states = self.control.lock();
        if states.current != ThreadState::Terminating && !self.is_alive() {
            states.current = ThreadState::Terminating;
            states.requested = ThreadState::Terminating;
        }
        states.current
    }

    /// The most recently requested state.
    pub fn requested_state(&self) -> ThreadState {
        self.control.requested()
    }

    /// Exit code of the loop, once it has finished.
    pub fn exit_code(&self) -> Option<i32> {
        self.control.lock().exit_code
    }

    /// Whether the native thread is still executing.
    pub fn is_alive(&self) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| self.backend.is_alive(handle))
    }

    /// Best-effort debugger name for the thread. Returns false once the
    /// thread has been joined or if the backend cannot rename it.
    pub fn set_name(&self, name: &str) -> bool {
        self.handle
            .as_ref()
            .is_some_and(|handle| self.backend.set_debug_name(handle, self.id, name))
    }

    /// Requests `Running`. With `wait`, blocks until the thread is running
    /// and returns false if it terminated instead.
    pub fn run(&self, wait: bool) -> bool {
        self.request(ThreadState::Running);
        if wait {
            return self.wait_for(ThreadState::Running);
        }
        true
    }

    /// Requests `Stopped`. With `wait`, blocks until the thread has stopped
    /// and returns false if it terminated instead.
    pub fn stop(&self, wait: bool) -> bool {
        self.request(ThreadState::Stopped);
        if wait {
            return self.wait_for(ThreadState::Stopped);
        }
        true
    }

    /// Requests `Terminating`.
    ///
    /// A thread that has not finished its loop within a grace period is
    /// killed through the backend if possible. With `wait`, blocks until the
    /// native thread has exited.
    pub fn terminate(&self, wait: bool) {
        self.request(ThreadState::Terminating);

        if !self.wait_responsive(TERMINATE_GRACE) && self.is_alive() {
            if let Some(handle) = self.handle.as_ref() {
                if self.backend.force_kill(handle) {
                    warn!("Thread {} killed after ignoring termination", self.id);
                }
            }
        }

        if wait {
            self.join();
        }
    }

    /// Requests `Terminating` and kills the thread right away if it is
    /// still alive. Unsafe for the killed thread's resources; prefer
    /// [`terminate`](Self::terminate).
    pub fn terminate_now(&self) -> bool {
        self.request(ThreadState::Terminating);
        match self.handle.as_ref() {
            Some(handle) if self.backend.is_alive(handle) => self.backend.force_kill(handle),
            _ => false,
        }
    }

    /// Blocks until the native thread exits. Returns the exit code if this
    /// call reaped the thread.
    pub fn join(&self) -> Option<i32> {
        let code = self
            .handle
            .as_ref()
            .and_then(|handle| self.backend.join(handle));
        if code.is_some() {
            debug!("Thread {} joined with exit code {code:?}", self.id);
        }
        code
    }

    /// Records a new request unless the thread is already terminating.
    fn request(&self, state: ThreadState) {
        let alive = self.is_alive();
        let mut states = self.control.lock();
        if !alive {
            states.requested = ThreadState::Terminating;
            states.current = ThreadState::Terminating;
            return;
        }
        if states.current == ThreadState::Terminating
            || states.requested == ThreadState::Terminating
        {
            return;
        }
        if states.requested != state {
            states.requested = state;
            drop(states);
            self.control.changed.notify_all();
        }
    }

    fn wait_for(&self, target: ThreadState) -> bool {
        if !self.is_alive() {
            return false;
        }

        let mut states = self.control.lock();
        loop {
            if states.current == target {
                return true;
            }
            if states.current == ThreadState::Terminating || !self.is_alive() {
                return false;
            }
            states = self.control.wait_timeout(states, WAIT_INTERVAL);
        }
    }

    /// Waits until the loop has finished or the thread is gone.
    fn wait_responsive(&self, grace: Duration) -> bool {
        let deadline = Instant::now() + grace;
        let mut states = self.control.lock();
        loop {
            if states.exit_code.is_some() || !self.is_alive() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            states = self
                .control
                .wait_timeout(states, (deadline - now).min(WAIT_INTERVAL));
        }
    }
}

impl<B: ThreadBackend> Drop for ManagedThread<B> {
    fn drop(&mut self) {
        self.terminate(true);
        if let Some(handle) = self.handle.take() {
            self.backend.release_handle(handle);
        }
    }
}
