use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use log::{debug, warn};

/// Scheduling priority hint given to the backend when a thread is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ThreadPriority {
    /// Background work.
    Low,
    /// Regular work.
    #[default]
    Normal,
    /// Latency sensitive work.
    High,
}

/// Entry point run on a newly created native thread. The return value is
/// the thread's exit code.
pub type ThreadEntry = Box<dyn FnOnce() -> i32 + Send + 'static>;

/// A platform thread implementation.
///
/// [`ManagedThread`](crate::ManagedThread) drives its native thread only
/// through this trait, so alternative backends can be swapped in.
pub trait ThreadBackend: Send + Sync + 'static {
    /// Native handle for one created thread.
    type Handle: Send + Sync + 'static;

    /// Starts `entry` on a new native thread, returning its handle and a
    /// numeric id.
    fn create(
        &self,
        entry: ThreadEntry,
        priority: ThreadPriority,
        name: Option<&str>,
    ) -> io::Result<(Self::Handle, u64)>;

    /// Whether the native thread is still executing.
    fn is_alive(&self, handle: &Self::Handle) -> bool;

    /// Blocks until the thread exits. Returns its exit code if this call
    /// was the one to reap it and the thread ended normally.
    fn join(&self, handle: &Self::Handle) -> Option<i32>;

    /// Kills the thread without its cooperation. Returns false if the
    /// backend cannot do that.
    fn force_kill(&self, handle: &Self::Handle) -> bool;

    /// Gives up the handle without waiting for the thread.
    fn release_handle(&self, handle: Self::Handle);

    /// Attaches a debugger-visible name to the thread, if supported.
    fn set_debug_name(&self, handle: &Self::Handle, id: u64, name: &str) -> bool;
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Backend built on `std::thread`.
///
/// Std threads cannot be killed from outside, so `force_kill` always reports
/// false. On Linux the priority becomes the thread's nice value and names
/// can be changed while the thread is unjoined; elsewhere both are only
/// logged.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdBackend;

/// Handle to a thread created by [`StdBackend`].
pub struct StdHandle {
    join: Mutex<Option<JoinHandle<i32>>>,
    exited: Arc<AtomicBool>,
}

/// Marks the thread as exited when dropped, including during unwinding.
struct ExitFlag(Arc<AtomicBool>);

impl Drop for ExitFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl ThreadBackend for StdBackend {
    type Handle = StdHandle;

    fn create(
        &self,
        entry: ThreadEntry,
        priority: ThreadPriority,
        name: Option<&str>,
    ) -> io::Result<(StdHandle, u64)> {
        let id = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        let exited = Arc::new(AtomicBool::new(false));
        let flag = ExitFlag(Arc::clone(&exited));

        let mut builder = thread::Builder::new();
        if let Some(name) = name {
            builder = builder.name(name.to_owned());
        }
        let join = builder.spawn(move || {
            let _flag = flag;
            if let Err(e) = os::apply_priority(priority) {
                warn!("Thread {id} keeps its inherited priority, {priority:?} failed: {e}");
            }
            entry()
        })?;

        debug!("Created thread {id} with {priority:?} priority");
        Ok((
            StdHandle {
                join: Mutex::new(Some(join)),
                exited,
            },
            id,
        ))
    }

    fn is_alive(&self, handle: &StdHandle) -> bool {
        !handle.exited.load(Ordering::Acquire)
    }

    fn join(&self, handle: &StdHandle) -> Option<i32> {
        // The lock is held across the join so a second joiner waits for the
        // first instead of returning while the thread still runs.
        let mut join = handle.join.lock().unwrap_or_else(PoisonError::into_inner);
        match join.take()?.join() {
            Ok(code) => Some(code),
            Err(_) => {
                warn!("Joined thread ended by panic");
                None
            }
        }
    }

    fn force_kill(&self, _handle: &StdHandle) -> bool {
        warn!("std threads cannot be killed, waiting for cooperative exit");
        false
    }

    fn release_handle(&self, handle: StdHandle) {
        drop(handle);
    }

    fn set_debug_name(&self, handle: &StdHandle, id: u64, name: &str) -> bool {
        let join = handle.join.lock().unwrap_or_else(PoisonError::into_inner);
        let renamed = join
            .as_ref()
            .is_some_and(|join| os::set_thread_name(join, name));
        if !renamed {
            debug!("Thread {id} could not be renamed to {name:?}");
        }
        renamed
    }
}

#[cfg(target_os = "linux")]
mod os {
    use std::ffi::CString;
    use std::io;
    use std::os::unix::thread::JoinHandleExt;
    use std::thread::JoinHandle;

    use super::ThreadPriority;

    /// Kernel limit for thread names, without the terminating nul.
    const NAME_LIMIT: usize = 15;

    /// Shifts the calling thread's nice value: +10 for `Low`, -5 for `High`.
    pub(super) fn apply_priority(priority: ThreadPriority) -> io::Result<()> {
        let delta = match priority {
            ThreadPriority::Low => 10,
            ThreadPriority::Normal => return Ok(()),
            ThreadPriority::High => -5,
        };
        // SAFETY: gettid, getpriority and setpriority take no pointers and
        // only address the calling thread.
        let rc = unsafe {
            let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
            let nice = libc::getpriority(libc::PRIO_PROCESS, tid);
            libc::setpriority(libc::PRIO_PROCESS, tid, (nice + delta).clamp(-20, 19))
        };
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    pub(super) fn set_thread_name<T>(join: &JoinHandle<T>, name: &str) -> bool {
        let mut end = name.len().min(NAME_LIMIT);
        while !name.is_char_boundary(end) {
            end -= 1;
        }
        let Ok(name) = CString::new(&name[..end]) else {
            return false;
        };
        // SAFETY: the handle is not joined yet, so its pthread_t is valid.
        unsafe { libc::pthread_setname_np(join.as_pthread_t(), name.as_ptr()) == 0 }
    }
}

#[cfg(not(target_os = "linux"))]
mod os {
    use std::io;
    use std::thread::JoinHandle;

    use log::debug;

    use super::ThreadPriority;

    pub(super) fn apply_priority(priority: ThreadPriority) -> io::Result<()> {
        debug!("{priority:?} priority is not mapped on this platform");
        Ok(())
    }

    pub(super) fn set_thread_name<T>(_join: &JoinHandle<T>, _name: &str) -> bool {
        false
    }
}
