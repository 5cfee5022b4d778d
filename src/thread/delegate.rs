use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{ManagedThread, Runnable, StdBackend, ThreadBackend, ThreadPriority, ThreadState};
use crate::{Result, ThreadError};

/// Exit code of the run hook when nothing is bound.
const EXIT_UNBOUND: i32 = -1;

/// A method on the bound object, used as the run hook. Zero keeps the
/// thread running.
pub type Method<T> = fn(&T) -> i32;

struct Binding<T> {
    object: Arc<T>,
    method: Method<T>,
}

type Slot<T> = Arc<Mutex<Option<Binding<T>>>>;

fn lock_slot<T>(slot: &Mutex<Option<Binding<T>>>) -> MutexGuard<'_, Option<Binding<T>>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

struct DelegateHook<T> {
    slot: Slot<T>,
}

impl<T: Send + Sync + 'static> Runnable for DelegateHook<T> {
    fn on_run(&mut self) -> i32 {
        let bound = lock_slot(&self.slot)
            .as_ref()
            .map(|binding| (Arc::clone(&binding.object), binding.method));
        match bound {
            Some((object, method)) => method(&object),
            None => EXIT_UNBOUND,
        }
    }
}

/// A [`ManagedThread`] whose run hook calls a method on a shared object.
///
/// One host type can drive several independently controlled threads, one
/// per method, without a `Runnable` type for each role. The binding can
/// only change while the thread is stopped.
pub struct DelegateThread<T, B = StdBackend>
where
    T: Send + Sync + 'static,
    B: ThreadBackend,
{
    thread: ManagedThread<B>,
    slot: Slot<T>,
}

impl<T: Send + Sync + 'static> DelegateThread<T> {
    /// Starts an unbound, stopped thread.
    pub fn new() -> Result<Self> {
        Self::with_backend(StdBackend, ThreadPriority::Normal, None)
    }

    /// Starts an unbound, stopped thread with the given priority hint.
    pub fn with_priority(priority: ThreadPriority) -> Result<Self> {
        Self::with_backend(StdBackend, priority, None)
    }
}

impl<T, B> DelegateThread<T, B>
where
    T: Send + Sync + 'static,
    B: ThreadBackend,
{
    /// Starts an unbound, stopped thread on `backend`.
    pub fn with_backend(backend: B, priority: ThreadPriority, name: Option<&str>) -> Result<Self> {
        let slot: Slot<T> = Arc::new(Mutex::new(None));
        let hook = DelegateHook {
            slot: Arc::clone(&slot),
        };
        let thread = ManagedThread::with_backend(backend, hook, priority, name)?;
        Ok(Self { thread, slot })
    }

    /// Binds `method` on `object` as the run hook.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::NotStopped`] unless the thread is stopped and
    /// no other state has been requested.
    pub fn bind(&self, object: Arc<T>, method: Method<T>) -> Result<()> {
        self.bind_parts(Some(object), Some(method))
    }

    /// Removes the binding. The run hook then ends the thread.
    pub fn unbind(&self) -> Result<()> {
        self.bind_parts(None, None)
    }

    /// Sets or clears the binding from its two halves.
    ///
    /// # Errors
    ///
    /// Returns [`ThreadError::IncompleteBinding`] when only one half is
    /// given and [`ThreadError::NotStopped`] unless the thread is stopped
    /// and staying stopped.
    pub fn bind_parts(&self, object: Option<Arc<T>>, method: Option<Method<T>>) -> Result<()> {
        let mut slot = lock_slot(&self.slot);
        if self.thread.state() != ThreadState::Stopped
            || self.thread.requested_state() != ThreadState::Stopped
        {
            return Err(ThreadError::NotStopped);
        }

        *slot = match (object, method) {
            (Some(object), Some(method)) => Some(Binding { object, method }),
            (None, None) => None,
            _ => return Err(ThreadError::IncompleteBinding),
        };
        Ok(())
    }

    /// Whether a method is currently bound.
    pub fn is_bound(&self) -> bool {
        lock_slot(&self.slot).is_some()
    }
}

impl<T, B> Deref for DelegateThread<T, B>
where
    T: Send + Sync + 'static,
    B: ThreadBackend,
{
    type Target = ManagedThread<B>;

    fn deref(&self) -> &ManagedThread<B> {
        &self.thread
    }
}
