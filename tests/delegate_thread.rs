use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use threadkit::{DelegateThread, Method, ThreadError, ThreadState};

#[derive(Default)]
struct Host {
    ticks: AtomicUsize,
    queue: Mutex<Vec<usize>>,
    consumed: AtomicUsize,
}

impl Host {
    fn tick_three_times(&self) -> i32 {
        if self.ticks.fetch_add(1, Ordering::SeqCst) + 1 >= 3 {
            5
        } else {
            0
        }
    }

    fn idle(&self) -> i32 {
        thread::sleep(Duration::from_millis(1));
        0
    }

    fn produce(&self) -> i32 {
        self.queue.lock().unwrap().extend(0..10);
        thread::sleep(Duration::from_millis(1));
        0
    }

    fn consume(&self) -> i32 {
        let drained = self.queue.lock().unwrap().drain(..).count();
        self.consumed.fetch_add(drained, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        0
    }
}

#[test]
fn bound_method_drives_the_loop() {
    let host = Arc::new(Host::default());
    let thread = DelegateThread::new().unwrap();
    thread.bind(Arc::clone(&host), Host::tick_three_times).unwrap();
    assert!(thread.is_bound());

    thread.run(false);

    assert_eq!(thread.join(), Some(5));
    assert_eq!(host.ticks.load(Ordering::SeqCst), 3);
}

#[test]
fn rebinding_requires_stopped_thread() {
    let host = Arc::new(Host::default());
    let thread = DelegateThread::new().unwrap();
    thread.bind(Arc::clone(&host), Host::idle).unwrap();
    assert!(thread.run(true));

    let err = thread.bind(Arc::clone(&host), Host::produce).unwrap_err();
    assert!(matches!(err, ThreadError::NotStopped));
    assert!(matches!(thread.unbind(), Err(ThreadError::NotStopped)));

    assert!(thread.stop(true));
    thread.bind(Arc::clone(&host), Host::produce).unwrap();
    assert_eq!(thread.state(), ThreadState::Stopped);
}

#[test]
fn binding_is_rejected_once_run_is_requested() {
    let host = Arc::new(Host::default());
    let thread = DelegateThread::new().unwrap();
    thread.bind(Arc::clone(&host), Host::idle).unwrap();

    // The loop may not have left Stopped yet, but a run is pending.
    thread.run(false);
    let err = thread.bind(Arc::clone(&host), Host::produce).unwrap_err();
    assert!(matches!(err, ThreadError::NotStopped));
    assert!(matches!(thread.unbind(), Err(ThreadError::NotStopped)));

    assert!(thread.stop(true));
    thread.bind(Arc::clone(&host), Host::produce).unwrap();
}

#[test]
fn half_binding_is_rejected() {
    let host = Arc::new(Host::default());
    let thread: DelegateThread<Host> = DelegateThread::new().unwrap();

    let err = thread.bind_parts(Some(Arc::clone(&host)), None).unwrap_err();
    assert!(matches!(err, ThreadError::IncompleteBinding));

    let method: Method<Host> = Host::idle;
    let err = thread.bind_parts(None, Some(method)).unwrap_err();
    assert!(matches!(err, ThreadError::IncompleteBinding));

    assert!(!thread.is_bound());
}

#[test]
fn unbound_thread_exits_when_run() {
    let thread: DelegateThread<Host> = DelegateThread::new().unwrap();
    thread.run(false);
    assert_eq!(thread.join(), Some(-1));
}

#[test]
fn unbind_clears_binding() {
    let host = Arc::new(Host::default());
    let thread = DelegateThread::new().unwrap();
    thread.bind(host, Host::idle).unwrap();
    thread.unbind().unwrap();
    assert!(!thread.is_bound());
}

#[test]
fn one_host_drives_two_threads() {
    let host = Arc::new(Host::default());
    let producer = DelegateThread::new().unwrap();
    let consumer = DelegateThread::new().unwrap();
    producer.bind(Arc::clone(&host), Host::produce).unwrap();
    consumer.bind(Arc::clone(&host), Host::consume).unwrap();

    assert!(producer.run(true));
    assert!(consumer.run(true));
    thread::sleep(Duration::from_millis(50));
    assert!(producer.stop(true));
    assert!(consumer.stop(true));

    host.consume();
    assert!(host.consumed.load(Ordering::SeqCst) > 0);
    assert_eq!(host.consumed.load(Ordering::SeqCst) % 10, 0);

    producer.terminate(true);
    consumer.terminate(true);
    assert_eq!(producer.state(), ThreadState::Terminating);
    assert_eq!(consumer.state(), ThreadState::Terminating);
}
