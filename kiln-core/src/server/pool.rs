//! Fixed-size worker pool with a bounded FIFO queue
//!
//! Admission is decided by [`ThreadPool::try_execute`]: a task is accepted
//! while it can be claimed by an idle worker or fits in the queue, so with
//! `N` workers busy and `Q` tasks queued every further submission is
//! rejected. The caller keeps ownership of a rejected task and decides what
//! to do with it.

use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crate::events::{Event, SharedSink};

/// Result of a non-blocking submission
#[derive(Debug, PartialEq, Eq)]
pub enum Submission<T> {
    /// Claimed by an idle worker or queued
    Accepted,
    /// Pool saturated or shut down; the task is handed back
    Rejected(T),
}

impl<T> Submission<T> {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Submission::Accepted)
    }
}

type Handler<T> = dyn Fn(T, &str) + Send + Sync;

struct State<T> {
    queue: VecDeque<T>,
    /// Workers not currently running a task
    idle: usize,
    shutdown: bool,
}

struct Shared<T> {
    state: Mutex<State<T>>,
    /// Signalled when a task is queued or shutdown begins
    available: Condvar,
    /// Signalled when a worker frees up room for another task
    space: Condvar,
    capacity: usize,
    handler: Box<Handler<T>>,
    sink: SharedSink,
}

impl<T> Shared<T> {
    // The lock is never held while the handler runs, so a poisoned state is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn has_room(&self, state: &State<T>) -> bool {
        state.queue.len() < self.capacity + state.idle
    }
}

/// A fixed set of named worker threads draining a bounded queue
///
/// Each task runs to completion on one worker before that worker takes the
/// next; a panic inside the handler is caught, recorded, and the worker
/// carries on.
pub struct ThreadPool<T: Send + 'static> {
    shared: Arc<Shared<T>>,
    workers: Vec<JoinHandle<()>>,
}

impl<T: Send + 'static> ThreadPool<T> {
    /// Spawn `size` workers named `Thread-1` .. `Thread-N`
    pub fn new<F>(size: usize, queue_capacity: usize, sink: SharedSink, handler: F) -> io::Result<Self>
    where
        F: Fn(T, &str) + Send + Sync + 'static,
    {
        if size == 0 {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "pool size must be at least 1"));
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(State { queue: VecDeque::new(), idle: size, shutdown: false }),
            available: Condvar::new(),
            space: Condvar::new(),
            capacity: queue_capacity,
            handler: Box::new(handler),
            sink,
        });

        let mut pool = Self { shared, workers: Vec::with_capacity(size) };
        for id in 1..=size {
            let shared = Arc::clone(&pool.shared);
            let name = format!("Thread-{}", id);
            // On failure `pool` is dropped, which stops the workers already spawned
            let handle =
                thread::Builder::new().name(name.clone()).spawn(move || run_worker(shared, name))?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Maximum number of tasks waiting while every worker is busy
    pub fn queue_capacity(&self) -> usize {
        self.shared.capacity
    }

    /// Tasks submitted but not yet claimed by a worker
    pub fn queued(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Workers not currently running a task
    pub fn idle(&self) -> usize {
        self.shared.lock().idle
    }

    /// Submit without blocking
    pub fn try_execute(&self, task: T) -> Submission<T> {
        let mut state = self.shared.lock();
        if state.shutdown || !self.shared.has_room(&state) {
            return Submission::Rejected(task);
        }

        state.queue.push_back(task);
        let waiting = state.queue.len().saturating_sub(state.idle);
        drop(state);

        self.shared.available.notify_one();
        if waiting > 0 {
            self.shared.sink.record(&Event::ConnectionQueued { queue_len: waiting });
        }
        Submission::Accepted
    }

    /// Submit, blocking until there is room. Returns the task if the pool shuts down.
    pub fn execute(&self, task: T) -> Result<(), T> {
        let mut state = self.shared.lock();
        while !state.shutdown && !self.shared.has_room(&state) {
            state = self.shared.space.wait(state).unwrap_or_else(PoisonError::into_inner);
        }
        if state.shutdown {
            return Err(task);
        }

        state.queue.push_back(task);
        drop(state);
        self.shared.available.notify_one();
        Ok(())
    }

    /// Stop admitting tasks, let the queue drain, then join every worker
    pub fn shutdown(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.available.notify_all();
        self.shared.space.notify_all();

        for handle in self.workers.drain(..) {
            // Handler panics are caught inside the worker, so join only fails
            // if the pool itself is broken
            if handle.join().is_err() {
                log::error!(target: "kiln::pool", "Worker thread terminated abnormally");
            }
        }
    }
}

impl<T: Send + 'static> Drop for ThreadPool<T> {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.shutdown();
        }
    }
}

fn run_worker<T>(shared: Arc<Shared<T>>, name: String) {
    shared.sink.record(&Event::WorkerStarted { worker: name.clone() });

    loop {
        let task = {
            let mut state = shared.lock();
            loop {
                if let Some(task) = state.queue.pop_front() {
                    state.idle -= 1;
                    break Some(task);
                }
                if state.shutdown {
                    break None;
                }
                state = shared.available.wait(state).unwrap_or_else(PoisonError::into_inner);
            }
        };

        let Some(task) = task else {
            break;
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (shared.handler)(task, &name)));
        if let Err(payload) = outcome {
            shared.sink.record(&Event::WorkerPanicked {
                worker: name.clone(),
                message: panic_message(payload.as_ref()),
            });
        }

        shared.lock().idle += 1;
        shared.space.notify_one();
    }

    shared.sink.record(&Event::WorkerStopped { worker: name });
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{MemorySink, NullSink};
    use std::sync::mpsc;
    use std::time::Duration;

    /// Handler that parks every task until released, then reports it
    fn gated() -> (
        mpsc::Sender<()>,
        mpsc::Receiver<(usize, String)>,
        impl Fn(usize, &str) + Send + Sync + 'static,
    ) {
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel();
        let release_rx = Mutex::new(release_rx);
        let done_tx = Mutex::new(done_tx);

        let handler = move |task: usize, worker: &str| {
            release_rx.lock().unwrap().recv().unwrap();
            done_tx.lock().unwrap().send((task, worker.to_string())).unwrap();
        };
        (release_tx, done_rx, handler)
    }

    #[test]
    fn test_admits_exactly_workers_plus_queue() {
        let (release, done, handler) = gated();
        let mut pool = ThreadPool::new(2, 3, Arc::new(NullSink), handler).unwrap();

        let outcomes: Vec<Submission<usize>> = (0..8).map(|i| pool.try_execute(i)).collect();
        let accepted = outcomes.iter().filter(|s| s.is_accepted()).count();
        assert_eq!(accepted, 5);
        assert_eq!(outcomes[5], Submission::Rejected(5));
        assert_eq!(outcomes[7], Submission::Rejected(7));

        for _ in 0..5 {
            release.send(()).unwrap();
        }
        let mut finished: Vec<usize> =
            (0..5).map(|_| done.recv_timeout(Duration::from_secs(5)).unwrap().0).collect();
        finished.sort();
        assert_eq!(finished, vec![0, 1, 2, 3, 4]);

        pool.shutdown();
    }

    #[test]
    fn test_room_returns_after_a_task_finishes() {
        let (release, done, handler) = gated();
        let mut pool = ThreadPool::new(1, 1, Arc::new(NullSink), handler).unwrap();

        assert!(pool.try_execute(0).is_accepted());
        assert!(pool.try_execute(1).is_accepted());
        assert!(!pool.try_execute(2).is_accepted());

        release.send(()).unwrap();
        done.recv_timeout(Duration::from_secs(5)).unwrap();
        // Task 1 is now running and the queue is empty again
        let mut admitted = false;
        for _ in 0..100 {
            if pool.try_execute(3).is_accepted() {
                admitted = true;
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(admitted);

        release.send(()).unwrap();
        release.send(()).unwrap();
        pool.shutdown();
    }

    #[test]
    fn test_worker_names() {
        // All three tasks must be running at once, so each lands on its own worker
        let barrier = std::sync::Barrier::new(3);
        let (done_tx, done) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        let mut pool = ThreadPool::new(3, 0, Arc::new(NullSink), move |_: usize, worker: &str| {
            barrier.wait();
            done_tx.lock().unwrap().send(worker.to_string()).unwrap();
        })
        .unwrap();

        for i in 0..3 {
            assert!(pool.try_execute(i).is_accepted());
        }
        let mut names: Vec<String> =
            (0..3).map(|_| done.recv_timeout(Duration::from_secs(5)).unwrap()).collect();
        names.sort();
        assert_eq!(names, vec!["Thread-1", "Thread-2", "Thread-3"]);

        pool.shutdown();
    }

    #[test]
    fn test_panic_does_not_kill_worker() {
        let sink = Arc::new(MemorySink::new());
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);

        let mut pool = ThreadPool::new(1, 4, sink.clone(), move |task: usize, _worker: &str| {
            if task == 0 {
                panic!("handler failed on task 0");
            }
            done_tx.lock().unwrap().send(task).unwrap();
        })
        .unwrap();

        pool.execute(0).unwrap();
        pool.execute(1).unwrap();
        assert_eq!(done_rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);

        pool.shutdown();
        let panics = sink.events().into_iter().filter_map(|e| match e {
            Event::WorkerPanicked { worker, message } => Some((worker, message)),
            _ => None,
        });
        assert_eq!(
            panics.collect::<Vec<_>>(),
            vec![("Thread-1".to_string(), "handler failed on task 0".to_string())]
        );
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let (done_tx, done_rx) = mpsc::channel();
        let done_tx = Mutex::new(done_tx);
        let mut pool = ThreadPool::new(2, 10, Arc::new(NullSink), move |task: usize, _: &str| {
            thread::sleep(Duration::from_millis(5));
            done_tx.lock().unwrap().send(task).unwrap();
        })
        .unwrap();

        for i in 0..10 {
            pool.execute(i).unwrap();
        }
        pool.shutdown();

        let mut finished: Vec<usize> = done_rx.try_iter().collect();
        finished.sort();
        assert_eq!(finished, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_rejects_after_shutdown() {
        let sink = Arc::new(MemorySink::new());
        let mut pool = ThreadPool::new(2, 2, sink.clone(), |_: usize, _: &str| {}).unwrap();
        pool.shutdown();

        assert_eq!(pool.try_execute(9), Submission::Rejected(9));
        assert_eq!(pool.execute(10), Err(10));
        assert_eq!(sink.count(|e| matches!(e, Event::WorkerStopped { .. })), 2);
    }

    #[test]
    fn test_zero_size_is_an_error() {
        let result = ThreadPool::new(0, 5, Arc::new(NullSink), |_: usize, _: &str| {});
        assert!(result.is_err());
    }
}
