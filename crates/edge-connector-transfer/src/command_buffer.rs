//! Single-consumer task queue (§4.4) that runs user callbacks off the
//! transport thread, in FIFO order.

use crossbeam_channel::{unbounded, Sender};
use std::thread::JoinHandle;

type Task = Box<dyn FnOnce() + Send + 'static>;

enum Job {
    Run(Task),
    Shutdown,
}

/// Runs pushed closures one at a time, in the order they were pushed, on a
/// dedicated worker thread. `push` never blocks the caller.
pub struct CommandBuffer {
    sender: Sender<Job>,
    worker: Option<JoinHandle<()>>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        let (sender, receiver) = unbounded::<Job>();
        let worker = std::thread::Builder::new()
            .name("command-buffer".into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    match job {
                        Job::Run(task) => task(),
                        Job::Shutdown => break,
                    }
                }
            })
            .expect("failed to spawn command buffer worker thread");

        Self {
            sender,
            worker: Some(worker),
        }
    }

    /// Enqueue a task. Wait-free from the caller's perspective.
    pub fn push(&self, task: impl FnOnce() + Send + 'static) {
        // The worker thread only stops once `shutdown` drops the sender's
        // matching receiver; until then this send cannot fail.
        let _ = self.sender.send(Job::Run(Box::new(task)));
    }

    /// Drain remaining tasks and join the worker thread.
    pub fn shutdown(mut self) {
        self.shutdown_mut();
    }

    fn shutdown_mut(&mut self) {
        let _ = self.sender.send(Job::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        self.shutdown_mut();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::sync::Arc;

    #[test]
    fn tasks_run_in_fifo_order() {
        let buffer = CommandBuffer::new();
        let (tx, rx) = mpsc::channel();
        for i in 0..10 {
            let tx = tx.clone();
            buffer.push(move || tx.send(i).unwrap());
        }
        drop(tx);
        buffer.shutdown();
        let received: Vec<i32> = rx.iter().collect();
        assert_eq!(received, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn push_never_runs_on_caller_thread() {
        let buffer = CommandBuffer::new();
        let caller_thread = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        buffer.push(move || tx.send(std::thread::current().id()).unwrap());
        let worker_thread = rx.recv().unwrap();
        assert_ne!(caller_thread, worker_thread);
        buffer.shutdown();
    }

    #[test]
    fn shutdown_drains_pending_tasks() {
        let buffer = CommandBuffer::new();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = counter.clone();
            buffer.push(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        buffer.shutdown();
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
}
