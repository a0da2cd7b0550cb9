//! Off-context execution of blocking operations.
//!
//! [`TaskDispatcher::run`] hands an operation to a blocking worker of the
//! tokio runtime. When it finishes, its completion callback is queued on the
//! [`CompletionQueue`], which the primary context drains. Callbacks therefore
//! always run on the primary context, never on a worker.

use std::any::Any;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

use crate::error::DispatchError;

type Completion = Box<dyn FnOnce() + Send>;

/// Submits operations to blocking workers.
#[derive(Clone)]
pub struct TaskDispatcher {
    runtime: Handle,
    completions: mpsc::UnboundedSender<Completion>,
}

/// Receives completion callbacks for the primary context.
pub struct CompletionQueue {
    completions: mpsc::UnboundedReceiver<Completion>,
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl TaskDispatcher {
    /// Dispatcher spawning on `runtime`, with its completion queue.
    pub fn new(runtime: Handle) -> (Self, CompletionQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                runtime,
                completions: tx,
            },
            CompletionQueue { completions: rx },
        )
    }

    /// Run `operation` on a worker and queue `on_complete` with its result.
    ///
    /// A panic inside `operation` is reported as
    /// [`DispatchError::Panicked`].
    pub fn run<T, Op, Done>(&self, name: &'static str, operation: Op, on_complete: Done)
    where
        T: Send + 'static,
        Op: FnOnce() -> T + Send + 'static,
        Done: FnOnce(Result<T, DispatchError>) + Send + 'static,
    {
        debug!(operation = name, "Dispatching");
        let worker = self.runtime.spawn_blocking(operation);
        let completions = self.completions.clone();

        self.runtime.spawn(async move {
            let result = match worker.await {
                Ok(value) => Ok(value),
                Err(e) if e.is_panic() => {
                    let message = panic_message(e.into_panic());
                    error!(operation = name, panic = %message, "Operation panicked");
                    Err(DispatchError::Panicked(message))
                }
                Err(_) => Err(DispatchError::Cancelled),
            };

            if completions
                .send(Box::new(move || on_complete(result)))
                .is_err()
            {
                debug!(operation = name, "Completion queue closed, result dropped");
            }
        });
    }
}

impl CompletionQueue {
    /// Wait for the next completion and run it.
    ///
    /// Returns `false` once every dispatcher is gone and the queue is empty.
    pub async fn next(&mut self) -> bool {
        match self.completions.recv().await {
            Some(completion) => {
                completion();
                true
            }
            None => false,
        }
    }

    /// Run every completion already queued, without waiting.
    pub fn run_pending(&mut self) -> usize {
        let mut count = 0;
        while let Ok(completion) = self.completions.try_recv() {
            completion();
            count += 1;
        }
        count
    }

    /// Drain completions until `result` is delivered.
    ///
    /// Pair with a completion callback that sends into the matching
    /// `oneshot::Sender`. Returns `None` if that sender is dropped unsent.
    pub async fn wait_for<T>(&mut self, mut result: oneshot::Receiver<T>) -> Option<T> {
        loop {
            match result.try_recv() {
                Ok(value) => return Some(value),
                Err(oneshot::error::TryRecvError::Closed) => return None,
                Err(oneshot::error::TryRecvError::Empty) => {}
            }
            if !self.next().await {
                return result.try_recv().ok();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::thread;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_completion_runs_on_primary_context() {
        let (dispatcher, mut queue) = TaskDispatcher::new(Handle::current());
        let primary = thread::current().id();
        let (tx, rx) = oneshot::channel();

        dispatcher.run(
            "worker-thread",
            move || thread::current().id(),
            move |result| {
                let _ = tx.send((result, thread::current().id()));
            },
        );
        let (result, completed_on) = queue.wait_for(rx).await.unwrap();

        assert_ne!(result.unwrap(), primary);
        assert_eq!(completed_on, primary);
    }

    #[tokio::test]
    async fn test_panic_is_reported() {
        let (dispatcher, mut queue) = TaskDispatcher::new(Handle::current());
        let (tx, rx) = oneshot::channel();

        dispatcher.run(
            "boom",
            || -> u32 { panic!("worker exploded") },
            move |result| {
                let _ = tx.send(result);
            },
        );

        let result = queue.wait_for(rx).await.unwrap();
        assert_eq!(
            result,
            Err(DispatchError::Panicked("worker exploded".to_string()))
        );
    }

    #[tokio::test]
    async fn test_completions_in_issue_order_when_serialized() {
        let (dispatcher, mut queue) = TaskDispatcher::new(Handle::current());
        let log = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let (tx, rx) = oneshot::channel();
            let log = Arc::clone(&log);
            dispatcher.run(
                "step",
                move || i,
                move |result: Result<i32, DispatchError>| {
                    log.lock().unwrap().push(result.unwrap());
                    let _ = tx.send(());
                },
            );
            queue.wait_for(rx).await.unwrap();
        }

        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_run_pending_does_not_block() {
        let (_dispatcher, mut queue) = TaskDispatcher::new(Handle::current());
        assert_eq!(queue.run_pending(), 0);
    }

    #[tokio::test]
    async fn test_next_returns_false_when_dispatcher_dropped() {
        let (dispatcher, mut queue) = TaskDispatcher::new(Handle::current());
        drop(dispatcher);
        assert!(!queue.next().await);
    }
}
