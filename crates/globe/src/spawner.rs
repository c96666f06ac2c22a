//! Executor seam for layer requests.
//!
//! The planet never owns a runtime. It hands request futures to a
//! [`TaskSpawner`]; completed results come back over a channel and are applied
//! on the next update. Hosts plug in their own runtime, while
//! [`LocalExecutor`] runs tasks on the calling thread, once per tick.

use std::{
    future::Future,
    pin::Pin,
    sync::Mutex,
    task::{Context, Waker},
};

/// A spawned unit of background work.
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Spawns background tasks that run to completion.
///
/// Tasks return `()`; results travel back through channels.
pub trait TaskSpawner: Send + Sync {
    fn spawn(&self, future: BoxFuture);
}

/// A cooperative executor polled explicitly by its owner.
#[derive(Default)]
pub struct LocalExecutor {
    tasks: Mutex<Vec<BoxFuture>>,
}

impl LocalExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Poll every task until none makes further progress.
    ///
    /// Returns the number of tasks that completed. Tasks spawned while running
    /// are picked up in the same call.
    pub fn run_until_stalled(&self) -> usize {
        let mut cx = Context::from_waker(Waker::noop());
        let mut completed = 0;
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap());
            if tasks.is_empty() {
                return completed;
            }
            let before = tasks.len();
            tasks.retain_mut(|task| task.as_mut().poll(&mut cx).is_pending());
            let finished = before - tasks.len();
            completed += finished;

            let mut queue = self.tasks.lock().unwrap();
            let spawned_meanwhile = !queue.is_empty();
            tasks.append(&mut queue);
            *queue = tasks;
            if finished == 0 && !spawned_meanwhile {
                return completed;
            }
        }
    }

    /// Number of tasks still waiting.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

impl TaskSpawner for LocalExecutor {
    fn spawn(&self, future: BoxFuture) {
        self.tasks.lock().unwrap().push(future);
    }
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Drive `future` to completion on the current thread.
#[cfg(test)]
pub(crate) fn block_on<F: Future>(future: F) -> F::Output {
    use std::task::Poll;

    let mut cx = Context::from_waker(Waker::noop());
    let mut future = std::pin::pin!(future);
    loop {
        if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
            return output;
        }
        std::thread::yield_now();
    }
}
