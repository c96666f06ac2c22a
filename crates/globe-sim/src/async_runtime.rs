//! Tokio-backed task spawner for layer requests.

use globe::{BoxFuture, TaskSpawner};
use tokio::runtime::Handle;

/// Spawns planet requests onto a Tokio runtime.
///
/// Tasks run on the runtime's worker threads; their results reach the planet
/// over its result channel and are applied on the next update.
#[derive(Debug, Clone)]
pub struct TokioSpawner {
    handle: Handle,
}

impl TokioSpawner {
    /// Spawner for the runtime the caller is running on.
    ///
    /// Panics outside a Tokio runtime.
    #[must_use]
    pub fn current() -> Self {
        Self {
            handle: Handle::current(),
        }
    }
}

impl TaskSpawner for TokioSpawner {
    fn spawn(&self, future: BoxFuture) {
        // Completion is reported through the planet's channel.
        drop(self.handle.spawn(future));
    }
}
