use std::future::Future;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

use crate::error::FabricResult;

/// Single-threaded cooperative executor hosting connection loops, device
/// run-loops and clients.
pub struct Runtime {
    pool: LocalPool,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self {
            pool: LocalPool::new(),
        }
    }

    pub fn spawner(&self) -> LocalSpawner {
        self.pool.spawner()
    }

    pub fn spawn<F>(&self, task: F) -> FabricResult<()>
    where
        F: Future<Output = ()> + 'static,
    {
        self.pool.spawner().spawn_local(task)?;
        Ok(())
    }

    /// Polls every task until none can make progress.
    pub fn run_until_stalled(&mut self) {
        self.pool.run_until_stalled();
    }

    /// Drives `future` to completion, running spawned tasks alongside it.
    pub fn run_until<F: Future>(&mut self, future: F) -> F::Output {
        self.pool.run_until(future)
    }
}
