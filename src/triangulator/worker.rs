//! Background index recomputation on a dedicated tokio runtime

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::runtime::{Builder, Runtime};

use crate::core::error::Error;
use crate::core::types::Result;

/// Runs CPU-bound jobs off the calling thread and hands each result to a
/// completion callback.
///
/// Jobs run on the runtime's blocking pool; a job that panics is reported to
/// its callback as [`Error::Worker`] instead of tearing down the runtime.
pub struct IndexWorker {
    runtime: Runtime,
    in_flight: Arc<AtomicUsize>,
}

impl IndexWorker {
    /// Create a worker with `threads` async threads (at least one).
    pub fn new(threads: usize) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(threads.max(1))
            .thread_name("strata-index")
            .build()?;
        log::debug!("Index worker started with {} threads", threads.max(1));
        Ok(Self {
            runtime,
            in_flight: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Run `job` in the background and pass its outcome to `callback`.
    ///
    /// The callback runs on a worker thread, never on the caller's.
    pub fn submit<T, J, F>(&self, job: J, callback: F)
    where
        T: Send + 'static,
        J: FnOnce() -> Result<T> + Send + 'static,
        F: FnOnce(Result<T>) + Send + 'static,
    {
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::SeqCst);

        let task = self.runtime.spawn_blocking(job);
        self.runtime.spawn(async move {
            let result = match task.await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Index job failed: {}", e);
                    Err(Error::Worker(e.to_string()))
                }
            };
            in_flight.fetch_sub(1, Ordering::SeqCst);
            callback(result);
        });
    }

    /// Jobs submitted whose callback has not started yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}
