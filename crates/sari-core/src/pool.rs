//! Bounded fan-out for blocking collaborator calls.
//!
//! A gatherer submits N independent tasks and blocks until all N results are
//! collected. Results come back in submission order whatever the completion
//! order. Each task has its own timeout; a timed-out task is reported as such
//! and does not cancel its siblings.
//!
//! The pool owns a tokio runtime. The pipeline creates it, lends it to each
//! gatherer for the duration of `gather`, and shuts it down at the end of the
//! run.

use crate::error::{Result, SariError};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tokio::sync::Semaphore;

pub const DEFAULT_WORKERS: usize = 8;
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("task failed: {0}")]
    Panicked(String),
    #[error("worker pool is shut down")]
    Closed,
}

pub struct WorkerPool {
    runtime: Runtime,
    slots: Arc<Semaphore>,
    workers: usize,
    task_timeout: Duration,
}

impl WorkerPool {
    /// At most `workers` tasks run at once; each may take `task_timeout`.
    pub fn new(workers: usize, task_timeout: Duration) -> Result<Self> {
        let workers = workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("sari-worker")
            .enable_all()
            .build()
            .map_err(|e| SariError::WorkerPool(e.to_string()))?;
        Ok(Self {
            runtime,
            slots: Arc::new(Semaphore::new(workers)),
            workers,
            task_timeout,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    /// Run `f` over every item and collect the results in input order.
    pub fn map<T, R, F>(&self, items: Vec<T>, f: F) -> Vec<std::result::Result<R, TaskError>>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let timeout = self.task_timeout;
        self.runtime.block_on(async {
            let handles: Vec<_> = items
                .into_iter()
                .map(|item| {
                    let f = Arc::clone(&f);
                    let slots = Arc::clone(&self.slots);
                    tokio::spawn(async move {
                        let permit = slots.acquire_owned().await.map_err(|_| TaskError::Closed)?;
                        // The permit moves into the blocking task so a timed-out
                        // call keeps its slot until it really returns.
                        let work = tokio::task::spawn_blocking(move || {
                            let _permit = permit;
                            f(item)
                        });
                        match tokio::time::timeout(timeout, work).await {
                            Ok(Ok(result)) => Ok(result),
                            Ok(Err(join)) => Err(TaskError::Panicked(join.to_string())),
                            Err(_) => Err(TaskError::TimedOut(timeout)),
                        }
                    })
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for handle in handles {
                results.push(match handle.await {
                    Ok(result) => result,
                    Err(join) => Err(TaskError::Panicked(join.to_string())),
                });
            }
            results
        })
    }

    /// Stop accepting work and wait briefly for stragglers.
    pub fn shutdown(self) {
        self.slots.close();
        self.runtime.shutdown_timeout(Duration::from_secs(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn results_keep_input_order() {
        let pool = WorkerPool::new(4, Duration::from_secs(5)).unwrap();
        let results = pool.map(vec![30u64, 1, 15, 0], |ms| {
            std::thread::sleep(Duration::from_millis(ms));
            ms * 2
        });
        let values: Vec<u64> = results.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(values, vec![60, 2, 30, 0]);
        pool.shutdown();
    }

    #[test]
    fn timeout_only_fails_the_slow_task() {
        let pool = WorkerPool::new(4, Duration::from_millis(100)).unwrap();
        let results = pool.map(vec![0u64, 1_000, 0], |ms| {
            std::thread::sleep(Duration::from_millis(ms));
            ms
        });
        assert_eq!(results[0], Ok(0));
        assert_eq!(
            results[1],
            Err(TaskError::TimedOut(Duration::from_millis(100)))
        );
        assert_eq!(results[2], Ok(0));
        pool.shutdown();
    }

    #[test]
    fn timeout_message_keeps_sub_second_precision() {
        assert_eq!(
            TaskError::TimedOut(Duration::from_millis(250)).to_string(),
            "timed out after 250ms"
        );
        assert_eq!(
            TaskError::TimedOut(Duration::from_secs(10)).to_string(),
            "timed out after 10s"
        );
    }

    #[test]
    fn concurrency_is_bounded() {
        let pool = WorkerPool::new(2, Duration::from_secs(5)).unwrap();
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let results = pool.map((0..8).collect(), move |_: u32| {
            let now = r.fetch_add(1, Ordering::SeqCst) + 1;
            p.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            r.fetch_sub(1, Ordering::SeqCst);
        });
        assert!(results.iter().all(|r| r.is_ok()));
        assert!(peak.load(Ordering::SeqCst) <= 2);
        pool.shutdown();
    }

    #[test]
    fn panicking_task_is_isolated() {
        let pool = WorkerPool::new(2, Duration::from_secs(5)).unwrap();
        let results = pool.map(vec![1, 0, 2], |n: u32| {
            if n == 0 {
                panic!("boom");
            }
            n
        });
        assert_eq!(results[0], Ok(1));
        assert!(matches!(results[1], Err(TaskError::Panicked(_))));
        assert_eq!(results[2], Ok(2));
        pool.shutdown();
    }

    #[test]
    fn empty_input() {
        let pool = WorkerPool::new(1, Duration::from_secs(1)).unwrap();
        let results: Vec<std::result::Result<u8, TaskError>> = pool.map(Vec::<u8>::new(), |n| n);
        assert!(results.is_empty());
        pool.shutdown();
    }
}
