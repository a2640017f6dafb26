use crate::{error, warn, ArmorError};
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed number of named threads draining one job queue. Shareable between writers,
/// in which case the caller owns its lifecycle.
pub struct WorkerPool {
    name: String,
    size: usize,
    topic: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(name: &str, size: usize) -> Result<Self, ArmorError> {
        let size = size.max(1);
        let (topic, receiver): (Sender<Job>, Receiver<Job>) = unbounded();
        let mut handles = Vec::with_capacity(size);
        for n in 0..size {
            let receiver = receiver.clone();
            let thread_name = format!("{}-worker-{}", name, n);
            let handle = thread::Builder::new().name(thread_name.clone()).spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("{} recovered from a panicking task", thread_name);
                    }
                }
            })?;
            handles.push(handle);
        }
        Ok(Self { name: name.to_string(), size, topic: Mutex::new(Some(topic)), handles: Mutex::new(handles) })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn execute<F: FnOnce() + Send + 'static>(&self, job: F) -> Result<(), ArmorError> {
        match self.topic.lock()?.as_ref() {
            Some(topic) => Ok(topic.send(Box::new(job))?),
            None => Err(ArmorError::Custom(format!("worker pool {} is shut down", self.name))),
        }
    }

    /// Lets queued jobs finish, then joins every worker.
    pub fn shutdown(&self) -> Result<(), ArmorError> {
        drop(self.topic.lock()?.take());
        let handles: Vec<JoinHandle<()>> = self.handles.lock()?.drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker of pool {} terminated abnormally", self.name);
            }
        }
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Ok(mut topic) = self.topic.lock() {
            topic.take();
        }
    }
}

/// Units of work submitted to a pool whose results are collected in completion order.
/// Nothing is cancelled early: `join` waits for every submitted unit.
pub struct TaskGroup<'p, T> {
    pool: &'p WorkerPool,
    results_tx: Sender<Result<T, ArmorError>>,
    results_rx: Receiver<Result<T, ArmorError>>,
    submitted: usize,
}

impl<'p, T: Send + 'static> TaskGroup<'p, T> {
    pub fn new(pool: &'p WorkerPool) -> Self {
        let (results_tx, results_rx) = unbounded();
        Self { pool, results_tx, results_rx, submitted: 0 }
    }

    pub fn submit<F>(&mut self, task: F)
    where
        F: FnOnce() -> Result<T, ArmorError> + Send + 'static,
    {
        self.submitted += 1;
        let results_tx = self.results_tx.clone();
        if let Err(e) = self.pool.execute(move || {
            let _ = results_tx.send(task());
        }) {
            let _ = self.results_tx.send(Err(e));
        }
    }

    pub fn join(self) -> Vec<Result<T, ArmorError>> {
        let TaskGroup { results_tx, results_rx, submitted, .. } = self;
        drop(results_tx);
        let mut results = Vec::with_capacity(submitted);
        for _ in 0..submitted {
            match results_rx.recv() {
                Ok(result) => results.push(result),
                // a panicking unit drops its sender without reporting
                Err(_) => results.push(Err(ArmorError::Execution(Box::new(ArmorError::Custom("task terminated without a result".to_string()))))),
            }
        }
        results
    }
}

/// Reduces per-unit results to one outcome. Offset violations win over other recognized
/// errors, which win over anything else; the latter gets wrapped into `Execution`.
/// With `skip_benign`, shutdown races are logged and left out.
pub fn settle<T>(results: Vec<Result<T, ArmorError>>, skip_benign: bool) -> Result<Vec<T>, ArmorError> {
    let mut values = Vec::with_capacity(results.len());
    let mut errors = Vec::new();
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(e) if skip_benign && e.is_benign() => warn!("Ignoring benign failure: {}", e),
            Err(e) => errors.push(e),
        }
    }
    if errors.is_empty() {
        return Ok(values);
    }
    let pick = errors
        .iter()
        .position(|e| e.is_entity_offset())
        .or_else(|| errors.iter().position(|e| e.is_recognized()))
        .unwrap_or(0);
    Err(errors.swap_remove(pick).into_surfaced())
}

#[cfg(all(test, not(feature = "integration")))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn offset_error() -> ArmorError {
        ArmorError::EntityOffset { shard: "s".into(), column: "c".into(), entity: "1".into(), message: "m".into() }
    }

    #[test]
    fn tasks_run_on_named_workers() {
        let pool = WorkerPool::new("armor-test", 3).unwrap();
        let mut group = TaskGroup::new(&pool);
        for i in 0..10 {
            group.submit(move || Ok((i, thread::current().name().unwrap_or_default().to_string())));
        }
        let results = settle(group.join(), false).unwrap();
        assert_eq!(results.len(), 10);
        assert!(results.iter().all(|(_, name)| name.starts_with("armor-test-worker-")));
        let mut ids: Vec<i32> = results.into_iter().map(|(i, _)| i).collect();
        ids.sort();
        assert_eq!(ids, (0..10).collect::<Vec<_>>());
        pool.shutdown().unwrap();
    }

    #[test]
    fn all_units_complete_before_the_first_failure_is_reported() {
        let pool = WorkerPool::new("armor-fail", 2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        let mut group = TaskGroup::new(&pool);
        for i in 0..6 {
            let done = done.clone();
            group.submit(move || {
                thread::sleep(std::time::Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
                if i == 1 { Err(ArmorError::Custom("boom".into())) } else { Ok(i) }
            });
        }
        let outcome = settle(group.join(), false);
        assert_eq!(done.load(Ordering::SeqCst), 6);
        assert!(matches!(outcome, Err(ArmorError::Execution(_))));
    }

    #[test]
    fn panicking_units_become_execution_failures() {
        let pool = WorkerPool::new("armor-panic", 1).unwrap();
        let mut group: TaskGroup<u8> = TaskGroup::new(&pool);
        group.submit(|| panic!("unit exploded"));
        group.submit(|| Ok(1));
        let results = group.join();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(matches!(settle(results, false), Err(ArmorError::Execution(_))));
    }

    #[test]
    fn offset_violations_take_priority() {
        let results: Vec<Result<u8, ArmorError>> = vec![
            Err(ArmorError::Custom("generic".into())),
            Err(ArmorError::WriteTransaction("tx".into())),
            Err(offset_error()),
        ];
        assert!(matches!(settle(results, false), Err(ArmorError::EntityOffset { .. })));

        let results: Vec<Result<u8, ArmorError>> = vec![Err(ArmorError::Custom("generic".into())), Err(ArmorError::WriteTransaction("tx".into()))];
        assert!(matches!(settle(results, false), Err(ArmorError::WriteTransaction(_))));
    }

    #[test]
    fn benign_failures_are_skipped_on_request() {
        let results: Vec<Result<u8, ArmorError>> = vec![Ok(1), Err(ArmorError::ShardClosed("s".into())), Ok(2)];
        assert_eq!(settle(results, true).unwrap(), vec![1, 2]);
        let results: Vec<Result<u8, ArmorError>> = vec![Ok(1), Err(ArmorError::ShardClosed("s".into()))];
        assert!(matches!(settle(results, false), Err(ArmorError::Execution(_))));
    }

    #[test]
    fn shut_down_pools_reject_work() {
        let pool = WorkerPool::new("armor-closed", 1).unwrap();
        pool.shutdown().unwrap();
        assert!(pool.execute(|| {}).is_err());
        let mut group: TaskGroup<u8> = TaskGroup::new(&pool);
        group.submit(|| Ok(1));
        assert!(matches!(settle(group.join(), false), Err(ArmorError::Execution(_))));
    }
}
