use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::job::{Job, JobHandle, ParallelParams};
use crate::worker::{job_loop, schedule_on, worker_loop, SystemShared, WorkerLocal};

/// Owns the worker threads. The submitting thread doubles as the last
/// worker slot (the "primary"): `execute` schedules on it, wakes the pool
/// and then helps run jobs until the root job completes.
pub struct JobSystem {
    shared: Arc<SystemShared>,
    threads: Vec<JoinHandle<()>>,
    primary: WorkerLocal,
}

impl JobSystem {
    /// `worker_count` is the number of extra worker threads requested; one
    /// more slot is reserved for the submitter. The total is clamped to
    /// hardware_parallelism - 1 and to 32.
    pub fn new(worker_count: usize) -> JobSystem {
        let hardware = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        let mut total = worker_count + 1;
        if total >= hardware {
            total = hardware.saturating_sub(1).max(1);
        }
        if total > 32 {
            total = 32;
        }

        let shared = Arc::new(SystemShared::new(total));
        let mut threads = Vec::with_capacity(total - 1);
        for id in 0..total - 1 {
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("alchemy-worker-{id}"))
                .spawn(move || worker_loop(&shared, id))
                .expect("failed to spawn worker thread");
            threads.push(handle);
        }

        log::debug!("job system started with {total} worker slots");

        JobSystem {
            shared,
            threads,
            primary: WorkerLocal::new(total - 1),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count()
    }

    /// Schedule `job` on the primary, wake the pool, and help run jobs
    /// until it (and everything it spawned) completes.
    pub fn execute<J: Job>(&self, params: ParallelParams, job: J) {
        let handle = self.schedule(params, Arc::new(job));

        self.shared.work_in_system.store(true, Ordering::Release);
        {
            let _guard = self.shared.work_mutex.lock();
            self.shared.work_cv.notify_all();
        }

        while handle.is_active() {
            job_loop(&self.shared, &self.primary);
        }

        self.shared.work_in_system.store(false, Ordering::Release);
        self.primary.scratch.borrow_mut().reset();
    }

    fn schedule(&self, params: ParallelParams, job: Arc<dyn Job>) -> JobHandle {
        let handle = schedule_on(&self.shared, &self.primary, params, job);
        // the primary's ledger entry for the root is consumed here; execute
        // awaits the handle directly
        self.primary.ledger.borrow_mut().pop();
        handle
    }

    pub fn shutdown(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.shared.shutting_down.store(true, Ordering::Release);
        {
            let _guard = self.shared.work_mutex.lock();
            self.shared.work_cv.notify_all();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for JobSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}
