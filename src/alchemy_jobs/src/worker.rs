use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::job::{
    batch_count, Job, JobHandle, JobKind, JobPayload, JobRecord, JobState, ParallelParams,
};
use crate::scratch::ScratchArena;

/// State shared by every worker and the primary.
pub(crate) struct SystemShared {
    pub(crate) queues: Vec<Mutex<VecDeque<Arc<JobRecord>>>>,
    pub(crate) work_mutex: Mutex<()>,
    pub(crate) work_cv: Condvar,
    pub(crate) work_in_system: AtomicBool,
    pub(crate) shutting_down: AtomicBool,
}

impl SystemShared {
    pub(crate) fn new(worker_count: usize) -> SystemShared {
        SystemShared {
            queues: (0..worker_count).map(|_| Mutex::new(VecDeque::new())).collect(),
            work_mutex: Mutex::new(()),
            work_cv: Condvar::new(),
            work_in_system: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
        }
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.queues.len()
    }
}

/// Per-thread worker state: the child-job ledger and the scratch arena.
/// Only the owning thread touches this; the shared queues are what other
/// workers see.
pub(crate) struct WorkerLocal {
    pub(crate) id: usize,
    pub(crate) ledger: RefCell<Vec<JobHandle>>,
    pub(crate) scratch: RefCell<ScratchArena>,
}

impl WorkerLocal {
    pub(crate) fn new(id: usize) -> WorkerLocal {
        WorkerLocal {
            id,
            ledger: RefCell::new(Vec::with_capacity(128)),
            scratch: RefCell::new(ScratchArena::new()),
        }
    }
}

/// Handle a job body uses to talk back to the scheduler: spawn children,
/// await them, and borrow the worker's scratch arena.
pub struct JobContext<'a> {
    pub(crate) shared: &'a SystemShared,
    pub(crate) local: &'a WorkerLocal,
}

impl<'a> JobContext<'a> {
    pub fn worker_id(&self) -> usize {
        self.local.id
    }

    pub fn worker_count(&self) -> usize {
        self.shared.worker_count()
    }

    /// Enqueue a job on this worker's own queue.
    pub fn schedule<J: Job>(&self, params: ParallelParams, job: J) -> JobHandle {
        self.schedule_arc(params, Arc::new(job))
    }

    pub fn schedule_arc(&self, params: ParallelParams, job: Arc<dyn Job>) -> JobHandle {
        schedule_on(self.shared, self.local, params, job)
    }

    /// Run other jobs until `handle` completes.
    pub fn wait(&self, handle: &JobHandle) {
        while handle.is_active() {
            job_loop(self.shared, self.local);
        }
    }

    pub fn wait_all(&self, handles: &[JobHandle]) {
        loop {
            let has_active = handles.iter().any(|h| h.is_active());
            if !has_active {
                return;
            }
            job_loop(self.shared, self.local);
        }
    }

    /// Schedule and await in one step.
    pub fn run<J: Job>(&self, params: ParallelParams, job: J) {
        let handle = self.schedule(params, job);
        self.wait(&handle);
    }

    /// Borrow the per-worker scratch arena. The runner rolls the arena
    /// back around every job body, so anything allocated here is gone by
    /// the time the next job runs.
    pub fn with_scratch<R>(&self, f: impl FnOnce(&mut ScratchArena) -> R) -> R {
        f(&mut self.local.scratch.borrow_mut())
    }
}

fn is_primary(shared: &SystemShared, id: usize) -> bool {
    id == shared.worker_count() - 1
}

pub(crate) fn schedule_on(
    shared: &SystemShared,
    local: &WorkerLocal,
    params: ParallelParams,
    job: Arc<dyn Job>,
) -> JobHandle {
    let handle = match params.kind {
        JobKind::Single => {
            let record = JobRecord::new(JobPayload::User(job), JobKind::Single, 0, 1);
            shared.queues[local.id].lock().push_back(record.clone());
            JobHandle { record }
        }
        JobKind::ForeachIndexed | JobKind::ForeachBatched => {
            let item_count = params.item_count;
            let mut batch_size = params.batch_size.max(1);
            if batch_size > item_count {
                batch_size = item_count;
            }

            if item_count == 0 {
                let record = JobRecord::completed_empty();
                return JobHandle { record };
            }

            let batches = batch_count(item_count, batch_size);
            let mut children = Vec::with_capacity(batches as usize);
            for batch_index in 0..batches {
                let start = batch_index * batch_size;
                let end = (start + batch_size).min(item_count);
                let record = JobRecord::new(JobPayload::User(job.clone()), params.kind, start, end);
                children.push(JobHandle { record });
            }

            let container = JobRecord::new(
                JobPayload::Container(children.clone()),
                JobKind::Single,
                0,
                0,
            );

            {
                let mut queue = shared.queues[local.id].lock();
                for child in &children {
                    queue.push_back(child.record.clone());
                }
                queue.push_back(container.clone());
            }

            JobHandle { record: container }
        }
    };

    local.ledger.borrow_mut().push(handle.clone());
    handle
}

fn try_get_job(shared: &SystemShared, id: usize) -> Option<Arc<JobRecord>> {
    if let Some(mut queue) = shared.queues[id].try_lock() {
        if let Some(job) = queue.pop_front() {
            return Some(job);
        }
    }

    // steal from the right neighbour first so the load spreads
    let count = shared.worker_count();
    for victim in (id + 1..count).chain(0..id) {
        if let Some(mut queue) = shared.queues[victim].try_lock() {
            if let Some(job) = queue.pop_front() {
                return Some(job);
            }
        }
    }

    None
}

/// One scheduling round: make ten attempts to find a job (own queue, then
/// steal), run it if found, otherwise back off. Non-primary workers sleep
/// briefly when the system looks empty; the primary never sleeps.
pub(crate) fn job_loop(shared: &SystemShared, local: &WorkerLocal) {
    for _ in 0..10 {
        if let Some(record) = try_get_job(shared, local.id) {
            run_job(shared, local, record);
            return;
        }
        std::thread::yield_now();
    }

    if !is_primary(shared, local.id) {
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn run_job(shared: &SystemShared, local: &WorkerLocal, record: Arc<JobRecord>) {
    let threshold = local.ledger.borrow().len();
    record.set_state(JobState::Running);

    let marker = local.scratch.borrow().mark();
    let ctx = JobContext { shared, local };

    match &record.payload {
        JobPayload::User(job) => match record.kind {
            JobKind::Single => job.execute(&ctx),
            JobKind::ForeachIndexed => {
                for index in record.start..record.end {
                    job.execute_index(&ctx, index);
                }
            }
            JobKind::ForeachBatched => job.execute_range(&ctx, record.start, record.end),
        },
        JobPayload::Container(children) => {
            // keep helping until every child of the split has finished
            loop {
                let has_active = children.iter().any(|c| c.is_active());
                if !has_active {
                    break;
                }
                job_loop(shared, local);
            }
        }
        JobPayload::Empty => {}
    }

    let schedule_end = local.ledger.borrow().len();
    local.scratch.borrow_mut().rollback_to(marker);

    // a job isn't done until the jobs it spawned are done
    loop {
        let has_pending = {
            let ledger = local.ledger.borrow();
            ledger[threshold..schedule_end].iter().any(|h| h.is_active())
        };
        if !has_pending {
            break;
        }
        job_loop(shared, local);
    }

    record.set_state(JobState::Completed);
    local.ledger.borrow_mut().truncate(threshold);
}

pub(crate) fn worker_loop(shared: &SystemShared, id: usize) {
    let local = WorkerLocal::new(id);

    while !shared.shutting_down.load(Ordering::Acquire) {
        if !shared.work_in_system.load(Ordering::Acquire) {
            local.scratch.borrow_mut().reset();
            let mut guard = shared.work_mutex.lock();
            while !shared.shutting_down.load(Ordering::Acquire)
                && !shared.work_in_system.load(Ordering::Acquire)
            {
                shared.work_cv.wait(&mut guard);
            }
            if shared.shutting_down.load(Ordering::Acquire) {
                return;
            }
        }

        job_loop(shared, &local);
    }
}
