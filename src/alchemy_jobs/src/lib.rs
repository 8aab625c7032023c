//! Work-stealing job scheduler.
//!
//! A fixed pool of worker threads plus a "primary" worker that runs on the
//! submitting thread and drives the pipeline. Jobs may spawn and await
//! child jobs from inside their bodies; a job is not complete until every
//! job it scheduled during its body has completed. Idle workers steal from
//! their neighbours' queues with `try_lock` so they never block behind a
//! busy victim.

pub mod job;
pub mod pool;
pub mod scratch;
pub mod system;
mod worker;

pub use job::{Job, JobHandle, JobKind, Parallel, ParallelParams};
pub use pool::Pool;
pub use scratch::{ScratchArena, ScratchMarker, ScratchSpan};
pub use system::JobSystem;
pub use worker::JobContext;
