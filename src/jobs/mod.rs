//! Background job execution: worker pool and periodic scheduler.

pub mod scheduler;
pub mod worker;

pub use scheduler::Scheduler;
pub use worker::{dispatch, WorkerPool};
