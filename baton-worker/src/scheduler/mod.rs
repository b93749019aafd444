//! Scheduler layer
//!
//! Runs one poll loop per registered task type, dispatches leased tasks to
//! their handlers and hands the outcomes to the reporter.

pub mod poller;
pub mod runner;

pub use poller::WorkerState;
pub use runner::TaskRunner;
