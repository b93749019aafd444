//! Repository layer
//!
//! Repositories abstract communication with the orchestration server.
//! They provide a narrow interface over the task endpoints without any
//! business logic, so the scheduler can be tested against an in-memory
//! implementation.

mod tasks;

pub use tasks::TaskRepository;
