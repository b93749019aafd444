//! Core domain types
//!
//! These types mirror the JSON the orchestration server exchanges with
//! workers. They are shared between the HTTP client (which transports them)
//! and the worker runtime (which executes and reports them).

pub mod task;
