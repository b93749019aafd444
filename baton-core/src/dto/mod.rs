//! Data Transfer Objects
//!
//! Request shapes sent from workers to the server that have no
//! counterpart in the domain model.

pub mod task;
