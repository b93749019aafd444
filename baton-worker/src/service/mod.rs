//! Service layer
//!
//! Services hold the runner's business logic on top of the repositories.

mod reporter;

pub use reporter::ResultReporter;
