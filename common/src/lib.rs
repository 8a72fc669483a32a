//! Shared infrastructure for the stabilisation workspace: logging setup and
//! the worker pool used for parallel batches.

pub mod log_setup;
pub mod parallel;

pub use log_setup::{LogSetupError, setup_logging, setup_test_logging};
pub use parallel::WorkerPool;
