//! Worker pool for podclip background jobs.
//!
//! N workers share one job store; each loops claim → dispatch → verdict.
//! Cancellation is cooperative (a watch channel observed at I/O
//! boundaries), retries are bounded with exponential backoff, and a
//! periodic sweep re-pends rows abandoned by dead workers.

pub mod config;
pub mod error;
pub mod executor;
pub mod handlers;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::WorkerPool;
pub use handlers::build_registry;
