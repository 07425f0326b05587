//! SQLite persistence for the podclip backend.
//!
//! This crate provides:
//! - `Database`: connection management and schema migration
//! - `JobStore`: the durable job queue table
//! - `ClipRepository`: clip rows and filtered listings
//!
//! All access goes through a single connection behind a mutex; statements
//! are short and never span I/O, so the lock is held only for the duration
//! of each query.

pub mod clips;
pub mod database;
pub mod error;
pub mod jobs;

pub use clips::{ClipFilter, ClipRepository, MAX_LIST_LIMIT};
pub use database::Database;
pub use error::{DbError, DbResult};
pub use jobs::JobStore;
