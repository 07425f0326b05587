//! Filesystem storage for extracted clips and dataset export.
//!
//! Layout: `<root>/<label-slug>/clip_<uuid>.wav`, with scratch space under
//! a separate temp root. All writes are atomic (temp sibling + rename).

pub mod error;
pub mod export;
pub mod store;

pub use error::{StorageError, StorageResult};
pub use export::{stream_dataset_zip, ExportEntry};
pub use store::ClipStore;
