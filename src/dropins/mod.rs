//! Auto-discovery of applications placed in the dropins directory.
//!
//! The [`DropinMonitor`] turns entries of the dropins directory into
//! auto-install [`AppRecord`]s in a [`RecordStore`], resolving configured
//! locations through a [`PathResolver`].

mod monitor;
mod resolve;
mod store;

pub use monitor::DropinMonitor;
pub use resolve::{PathResolver, SymbolicResolver};
pub use store::{AppRecord, MemoryRecordStore, RecordEvent, RecordFilter, RecordId, RecordStore};
