//! Concurrent channel export into a single archive.
//!
//! The pipeline is split into:
//! - [`paginator`] - backward pagination over one channel's history
//! - [`writer`] - archive sinks and the writer actor that owns the container
//! - [`task`] - one export task per channel, paginator into entry
//! - [`coordinator`] - fan-out, fan-in, cancellation and finalization

pub mod coordinator;
pub mod paginator;
pub(crate) mod task;
pub mod writer;

#[cfg(test)]
pub(crate) mod test_support;


pub use coordinator::ExportCoordinator;
pub use paginator::MessagePaginator;
pub use writer::{ArchiveSink, ArchiveWriter, EntryId, EntryWriter, ZipArchiveSink};
