//! Error types for discord-archive
//!
//! This module provides the error taxonomy for the library:
//! - [`SelectionError`] for channel index arguments that cannot be honoured
//! - [`ExportError`] for failures inside the concurrent export pipeline
//! - [`Error`], the top-level type every public operation returns
//!
//! Every variant renders as a single human-readable line naming the failing
//! operation and its cause, which is what the shell prints.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for discord-archive operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for discord-archive
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "export.page_size")
        key: Option<String>,
    },

    /// Channel selection arguments were rejected
    #[error("invalid selection: {0}")]
    Selection(#[from] SelectionError),

    /// The export pipeline failed
    #[error("export failed: {0}")]
    Export(#[from] ExportError),

    /// The remote service answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code returned by the service
        status: u16,
        /// Message extracted from the response body
        message: String,
    },

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation needing a session was attempted without one
    #[error("not logged in")]
    NotLoggedIn,

    /// An operation needing a guild scope was attempted outside of one
    #[error("not within the scope of a guild")]
    NoGuildScope,

    /// The requested archive file is already on disk
    #[error("file already exists: {}", .0.display())]
    ArchiveExists(PathBuf),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Errors produced while turning user arguments into a channel selection
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// Argument is not a non-negative integer
    #[error("{arg:?} is not a valid channel #")]
    NotANumber {
        /// The offending argument, as typed
        arg: String,
    },

    /// Argument is a number but does not name an existing channel
    #[error("{arg:?} is not a valid channel #, outside of range 0..{count}")]
    OutOfRange {
        /// The offending argument, as typed
        arg: String,
        /// Number of channels available for selection
        count: usize,
    },
}

/// Errors raised inside the export pipeline (tasks, writer actor, coordinator)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExportError {
    /// A page of messages could not be fetched
    #[error("getting messages for channel {channel}: {reason}")]
    Retrieval {
        /// Display name of the channel being exported
        channel: String,
        /// The underlying failure
        reason: String,
    },

    /// An archive entry could not be opened
    #[error("opening archive entry {entry}: {reason}")]
    EntryCreation {
        /// Name of the entry that was being created
        entry: String,
        /// The underlying failure
        reason: String,
    },

    /// A message could not be encoded as JSON
    #[error("encoding message {message_id} of channel {channel}: {reason}")]
    Serialization {
        /// Display name of the channel being exported
        channel: String,
        /// Identifier of the message that failed to encode
        message_id: String,
        /// The underlying failure
        reason: String,
    },

    /// Writing into an archive entry failed
    #[error("writing archive entry {entry}: {reason}")]
    EntryWrite {
        /// Name of the entry being written
        entry: String,
        /// The underlying failure
        reason: String,
    },

    /// Closing the archive container failed
    #[error("closing archive {}: {reason}", .path.display())]
    Finalization {
        /// Path of the archive file
        path: PathBuf,
        /// The underlying failure
        reason: String,
    },

    /// The export was cancelled before it could finish
    #[error("export cancelled")]
    Cancelled,
}

impl ExportError {
    /// Whether this failure is a consequence of cancellation rather than a root cause
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExportError::Cancelled)
    }
}

impl Error {
    /// Create a configuration error for the given key
    pub fn config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}
