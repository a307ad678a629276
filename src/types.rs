//! Core types for discord-archive

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ExportError;

macro_rules! snowflake_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create an identifier from its string form
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

snowflake_id!(
    /// Unique identifier of a guild (server)
    GuildId
);
snowflake_id!(
    /// Unique identifier of a channel
    ChannelId
);
snowflake_id!(
    /// Unique identifier of a message, also used as the pagination cursor
    MessageId
);
snowflake_id!(
    /// Unique identifier of a user
    UserId
);

/// Discord channel type codes
pub mod channel_kind {
    /// Text channel within a guild
    pub const GUILD_TEXT: u8 = 0;
    /// Voice channel within a guild
    pub const GUILD_VOICE: u8 = 2;
    /// Category that contains up to 50 channels
    pub const GUILD_CATEGORY: u8 = 4;
    /// Announcement channel
    pub const GUILD_ANNOUNCEMENT: u8 = 5;
    /// Thread within an announcement channel
    pub const ANNOUNCEMENT_THREAD: u8 = 10;
    /// Public thread within a text channel
    pub const PUBLIC_THREAD: u8 = 11;
    /// Private thread within a text channel
    pub const PRIVATE_THREAD: u8 = 12;
}

/// The account a session is logged in as
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User ID
    pub id: UserId,
    /// Account username
    pub username: String,
}

/// A guild the logged-in user belongs to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    /// Guild ID
    pub id: GuildId,
    /// Display name
    pub name: String,
}

/// A channel within a guild
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel ID
    pub id: ChannelId,
    /// Display name (used to name the archive entry)
    #[serde(default)]
    pub name: String,
    /// Channel type code, see [`channel_kind`]
    #[serde(rename = "type", default)]
    pub kind: u8,
    /// Sorting position within the guild
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl Channel {
    /// Whether the channel carries a message history
    pub fn is_text_based(&self) -> bool {
        matches!(
            self.kind,
            channel_kind::GUILD_TEXT
                | channel_kind::GUILD_ANNOUNCEMENT
                | channel_kind::ANNOUNCEMENT_THREAD
                | channel_kind::PUBLIC_THREAD
                | channel_kind::PRIVATE_THREAD
        )
    }
}

/// A message record
///
/// Only the identifier is interpreted. The timestamp is kept as the service
/// sent it and every other field lands in `fields`, so a message is written
/// back out unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message ID
    pub id: MessageId,
    /// When the message was sent, as an ISO 8601 string
    pub timestamp: String,
    /// Remaining fields, owned by the remote service's schema
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl Message {
    /// Parsed send time, if the timestamp is valid RFC 3339
    pub fn sent_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.timestamp).ok()
    }
}

/// Result reported by a single channel export task
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The channel's history was fully written to its entry
    Done {
        /// Number of messages written
        messages: u64,
    },
    /// The task stopped early
    Failed(ExportError),
}

/// Per-channel line of a successful export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelReport {
    /// Channel ID
    pub channel_id: ChannelId,
    /// Channel display name
    pub channel_name: String,
    /// Archive entry the channel was written to
    pub entry: String,
    /// Number of messages written
    pub messages: u64,
}

/// Summary of a successful export
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Archive file path
    pub path: PathBuf,
    /// One report per exported channel, in selection order
    pub channels: Vec<ChannelReport>,
}

impl ExportReport {
    /// Total number of messages across all channels
    pub fn total_messages(&self) -> u64 {
        self.channels.iter().map(|c| c.messages).sum()
    }
}

/// Event emitted by the exporter
///
/// Consumers subscribe via [`crate::Archiver::subscribe`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// An export was launched
    ExportStarted {
        /// Archive file path
        path: PathBuf,
        /// Number of channels selected
        channels: usize,
    },

    /// A channel task acquired its concurrency permit and started paginating
    ChannelStarted {
        /// Channel ID
        channel_id: ChannelId,
        /// Channel display name
        name: String,
    },

    /// A page of messages was appended to a channel's entry
    PageArchived {
        /// Channel ID
        channel_id: ChannelId,
        /// Messages in this page
        messages: usize,
        /// Messages written for this channel so far
        total: u64,
    },

    /// A channel finished successfully
    ChannelComplete {
        /// Channel ID
        channel_id: ChannelId,
        /// Channel display name
        name: String,
        /// Messages written
        messages: u64,
    },

    /// A channel task failed
    ChannelFailed {
        /// Channel ID
        channel_id: ChannelId,
        /// Channel display name
        name: String,
        /// Error message
        error: String,
    },

    /// The archive was finalized
    ExportComplete {
        /// Archive file path
        path: PathBuf,
        /// Messages written across all channels
        messages: u64,
    },

    /// The export was abandoned
    ExportFailed {
        /// Archive file path
        path: PathBuf,
        /// Error message
        error: String,
    },
}
