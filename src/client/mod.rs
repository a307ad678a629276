//! Remote service boundary -- the calls the exporter consumes.
//!
//! - [`ChatService`] - listing and paginated retrieval, mockable in tests
//! - [`Connector`] - turns a token into a ready `ChatService`
//! - [`http`] - production implementation over the Discord REST API

pub mod http;

use std::sync::Arc;

use crate::error::Result;
use crate::types::{Channel, ChannelId, Guild, GuildId, Message, MessageId, User};

pub use http::{HttpChatService, HttpConnector};

/// Abstraction over the remote service, enabling testability.
#[async_trait::async_trait]
pub trait ChatService: Send + Sync {
    /// The account the credentials belong to
    async fn current_user(&self) -> Result<User>;

    /// Guilds the account is a member of, in service order
    async fn current_user_guilds(&self) -> Result<Vec<Guild>>;

    /// Channels of a guild, in service order
    async fn guild_channels(&self, guild: &GuildId) -> Result<Vec<Channel>>;

    /// Up to `limit` messages strictly older than `before` (newest first).
    ///
    /// `before = None` starts from the most recent message. An empty page
    /// means the history is exhausted.
    async fn channel_messages(
        &self,
        channel: &ChannelId,
        limit: usize,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>>;
}

/// Builds a [`ChatService`] for a set of credentials.
#[async_trait::async_trait]
pub trait Connector: Send + Sync {
    /// Create a service client authenticated with `token`
    async fn connect(&self, token: &str) -> Result<Arc<dyn ChatService>>;
}
