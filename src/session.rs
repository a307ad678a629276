//! Logged-in session state, passed explicitly to every operation that needs it.

use std::sync::Arc;

use crate::client::{ChatService, Connector};
use crate::error::{Error, Result};
use crate::selection::parse_index;
use crate::types::{Channel, Guild, User};

/// An authenticated connection to the service plus the guild currently in scope.
pub struct Session {
    user: User,
    service: Arc<dyn ChatService>,
    scope: Option<Guild>,
}

impl Session {
    /// Connect with `token` and verify it by fetching the account it belongs to.
    pub async fn login(connector: &dyn Connector, token: &str) -> Result<Self> {
        let service = connector.connect(token).await?;
        Self::from_service(service).await
    }

    /// Build a session around an existing service client.
    pub async fn from_service(service: Arc<dyn ChatService>) -> Result<Self> {
        let user = service.current_user().await?;
        tracing::info!(user_id = %user.id, username = %user.username, "Logged in");
        Ok(Self {
            user,
            service,
            scope: None,
        })
    }

    /// The logged-in account
    pub fn user(&self) -> &User {
        &self.user
    }

    /// The service client this session talks through
    pub fn service(&self) -> &Arc<dyn ChatService> {
        &self.service
    }

    /// The guild currently in scope, if any
    pub fn scope(&self) -> Option<&Guild> {
        self.scope.as_ref()
    }

    /// Guilds the account belongs to, in the order `enter` indexes them
    pub async fn guilds(&self) -> Result<Vec<Guild>> {
        self.service.current_user_guilds().await
    }

    /// Enter the guild at position `arg` of [`Session::guilds`].
    ///
    /// Guild order is assumed stable between the listing the user saw and this call.
    pub async fn enter(&mut self, arg: &str) -> Result<&Guild> {
        let mut guilds = self.guilds().await?;
        let index = parse_index(guilds.len(), arg)?;
        let guild = guilds.swap_remove(index);
        tracing::debug!(guild_id = %guild.id, guild = %guild.name, "Entered guild");
        let guild: &Guild = self.scope.insert(guild);
        Ok(guild)
    }

    /// Leave the current guild; returns the guild that was left
    pub fn leave(&mut self) -> Option<Guild> {
        self.scope.take()
    }

    /// Channels of the guild in scope, in the order selections index them.
    ///
    /// With `text_only`, channels without a message history (voice, categories)
    /// are dropped before indexing.
    pub async fn channels(&self, text_only: bool) -> Result<Vec<Channel>> {
        let guild = self.scope.as_ref().ok_or(Error::NoGuildScope)?;
        let mut channels = self.service.guild_channels(&guild.id).await?;
        if text_only {
            channels.retain(Channel::is_text_based);
        }
        Ok(channels)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::test_support::FixtureService;
    use crate::types::channel_kind;

    fn fixture() -> Arc<FixtureService> {
        Arc::new(
            FixtureService::new()
                .with_guild("1", "Rustaceans")
                .with_guild("2", "Gophers")
                .with_channel("2", "20", "lobby", channel_kind::GUILD_TEXT, 0)
                .with_channel("2", "21", "Voice", channel_kind::GUILD_VOICE, 0)
                .with_channel("2", "22", "news", channel_kind::GUILD_ANNOUNCEMENT, 0),
        )
    }

    #[tokio::test]
    async fn enter_scopes_guild_by_index() {
        let mut session = Session::from_service(fixture()).await.unwrap();
        assert_eq!(session.user().username, "archivist");
        assert!(session.scope().is_none());

        let guild = session.enter("1").await.unwrap();
        assert_eq!(guild.name, "Gophers");
        assert_eq!(session.scope().map(|g| g.id.as_str()), Some("2"));
    }

    #[tokio::test]
    async fn enter_rejects_out_of_range_index_and_keeps_scope() {
        let mut session = Session::from_service(fixture()).await.unwrap();
        session.enter("0").await.unwrap();

        let err = session.enter("2").await.unwrap_err();
        assert!(matches!(err, Error::Selection(_)));
        assert_eq!(session.scope().map(|g| g.name.as_str()), Some("Rustaceans"));
    }

    #[tokio::test]
    async fn channels_require_scope() {
        let session = Session::from_service(fixture()).await.unwrap();
        assert!(matches!(
            session.channels(true).await,
            Err(Error::NoGuildScope)
        ));
    }

    #[tokio::test]
    async fn text_only_listing_drops_voice_channels() {
        let mut session = Session::from_service(fixture()).await.unwrap();
        session.enter("1").await.unwrap();

        let all = session.channels(false).await.unwrap();
        assert_eq!(all.len(), 3);

        let text: Vec<_> = session
            .channels(true)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(text, vec!["lobby", "news"]);
    }

    #[tokio::test]
    async fn leave_returns_previous_scope() {
        let mut session = Session::from_service(fixture()).await.unwrap();
        assert!(session.leave().is_none());
        session.enter("0").await.unwrap();
        assert_eq!(session.leave().map(|g| g.name), Some("Rustaceans".into()));
        assert!(session.scope().is_none());
    }
}
