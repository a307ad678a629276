//! Discord REST API client.

use std::sync::Arc;

use reqwest::header::AUTHORIZATION;
use serde::de::DeserializeOwned;
use url::Url;

use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::types::{Channel, ChannelId, Guild, GuildId, Message, MessageId, User};

use super::{ChatService, Connector};

/// Production [`ChatService`] backed by reqwest.
pub struct HttpChatService {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpChatService {
    /// Create a client for `config.base_url` authenticating with `token`
    pub fn new(config: &ApiConfig, token: impl Into<String>) -> Result<Self> {
        Url::parse(&config.base_url)
            .map_err(|e| Error::config("api.base_url", format!("invalid URL: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Url::parse(&format!("{}/{}", self.base_url, path))
            .map_err(|e| Error::Other(format!("invalid endpoint {path:?}: {e}")))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: api_error_message(&body, status),
            });
        }

        Ok(response.json::<T>().await?)
    }
}

/// Pull the human-readable message out of an error body, falling back to the status reason.
fn api_error_message(body: &str, status: reqwest::StatusCode) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        return parsed.message;
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.to_string();
    }
    status
        .canonical_reason()
        .unwrap_or("unknown error")
        .to_string()
}

#[async_trait::async_trait]
impl ChatService for HttpChatService {
    async fn current_user(&self) -> Result<User> {
        self.get(self.endpoint("users/@me")?).await
    }

    async fn current_user_guilds(&self) -> Result<Vec<Guild>> {
        self.get(self.endpoint("users/@me/guilds")?).await
    }

    async fn guild_channels(&self, guild: &GuildId) -> Result<Vec<Channel>> {
        self.get(self.endpoint(&format!("guilds/{guild}/channels"))?)
            .await
    }

    async fn channel_messages(
        &self,
        channel: &ChannelId,
        limit: usize,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>> {
        let mut url = self.endpoint(&format!("channels/{channel}/messages"))?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &limit.to_string());
            if let Some(before) = before {
                query.append_pair("before", before.as_str());
            }
        }
        self.get(url).await
    }
}

/// Production [`Connector`] producing [`HttpChatService`] instances.
pub struct HttpConnector {
    config: ApiConfig,
}

impl HttpConnector {
    /// Create a connector for the given API settings
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl Connector for HttpConnector {
    async fn connect(&self, token: &str) -> Result<Arc<dyn ChatService>> {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::Other("empty token".to_string()));
        }
        Ok(Arc::new(HttpChatService::new(&self.config, token)?))
    }
}
