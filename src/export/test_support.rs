//! In-memory service and sink used by unit tests across the crate.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::client::{ChatService, Connector};
use crate::error::{Error, ExportError, Result};
use crate::types::{Channel, ChannelId, Guild, GuildId, Message, MessageId, User, UserId};

use super::writer::{ArchiveSink, EntryId};

/// Build a fixture message with a numeric id; larger ids are newer.
pub(crate) fn fixture_message(channel: &str, n: u64) -> Message {
    let mut fields = serde_json::Map::new();
    fields.insert("channel_id".into(), channel.into());
    fields.insert("content".into(), format!("message {n}").into());
    Message {
        id: MessageId::new(n.to_string()),
        timestamp: format!("2024-01-01T00:{:02}:{:02}+00:00", (n / 60) % 60, n % 60),
        fields,
    }
}

/// Counters observed by tests
#[derive(Debug, Default)]
pub(crate) struct FixtureStats {
    /// `channel_messages` calls per channel
    pub(crate) calls: HashMap<String, usize>,
    /// `before` cursor of every call, per channel
    pub(crate) cursors: HashMap<String, Vec<Option<String>>>,
    in_flight: usize,
    /// Highest number of concurrent `channel_messages` calls seen
    pub(crate) max_in_flight: usize,
}

/// Decrements the in-flight counter even when the request future is dropped
struct InFlight<'a>(&'a Mutex<FixtureStats>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut stats) = self.0.lock() {
            stats.in_flight -= 1;
        }
    }
}

/// Scriptable [`ChatService`] backed by in-memory histories.
#[derive(Default)]
pub(crate) struct FixtureService {
    guilds: Vec<Guild>,
    channels: HashMap<String, Vec<Channel>>,
    histories: HashMap<String, Vec<Message>>,
    failures: HashMap<String, usize>,
    hangs: HashSet<String>,
    page_delay: Option<Duration>,
    stats: Mutex<FixtureStats>,
}

impl FixtureService {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_guild(mut self, id: &str, name: &str) -> Self {
        self.guilds.push(Guild {
            id: GuildId::new(id),
            name: name.to_string(),
        });
        self
    }

    /// Add a channel holding `messages` messages, ids `messages..=1` newest first
    pub(crate) fn with_channel(
        mut self,
        guild: &str,
        id: &str,
        name: &str,
        kind: u8,
        messages: u64,
    ) -> Self {
        self.channels
            .entry(guild.to_string())
            .or_default()
            .push(Channel {
                id: ChannelId::new(id),
                name: name.to_string(),
                kind,
                position: None,
            });
        self.histories.insert(
            id.to_string(),
            (1..=messages).rev().map(|n| fixture_message(id, n)).collect(),
        );
        self
    }

    /// Fail the `page`-th request (1-based) for `channel`
    pub(crate) fn with_failure(mut self, channel: &str, page: usize) -> Self {
        self.failures.insert(channel.to_string(), page);
        self
    }

    /// Never answer requests for `channel`
    pub(crate) fn with_hang(mut self, channel: &str) -> Self {
        self.hangs.insert(channel.to_string());
        self
    }

    /// Delay every message request
    pub(crate) fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = Some(delay);
        self
    }

    pub(crate) fn calls(&self, channel: &str) -> usize {
        self.stats
            .lock()
            .expect("stats lock")
            .calls
            .get(channel)
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn cursors(&self, channel: &str) -> Vec<Option<String>> {
        self.stats
            .lock()
            .expect("stats lock")
            .cursors
            .get(channel)
            .cloned()
            .unwrap_or_default()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.stats.lock().expect("stats lock").max_in_flight
    }

    pub(crate) fn channels_of(&self, guild: &str) -> Vec<Channel> {
        self.channels.get(guild).cloned().unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl ChatService for FixtureService {
    async fn current_user(&self) -> Result<User> {
        Ok(User {
            id: UserId::new("1000"),
            username: "archivist".to_string(),
        })
    }

    async fn current_user_guilds(&self) -> Result<Vec<Guild>> {
        Ok(self.guilds.clone())
    }

    async fn guild_channels(&self, guild: &GuildId) -> Result<Vec<Channel>> {
        self.channels
            .get(guild.as_str())
            .cloned()
            .ok_or_else(|| Error::Api {
                status: 404,
                message: "Unknown Guild".to_string(),
            })
    }

    async fn channel_messages(
        &self,
        channel: &ChannelId,
        limit: usize,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>> {
        let call = {
            let mut stats = self.stats.lock().expect("stats lock");
            stats.in_flight += 1;
            stats.max_in_flight = stats.max_in_flight.max(stats.in_flight);
            stats
                .cursors
                .entry(channel.to_string())
                .or_default()
                .push(before.map(|id| id.to_string()));
            let calls = stats.calls.entry(channel.to_string()).or_default();
            *calls += 1;
            *calls
        };
        let _in_flight = InFlight(&self.stats);

        if self.hangs.contains(channel.as_str()) {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.page_delay {
            tokio::time::sleep(delay).await;
        }
        if self.failures.get(channel.as_str()) == Some(&call) {
            return Err(Error::Api {
                status: 500,
                message: "fixture failure".to_string(),
            });
        }

        let history = self.histories.get(channel.as_str()).ok_or_else(|| Error::Api {
            status: 404,
            message: "Unknown Channel".to_string(),
        })?;
        let start = match before {
            None => 0,
            Some(cursor) => history
                .iter()
                .position(|m| &m.id == cursor)
                .map_or(history.len(), |i| i + 1),
        };
        Ok(history.iter().skip(start).take(limit).cloned().collect())
    }
}

/// [`Connector`] that hands out one fixture service for a single accepted token.
pub(crate) struct FixtureConnector {
    pub(crate) service: Arc<FixtureService>,
    pub(crate) token: String,
}

#[async_trait::async_trait]
impl Connector for FixtureConnector {
    async fn connect(&self, token: &str) -> Result<Arc<dyn ChatService>> {
        if token.trim() != self.token {
            return Err(Error::Api {
                status: 401,
                message: "401: Unauthorized".to_string(),
            });
        }
        Ok(Arc::clone(&self.service) as Arc<dyn ChatService>)
    }
}

/// What a [`MemorySink`] saw, shared with the test after the sink is consumed
#[derive(Debug, Default)]
pub(crate) struct MemoryArchive {
    pub(crate) entries: Vec<(String, Vec<u8>, bool)>,
    pub(crate) finalized: bool,
    pub(crate) abandoned: bool,
}

impl MemoryArchive {
    pub(crate) fn lines(&self, name: &str) -> Vec<String> {
        self.entries
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, bytes, _)| {
                String::from_utf8_lossy(bytes)
                    .lines()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.iter().map(|(n, _, _)| n.clone()).collect()
    }
}

/// [`ArchiveSink`] recording everything in memory.
#[derive(Default)]
pub(crate) struct MemorySink {
    archive: Arc<Mutex<MemoryArchive>>,
    fail_create: Option<String>,
}

impl MemorySink {
    pub(crate) fn new() -> (Self, Arc<Mutex<MemoryArchive>>) {
        let sink = Self::default();
        let archive = Arc::clone(&sink.archive);
        (sink, archive)
    }

    /// Reject creation of the entry called `name`
    pub(crate) fn failing_create(mut self, name: &str) -> Self {
        self.fail_create = Some(name.to_string());
        self
    }
}

impl ArchiveSink for MemorySink {
    fn create_entry(&mut self, name: &str) -> std::result::Result<EntryId, ExportError> {
        if self.fail_create.as_deref() == Some(name) {
            return Err(ExportError::EntryCreation {
                entry: name.to_string(),
                reason: "disk full".to_string(),
            });
        }
        let mut archive = self.archive.lock().expect("archive lock");
        archive.entries.push((name.to_string(), Vec::new(), false));
        Ok(EntryId(archive.entries.len() - 1))
    }

    fn append(&mut self, entry: EntryId, payload: &[u8]) -> std::result::Result<(), ExportError> {
        let mut archive = self.archive.lock().expect("archive lock");
        let (_, bytes, _) = &mut archive.entries[entry.0];
        bytes.extend_from_slice(payload);
        Ok(())
    }

    fn finish_entry(&mut self, entry: EntryId) -> std::result::Result<(), ExportError> {
        self.archive.lock().expect("archive lock").entries[entry.0].2 = true;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> std::result::Result<(), ExportError> {
        self.archive.lock().expect("archive lock").finalized = true;
        Ok(())
    }

    fn abandon(self: Box<Self>) {
        self.archive.lock().expect("archive lock").abandoned = true;
    }
}
