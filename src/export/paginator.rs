//! Backward pagination over one channel's message history.

use std::sync::Arc;

use futures::stream::{self, Stream};

use crate::client::ChatService;
use crate::error::Result;
use crate::types::{ChannelId, Message, MessageId};

/// Walks a channel's history from the most recent message backwards, one page at a time.
///
/// The paginator owns its cursor; once it has yielded an error or seen an empty
/// page it is exhausted and never requests again.
pub struct MessagePaginator {
    service: Arc<dyn ChatService>,
    channel: ChannelId,
    page_size: usize,
    cursor: Option<MessageId>,
    exhausted: bool,
    pages_fetched: usize,
}

impl MessagePaginator {
    /// Create a paginator starting at the most recent message of `channel`
    pub fn new(service: Arc<dyn ChatService>, channel: ChannelId, page_size: usize) -> Self {
        Self {
            service,
            channel,
            page_size,
            cursor: None,
            exhausted: false,
            pages_fetched: 0,
        }
    }

    /// Fetch the next page.
    ///
    /// Returns `None` once the history is exhausted. A retrieval error is
    /// returned once and ends the sequence.
    pub async fn next_page(&mut self) -> Option<Result<Vec<Message>>> {
        if self.exhausted {
            return None;
        }

        let result = self
            .service
            .channel_messages(&self.channel, self.page_size, self.cursor.as_ref())
            .await;
        self.pages_fetched += 1;

        match result {
            Err(e) => {
                self.exhausted = true;
                Some(Err(e))
            }
            Ok(messages) if messages.is_empty() => {
                self.exhausted = true;
                None
            }
            Ok(messages) => {
                // Pages arrive newest first, so the last message is the oldest seen.
                self.cursor = messages.last().map(|m| m.id.clone());
                tracing::debug!(
                    channel_id = %self.channel,
                    page = self.pages_fetched,
                    messages = messages.len(),
                    "Fetched message page"
                );
                Some(Ok(messages))
            }
        }
    }

    /// Identifier of the oldest message seen so far
    pub fn cursor(&self) -> Option<&MessageId> {
        self.cursor.as_ref()
    }

    /// Whether no further pages will be requested
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Number of page requests issued, including the terminating one
    pub fn pages_fetched(&self) -> usize {
        self.pages_fetched
    }

    /// Flatten the pages into a lazy stream of messages.
    ///
    /// The stream ends after the history is exhausted or right after the first error.
    pub fn into_stream(self) -> impl Stream<Item = Result<Message>> {
        stream::unfold(
            (self, Vec::new().into_iter()),
            |(mut paginator, mut page)| async move {
                loop {
                    if let Some(message) = page.next() {
                        return Some((Ok(message), (paginator, page)));
                    }
                    match paginator.next_page().await? {
                        Ok(messages) => page = messages.into_iter(),
                        Err(e) => return Some((Err(e), (paginator, page))),
                    }
                }
            },
        )
    }
}
