//! Channel export task -- drives one paginator into one archive entry.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::client::ChatService;
use crate::error::ExportError;
use crate::types::{Channel, Event, ExportOutcome, Message};

use super::paginator::MessagePaginator;
use super::writer::EntryWriter;

/// Everything a single channel export needs; consumed by [`ChannelExportTask::run`].
pub(crate) struct ChannelExportTask {
    pub(crate) service: Arc<dyn ChatService>,
    pub(crate) channel: Channel,
    pub(crate) entry: EntryWriter,
    pub(crate) page_size: usize,
    pub(crate) cancel_token: CancellationToken,
    pub(crate) event_tx: broadcast::Sender<Event>,
}

impl ChannelExportTask {
    /// Export the channel and report exactly one outcome.
    pub(crate) async fn run(self) -> ExportOutcome {
        match self.export().await {
            Ok(messages) => ExportOutcome::Done { messages },
            Err(e) => ExportOutcome::Failed(e),
        }
    }

    async fn export(self) -> Result<u64, ExportError> {
        let ChannelExportTask {
            service,
            channel,
            entry,
            page_size,
            cancel_token,
            event_tx,
        } = self;

        event_tx
            .send(Event::ChannelStarted {
                channel_id: channel.id.clone(),
                name: channel.name.clone(),
            })
            .ok();

        let mut paginator = MessagePaginator::new(service, channel.id.clone(), page_size);
        let mut written: u64 = 0;

        loop {
            let page = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    tracing::debug!(channel_id = %channel.id, written, "Channel export cancelled");
                    return Err(ExportError::Cancelled);
                }
                page = paginator.next_page() => page,
            };

            let messages = match page {
                None => break,
                Some(Ok(messages)) => messages,
                Some(Err(e)) => {
                    return Err(ExportError::Retrieval {
                        channel: channel.name.clone(),
                        reason: e.to_string(),
                    });
                }
            };

            entry.append(encode_page(&channel, &messages)?).await?;
            written += messages.len() as u64;
            tracing::trace!(
                channel_id = %channel.id,
                messages = messages.len(),
                oldest = ?messages.last().and_then(Message::sent_at),
                "Page archived"
            );

            event_tx
                .send(Event::PageArchived {
                    channel_id: channel.id.clone(),
                    messages: messages.len(),
                    total: written,
                })
                .ok();
        }

        entry.finish().await?;
        Ok(written)
    }
}

/// Serialize a page as newline-delimited JSON, one message per line.
pub(crate) fn encode_page(channel: &Channel, messages: &[Message]) -> Result<Vec<u8>, ExportError> {
    let mut payload = Vec::with_capacity(messages.len() * 256);
    for message in messages {
        serde_json::to_writer(&mut payload, message).map_err(|e| ExportError::Serialization {
            channel: channel.name.clone(),
            message_id: message.id.to_string(),
            reason: e.to_string(),
        })?;
        payload.push(b'\n');
    }
    Ok(payload)
}
