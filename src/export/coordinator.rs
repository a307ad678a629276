//! Export coordinator -- fan-out of channel tasks, fan-in of their outcomes.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::client::ChatService;
use crate::config::ExportConfig;
use crate::error::{Error, ExportError, Result};
use crate::selection::Selection;
use crate::types::{Channel, ChannelReport, Event, ExportOutcome, ExportReport};

use super::task::ChannelExportTask;
use super::writer::{ArchiveSink, ArchiveWriter};

/// Runs one export: one task per selected channel, one writer for the container.
pub struct ExportCoordinator {
    service: Arc<dyn ChatService>,
    config: ExportConfig,
    event_tx: broadcast::Sender<Event>,
}

impl ExportCoordinator {
    /// Create a coordinator fetching through `service`
    pub fn new(
        service: Arc<dyn ChatService>,
        config: ExportConfig,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            service,
            config,
            event_tx,
        }
    }

    /// Export every selected channel into `sink`.
    ///
    /// Phases:
    /// 1. Create one entry per selected channel, sequentially, before any task runs
    /// 2. Spawn one task per channel; at most `max_concurrent_channels` paginate at once
    /// 3. Collect one outcome per task from a single outcome channel
    /// 4. On the first failure, cancel and join the siblings, then abandon the sink
    /// 5. If every task succeeded, finalize the sink
    ///
    /// `path` labels events and errors; `cancel_token` stops the whole export.
    pub async fn run(
        &self,
        channels: &[Channel],
        selection: &Selection,
        sink: Box<dyn ArchiveSink>,
        path: &Path,
        cancel_token: &CancellationToken,
    ) -> Result<ExportReport> {
        if selection.len() != channels.len() {
            return Err(Error::Other(format!(
                "selection covers {} channels but {} were listed",
                selection.len(),
                channels.len()
            )));
        }

        let selected: Vec<&Channel> = selection.indices().map(|i| &channels[i]).collect();
        let names = entry_names(&selected);

        self.event_tx
            .send(Event::ExportStarted {
                path: path.to_path_buf(),
                channels: selected.len(),
            })
            .ok();
        tracing::info!(path = %path.display(), channels = selected.len(), "Starting export");

        let writer = ArchiveWriter::spawn(sink, self.config.writer_buffer, path.to_path_buf());

        // Phase 1: entries exist before any task can write
        let mut entries = Vec::with_capacity(selected.len());
        for name in &names {
            match writer.create_entry(name).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::error!(entry = %name, error = %e, "Failed to create archive entry");
                    writer.abandon().await;
                    return Err(self.fail(path, e));
                }
            }
        }

        // Phase 2: fan-out
        let cancel = cancel_token.child_token();
        let limiter = Arc::new(Semaphore::new(self.config.max_concurrent_channels.max(1)));
        let (outcome_tx, mut outcome_rx) =
            mpsc::channel::<(usize, ExportOutcome)>(selected.len().max(1));

        let mut handles = Vec::with_capacity(selected.len());
        for (slot, (channel, entry)) in selected.iter().zip(entries).enumerate() {
            let task = ChannelExportTask {
                service: Arc::clone(&self.service),
                channel: (*channel).clone(),
                entry,
                page_size: self.config.page_size,
                cancel_token: cancel.clone(),
                event_tx: self.event_tx.clone(),
            };
            let limiter = Arc::clone(&limiter);
            let outcome_tx = outcome_tx.clone();
            let cancel = cancel.clone();

            handles.push(tokio::spawn(async move {
                let outcome = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => ExportOutcome::Failed(ExportError::Cancelled),
                    permit = limiter.acquire_owned() => match permit {
                        Ok(_permit) => task.run().await,
                        Err(_) => ExportOutcome::Failed(ExportError::Cancelled),
                    },
                };
                // The receiver only goes away once the coordinator has given up
                let _ = outcome_tx.send((slot, outcome)).await;
            }));
        }
        drop(outcome_tx);
        let launched = handles.len();

        // Phase 3: fan-in
        let mut counts = vec![0u64; launched];
        let mut received = 0;
        let mut failure: Option<ExportError> = None;
        while received < launched {
            let Some((slot, outcome)) = outcome_rx.recv().await else {
                break;
            };
            received += 1;
            let channel = selected[slot];

            match outcome {
                ExportOutcome::Done { messages } => {
                    counts[slot] = messages;
                    tracing::info!(
                        channel_id = %channel.id,
                        channel = %channel.name,
                        messages,
                        "Channel exported"
                    );
                    self.event_tx
                        .send(Event::ChannelComplete {
                            channel_id: channel.id.clone(),
                            name: channel.name.clone(),
                            messages,
                        })
                        .ok();
                }
                ExportOutcome::Failed(e) => {
                    tracing::warn!(
                        channel_id = %channel.id,
                        channel = %channel.name,
                        error = %e,
                        "Channel export failed, cancelling remaining channels"
                    );
                    self.event_tx
                        .send(Event::ChannelFailed {
                            channel_id: channel.id.clone(),
                            name: channel.name.clone(),
                            error: e.to_string(),
                        })
                        .ok();
                    failure = Some(e);
                    break;
                }
            }
        }

        if failure.is_none() && received < launched {
            failure = Some(ExportError::EntryWrite {
                entry: "<unknown>".to_string(),
                reason: format!(
                    "{} of {} export tasks exited without reporting",
                    launched - received,
                    launched
                ),
            });
        }

        // Phase 4: siblings must be stopped before the container is touched again
        if let Some(error) = failure {
            cancel.cancel();
            for handle in handles {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Channel export task panicked");
                }
            }
            writer.abandon().await;
            return Err(self.fail(path, error));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Channel export task panicked");
            }
        }

        // Phase 5: finalize
        if let Err(e) = writer.finalize().await {
            tracing::error!(path = %path.display(), error = %e, "Failed to finalize archive");
            return Err(self.fail(path, e));
        }

        let report = ExportReport {
            path: path.to_path_buf(),
            channels: selected
                .iter()
                .zip(names)
                .zip(counts)
                .map(|((channel, entry), messages)| ChannelReport {
                    channel_id: channel.id.clone(),
                    channel_name: channel.name.clone(),
                    entry,
                    messages,
                })
                .collect(),
        };

        self.event_tx
            .send(Event::ExportComplete {
                path: path.to_path_buf(),
                messages: report.total_messages(),
            })
            .ok();
        Ok(report)
    }

    fn fail(&self, path: &Path, error: ExportError) -> Error {
        self.event_tx
            .send(Event::ExportFailed {
                path: path.to_path_buf(),
                error: error.to_string(),
            })
            .ok();
        Error::Export(error)
    }
}

/// Archive entry names for the selected channels, in order.
///
/// Names come from the channel's display name with path separators replaced;
/// a name already taken gets the channel ID appended, then a counter if that
/// is taken too.
pub(crate) fn entry_names(channels: &[&Channel]) -> Vec<String> {
    let mut taken = HashSet::with_capacity(channels.len());
    channels
        .iter()
        .map(|channel| {
            let base = if channel.name.trim().is_empty() {
                channel.id.to_string()
            } else {
                channel.name.replace(['/', '\\'], "_")
            };

            let mut name = format!("{base}.json");
            if taken.contains(&name) {
                name = format!("{base} ({}).json", channel.id);
            }
            let mut n = 2;
            while taken.contains(&name) {
                name = format!("{base} ({}) ({n}).json", channel.id);
                n += 1;
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}
