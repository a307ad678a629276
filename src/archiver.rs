//! Archive orchestration -- ties a session, a channel selection and an output file together.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::export::{ExportCoordinator, ZipArchiveSink};
use crate::selection::Selection;
use crate::session::Session;
use crate::types::{Event, ExportReport};

/// Entry point for exports.
///
/// Cheap to clone; clones share the event channel.
#[derive(Clone)]
pub struct Archiver {
    config: Arc<Config>,
    event_tx: broadcast::Sender<Event>,
}

impl Archiver {
    /// Create an archiver, validating `config` first.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        // Buffer of 1000 events keeps slow subscribers from lagging during large exports
        let (event_tx, _rx) = broadcast::channel(1000);

        Ok(Self {
            config: Arc::new(config),
            event_tx,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to export events.
    ///
    /// Each subscriber receives every event emitted after it subscribed. A
    /// subscriber that falls more than 1000 events behind gets
    /// `RecvError::Lagged` and skips the oldest ones.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Path of the archive for a base name typed by the user
    pub fn archive_path(&self, base_name: &str) -> PathBuf {
        self.config
            .export
            .output_dir
            .join(format!("{}.zip", base_name.trim()))
    }

    /// Archive channels of the guild in scope into a new file at `path`.
    ///
    /// `args` are channel indices into [`Session::channels`]; none means every
    /// channel. Nothing is created on disk when the scope, the file or the
    /// selection is invalid. On failure the partly written file is removed
    /// unless `export.keep_partial` is set.
    pub async fn archive<S: AsRef<str>>(
        &self,
        session: &Session,
        path: &Path,
        args: &[S],
        cancel_token: &CancellationToken,
    ) -> Result<ExportReport> {
        let guild = session.scope().ok_or(Error::NoGuildScope)?;
        if path.exists() {
            return Err(Error::ArchiveExists(path.to_path_buf()));
        }

        let channels = session
            .channels(self.config.export.text_channels_only)
            .await?;
        let selection = Selection::parse(channels.len(), args)?;

        tracing::info!(
            guild_id = %guild.id,
            guild = %guild.name,
            path = %path.display(),
            selected = selection.selected_count(),
            listed = channels.len(),
            "Archiving guild"
        );

        let sink = ZipArchiveSink::create(path, self.config.export.spool_dir.clone())?;
        let coordinator = ExportCoordinator::new(
            Arc::clone(session.service()),
            self.config.export.clone(),
            self.event_tx.clone(),
        );

        let result = coordinator
            .run(&channels, &selection, Box::new(sink), path, cancel_token)
            .await;

        if result.is_err() && !self.config.export.keep_partial {
            match tokio::fs::remove_file(path).await {
                Ok(()) => {
                    tracing::debug!(path = %path.display(), "Removed incomplete archive");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to remove incomplete archive");
                }
            }
        }

        result
    }
}
