//! Archive writer -- the single owner of the archive container.
//!
//! Export tasks never touch the container. They hold an [`EntryWriter`] bound
//! to their own entry and send serialized pages to the writer actor, which runs
//! on a blocking thread and applies commands to the [`ArchiveSink`] one at a
//! time.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tokio::sync::{mpsc, oneshot};

use crate::error::{Error, ExportError, Result};

/// Position of an entry within its sink, in creation order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct EntryId(pub usize);

/// Sequential, append-only archive container with one named entry per channel.
///
/// Implementations are driven from a single thread and may block.
pub trait ArchiveSink: Send + 'static {
    /// Register a new entry; names must be unique within the archive
    fn create_entry(&mut self, name: &str) -> std::result::Result<EntryId, ExportError>;

    /// Append bytes to an open entry
    fn append(&mut self, entry: EntryId, payload: &[u8]) -> std::result::Result<(), ExportError>;

    /// Close an entry; no further appends are accepted for it
    fn finish_entry(&mut self, entry: EntryId) -> std::result::Result<(), ExportError>;

    /// Flush and close the container
    fn finalize(self: Box<Self>) -> std::result::Result<(), ExportError>;

    /// Give up on the container without finalizing it
    fn abandon(self: Box<Self>);
}

enum EntryState {
    /// Receiving pages into an anonymous spool file
    Open { spool: BufWriter<File>, bytes: u64 },
    /// Complete, waiting in its spool file for the container to be finalized
    Finished { spool: File, bytes: u64 },
    /// Spool could not be flushed; the entry can never be written
    Broken,
}

struct SpooledEntry {
    name: String,
    state: EntryState,
}

/// Zip-backed [`ArchiveSink`].
///
/// A zip container can only have one entry open at a time, so every entry is
/// spooled to a temporary file while its channel is being exported. Nothing
/// is written to the archive file until [`ArchiveSink::finalize`], which copies
/// the finished entries into the zip in creation order. An abandoned archive
/// is left as an empty file that no zip reader accepts.
pub struct ZipArchiveSink {
    path: PathBuf,
    file: File,
    spool_dir: Option<PathBuf>,
    entries: Vec<SpooledEntry>,
}

impl ZipArchiveSink {
    /// Create a new archive at `path`, refusing to overwrite an existing file.
    pub fn create(path: impl AsRef<Path>, spool_dir: Option<PathBuf>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    Error::ArchiveExists(path.clone())
                } else {
                    Error::Io(std::io::Error::new(
                        e.kind(),
                        format!("opening file {}: {}", path.display(), e),
                    ))
                }
            })?;

        Ok(Self {
            path,
            file,
            spool_dir,
            entries: Vec::new(),
        })
    }

    /// Path of the archive file
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_spool(&self) -> std::io::Result<File> {
        match &self.spool_dir {
            Some(dir) => tempfile::tempfile_in(dir),
            None => tempfile::tempfile(),
        }
    }

    fn entry_mut(&mut self, entry: EntryId) -> std::result::Result<&mut SpooledEntry, ExportError> {
        self.entries
            .get_mut(entry.0)
            .ok_or_else(|| ExportError::EntryWrite {
                entry: format!("#{}", entry.0),
                reason: "unknown entry".to_string(),
            })
    }
}

impl ArchiveSink for ZipArchiveSink {
    fn create_entry(&mut self, name: &str) -> std::result::Result<EntryId, ExportError> {
        if self.entries.iter().any(|e| e.name == name) {
            return Err(ExportError::EntryCreation {
                entry: name.to_string(),
                reason: "duplicate entry name".to_string(),
            });
        }

        let spool = self.open_spool().map_err(|e| ExportError::EntryCreation {
            entry: name.to_string(),
            reason: format!("failed to create spool file: {e}"),
        })?;

        self.entries.push(SpooledEntry {
            name: name.to_string(),
            state: EntryState::Open {
                spool: BufWriter::new(spool),
                bytes: 0,
            },
        });
        Ok(EntryId(self.entries.len() - 1))
    }

    fn append(&mut self, entry: EntryId, payload: &[u8]) -> std::result::Result<(), ExportError> {
        let spooled = self.entry_mut(entry)?;
        match &mut spooled.state {
            EntryState::Open { spool, bytes } => {
                spool
                    .write_all(payload)
                    .map_err(|e| ExportError::EntryWrite {
                        entry: spooled.name.clone(),
                        reason: e.to_string(),
                    })?;
                *bytes += payload.len() as u64;
                Ok(())
            }
            EntryState::Finished { .. } | EntryState::Broken => Err(ExportError::EntryWrite {
                entry: spooled.name.clone(),
                reason: "entry already closed".to_string(),
            }),
        }
    }

    fn finish_entry(&mut self, entry: EntryId) -> std::result::Result<(), ExportError> {
        let spooled = self.entry_mut(entry)?;
        let name = spooled.name.clone();
        let write_err = |reason: String| ExportError::EntryWrite {
            entry: name.clone(),
            reason,
        };

        let (spool, bytes) = match std::mem::replace(&mut spooled.state, EntryState::Broken) {
            EntryState::Open { spool, bytes } => (spool, bytes),
            state => {
                spooled.state = state;
                return Err(write_err("entry already closed".to_string()));
            }
        };

        let mut file = spool
            .into_inner()
            .map_err(|e| write_err(format!("flushing spool: {}", e.error())))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| write_err(format!("rewinding spool: {e}")))?;
        spooled.state = EntryState::Finished { spool: file, bytes };

        tracing::debug!(entry = %name, bytes, "Entry finished");
        Ok(())
    }

    fn finalize(self: Box<Self>) -> std::result::Result<(), ExportError> {
        let Self {
            path, file, entries, ..
        } = *self;
        let finalize_err = |reason: String| ExportError::Finalization {
            path: path.clone(),
            reason,
        };

        if let Some(open) = entries
            .iter()
            .find(|e| !matches!(e.state, EntryState::Finished { .. }))
        {
            return Err(finalize_err(format!(
                "entry {} was never finished",
                open.name
            )));
        }

        let count = entries.len();
        let mut zip = zip::ZipWriter::new(file);
        for entry in entries {
            let EntryState::Finished { mut spool, bytes } = entry.state else {
                continue;
            };
            let options = zip::write::FileOptions::default()
                .compression_method(zip::CompressionMethod::Deflated)
                .large_file(bytes >= u64::from(u32::MAX));
            zip.start_file(entry.name.as_str(), options)
                .map_err(|e| finalize_err(format!("{}: {e}", entry.name)))?;
            std::io::copy(&mut spool, &mut zip)
                .map_err(|e| finalize_err(format!("{}: {e}", entry.name)))?;
        }

        let file = zip.finish().map_err(|e| finalize_err(e.to_string()))?;
        file.sync_all().map_err(|e| finalize_err(e.to_string()))?;

        tracing::info!(path = %path.display(), entries = count, "Archive finalized");
        Ok(())
    }

    fn abandon(self: Box<Self>) {
        let unfinished = self
            .entries
            .iter()
            .filter(|e| !matches!(e.state, EntryState::Finished { .. }))
            .count();
        // Spool files are deleted on drop; the archive file stays empty.
        tracing::warn!(
            path = %self.path.display(),
            unfinished,
            "Abandoning archive"
        );
    }
}

/// Command sent to the writer actor
enum WriterCommand {
    CreateEntry {
        name: String,
        reply: oneshot::Sender<std::result::Result<EntryId, ExportError>>,
    },
    Append {
        entry: EntryId,
        payload: Vec<u8>,
        reply: oneshot::Sender<std::result::Result<(), ExportError>>,
    },
    FinishEntry {
        entry: EntryId,
        reply: oneshot::Sender<std::result::Result<(), ExportError>>,
    },
    Finalize {
        reply: oneshot::Sender<std::result::Result<(), ExportError>>,
    },
    Abandon,
}

/// Actor loop: applies commands to the sink until it is finalized, abandoned,
/// or every handle is gone.
fn run_writer(mut sink: Box<dyn ArchiveSink>, mut rx: mpsc::Receiver<WriterCommand>) {
    while let Some(command) = rx.blocking_recv() {
        match command {
            WriterCommand::CreateEntry { name, reply } => {
                let _ = reply.send(sink.create_entry(&name));
            }
            WriterCommand::Append {
                entry,
                payload,
                reply,
            } => {
                let _ = reply.send(sink.append(entry, &payload));
            }
            WriterCommand::FinishEntry { entry, reply } => {
                let _ = reply.send(sink.finish_entry(entry));
            }
            WriterCommand::Finalize { reply } => {
                let _ = reply.send(sink.finalize());
                return;
            }
            WriterCommand::Abandon => {
                sink.abandon();
                return;
            }
        }
    }
    sink.abandon();
}

/// Send a command and wait for its acknowledgement.
///
/// `gone` builds the error reported when the actor is no longer running.
async fn request<T>(
    tx: &mpsc::Sender<WriterCommand>,
    command: impl FnOnce(oneshot::Sender<std::result::Result<T, ExportError>>) -> WriterCommand,
    gone: impl Fn() -> ExportError,
) -> std::result::Result<T, ExportError> {
    let (reply_tx, reply_rx) = oneshot::channel();
    tx.send(command(reply_tx)).await.map_err(|_| gone())?;
    reply_rx.await.map_err(|_| gone())?
}

/// Handle to the writer actor, owned by the export coordinator.
pub struct ArchiveWriter {
    tx: mpsc::Sender<WriterCommand>,
    actor: tokio::task::JoinHandle<()>,
    path: PathBuf,
}

impl ArchiveWriter {
    /// Start the actor on a blocking thread, taking exclusive ownership of `sink`.
    ///
    /// `path` is only used to label finalization errors.
    pub fn spawn(sink: Box<dyn ArchiveSink>, buffer: usize, path: PathBuf) -> Self {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let actor = tokio::task::spawn_blocking(move || run_writer(sink, rx));
        Self { tx, actor, path }
    }

    /// Create an entry and return the handle a task uses to write it.
    pub async fn create_entry(&self, name: &str) -> std::result::Result<EntryWriter, ExportError> {
        let entry = request(
            &self.tx,
            |reply| WriterCommand::CreateEntry {
                name: name.to_string(),
                reply,
            },
            || ExportError::EntryCreation {
                entry: name.to_string(),
                reason: "archive writer stopped".to_string(),
            },
        )
        .await?;

        Ok(EntryWriter {
            tx: self.tx.clone(),
            entry,
            name: name.to_string(),
        })
    }

    /// Finalize the container and wait for the actor to exit.
    pub async fn finalize(self) -> std::result::Result<(), ExportError> {
        let path = self.path.clone();
        let gone = || ExportError::Finalization {
            path: path.clone(),
            reason: "archive writer stopped".to_string(),
        };
        let result = request(&self.tx, |reply| WriterCommand::Finalize { reply }, gone).await;
        drop(self.tx);
        if let Err(e) = self.actor.await {
            tracing::error!(error = %e, "Archive writer task panicked");
            return Err(gone());
        }
        result
    }

    /// Abandon the container without finalizing it and wait for the actor to exit.
    pub async fn abandon(self) {
        let _ = self.tx.send(WriterCommand::Abandon).await;
        drop(self.tx);
        if let Err(e) = self.actor.await {
            tracing::error!(error = %e, "Archive writer task panicked");
        }
    }
}

/// Write access to exactly one archive entry.
pub struct EntryWriter {
    tx: mpsc::Sender<WriterCommand>,
    entry: EntryId,
    name: String,
}

impl EntryWriter {
    /// Name of the entry inside the archive
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append serialized bytes to this entry
    pub async fn append(&self, payload: Vec<u8>) -> std::result::Result<(), ExportError> {
        request(
            &self.tx,
            |reply| WriterCommand::Append {
                entry: self.entry,
                payload,
                reply,
            },
            || self.writer_gone(),
        )
        .await
    }

    /// Close this entry; the handle is consumed
    pub async fn finish(self) -> std::result::Result<(), ExportError> {
        request(
            &self.tx,
            |reply| WriterCommand::FinishEntry {
                entry: self.entry,
                reply,
            },
            || self.writer_gone(),
        )
        .await
    }

    fn writer_gone(&self) -> ExportError {
        ExportError::EntryWrite {
            entry: self.name.clone(),
            reason: "archive writer stopped".to_string(),
        }
    }
}
