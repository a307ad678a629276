//! # discord-archive
//!
//! Archive the message history of Discord guild channels into a zip file.
//!
//! ## Design Philosophy
//!
//! discord-archive is designed to be:
//! - **Concurrent** - Channels are exported in parallel, bounded by configuration
//! - **All or nothing** - One failing channel aborts the export; no half-archive is finalized
//! - **Streaming** - Pages are written as they arrive, memory stays bounded
//! - **Event-driven** - Consumers subscribe to progress events, no polling required
//!
//! ## Quick Start
//!
//! ```no_run
//! use discord_archive::{Archiver, Config, HttpConnector, Session};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let connector = HttpConnector::new(config.api.clone());
//!     let archiver = Archiver::new(config)?;
//!
//!     let mut session = Session::login(&connector, "my-token").await?;
//!     session.enter("0").await?;
//!
//!     // Subscribe to events
//!     let mut events = archiver.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let path = archiver.archive_path("backup");
//!     let report = archiver
//!         .archive(&session, &path, &["0", "2"], &CancellationToken::new())
//!         .await?;
//!     println!("{} messages archived", report.total_messages());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Archive orchestration
pub mod archiver;
/// Remote service clients
pub mod client;
/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Concurrent channel export pipeline
pub mod export;
/// Channel selection from index arguments
pub mod selection;
/// Logged-in session state
pub mod session;
/// Interactive command shell
pub mod shell;
/// Core types and events
pub mod types;

// Re-export commonly used types
pub use archiver::Archiver;
pub use client::{ChatService, Connector, HttpChatService, HttpConnector};
pub use config::{ApiConfig, Config, ExportConfig};
pub use error::{Error, ExportError, Result, SelectionError};
pub use export::{ArchiveSink, ExportCoordinator, MessagePaginator, ZipArchiveSink};
pub use selection::Selection;
pub use session::Session;
pub use shell::{SecretReader, Shell};
pub use types::{
    Channel, ChannelId, ChannelReport, Event, ExportOutcome, ExportReport, Guild, GuildId,
    Message, MessageId, User, UserId,
};

use tokio_util::sync::CancellationToken;

/// Cancel `token` when a termination signal arrives.
///
/// Meant to be spawned next to the shell; every export started with `token`
/// (or a child of it) is aborted on the signal.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use discord_archive::cancel_on_signal;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let shutdown = CancellationToken::new();
///     tokio::spawn(cancel_on_signal(shutdown.clone()));
///     shutdown.cancelled().await;
/// }
/// ```
pub async fn cancel_on_signal(token: CancellationToken) {
    tokio::select! {
        _ = wait_for_signal() => token.cancel(),
        _ = token.cancelled() => {}
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal, cancelling");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C), cancelling");
                }
            }
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register signal handlers, using ctrl_c fallback");
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal, cancelling");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
            std::future::pending::<()>().await;
        }
    }
}
