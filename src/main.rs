use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use discord_archive::{Archiver, Config, HttpConnector, Shell, cancel_on_signal};

#[derive(Parser)]
#[command(
    name = "discord-archive",
    version,
    about = "Archive Discord channel history into zip files"
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, env = "DISCORD_ARCHIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Token to log in with on startup
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

/// Logs go to stderr; stdout belongs to the shell.
fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    tracing::debug!(?config, "Loaded configuration");

    let connector = Arc::new(HttpConnector::new(config.api.clone()));
    let archiver = Archiver::new(config)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(cancel_on_signal(shutdown.clone()));

    let mut shell = Shell::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        connector,
        archiver,
        shutdown.clone(),
    );
    if std::io::stdin().is_terminal() {
        shell = shell.with_secret_reader(Arc::new(rpassword::read_password));
    }
    if let Some(token) = cli.token.as_deref() {
        shell.login(token).await?;
    }
    shell.run().await?;

    // Stop the signal listener once the shell has exited on its own
    shutdown.cancel();
    Ok(())
}
